//! Closed-form intrinsics from plane homographies.

use checkercal_core::{ImageSize, PinholeIntrinsics};
use nalgebra::{DMatrix, DVector, Matrix3, SVector};

/// The 6-vector `v_ij(H)` of Zhang's method for columns `i`, `j`.
fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = h.column(i);
    let hj = h.column(j);

    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Zhang's closed-form intrinsics from at least three homographies.
///
/// The estimated skew is dropped. Returns `None` for fewer than three
/// views or when the image of the absolute conic is not positive definite.
pub fn intrinsics_from_homographies(hs: &[Matrix3<f64>]) -> Option<PinholeIntrinsics> {
    if hs.len() < 3 {
        return None;
    }

    let m = hs.len();
    let mut vmtx = DMatrix::<f64>::zeros((2 * m).max(6), 6);
    for (k, h) in hs.iter().enumerate() {
        // scale-normalise so every view weighs the same
        let h = h / h.column(0).norm().max(h.column(1).norm());
        let v11 = v_ij(&h, 0, 0);
        let v22 = v_ij(&h, 1, 1);
        let v12 = v_ij(&h, 0, 1);
        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    // V b = 0: right singular vector of the smallest singular value
    let svd = vmtx.svd(false, true);
    let v_t = svd.v_t?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let mut b = SVector::<f64, 6>::from_iterator(v_t.row(min_idx).iter().copied());
    if b[0] < 0.0 {
        b = -b;
    }

    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    if denom_norm <= 0.0 || denom / denom_norm <= 1e-9 {
        return None;
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda <= 0.0 {
        return None;
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    let k = PinholeIntrinsics::new(alpha, beta, u0, v0);
    is_finite(&k).then_some(k)
}

/// Focal lengths by least squares with the principal point fixed at the image centre.
pub fn intrinsics_with_centered_principal_point(
    hs: &[Matrix3<f64>],
    size: ImageSize,
) -> Option<PinholeIntrinsics> {
    if hs.is_empty() {
        return None;
    }
    let cx = (size.width as f64 - 1.0) * 0.5;
    let cy = (size.height as f64 - 1.0) * 0.5;
    let shift = Matrix3::new(1.0, 0.0, -cx, 0.0, 1.0, -cy, 0.0, 0.0, 1.0);

    // Unknowns x = 1/fx², y = 1/fy²; two linear constraints per view.
    let mut a = DMatrix::<f64>::zeros(2 * hs.len(), 2);
    let mut rhs = DVector::<f64>::zeros(2 * hs.len());
    for (k, h) in hs.iter().enumerate() {
        let h = shift * h;
        let h = h / h.column(0).norm().max(h.column(1).norm());
        let (h1, h2) = (h.column(0), h.column(1));
        a[(2 * k, 0)] = h1[0] * h2[0];
        a[(2 * k, 1)] = h1[1] * h2[1];
        rhs[2 * k] = -h1[2] * h2[2];
        a[(2 * k + 1, 0)] = h1[0] * h1[0] - h2[0] * h2[0];
        a[(2 * k + 1, 1)] = h1[1] * h1[1] - h2[1] * h2[1];
        rhs[2 * k + 1] = -(h1[2] * h1[2] - h2[2] * h2[2]);
    }

    let sol = a.svd(true, true).solve(&rhs, 1e-15).ok()?;
    if sol[0] <= 0.0 || sol[1] <= 0.0 {
        return None;
    }
    let k = PinholeIntrinsics::new(1.0 / sol[0].sqrt(), 1.0 / sol[1].sqrt(), cx, cy);
    is_finite(&k).then_some(k)
}

fn is_finite(k: &PinholeIntrinsics) -> bool {
    [k.fx, k.fy, k.cx, k.cy].iter().all(|v| v.is_finite()) && k.fx > 0.0 && k.fy > 0.0
}
