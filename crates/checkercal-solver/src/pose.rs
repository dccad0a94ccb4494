use checkercal_core::Pose;
use nalgebra::{Matrix3, Rotation3};

/// Board pose from a plane-to-image homography `H ~ K [r1 r2 t]`.
///
/// The rotation is projected onto SO(3) and the sign is chosen so the board
/// lies in front of the camera.
pub fn pose_from_homography(k: &Matrix3<f64>, h: &Matrix3<f64>) -> Option<Pose> {
    let k_inv = k.try_inverse()?;
    let a1 = k_inv * h.column(0);
    let a2 = k_inv * h.column(1);
    let a3 = k_inv * h.column(2);

    let norm = (a1.norm() + a2.norm()) * 0.5;
    if norm <= f64::EPSILON {
        return None;
    }
    let mut lambda = 1.0 / norm;
    if a3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = a1 * lambda;
    let r2 = a2 * lambda;
    let r3 = r1.cross(&r2);
    let r = Matrix3::from_columns(&[r1, r2, r3]);

    // polar decomposition onto SO(3)
    let svd = r.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let t = a3 * lambda;
    Some(Pose::from_rotation(
        &Rotation3::from_matrix_unchecked(r_orth),
        t,
    ))
}
