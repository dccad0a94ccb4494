//! Gradient-orthogonality corner refinement.
//!
//! At the true corner `q`, every image gradient `g(p)` inside a small window
//! is orthogonal to `p - q`. Summing `g gᵀ (p - q) = 0` over the window with
//! a Gaussian weight gives a 2×2 linear system for `q`, which is re-solved
//! around the updated estimate until it settles.

use checkercal_core::{sample_bilinear, GrayImageView};
use nalgebra::Point2;

use crate::params::SubPixParams;

/// Refine a corner estimate. Falls back to `p0` if the solution leaves the window.
pub fn refine_corner(
    img: &GrayImageView<'_>,
    p0: Point2<f32>,
    half_window: usize,
    params: &SubPixParams,
) -> Point2<f32> {
    let hw = half_window.max(1) as i32;
    let side = (2 * hw + 3) as usize;
    let mask: Vec<f64> = (-hw..=hw)
        .map(|d| {
            let t = d as f64 / hw as f64;
            (-t * t).exp()
        })
        .collect();

    let mut patch = vec![0.0f64; side * side];
    let mut c = Point2::new(p0.x as f64, p0.y as f64);
    let eps2 = (params.epsilon as f64).powi(2);

    for _ in 0..params.max_iters {
        for (row, dy) in (-(hw + 1)..=(hw + 1)).enumerate() {
            for (col, dx) in (-(hw + 1)..=(hw + 1)).enumerate() {
                patch[row * side + col] = sample_bilinear(
                    img,
                    (c.x + dx as f64) as f32,
                    (c.y + dy as f64) as f32,
                ) as f64;
            }
        }

        let (mut a, mut b, mut cc, mut bb1, mut bb2) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for (my, dy) in (-hw..=hw).enumerate() {
            let row = my + 1;
            for (mx, dx) in (-hw..=hw).enumerate() {
                let col = mx + 1;
                let gx = patch[row * side + col + 1] - patch[row * side + col - 1];
                let gy = patch[(row + 1) * side + col] - patch[(row - 1) * side + col];
                let w = mask[mx] * mask[my];
                let gxx = gx * gx * w;
                let gxy = gx * gy * w;
                let gyy = gy * gy * w;
                let px = c.x + dx as f64;
                let py = c.y + dy as f64;
                a += gxx;
                b += gxy;
                cc += gyy;
                bb1 += gxx * px + gxy * py;
                bb2 += gxy * px + gyy * py;
            }
        }

        let det = a * cc - b * b;
        if det.abs() <= f64::EPSILON * (a * cc).abs().max(1.0) {
            break;
        }
        let next = Point2::new((cc * bb1 - b * bb2) / det, (a * bb2 - b * bb1) / det);
        let moved = (next - c).norm_squared();
        c = next;
        if moved <= eps2 {
            break;
        }
    }

    let hwf = hw as f64;
    if !(c.x.is_finite() && c.y.is_finite())
        || (c.x - p0.x as f64).abs() > hwf
        || (c.y - p0.y as f64).abs() > hwf
    {
        return p0;
    }
    Point2::new(c.x as f32, c.y as f32)
}
