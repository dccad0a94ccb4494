use nalgebra::Vector2;
use std::f32::consts::{FRAC_PI_2, PI};

/// Absolute difference between two undirected axes (angles modulo π), in `[0, π/2]`.
pub fn axis_diff(a: f32, b: f32) -> f32 {
    let d = (b - a).rem_euclid(PI);
    d.min(PI - d)
}

/// Angle (radians) to unit vector.
#[inline]
pub fn angle_to_unit(theta: f32) -> Vector2<f32> {
    Vector2::new(theta.cos(), theta.sin())
}

/// Dominant pair of orthogonal axes among angles defined modulo π.
///
/// Two families 90° apart cancel in double-angle space, so the average is
/// taken on `4θ`. Returns the axis in `[0, π/2)` or `None` when there is
/// no dominant direction.
pub fn dominant_orthogonal_axis(angles: impl Iterator<Item = (f32, f32)>) -> Option<f32> {
    let mut sum = Vector2::<f32>::zeros();
    let mut weight_sum = 0.0f32;
    for (theta, w) in angles {
        if w <= 0.0 {
            continue;
        }
        sum += w * angle_to_unit(4.0 * theta);
        weight_sum += w;
    }
    if weight_sum <= 0.0 {
        return None;
    }
    let mean = sum / weight_sum;
    if mean.norm_squared() < 1e-4 {
        return None;
    }
    Some((0.25 * mean.y.atan2(mean.x)).rem_euclid(FRAC_PI_2))
}
