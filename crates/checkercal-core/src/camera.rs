//! Pinhole camera with Brown–Conrady distortion, in OpenCV conventions.

use nalgebra::{Matrix3, Point2, Point3, Rotation3, UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Zero-skew pinhole intrinsics.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PinholeIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl PinholeIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`
    pub fn k_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    /// Read intrinsics from a camera matrix, ignoring any skew term.
    pub fn from_k_matrix(k: &Matrix3<f64>) -> Self {
        Self::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)])
    }

    #[inline]
    pub fn to_pixel(&self, n: Vector2<f64>) -> Point2<f64> {
        Point2::new(self.fx * n.x + self.cx, self.fy * n.y + self.cy)
    }

    #[inline]
    pub fn to_normalized(&self, p: Point2<f64>) -> Vector2<f64> {
        Vector2::new((p.x - self.cx) / self.fx, (p.y - self.cy) / self.fy)
    }
}

/// Radial `k1, k2, k3` and tangential `p1, p2` lens distortion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BrownConrady {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl BrownConrady {
    /// Coefficients in OpenCV order `[k1, k2, p1, p2, k3]`.
    pub fn to_array(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn from_array(c: [f64; 5]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
        }
    }

    /// Apply distortion to a normalized image point.
    #[inline]
    pub fn distort(&self, n: Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;
        let xt = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let yt = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Vector2::new(x * radial + xt, y * radial + yt)
    }

    /// Invert [`distort`](Self::distort) by fixed-point iteration.
    pub fn undistort(&self, d: Vector2<f64>, iters: usize) -> Vector2<f64> {
        let mut n = d;
        for _ in 0..iters {
            let err = self.distort(n) - d;
            n -= err;
        }
        n
    }
}

/// Board-to-camera rigid transform as a Rodrigues vector plus translation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rvec: Vector3<f64>,
    pub tvec: Vector3<f64>,
}

impl Pose {
    pub fn new(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self { rvec, tvec }
    }

    pub fn from_rotation(r: &Rotation3<f64>, tvec: Vector3<f64>) -> Self {
        let q = UnitQuaternion::from_rotation_matrix(r);
        Self::new(q.scaled_axis(), tvec)
    }

    pub fn rotation(&self) -> Rotation3<f64> {
        UnitQuaternion::from_scaled_axis(self.rvec).to_rotation_matrix()
    }

    #[inline]
    pub fn transform(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation() * p + self.tvec
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub intrinsics: PinholeIntrinsics,
    pub distortion: BrownConrady,
}

impl CameraModel {
    pub fn new(intrinsics: PinholeIntrinsics, distortion: BrownConrady) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Project a point given in camera coordinates. `None` behind the camera.
    #[inline]
    pub fn project_camera_point(&self, pc: &Point3<f64>) -> Option<Point2<f64>> {
        if pc.z <= 1e-9 {
            return None;
        }
        let n = Vector2::new(pc.x / pc.z, pc.y / pc.z);
        Some(self.intrinsics.to_pixel(self.distortion.distort(n)))
    }

    /// Project a board point through `pose`.
    pub fn project(&self, pose: &Pose, pw: &Point3<f64>) -> Option<Point2<f64>> {
        let r = pose.rotation();
        self.project_camera_point(&(r * pw + pose.tvec))
    }

    /// Project many board points; any point behind the camera fails the batch.
    pub fn project_all(&self, pose: &Pose, pts: &[Point3<f64>]) -> Option<Vec<Point2<f64>>> {
        let r = pose.rotation();
        pts.iter()
            .map(|pw| self.project_camera_point(&(r * pw + pose.tvec)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> CameraModel {
        CameraModel::new(
            PinholeIntrinsics::new(800.0, 780.0, 640.0, 360.0),
            BrownConrady {
                k1: -0.2,
                k2: 0.05,
                p1: 0.001,
                p2: -0.0005,
                k3: 0.0,
            },
        )
    }

    #[test]
    fn principal_ray_hits_principal_point() {
        let cam = camera();
        let p = cam
            .project_camera_point(&Point3::new(0.0, 0.0, 2.0))
            .unwrap();
        assert_relative_eq!(p.x, 640.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 360.0, epsilon = 1e-12);
    }

    #[test]
    fn points_behind_camera_are_rejected() {
        let cam = camera();
        assert!(cam
            .project_camera_point(&Point3::new(0.1, 0.1, -1.0))
            .is_none());
    }

    #[test]
    fn undistort_inverts_distort() {
        let d = camera().distortion;
        let n = Vector2::new(0.25, -0.18);
        let back = d.undistort(d.distort(n), 20);
        assert_relative_eq!(back, n, epsilon = 1e-9);
    }

    #[test]
    fn pose_rotation_matches_rodrigues_vector() {
        let r = Rotation3::from_euler_angles(0.1, -0.2, 0.3);
        let pose = Pose::from_rotation(&r, Vector3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(pose.rotation().matrix(), r.matrix(), epsilon = 1e-12);
    }

    #[test]
    fn k_matrix_round_trips() {
        let k = camera().intrinsics.k_matrix();
        assert_eq!(PinholeIntrinsics::from_k_matrix(&k), camera().intrinsics);
    }
}
