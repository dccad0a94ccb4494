//! Joint refinement of intrinsics, distortion and per-view poses.
//!
//! Parameter layout: `[fx, fy, cx, cy, k1, k2, p1, p2, k3]` followed by
//! `[rx, ry, rz, tx, ty, tz]` for every view.

use checkercal_core::{BrownConrady, CameraModel, PinholeIntrinsics, Pose};
use levenberg_marquardt::LeastSquaresProblem;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn, Vector3};

use crate::PlanarView;

pub(crate) const N_INTRINSICS: usize = 9;
pub(crate) const N_POSE: usize = 6;

/// Residual used for points that end up behind the camera.
const BEHIND_CAMERA: f64 = 1e6;

pub(crate) struct PlanarBundle<'a> {
    views: &'a [PlanarView<'a>],
    /// First residual row of each view.
    offsets: Vec<usize>,
    n_residuals: usize,
    /// Intrinsic parameters held at their initial value.
    fixed: [bool; N_INTRINSICS],
    params: DVector<f64>,
}

impl<'a> PlanarBundle<'a> {
    pub(crate) fn new(
        views: &'a [PlanarView<'a>],
        fixed: [bool; N_INTRINSICS],
        x0: DVector<f64>,
    ) -> Self {
        let mut offsets = Vec::with_capacity(views.len());
        let mut n = 0;
        for v in views {
            offsets.push(n);
            n += 2 * v.image_points.len();
        }
        Self {
            views,
            offsets,
            n_residuals: n,
            fixed,
            params: x0,
        }
    }

    pub(crate) fn n_params(&self) -> usize {
        N_INTRINSICS + N_POSE * self.views.len()
    }

    pub(crate) fn pack(camera: &CameraModel, poses: &[Pose]) -> DVector<f64> {
        let k = &camera.intrinsics;
        let d = camera.distortion.to_array();
        let mut x = DVector::zeros(N_INTRINSICS + N_POSE * poses.len());
        x.rows_mut(0, N_INTRINSICS).copy_from_slice(&[
            k.fx, k.fy, k.cx, k.cy, d[0], d[1], d[2], d[3], d[4],
        ]);
        for (i, p) in poses.iter().enumerate() {
            let o = N_INTRINSICS + N_POSE * i;
            x.rows_mut(o, 3).copy_from(&p.rvec);
            x.rows_mut(o + 3, 3).copy_from(&p.tvec);
        }
        x
    }

    pub(crate) fn unpack_camera(x: &DVector<f64>) -> CameraModel {
        CameraModel::new(
            PinholeIntrinsics::new(x[0], x[1], x[2], x[3]),
            BrownConrady::from_array([x[4], x[5], x[6], x[7], x[8]]),
        )
    }

    pub(crate) fn unpack_pose(x: &DVector<f64>, view: usize) -> Pose {
        let o = N_INTRINSICS + N_POSE * view;
        Pose::new(
            Vector3::new(x[o], x[o + 1], x[o + 2]),
            Vector3::new(x[o + 3], x[o + 4], x[o + 5]),
        )
    }

    /// Write `projected - observed` for one view into `out` (length `2 * points`).
    fn view_residuals(&self, camera: &CameraModel, pose: &Pose, view: usize, out: &mut [f64]) {
        let v = &self.views[view];
        let r = pose.rotation();
        for (k, (pw, obs)) in v.object_points.iter().zip(v.image_points).enumerate() {
            let pc = r * pw + pose.tvec;
            let (du, dv) = match camera.project_camera_point(&pc) {
                Some(p) => (p.x - obs.x, p.y - obs.y),
                None => (BEHIND_CAMERA, BEHIND_CAMERA),
            };
            out[2 * k] = du;
            out[2 * k + 1] = dv;
        }
    }

    fn view_rows(&self, view: usize) -> std::ops::Range<usize> {
        let start = self.offsets[view];
        start..start + 2 * self.views[view].image_points.len()
    }
}

#[inline]
fn fd_step(v: f64) -> f64 {
    f64::EPSILON.sqrt() * v.abs().max(1.0)
}

impl PlanarBundle<'_> {
    fn residuals_at(&self, x: &DVector<f64>) -> DVector<f64> {
        let camera = Self::unpack_camera(x);
        let mut r = DVector::zeros(self.n_residuals);
        for view in 0..self.views.len() {
            let pose = Self::unpack_pose(x, view);
            let rows = self.view_rows(view);
            self.view_residuals(&camera, &pose, view, &mut r.as_mut_slice()[rows]);
        }
        r
    }

    /// Forward differences. Pose columns only touch their own view's rows.
    fn jacobian_at(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let mut j = DMatrix::zeros(self.n_residuals, self.n_params());
        let base = self.residuals_at(x);

        let mut xp = x.clone();
        for col in 0..N_INTRINSICS {
            if self.fixed[col] {
                continue;
            }
            let h = fd_step(x[col]);
            xp[col] = x[col] + h;
            let rp = self.residuals_at(&xp);
            xp[col] = x[col];
            j.column_mut(col).copy_from(&((rp - &base) / h));
        }

        let camera = Self::unpack_camera(x);
        let mut buf = Vec::new();
        for view in 0..self.views.len() {
            let rows = self.view_rows(view);
            buf.resize(rows.len(), 0.0);
            let o = N_INTRINSICS + N_POSE * view;
            for p in 0..N_POSE {
                let col = o + p;
                let h = fd_step(x[col]);
                xp[col] = x[col] + h;
                let pose = Self::unpack_pose(&xp, view);
                xp[col] = x[col];
                self.view_residuals(&camera, &pose, view, &mut buf);
                for (k, row) in rows.clone().enumerate() {
                    j[(row, col)] = (buf[k] - base[row]) / h;
                }
            }
        }
        j
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for PlanarBundle<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.residuals_at(&self.params))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        Some(self.jacobian_at(&self.params))
    }
}

/// Per-view RMS and overall RMS of the pixel reprojection error.
pub(crate) fn reprojection_errors(
    views: &[PlanarView<'_>],
    camera: &CameraModel,
    poses: &[Pose],
) -> (f64, Vec<f64>) {
    let mut total_sq = 0.0;
    let mut total_n = 0usize;
    let per_view = views
        .iter()
        .zip(poses)
        .map(|(v, pose)| {
            let sq: f64 = v
                .object_points
                .iter()
                .zip(v.image_points)
                .map(|(pw, obs)| match camera.project(pose, pw) {
                    Some(p) => (p - *obs).norm_squared(),
                    None => f64::INFINITY,
                })
                .sum();
            total_sq += sq;
            total_n += v.image_points.len();
            (sq / v.image_points.len().max(1) as f64).sqrt()
        })
        .collect();
    let rms = (total_sq / total_n.max(1) as f64).sqrt();
    (rms, per_view)
}
