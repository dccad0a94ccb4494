//! Planar (checkerboard) camera calibration.
//!
//! Given several views of a planar target, estimate a zero-skew pinhole
//! camera with 5-term Brown–Conrady distortion plus one board pose per view:
//!
//! 1. Normalised DLT homography per view.
//! 2. Zhang's closed-form intrinsics, or focal lengths with a centred
//!    principal point when the closed form is degenerate.
//! 3. Per-view pose from the homography.
//! 4. Levenberg–Marquardt over all parameters on pixel reprojection error.

mod bundle;
mod error;
mod lm;
mod pose;
mod zhang;

use checkercal_core::{estimate_homography, CameraModel, ImageSize, Pose};
use levenberg_marquardt::LeastSquaresProblem;
use log::{debug, info, warn};
use nalgebra::{Matrix3, Point2, Point3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::bundle::{reprojection_errors, PlanarBundle, N_INTRINSICS};

pub use error::SolveError;
pub use lm::LmOptions;
pub use pose::pose_from_homography;
pub use zhang::{intrinsics_from_homographies, intrinsics_with_centered_principal_point};

/// Fewest views the closed-form initialisation can work with.
pub const MIN_VIEWS: usize = 3;

/// One view of the planar target: board points on `z = 0` and their pixels.
#[derive(Clone, Copy, Debug)]
pub struct PlanarView<'a> {
    pub object_points: &'a [Point3<f64>],
    pub image_points: &'a [Point2<f64>],
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    pub lm: LmOptions,
    /// Keep `k3` at zero.
    pub fix_k3: bool,
    /// Keep `p1`, `p2` at zero.
    pub fix_tangential: bool,
}

/// Output of a successful calibration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanarCalibration {
    pub camera: CameraModel,
    /// Board-to-camera pose for every input view, in input order.
    pub poses: Vec<Pose>,
    /// RMS pixel reprojection error over all points.
    pub rms_error: f64,
    pub per_view_errors: Vec<f64>,
    /// Residual evaluations spent by the optimiser.
    pub evaluations: usize,
    pub converged: bool,
}

#[derive(Clone, Debug, Default)]
pub struct PlanarCalibrator {
    pub options: SolverOptions,
}

impl PlanarCalibrator {
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(views = views.len()))
    )]
    pub fn calibrate(
        &self,
        views: &[PlanarView<'_>],
        image_size: ImageSize,
    ) -> Result<PlanarCalibration, SolveError> {
        validate(views, image_size)?;

        let homographies = views
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let src: Vec<Point2<f64>> = v
                    .object_points
                    .iter()
                    .map(|p| Point2::new(p.x, p.y))
                    .collect();
                estimate_homography(&src, v.image_points)
                    .map(|h| h.h)
                    .ok_or(SolveError::Homography { view: i })
            })
            .collect::<Result<Vec<Matrix3<f64>>, _>>()?;

        let intrinsics = match intrinsics_from_homographies(&homographies)
            .filter(|k| principal_point_in_frame(k.cx, k.cy, image_size))
        {
            Some(k) => k,
            None => {
                debug!("closed-form intrinsics degenerate, centring the principal point");
                intrinsics_with_centered_principal_point(&homographies, image_size)
                    .ok_or(SolveError::DegenerateIntrinsics)?
            }
        };
        debug!(
            "initial intrinsics fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
            intrinsics.fx, intrinsics.fy, intrinsics.cx, intrinsics.cy
        );

        let k = intrinsics.k_matrix();
        let poses = homographies
            .iter()
            .enumerate()
            .map(|(i, h)| pose_from_homography(&k, h).ok_or(SolveError::PoseInit { view: i }))
            .collect::<Result<Vec<Pose>, _>>()?;

        let camera = CameraModel::new(intrinsics, Default::default());
        let mut fixed = [false; N_INTRINSICS];
        if self.options.fix_tangential {
            fixed[6] = true;
            fixed[7] = true;
        }
        if self.options.fix_k3 {
            fixed[8] = true;
        }

        let x0 = PlanarBundle::pack(&camera, &poses);
        let problem = PlanarBundle::new(views, fixed, x0);
        let (problem, report) = self.options.lm.solver().minimize(problem);
        let x = problem.params();
        let converged = report.termination.was_successful();
        if !x.iter().all(|v| v.is_finite()) {
            return Err(SolveError::NonFinite);
        }

        let camera = PlanarBundle::unpack_camera(&x);
        let poses: Vec<Pose> = (0..views.len())
            .map(|i| PlanarBundle::unpack_pose(&x, i))
            .collect();
        let (rms_error, per_view_errors) = reprojection_errors(views, &camera, &poses);

        if !converged {
            warn!(
                "calibration stopped after {} evaluations without converging: {:?}",
                report.number_of_evaluations, report.termination
            );
        }
        info!(
            "calibrated {} views: rms {:.4}px after {} evaluations ({:?})",
            views.len(),
            rms_error,
            report.number_of_evaluations,
            report.termination
        );

        Ok(PlanarCalibration {
            camera,
            poses,
            rms_error,
            per_view_errors,
            evaluations: report.number_of_evaluations,
            converged,
        })
    }
}

fn principal_point_in_frame(cx: f64, cy: f64, size: ImageSize) -> bool {
    cx >= 0.0 && cy >= 0.0 && cx <= size.width as f64 && cy <= size.height as f64
}

fn validate(views: &[PlanarView<'_>], image_size: ImageSize) -> Result<(), SolveError> {
    if image_size.width == 0 || image_size.height == 0 {
        return Err(SolveError::InvalidImageSize {
            width: image_size.width,
            height: image_size.height,
        });
    }
    if views.len() < MIN_VIEWS {
        return Err(SolveError::NotEnoughViews {
            required: MIN_VIEWS,
            got: views.len(),
        });
    }
    for (i, v) in views.iter().enumerate() {
        if v.object_points.len() != v.image_points.len() {
            return Err(SolveError::MismatchedPoints {
                view: i,
                object: v.object_points.len(),
                image: v.image_points.len(),
            });
        }
        if v.object_points.len() < 4 {
            return Err(SolveError::TooFewPoints {
                view: i,
                got: v.object_points.len(),
            });
        }
        if v.object_points.iter().any(|p| p.z.abs() > 1e-9) {
            return Err(SolveError::NonPlanarTarget { view: i });
        }
    }
    Ok(())
}
