use checkercal_core::{ImageSize, Pose};
use checkercal_solver::{PlanarCalibration, PlanarCalibrator, PlanarView, SolveError};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use crate::accumulator::Observation;

/// Camera model produced by one successful solve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub camera_matrix: Matrix3<f64>,
    /// OpenCV order: `k1, k2, p1, p2, k3`.
    pub distortion_coefficients: Vec<f64>,
    /// RMS pixel distance over all observed corners.
    pub reprojection_error: f64,
    pub per_view_errors: Vec<f64>,
    /// Board pose of each observation, in observation order.
    pub poses: Vec<Pose>,
    pub image_size: ImageSize,
    pub evaluations: usize,
    pub converged: bool,
}

impl CalibrationResult {
    pub fn from_planar(cal: PlanarCalibration, image_size: ImageSize) -> Self {
        Self {
            camera_matrix: cal.camera.intrinsics.k_matrix(),
            distortion_coefficients: cal.camera.distortion.to_array().to_vec(),
            reprojection_error: cal.rms_error,
            per_view_errors: cal.per_view_errors,
            poses: cal.poses,
            image_size,
            evaluations: cal.evaluations,
            converged: cal.converged,
        }
    }
}

/// Estimates a camera from a set of planar observations sharing one image size.
pub trait CalibrationSolver {
    fn solve(
        &self,
        observations: &[Observation],
        image_size: ImageSize,
    ) -> Result<CalibrationResult, SolveError>;
}

impl CalibrationSolver for PlanarCalibrator {
    fn solve(
        &self,
        observations: &[Observation],
        image_size: ImageSize,
    ) -> Result<CalibrationResult, SolveError> {
        let views: Vec<PlanarView<'_>> = observations
            .iter()
            .map(|o| PlanarView {
                object_points: &o.object_points,
                image_points: &o.image_points,
            })
            .collect();
        let cal = self.calibrate(&views, image_size)?;
        Ok(CalibrationResult::from_planar(cal, image_size))
    }
}
