//! Turning confirmed detections into observations.

use checkercal_core::ImageSize;
use image::imageops;
use log::{debug, info};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::detect::CornerDetector;
use crate::frame::Frame;
use crate::pattern::{generate_reference_pattern, GridSpec, ReferencePattern};

/// Below this many observations the solver is never invoked.
pub const MIN_OBSERVATIONS: usize = 3;

/// Default automatic trigger.
pub const DEFAULT_MIN_REQUIRED: usize = 15;

/// Outcome of running the detector on one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionResult {
    pub frame_index: usize,
    pub image_size: ImageSize,
    /// Refined corners in pattern order, `None` on a miss.
    pub corners: Option<Vec<Point2<f64>>>,
}

impl DetectionResult {
    pub fn found(frame_index: usize, image_size: ImageSize, corners: Vec<Point2<f64>>) -> Self {
        Self {
            frame_index,
            image_size,
            corners: Some(corners),
        }
    }

    pub fn miss(frame_index: usize, image_size: ImageSize) -> Self {
        Self {
            frame_index,
            image_size,
            corners: None,
        }
    }

    #[inline]
    pub fn is_found(&self) -> bool {
        self.corners.is_some()
    }
}

/// One accepted frame: the reference pattern paired with its image points.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub object_points: ReferencePattern,
    pub image_points: Vec<Point2<f64>>,
    pub image_size: ImageSize,
    pub frame_index: usize,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CommitRejection {
    #[error("no board detected in this frame")]
    NotFound,
    #[error("observations are sealed, calibration already ran")]
    Sealed,
    #[error("detection has {got} corners, pattern has {expected}")]
    CornerCount { expected: usize, got: usize },
    #[error("frame is {got:?}, earlier observations are {expected:?}")]
    ImageSize { expected: ImageSize, got: ImageSize },
}

/// Ordered, append-only set of observations plus the trigger thresholds.
#[derive(Clone, Debug)]
pub struct ObservationAccumulator {
    grid: GridSpec,
    pattern: ReferencePattern,
    observations: Vec<Observation>,
    min_required: usize,
    sealed: bool,
}

impl ObservationAccumulator {
    /// `grid` must be valid; `min_required` below [`MIN_OBSERVATIONS`] is
    /// raised to it.
    pub fn new(grid: GridSpec, min_required: usize) -> Self {
        Self {
            grid,
            pattern: generate_reference_pattern(&grid),
            observations: Vec::new(),
            min_required: min_required.max(MIN_OBSERVATIONS),
            sealed: false,
        }
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn pattern(&self) -> &ReferencePattern {
        &self.pattern
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    #[inline]
    pub fn committed_count(&self) -> usize {
        self.observations.len()
    }

    pub fn min_required(&self) -> usize {
        self.min_required
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Size shared by all observations, once there is one.
    pub fn image_size(&self) -> Option<ImageSize> {
        self.observations.first().map(|o| o.image_size)
    }

    /// Convert `frame` to grayscale and ask `detector` for the board.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(frame = frame.index))
    )]
    pub fn try_detect<D>(&self, detector: &D, frame: &Frame) -> DetectionResult
    where
        D: CornerDetector + ?Sized,
    {
        let gray = imageops::grayscale(&frame.image);
        match detector.detect(&gray, &self.grid) {
            Some(corners) => {
                debug!("frame {}: board found", frame.index);
                DetectionResult::found(frame.index, frame.size(), corners)
            }
            None => DetectionResult::miss(frame.index, frame.size()),
        }
    }

    /// Append an observation for `detection`; returns the new count.
    ///
    /// A rejected commit leaves the accumulator untouched.
    pub fn commit(&mut self, detection: &DetectionResult) -> Result<usize, CommitRejection> {
        if self.sealed {
            return Err(CommitRejection::Sealed);
        }
        let Some(corners) = detection.corners.as_ref() else {
            return Err(CommitRejection::NotFound);
        };
        if corners.len() != self.pattern.len() {
            return Err(CommitRejection::CornerCount {
                expected: self.pattern.len(),
                got: corners.len(),
            });
        }
        if let Some(expected) = self.image_size() {
            if expected != detection.image_size {
                return Err(CommitRejection::ImageSize {
                    expected,
                    got: detection.image_size,
                });
            }
        }

        self.observations.push(Observation {
            object_points: self.pattern.clone(),
            image_points: corners.clone(),
            image_size: detection.image_size,
            frame_index: detection.frame_index,
        });
        info!(
            "captured frame #{} ({}/{})",
            detection.frame_index,
            self.observations.len(),
            self.min_required
        );
        Ok(self.observations.len())
    }

    /// Automatic trigger: enough observations collected.
    pub fn ready_to_calibrate(&self) -> bool {
        self.committed_count() >= self.min_required
    }

    /// Hard floor for invoking the solver at all.
    pub fn can_attempt_calibration(&self) -> bool {
        self.committed_count() >= MIN_OBSERVATIONS
    }

    /// Freeze the set; later commits are rejected.
    pub fn seal(&mut self) {
        self.sealed = true;
    }
}
