use std::sync::Arc;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Reference points of one target instance, shared by every observation.
pub type ReferencePattern = Arc<[Point3<f64>]>;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GridSpecError {
    #[error("grid needs at least 2x2 inner corners (got {cols}x{rows})")]
    TooSmall { cols: usize, rows: usize },
    #[error("square size must be positive and finite (got {0})")]
    InvalidSquareSize(f64),
}

/// Inner-corner grid of a checkerboard target.
///
/// `cols` counts corners along a row (OpenCV's `boardSize.width`).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSpec {
    pub cols: usize,
    pub rows: usize,
    /// Side of one square, in the unit the poses are reported in.
    pub square_size: f64,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            cols: 9,
            rows: 6,
            square_size: 0.02,
        }
    }
}

impl GridSpec {
    pub fn new(cols: usize, rows: usize, square_size: f64) -> Result<Self, GridSpecError> {
        let spec = Self {
            cols,
            rows,
            square_size,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), GridSpecError> {
        if self.cols < 2 || self.rows < 2 {
            return Err(GridSpecError::TooSmall {
                cols: self.cols,
                rows: self.rows,
            });
        }
        if !(self.square_size.is_finite() && self.square_size > 0.0) {
            return Err(GridSpecError::InvalidSquareSize(self.square_size));
        }
        Ok(())
    }

    #[inline]
    pub fn corner_count(&self) -> usize {
        self.cols * self.rows
    }
}

/// Board points `(col * s, row * s, 0)` in row-major order.
///
/// `spec` must already be valid.
pub fn generate_reference_pattern(spec: &GridSpec) -> ReferencePattern {
    let s = spec.square_size;
    (0..spec.rows)
        .flat_map(|row| {
            (0..spec.cols).map(move |col| Point3::new(col as f64 * s, row as f64 * s, 0.0))
        })
        .collect()
}
