//! Levenberg–Marquardt settings for the bundle refinement.

use levenberg_marquardt::LevenbergMarquardt;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmOptions {
    /// Evaluation budget factor: at most `patience * (n_params + 1)` residual evaluations.
    pub patience: usize,
    /// Relative tolerance on the cost reduction.
    pub ftol: f64,
    /// Relative tolerance on the parameter update.
    pub xtol: f64,
    /// Tolerance on the cosine between residuals and Jacobian columns.
    pub gtol: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            patience: 100,
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-14,
        }
    }
}

impl LmOptions {
    /// Configured solver. Out-of-range values are clamped to the nearest valid one.
    pub fn solver(&self) -> LevenbergMarquardt<f64> {
        LevenbergMarquardt::new()
            .with_ftol(self.ftol.max(0.0))
            .with_xtol(self.xtol.max(0.0))
            .with_gtol(self.gtol.max(0.0))
            .with_patience(self.patience.max(1))
    }
}
