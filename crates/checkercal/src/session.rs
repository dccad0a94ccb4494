//! The calibration session: collect, solve once, persist.

use std::path::PathBuf;

use checkercal_solver::SolveError;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::accumulator::{
    CommitRejection, DetectionResult, ObservationAccumulator, DEFAULT_MIN_REQUIRED,
    MIN_OBSERVATIONS,
};
use crate::control::Signal;
use crate::pattern::{GridSpec, GridSpecError};
use crate::solve::{CalibrationResult, CalibrationSolver};
use crate::store::{ResultStore, StoreError, DEFAULT_OUTPUT_PATH};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Commits that trigger calibration without an explicit signal.
    pub min_required: usize,
    pub output_path: PathBuf,
    /// Reject solves whose RMS error (px) exceeds this; `None` accepts any.
    pub max_reprojection_error: Option<f64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_required: DEFAULT_MIN_REQUIRED,
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            max_reprojection_error: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Collecting,
    /// A result exists; terminal.
    Calibrated,
    /// The one solve attempt failed; terminal.
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionState::Collecting)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Grid(#[from] GridSpecError),
    #[error("min_required must be at least {floor} (got {got})")]
    MinRequiredTooSmall { floor: usize, got: usize },
    #[error("need at least {required} observations to calibrate, have {got}")]
    InsufficientObservations { required: usize, got: usize },
    #[error("session is {0:?}, signal ignored")]
    Finished(SessionState),
    #[error(transparent)]
    Commit(#[from] CommitRejection),
    #[error("calibration failed: {0}")]
    Solve(#[from] SolveError),
    #[error("reprojection error {rms:.4}px exceeds the {max:.4}px limit")]
    ReprojectionTooLarge { rms: f64, max: f64 },
}

/// What a successful solve produced.
#[derive(Debug)]
pub struct CalibrationOutcome {
    pub reprojection_error: f64,
    /// Persistence status; a failed write leaves the result in the session.
    pub persisted: Result<PathBuf, StoreError>,
}

/// What happened while handling one frame.
#[derive(Debug, Default)]
pub struct FrameOutcome {
    /// Set when the frame carried a confirm signal.
    pub commit: Option<Result<usize, SessionError>>,
    /// Set when calibration was requested or triggered automatically.
    pub calibration: Option<Result<CalibrationOutcome, SessionError>>,
}

/// Single-shot calibration session.
///
/// `Collecting` → (`Calibrated` | `Failed`). Nothing leaves a terminal state.
#[derive(Debug)]
pub struct CalibrationSession<S> {
    accumulator: ObservationAccumulator,
    solver: S,
    store: ResultStore,
    max_reprojection_error: Option<f64>,
    state: SessionState,
    result: Option<CalibrationResult>,
}

impl<S: CalibrationSolver> CalibrationSession<S> {
    pub fn new(grid: GridSpec, config: &SessionConfig, solver: S) -> Result<Self, SessionError> {
        grid.validate()?;
        if config.min_required < MIN_OBSERVATIONS {
            return Err(SessionError::MinRequiredTooSmall {
                floor: MIN_OBSERVATIONS,
                got: config.min_required,
            });
        }
        Ok(Self {
            accumulator: ObservationAccumulator::new(grid, config.min_required),
            solver,
            store: ResultStore::new(config.output_path.clone()),
            max_reprojection_error: config.max_reprojection_error,
            state: SessionState::Collecting,
            result: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn accumulator(&self) -> &ObservationAccumulator {
        &self.accumulator
    }

    pub fn result(&self) -> Option<&CalibrationResult> {
        self.result.as_ref()
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Commit a confirmed detection.
    pub fn commit(&mut self, detection: &DetectionResult) -> Result<usize, SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::Finished(self.state));
        }
        Ok(self.accumulator.commit(detection)?)
    }

    /// Run the solver on everything collected so far, then persist.
    ///
    /// Below [`MIN_OBSERVATIONS`] the request is rejected and collection
    /// continues. Otherwise the session ends in `Calibrated` or `Failed`.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip_all,
            fields(observations = self.accumulator.committed_count())
        )
    )]
    pub fn calibrate(&mut self) -> Result<CalibrationOutcome, SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::Finished(self.state));
        }
        let got = self.accumulator.committed_count();
        let image_size = match self.accumulator.image_size() {
            Some(size) if self.accumulator.can_attempt_calibration() => size,
            _ => {
                return Err(SessionError::InsufficientObservations {
                    required: MIN_OBSERVATIONS,
                    got,
                })
            }
        };

        self.accumulator.seal();
        info!("calibrating from {got} observations");
        let solved = self.solver.solve(self.accumulator.observations(), image_size);
        let result = match solved {
            Ok(result) => result,
            Err(e) => {
                self.state = SessionState::Failed;
                error!("calibration failed: {e}");
                return Err(e.into());
            }
        };

        let rms = result.reprojection_error;
        match self.max_reprojection_error {
            Some(max) if rms.is_nan() || rms > max => {
                self.state = SessionState::Failed;
                error!("reprojection error {rms:.4}px exceeds {max:.4}px, result discarded");
                return Err(SessionError::ReprojectionTooLarge { rms, max });
            }
            None if !result.converged => {
                warn!("solver did not converge, keeping result with rms {rms:.4}px");
            }
            _ => {}
        }

        info!("calibration done, reprojection error {rms:.4}px");
        let persisted = self
            .store
            .persist(&result)
            .map(|()| self.store.path().to_path_buf());
        if let Err(e) = &persisted {
            error!("{e}");
        }
        self.result = Some(result);
        self.state = SessionState::Calibrated;
        Ok(CalibrationOutcome {
            reprojection_error: rms,
            persisted,
        })
    }

    /// Apply one frame's signal.
    ///
    /// `Confirm` commits `detection`. Calibration runs on `Calibrate`, or
    /// automatically once the accumulator is ready. `None` and `Quit` do
    /// nothing here.
    pub fn handle(&mut self, signal: Signal, detection: &DetectionResult) -> FrameOutcome {
        let mut outcome = FrameOutcome::default();
        if signal == Signal::Confirm {
            outcome.commit = Some(self.commit(detection));
        }
        let auto = self.state == SessionState::Collecting && self.accumulator.ready_to_calibrate();
        if signal == Signal::Calibrate || auto {
            outcome.calibration = Some(self.calibrate());
        }
        outcome
    }
}
