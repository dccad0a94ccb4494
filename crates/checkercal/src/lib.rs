//! Interactive checkerboard camera calibration.
//!
//! A [`CalibrationSession`] collects user-confirmed checkerboard detections
//! as [`Observation`]s, runs a [`CalibrationSolver`] once enough are
//! available, and writes the camera matrix and distortion coefficients to an
//! OpenCV-compatible YAML file. Devices stay behind the [`FrameSource`],
//! [`FrameSink`] and [`SignalSource`] traits, so the whole flow runs against
//! image directories, in-memory frames or (feature `opencv`) a live camera.
//!
//! ```no_run
//! use checkercal::{
//!     run_interaction_loop, AutoConfirm, CalibrationSession, GridSpec, ImageSequenceSource,
//!     NullSink, Region, SessionConfig,
//! };
//! use checkercal_chessboard::ChessboardDetector;
//! use checkercal_solver::PlanarCalibrator;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let grid = GridSpec::new(9, 6, 0.02)?;
//! let mut session =
//!     CalibrationSession::new(grid, &SessionConfig::default(), PlanarCalibrator::default())?;
//! let mut source = ImageSequenceSource::open("captures")?;
//! let summary = run_interaction_loop(
//!     &mut session,
//!     &ChessboardDetector::default(),
//!     Region::Full,
//!     &mut source,
//!     &mut NullSink,
//!     &mut AutoConfirm,
//! );
//! println!("{summary:?}");
//! # Ok(())
//! # }
//! ```

mod accumulator;
#[cfg(feature = "opencv")]
mod camera;
mod config;
mod control;
mod detect;
mod frame;
mod interaction;
mod overlay;
mod pattern;
mod session;
mod solve;
pub mod store;

pub use accumulator::{
    CommitRejection, DetectionResult, Observation, ObservationAccumulator, DEFAULT_MIN_REQUIRED,
    MIN_OBSERVATIONS,
};
#[cfg(feature = "opencv")]
pub use camera::{CameraSource, HighguiKeys, HighguiWindow, SplitWindows};
pub use config::{AppConfig, CaptureConfig, ConfigError};
pub use control::{
    AutoConfirm, ParseSignalError, ScriptError, ScriptedSignals, Signal, SignalSource,
};
pub use detect::CornerDetector;
#[cfg(feature = "opencv")]
pub use detect::OpenCvChessboard;
pub use frame::{
    left_half, right_half, Frame, FrameError, FrameSource, ImageSequenceSource, InMemorySource,
    Region,
};
pub use interaction::{run_interaction_loop, LoopExit, LoopSummary};
pub use overlay::{draw_overlay, FrameSink, NullSink, Overlay, OverlayDirSink};
pub use pattern::{generate_reference_pattern, GridSpec, GridSpecError, ReferencePattern};
pub use session::{
    CalibrationOutcome, CalibrationSession, FrameOutcome, SessionConfig, SessionError,
    SessionState,
};
pub use solve::{CalibrationResult, CalibrationSolver};
pub use store::{ResultStore, StoreError, StoredCalibration, DEFAULT_OUTPUT_PATH};
