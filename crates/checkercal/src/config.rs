//! JSON configuration for a calibration run.

use std::fs;
use std::path::Path;

use checkercal_chessboard::ChessboardParams;
use checkercal_solver::SolverOptions;
use serde::{Deserialize, Serialize};

use crate::frame::Region;
use crate::pattern::GridSpec;
use crate::session::SessionConfig;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Capture device request. Only display-side concerns live here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// Half of a side-by-side frame to calibrate on.
    pub region: Region,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            width: 1280,
            height: 480,
            region: Region::Full,
        }
    }
}

/// Everything a run needs; every field falls back to its default.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub grid: GridSpec,
    pub session: SessionConfig,
    pub capture: CaptureConfig,
    pub detector: ChessboardParams,
    pub solver: SolverOptions,
}

impl AppConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
