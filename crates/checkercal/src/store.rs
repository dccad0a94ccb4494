//! Calibration files in OpenCV `FileStorage` YAML.
//!
//! ```yaml
//! %YAML:1.0
//! ---
//! camera_matrix: !!opencv-matrix
//!   rows: 3
//!   cols: 3
//!   dt: d
//!   data:
//!   - 600.0
//!   ...
//! distortion_coefficients: !!opencv-matrix
//!   rows: 1
//!   cols: 5
//!   dt: d
//!   data:
//!   - -0.1
//!   ...
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::solve::CalibrationResult;

pub const DEFAULT_OUTPUT_PATH: &str = "camera_calibration.yml";

const CAMERA_MATRIX_KEY: &str = "camera_matrix";
const DISTORTION_KEY: &str = "distortion_coefficients";
const HEADER: &str = "%YAML:1.0\n---\n";
const MATRIX_TAG: &str = "!!opencv-matrix";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error("calibration document has no '{0}' entry")]
    MissingKey(&'static str),
    #[error("'{key}' is declared {rows}x{cols} but holds {len} values")]
    Shape {
        key: &'static str,
        rows: usize,
        cols: usize,
        len: usize,
    },
}

/// Body of an `!!opencv-matrix` node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct OpenCvMatrix {
    rows: usize,
    cols: usize,
    dt: String,
    data: Vec<f64>,
}

impl OpenCvMatrix {
    fn doubles(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        Self {
            rows,
            cols,
            dt: "d".to_string(),
            data,
        }
    }

    fn check(&self, key: &'static str) -> Result<(), StoreError> {
        if self.rows * self.cols != self.data.len() {
            return Err(StoreError::Shape {
                key,
                rows: self.rows,
                cols: self.cols,
                len: self.data.len(),
            });
        }
        Ok(())
    }
}

/// The two entries a calibration file carries.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredCalibration {
    pub camera_matrix: Matrix3<f64>,
    pub distortion_coefficients: Vec<f64>,
}

impl From<&CalibrationResult> for StoredCalibration {
    fn from(r: &CalibrationResult) -> Self {
        Self {
            camera_matrix: r.camera_matrix,
            distortion_coefficients: r.distortion_coefficients.clone(),
        }
    }
}

/// Render the document text.
pub fn to_document(cal: &StoredCalibration) -> Result<String, StoreError> {
    let k = &cal.camera_matrix;
    let k_rows: Vec<f64> = (0..3)
        .flat_map(|r| (0..3).map(move |c| k[(r, c)]))
        .collect();
    let dist = &cal.distortion_coefficients;

    let mut doc = String::from(HEADER);
    write_matrix(&mut doc, CAMERA_MATRIX_KEY, &OpenCvMatrix::doubles(3, 3, k_rows))?;
    write_matrix(
        &mut doc,
        DISTORTION_KEY,
        &OpenCvMatrix::doubles(1, dist.len(), dist.clone()),
    )?;
    Ok(doc)
}

fn write_matrix(doc: &mut String, key: &str, m: &OpenCvMatrix) -> Result<(), StoreError> {
    let body = serde_yaml::to_string(m)?;
    doc.push_str(key);
    doc.push_str(": ");
    doc.push_str(MATRIX_TAG);
    doc.push('\n');
    for line in body.lines().filter(|l| *l != "---") {
        doc.push_str("  ");
        doc.push_str(line);
        doc.push('\n');
    }
    Ok(())
}

/// Parse a document written by [`to_document`] or by OpenCV.
pub fn parse_document(text: &str) -> Result<StoredCalibration, StoreError> {
    // `%YAML:1.0` is OpenCV's spelling and not a valid YAML directive.
    let body = match text.strip_prefix("%YAML:") {
        Some(rest) => rest.split_once('\n').map_or("", |(_, tail)| tail),
        None => text,
    };
    let root: Value = serde_yaml::from_str(body)?;

    let k = read_matrix(&root, CAMERA_MATRIX_KEY)?;
    if k.rows != 3 || k.cols != 3 {
        return Err(StoreError::Shape {
            key: CAMERA_MATRIX_KEY,
            rows: k.rows,
            cols: k.cols,
            len: k.data.len(),
        });
    }
    let dist = read_matrix(&root, DISTORTION_KEY)?;

    Ok(StoredCalibration {
        camera_matrix: Matrix3::from_row_slice(&k.data),
        distortion_coefficients: dist.data,
    })
}

fn read_matrix(root: &Value, key: &'static str) -> Result<OpenCvMatrix, StoreError> {
    let node = root.get(key).ok_or(StoreError::MissingKey(key))?.clone();
    let node = match node {
        Value::Tagged(tagged) => tagged.value,
        other => other,
    };
    let m: OpenCvMatrix = serde_yaml::from_value(node)?;
    m.check(key)?;
    Ok(m)
}

/// Writes results to one file, replacing whatever was there.
#[derive(Clone, Debug)]
pub struct ResultStore {
    path: PathBuf,
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_PATH)
    }
}

impl ResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn persist(&self, result: &CalibrationResult) -> Result<(), StoreError> {
        let doc = to_document(&StoredCalibration::from(result))?;
        fs::write(&self.path, doc).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;
        info!("calibration saved to {}", self.path.display());
        Ok(())
    }

    pub fn load(&self) -> Result<StoredCalibration, StoreError> {
        load(&self.path)
    }
}

pub fn load(path: impl AsRef<Path>) -> Result<StoredCalibration, StoreError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_document(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StoredCalibration {
        StoredCalibration {
            camera_matrix: Matrix3::new(
                612.345678901, 0.0, 319.5, 0.0, 611.9, 241.25, 0.0, 0.0, 1.0,
            ),
            distortion_coefficients: vec![-0.123456789, 0.0456, 1e-4, -2.5e-5, 0.001],
        }
    }

    #[test]
    fn document_has_opencv_layout() {
        let doc = to_document(&sample()).unwrap();
        assert!(doc.starts_with("%YAML:1.0\n---\ncamera_matrix: !!opencv-matrix\n"));
        assert!(doc.contains("distortion_coefficients: !!opencv-matrix\n"));
        assert!(doc.contains("  rows: 3\n"));
        assert!(doc.contains("  cols: 5\n"));
        assert!(doc.contains("  dt: d\n"));
    }

    #[test]
    fn document_round_trips_exactly() {
        let cal = sample();
        let back = parse_document(&to_document(&cal).unwrap()).unwrap();
        assert_eq!(back, cal);
    }

    #[test]
    fn reads_opencv_flow_style() {
        let text = "%YAML:1.0\n---\ncamera_matrix: !!opencv-matrix\n   rows: 3\n   cols: 3\n   dt: d\n   data: [ 5.0e+02, 0., 320., 0., 5.0e+02, 240., 0., 0., 1. ]\ndistortion_coefficients: !!opencv-matrix\n   rows: 5\n   cols: 1\n   dt: d\n   data: [ -0.1, 0.01, 0., 0., 0. ]\n";
        let cal = parse_document(text).unwrap();
        assert_eq!(cal.camera_matrix[(0, 0)], 500.0);
        assert_eq!(cal.camera_matrix[(0, 2)], 320.0);
        assert_eq!(cal.camera_matrix[(1, 2)], 240.0);
        assert_eq!(cal.distortion_coefficients.len(), 5);
        assert_eq!(cal.distortion_coefficients[0], -0.1);
    }

    #[test]
    fn missing_entry_is_reported() {
        let text = "%YAML:1.0\n---\ncamera_matrix: !!opencv-matrix\n  rows: 3\n  cols: 3\n  dt: d\n  data: [1, 0, 0, 0, 1, 0, 0, 0, 1]\n";
        assert!(matches!(
            parse_document(text),
            Err(StoreError::MissingKey("distortion_coefficients"))
        ));
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let text = "camera_matrix:\n  rows: 3\n  cols: 3\n  dt: d\n  data: [1, 0, 0]\ndistortion_coefficients:\n  rows: 1\n  cols: 0\n  dt: d\n  data: []\n";
        assert!(matches!(
            parse_document(text),
            Err(StoreError::Shape {
                key: "camera_matrix",
                ..
            })
        ));
    }
}
