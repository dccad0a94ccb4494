//! Core types and utilities for checkerboard camera calibration.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any concrete capture device, corner detector or solver:
//! - grayscale image buffers and bilinear sampling,
//! - DLT homography estimation,
//! - the D4 group of integer grid transforms,
//! - a pinhole camera with 5-term Brown–Conrady distortion,
//! - deterministic synthetic scenes for tests and demos,
//! - a minimal stderr logger (and a `tracing` subscriber behind a feature).

mod camera;
mod grid_transform;
mod homography;
mod image;
mod logger;
pub mod synthetic;

pub use camera::{BrownConrady, CameraModel, PinholeIntrinsics, Pose};
pub use grid_transform::{GridTransform, GRID_TRANSFORMS_D4};
pub use homography::{estimate_homography, Homography};
pub use image::{sample_bilinear, GrayImage, GrayImageView, ImageError, ImageSize};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
