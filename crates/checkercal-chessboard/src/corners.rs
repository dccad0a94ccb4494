//! ChESS corner candidates from `chess-corners`.

use std::f32::consts::PI;

use checkercal_core::GrayImageView;
use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::params::ChessParams;

/// ChESS corner candidate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChessCorner {
    pub position: Point2<f32>,
    pub strength: f32,
    /// Direction of the diagonal along the white squares, radians in `[0, π)`.
    pub orientation: f32,
    /// Which of the two orientation families the corner belongs to.
    pub orientation_cluster: Option<usize>,
}

impl ChessParams {
    /// Single-scale `chess-corners` configuration with these thresholds.
    pub fn to_chess_config(&self) -> ChessConfig {
        let mut cfg = ChessConfig::single_scale();
        cfg.params.use_radius10 = self.use_radius10;
        cfg.params.threshold_rel = self.threshold_rel;
        cfg.params.threshold_abs = self.threshold_abs;
        cfg.params.nms_radius = self.nms_radius;
        cfg.params.min_cluster_size = self.min_cluster_size;
        cfg
    }
}

pub fn adapt_chess_corner(c: &CornerDescriptor) -> ChessCorner {
    ChessCorner {
        position: Point2::new(c.x, c.y),
        strength: c.response,
        orientation: c.orientation.rem_euclid(PI),
        orientation_cluster: None,
    }
}

/// Detect ChESS corners and adapt them into [`ChessCorner`].
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(width = img.width(), height = img.height()))
)]
pub fn detect_chess_corners(img: &::image::GrayImage, params: &ChessParams) -> Vec<ChessCorner> {
    find_chess_corners_image(img, &params.to_chess_config())
        .iter()
        .map(adapt_chess_corner)
        .collect()
}

/// Borrow an `image::GrayImage` as a [`GrayImageView`].
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}
