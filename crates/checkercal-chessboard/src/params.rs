use serde::{Deserialize, Serialize};

/// Settings forwarded to the `chess-corners` detector.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessParams {
    /// Sample the radius-10 ring instead of radius 5.
    pub use_radius10: bool,
    /// Relative threshold as a fraction of the maximum response.
    pub threshold_rel: f32,
    /// Absolute threshold override; used instead of `threshold_rel` when set.
    pub threshold_abs: Option<f32>,
    /// Non-maximum suppression radius in pixels.
    pub nms_radius: u32,
    /// Minimum count of positive responses inside the NMS window.
    pub min_cluster_size: u32,
}

impl Default for ChessParams {
    fn default() -> Self {
        Self {
            use_radius10: false,
            threshold_rel: 0.2,
            threshold_abs: None,
            nms_radius: 2,
            min_cluster_size: 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGraphParams {
    /// Candidate neighbours examined per corner.
    pub k_neighbors: usize,
    /// Allowed edge length, as multiples of the median nearest-neighbour distance.
    pub min_spacing_ratio: f32,
    pub max_spacing_ratio: f32,
    /// Tolerance for corner orientations and edge directions.
    pub orientation_tolerance_deg: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            k_neighbors: 8,
            min_spacing_ratio: 0.5,
            max_spacing_ratio: 1.8,
            orientation_tolerance_deg: 22.5,
        }
    }
}

/// Iterative gradient-based corner refinement.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SubPixParams {
    /// Half side of the search window; the window is `2*half_window + 1` pixels wide.
    pub half_window: usize,
    pub max_iters: usize,
    /// Stop once the update moves the corner by at most this many pixels.
    pub epsilon: f32,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            half_window: 11,
            max_iters: 30,
            epsilon: 0.1,
        }
    }
}

/// Parameters of the chessboard detector.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessboardParams {
    /// Minimal corner strength to consider.
    pub min_strength: f32,
    pub chess: ChessParams,
    pub graph: GridGraphParams,
    pub subpix: SubPixParams,
    /// Skip the gradient refinement and report the ChESS peak positions.
    pub skip_refinement: bool,
}
