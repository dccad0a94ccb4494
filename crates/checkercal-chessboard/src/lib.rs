//! Chessboard inner-corner detector for camera calibration.
//!
//! Pipeline:
//! 1. ChESS corners and their orientation (diagonal along the white
//!    squares) from `chess-corners`.
//! 2. Drop corners below `min_strength`.
//! 3. Split corners into two orientation families 90° apart.
//! 4. Link each corner to at most one neighbour per grid direction
//!    (opposite family, spacing gate, edge along the local axes), keeping
//!    only mutual links.
//! 5. BFS components into integer `(i, j)` labels and locate the unique
//!    complete `cols × rows` window.
//! 6. Relabel row-major with corner 0 nearest the image's top-left.
//! 7. Iterative gradient refinement of each corner.
//!
//! A board is reported only when all inner corners are found.

mod corners;
mod detector;
mod geom;
mod gridgraph;
mod params;
mod subpix;

pub use corners::{adapt_chess_corner, detect_chess_corners, gray_view, ChessCorner};
pub use detector::{ChessboardDetection, ChessboardDetector};
pub use gridgraph::{GridAxes, GridGraph, NeighborDirection, NodeNeighbor};
pub use params::{ChessParams, ChessboardParams, GridGraphParams, SubPixParams};
pub use subpix::refine_corner;
