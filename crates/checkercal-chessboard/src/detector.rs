use std::cmp::Reverse;
use std::collections::HashMap;
use std::f32::consts::FRAC_PI_2;

use checkercal_core::{GrayImageView, GRID_TRANSFORMS_D4};
use kiddo::{KdTree, SquaredEuclidean};
use log::debug;
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::geom::{axis_diff, dominant_orthogonal_axis};
use crate::gridgraph::{assign_grid_coordinates, connected_components, GridAxes, GridGraph};
use crate::params::ChessboardParams;
use crate::corners::{detect_chess_corners, gray_view, ChessCorner};
use crate::subpix::refine_corner;

/// A complete board: every inner corner found, in canonical order.
#[derive(Clone, Debug, PartialEq)]
pub struct ChessboardDetection {
    pub cols: usize,
    pub rows: usize,
    /// Row-major, `cols` corners per row. Corner 0 is the one closest to the
    /// image's top-left among the orientation-preserving labellings.
    pub corners: Vec<Point2<f32>>,
    /// Median nearest-neighbour distance between corners, in pixels.
    pub spacing: f32,
}

/// Grid cells of a labelled component that form the `w × h` board.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Window {
    i0: i32,
    j0: i32,
    w: usize,
    h: usize,
}

/// Chessboard detector: ChESS corners, orientation families, grid graph,
/// canonical labelling and sub-pixel refinement.
#[derive(Clone, Debug, Default)]
pub struct ChessboardDetector {
    pub params: ChessboardParams,
}

impl ChessboardDetector {
    pub fn new(params: ChessboardParams) -> Self {
        Self { params }
    }

    /// Find all `cols × rows` inner corners in `img`, or `None`.
    ///
    /// Partial boards are never reported.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "debug",
            skip_all,
            fields(width = img.width(), height = img.height(), cols = cols, rows = rows)
        )
    )]
    pub fn detect(
        &self,
        img: &::image::GrayImage,
        cols: usize,
        rows: usize,
    ) -> Option<ChessboardDetection> {
        let corners = detect_chess_corners(img, &self.params.chess);
        debug!(
            "{} ChESS corners in {}x{} frame",
            corners.len(),
            img.width(),
            img.height()
        );

        let mut detection = self.detect_from_corners(&corners, cols, rows)?;
        if !self.params.skip_refinement {
            self.refine_corners(&gray_view(img), &mut detection.corners);
        }
        Some(detection)
    }

    /// Refine every corner in place with the configured sub-pixel window.
    pub fn refine_corners(&self, img: &GrayImageView<'_>, corners: &mut [Point2<f32>]) {
        let params = &self.params.subpix;
        for p in corners.iter_mut() {
            *p = refine_corner(img, *p, params.half_window, params);
        }
    }

    /// Assemble a `cols × rows` board from pre-computed ChESS corners.
    ///
    /// Corners need `position`, `orientation` and `strength`; clusters are
    /// assigned here.
    pub fn detect_from_corners(
        &self,
        corners: &[ChessCorner],
        cols: usize,
        rows: usize,
    ) -> Option<ChessboardDetection> {
        if cols < 2 || rows < 2 {
            return None;
        }
        let expected = cols * rows;

        let strong: Vec<ChessCorner> = corners
            .iter()
            .copied()
            .filter(|c| c.strength >= self.params.min_strength)
            .collect();
        if strong.len() < expected {
            debug!("only {} corners, need {}", strong.len(), expected);
            return None;
        }

        let Some(diagonal) =
            dominant_orthogonal_axis(strong.iter().map(|c| (c.orientation, c.strength)))
        else {
            debug!("no dominant corner orientation");
            return None;
        };

        let tol = self.params.graph.orientation_tolerance_deg.to_radians();
        let clustered: Vec<ChessCorner> = strong
            .into_iter()
            .filter_map(|mut c| {
                let d0 = axis_diff(diagonal, c.orientation);
                let d1 = axis_diff(diagonal + FRAC_PI_2, c.orientation);
                let (cluster, diff) = if d0 <= d1 { (0, d0) } else { (1, d1) };
                (diff <= tol).then(|| {
                    c.orientation_cluster = Some(cluster);
                    c
                })
            })
            .collect();
        if clustered.len() < expected {
            debug!(
                "{} corners left after orientation clustering, need {}",
                clustered.len(),
                expected
            );
            return None;
        }

        let spacing = median_nearest_distance(&clustered)?;
        let axes = GridAxes::from_diagonal(diagonal);
        let graph = GridGraph::new(&clustered, &self.params.graph, spacing, &axes);

        let mut components = connected_components(&graph);
        components.retain(|c| c.len() >= expected);
        components.sort_by_key(|c| Reverse(c.len()));
        debug!(
            "{} grid components with at least {} corners (spacing {:.1}px)",
            components.len(),
            expected,
            spacing
        );

        for component in components {
            let Some(cells) = assign_grid_coordinates(&graph, &component) else {
                debug!("inconsistent grid labelling, skipping component");
                continue;
            };
            let Some(window) = find_board_window(&cells, cols, rows) else {
                continue;
            };
            if let Some(ordered) = canonical_order(&cells, window, &clustered, cols, rows) {
                return Some(ChessboardDetection {
                    cols,
                    rows,
                    corners: ordered,
                    spacing,
                });
            }
        }
        None
    }
}

fn median_nearest_distance(corners: &[ChessCorner]) -> Option<f32> {
    if corners.len() < 2 {
        return None;
    }
    let coords = corners
        .iter()
        .map(|c| [c.position.x, c.position.y])
        .collect::<Vec<_>>();
    let tree: KdTree<f32, 2> = (&coords).into();

    let mut nearest: Vec<f32> = coords
        .iter()
        .enumerate()
        .filter_map(|(i, q)| {
            tree.nearest_n::<SquaredEuclidean>(q, 2)
                .into_iter()
                .find(|nn| nn.item as usize != i)
                .map(|nn| nn.distance.sqrt())
        })
        .collect();
    if nearest.is_empty() {
        return None;
    }
    nearest.sort_by(|a, b| a.total_cmp(b));
    Some(nearest[nearest.len() / 2])
}

/// The unique fully-populated `cols × rows` (or transposed) window, if any.
fn find_board_window(
    cells: &HashMap<(i32, i32), usize>,
    cols: usize,
    rows: usize,
) -> Option<Window> {
    let (mut imin, mut imax, mut jmin, mut jmax) = (i32::MAX, i32::MIN, i32::MAX, i32::MIN);
    for &(i, j) in cells.keys() {
        imin = imin.min(i);
        imax = imax.max(i);
        jmin = jmin.min(j);
        jmax = jmax.max(j);
    }

    let mut shapes = vec![(cols, rows)];
    if cols != rows {
        shapes.push((rows, cols));
    }

    let mut found = None;
    for (w, h) in shapes {
        let (w_i, h_i) = (w as i32, h as i32);
        for j0 in jmin..=jmax - h_i + 1 {
            for i0 in imin..=imax - w_i + 1 {
                let full = (0..h_i).all(|b| (0..w_i).all(|a| cells.contains_key(&(i0 + a, j0 + b))));
                if full {
                    if found.is_some() {
                        debug!("board window is ambiguous");
                        return None;
                    }
                    found = Some(Window { i0, j0, w, h });
                }
            }
        }
    }
    found
}

/// Relabel the window row-major. Among the four rotations that map it onto
/// `cols × rows`, keep the one whose first corner is nearest the image origin.
fn canonical_order(
    cells: &HashMap<(i32, i32), usize>,
    window: Window,
    corners: &[ChessCorner],
    cols: usize,
    rows: usize,
) -> Option<Vec<Point2<f32>>> {
    let (w, h) = (window.w as i32, window.h as i32);
    let mut best: Option<(f32, Vec<Point2<f32>>)> = None;

    for t in GRID_TRANSFORMS_D4 {
        let (tw, th) = if t.swaps_axes() {
            (window.h, window.w)
        } else {
            (window.w, window.h)
        };
        if (tw, th) != (cols, rows) {
            continue;
        }

        let ends = [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1)].map(|(a, b)| t.apply(a, b));
        let ox = ends.iter().map(|p| p[0]).min()?;
        let oy = ends.iter().map(|p| p[1]).min()?;

        let mut ordered = vec![Point2::origin(); cols * rows];
        for b in 0..h {
            for a in 0..w {
                let [x, y] = t.apply(a, b);
                let (c, r) = ((x - ox) as usize, (y - oy) as usize);
                let node = *cells.get(&(window.i0 + a, window.j0 + b))?;
                ordered[r * cols + c] = corners[node].position;
            }
        }

        // +col and +row must turn the same way as image x and y
        let ex = ordered[1] - ordered[0];
        let ey = ordered[cols] - ordered[0];
        if ex.x * ey.y - ex.y * ey.x <= 0.0 {
            continue;
        }

        let key = ordered[0].x + ordered[0].y;
        if best.as_ref().is_none_or(|(k, _)| key < *k) {
            best = Some((key, ordered));
        }
    }

    best.map(|(_, ordered)| ordered)
}
