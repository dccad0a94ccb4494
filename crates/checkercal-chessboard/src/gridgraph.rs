//! 4-connected neighbour graph over ChESS corners and integer grid labelling.

use std::collections::{HashMap, VecDeque};

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector2;

use crate::geom::angle_to_unit;
use crate::params::GridGraphParams;
use crate::corners::ChessCorner;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    Right,
    Left,
    Up,
    Down,
}

impl NeighborDirection {
    fn slot(self) -> usize {
        match self {
            NeighborDirection::Right => 0,
            NeighborDirection::Left => 1,
            NeighborDirection::Up => 2,
            NeighborDirection::Down => 3,
        }
    }

    fn opposite(self) -> Self {
        match self {
            NeighborDirection::Right => NeighborDirection::Left,
            NeighborDirection::Left => NeighborDirection::Right,
            NeighborDirection::Up => NeighborDirection::Down,
            NeighborDirection::Down => NeighborDirection::Up,
        }
    }

    fn step(self) -> (i32, i32) {
        match self {
            NeighborDirection::Right => (1, 0),
            NeighborDirection::Left => (-1, 0),
            NeighborDirection::Up => (0, -1),
            NeighborDirection::Down => (0, 1),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f32,
    pub score: f32,
}

/// Global grid axes in image space. `Right` is `+u`, `Down` is `+v`.
#[derive(Clone, Copy, Debug)]
pub struct GridAxes {
    pub u: Vector2<f32>,
    pub v: Vector2<f32>,
}

impl GridAxes {
    /// Axes at ±45° from the dominant corner diagonal.
    pub fn from_diagonal(diagonal: f32) -> Self {
        let u = angle_to_unit(diagonal - std::f32::consts::FRAC_PI_4);
        Self {
            u,
            v: Vector2::new(-u.y, u.x),
        }
    }

    fn classify(&self, e: &Vector2<f32>) -> NeighborDirection {
        let du = e.dot(&self.u);
        let dv = e.dot(&self.v);
        if du.abs() >= dv.abs() {
            if du >= 0.0 {
                NeighborDirection::Right
            } else {
                NeighborDirection::Left
            }
        } else if dv >= 0.0 {
            NeighborDirection::Down
        } else {
            NeighborDirection::Up
        }
    }
}

fn is_good_neighbor(
    corner: &ChessCorner,
    neighbor: &ChessCorner,
    neighbor_index: usize,
    params: &GridGraphParams,
    spacing: f32,
    axes: &GridAxes,
) -> Option<NodeNeighbor> {
    // Adjacent corners always belong to opposite orientation families.
    let (Some(ci), Some(cj)) = (corner.orientation_cluster, neighbor.orientation_cluster) else {
        return None;
    };
    if ci == cj {
        return None;
    }

    let vec_to_neighbor = neighbor.position - corner.position;
    let distance = vec_to_neighbor.norm();
    if distance < params.min_spacing_ratio * spacing || distance > params.max_spacing_ratio * spacing
    {
        return None;
    }

    // The local grid axes at this edge are v± = oi ± oj, where oi, oj are the
    // two (roughly orthogonal) bright diagonals. A valid edge is nearly
    // collinear with one of them.
    let e = vec_to_neighbor / distance;
    let oi = angle_to_unit(corner.orientation);
    let oj = angle_to_unit(neighbor.orientation);
    let mut best_alignment = 0.0f32;
    for axis in [oi + oj, oi - oj] {
        if axis.norm_squared() > 1e-6 {
            best_alignment = best_alignment.max(axis.normalize().dot(&e).abs());
        }
    }
    if best_alignment < params.orientation_tolerance_deg.to_radians().cos() {
        return None;
    }

    Some(NodeNeighbor {
        direction: axes.classify(&e),
        index: neighbor_index,
        distance,
        score: 1.0 - best_alignment,
    })
}

/// Keep at most one neighbour per direction, choosing the closest candidate.
fn select_neighbors(candidates: Vec<NodeNeighbor>) -> [Option<NodeNeighbor>; 4] {
    let mut best: [Option<NodeNeighbor>; 4] = [None, None, None, None];

    for candidate in candidates {
        let slot = &mut best[candidate.direction.slot()];
        let replace = match slot {
            None => true,
            Some(current) => {
                candidate.distance < current.distance
                    || (candidate.distance == current.distance && candidate.score < current.score)
            }
        };
        if replace {
            *slot = Some(candidate);
        }
    }

    best
}

pub struct GridGraph {
    pub neighbors: Vec<Vec<NodeNeighbor>>,
}

impl GridGraph {
    /// Build the graph; only mutual edges (i→j along d and j→i along -d) are kept.
    pub fn new(
        corners: &[ChessCorner],
        params: &GridGraphParams,
        spacing: f32,
        axes: &GridAxes,
    ) -> Self {
        let coords = corners
            .iter()
            .map(|c| [c.position.x, c.position.y])
            .collect::<Vec<_>>();
        let tree: KdTree<f32, 2> = (&coords).into();
        let mut slots = Vec::with_capacity(corners.len());

        for (i, corner) in corners.iter().enumerate() {
            // the query point itself comes back as one of the results
            let results =
                tree.nearest_n::<SquaredEuclidean>(&coords[i], params.k_neighbors + 1);

            let candidates = results
                .into_iter()
                .map(|nn| nn.item as usize)
                .filter(|&j| j != i)
                .take(params.k_neighbors)
                .filter_map(|j| is_good_neighbor(corner, &corners[j], j, params, spacing, axes))
                .collect();
            slots.push(select_neighbors(candidates));
        }

        let neighbors = (0..corners.len())
            .map(|i| {
                slots[i]
                    .iter()
                    .flatten()
                    .filter(|n| {
                        slots[n.index][n.direction.opposite().slot()]
                            .as_ref()
                            .is_some_and(|back| back.index == i)
                    })
                    .cloned()
                    .collect()
            })
            .collect();

        Self { neighbors }
    }
}

pub fn connected_components(graph: &GridGraph) -> Vec<Vec<usize>> {
    let mut visited = vec![false; graph.neighbors.len()];
    let mut components = Vec::new();

    for start in 0..graph.neighbors.len() {
        if visited[start] {
            continue;
        }

        let mut component = Vec::new();
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            component.push(node);

            for neighbor in &graph.neighbors[node] {
                if !visited[neighbor.index] {
                    stack.push(neighbor.index);
                }
            }
        }

        components.push(component);
    }

    components
}

/// BFS a component and label every node with integer `(i, j)`.
///
/// Returns `None` when the labelling is inconsistent (a node reached with
/// two different labels, or two nodes sharing one).
pub fn assign_grid_coordinates(
    graph: &GridGraph,
    component: &[usize],
) -> Option<HashMap<(i32, i32), usize>> {
    let start = *component.first()?;
    let mut label: HashMap<usize, (i32, i32)> = HashMap::with_capacity(component.len());
    let mut queue = VecDeque::new();
    label.insert(start, (0, 0));
    queue.push_back(start);

    while let Some(node) = queue.pop_front() {
        let (i, j) = label[&node];
        for neighbor in &graph.neighbors[node] {
            let (di, dj) = neighbor.direction.step();
            let expected = (i + di, j + dj);
            match label.get(&neighbor.index) {
                Some(&seen) if seen != expected => return None,
                Some(_) => {}
                None => {
                    label.insert(neighbor.index, expected);
                    queue.push_back(neighbor.index);
                }
            }
        }
    }

    let mut by_cell = HashMap::with_capacity(label.len());
    for (node, cell) in label {
        if by_cell.insert(cell, node).is_some() {
            return None;
        }
    }
    Some(by_cell)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;
    use std::f32::consts::FRAC_PI_4;

    fn make_corner(x: f32, y: f32, cluster: usize) -> ChessCorner {
        ChessCorner {
            position: Point2::new(x, y),
            orientation: if cluster == 0 {
                FRAC_PI_4
            } else {
                3.0 * FRAC_PI_4
            },
            orientation_cluster: Some(cluster),
            strength: 1.0,
        }
    }

    fn grid(cols: usize, rows: usize, spacing: f32) -> Vec<ChessCorner> {
        let mut corners = Vec::new();
        for j in 0..rows {
            for i in 0..cols {
                corners.push(make_corner(
                    i as f32 * spacing,
                    j as f32 * spacing,
                    (i + j) % 2,
                ));
            }
        }
        corners
    }

    fn axes() -> GridAxes {
        GridAxes::from_diagonal(FRAC_PI_4)
    }

    fn neighbor_map(neighbors: &[NodeNeighbor]) -> HashMap<NeighborDirection, &NodeNeighbor> {
        neighbors.iter().map(|n| (n.direction, n)).collect()
    }

    #[test]
    fn finds_axis_neighbors_in_regular_grid() {
        let cols = 3;
        let corners = grid(cols, 3, 10.0);
        let graph = GridGraph::new(&corners, &GridGraphParams::default(), 10.0, &axes());
        let idx = |i: usize, j: usize| j * cols + i;

        let center = neighbor_map(&graph.neighbors[idx(1, 1)]);
        assert_eq!(4, center.len());
        assert_eq!(idx(0, 1), center[&NeighborDirection::Left].index);
        assert_eq!(idx(2, 1), center[&NeighborDirection::Right].index);
        assert_eq!(idx(1, 0), center[&NeighborDirection::Up].index);
        assert_eq!(idx(1, 2), center[&NeighborDirection::Down].index);

        let top_left = neighbor_map(&graph.neighbors[idx(0, 0)]);
        assert_eq!(2, top_left.len());
        assert!(top_left.contains_key(&NeighborDirection::Right));
        assert!(top_left.contains_key(&NeighborDirection::Down));
    }

    #[test]
    fn rejects_same_family_neighbors() {
        let corners = vec![make_corner(0.0, 0.0, 0), make_corner(10.0, 0.0, 0)];
        let graph = GridGraph::new(&corners, &GridGraphParams::default(), 10.0, &axes());
        assert!(graph.neighbors[0].is_empty());
        assert!(graph.neighbors[1].is_empty());
    }

    #[test]
    fn rejects_neighbors_outside_distance_window() {
        let corners = vec![make_corner(0.0, 0.0, 0), make_corner(30.0, 0.0, 1)];
        let graph = GridGraph::new(&corners, &GridGraphParams::default(), 10.0, &axes());
        assert!(graph.neighbors[0].is_empty());
    }

    #[test]
    fn rejects_diagonal_edges() {
        let corners = vec![make_corner(0.0, 0.0, 0), make_corner(10.0, 10.0, 1)];
        let graph = GridGraph::new(&corners, &GridGraphParams::default(), 12.0, &axes());
        assert!(graph.neighbors[0].is_empty());
    }

    #[test]
    fn keeps_closest_candidate_per_direction() {
        let corners = vec![
            make_corner(0.0, 0.0, 0),
            make_corner(10.0, 0.0, 1),
            make_corner(12.0, 0.5, 1),
            make_corner(-10.0, 0.0, 1),
        ];
        let graph = GridGraph::new(&corners, &GridGraphParams::default(), 10.0, &axes());
        let map = neighbor_map(&graph.neighbors[0]);
        assert_eq!(2, map.len());
        assert_eq!(1, map[&NeighborDirection::Right].index);
        assert_eq!(3, map[&NeighborDirection::Left].index);
        // corner 2 points at 0 but 0 prefers 1, so the edge is not mutual
        assert!(graph.neighbors[2].is_empty());
    }

    #[test]
    fn labels_full_grid_consistently() {
        let (cols, rows) = (4, 3);
        let corners = grid(cols, rows, 10.0);
        let graph = GridGraph::new(&corners, &GridGraphParams::default(), 10.0, &axes());
        let comps = connected_components(&graph);
        assert_eq!(comps.len(), 1);
        let cells = assign_grid_coordinates(&graph, &comps[0]).unwrap();
        assert_eq!(cells.len(), cols * rows);
        let (i0, j0) = cells.keys().fold((i32::MAX, i32::MAX), |(a, b), &(i, j)| {
            (a.min(i), b.min(j))
        });
        for j in 0..rows {
            for i in 0..cols {
                let node = cells[&(i0 + i as i32, j0 + j as i32)];
                assert_eq!(node, j * cols + i);
            }
        }
    }

    #[test]
    fn every_interior_node_is_linked_in_large_grid() {
        let (cols, rows) = (20, 20);
        let corners = grid(cols, rows, 10.0);
        let graph = GridGraph::new(&corners, &GridGraphParams::default(), 10.0, &axes());
        for j in 1..rows - 1 {
            for i in 1..cols - 1 {
                assert_eq!(graph.neighbors[j * cols + i].len(), 4, "node ({i}, {j})");
            }
        }
        assert_eq!(connected_components(&graph).len(), 1);
    }

    #[test]
    fn candidate_count_limits_the_search() {
        let corners = grid(3, 3, 10.0);
        let params = GridGraphParams {
            k_neighbors: 1,
            ..Default::default()
        };
        let graph = GridGraph::new(&corners, &params, 10.0, &axes());
        // with a single candidate per node, at most one edge per node survives
        assert!(graph.neighbors.iter().all(|n| n.len() <= 1));
    }
}
