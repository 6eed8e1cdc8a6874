use std::collections::{HashMap, VecDeque};
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector2;

use crate::geom::{axis_vec_diff, is_orthogonal};
use crate::params::GridGraphParams;
use crate::Corner;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    Right,
    Left,
    Up,
    Down,
}

impl NeighborDirection {
    /// Grid step `(di, dj)` for this direction; `j` grows downwards.
    fn step(self) -> (i32, i32) {
        match self {
            NeighborDirection::Right => (1, 0),
            NeighborDirection::Left => (-1, 0),
            NeighborDirection::Up => (0, -1),
            NeighborDirection::Down => (0, 1),
        }
    }

    fn slot(self) -> usize {
        match self {
            NeighborDirection::Right => 0,
            NeighborDirection::Left => 1,
            NeighborDirection::Up => 2,
            NeighborDirection::Down => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f32,
    pub score: f32,
}

fn direction_quadrant(v: &Vector2<f32>) -> NeighborDirection {
    if v.x.abs() > v.y.abs() {
        if v.x >= 0.0 {
            NeighborDirection::Right
        } else {
            NeighborDirection::Left
        }
    } else if v.y >= 0.0 {
        NeighborDirection::Down
    } else {
        NeighborDirection::Up
    }
}

/// A ChESS orientation runs along a square diagonal, so a grid edge between
/// two neighbouring corners sits at ~45° to both orientations, and the two
/// orientations are ~orthogonal.
fn is_good_neighbor(
    corner: &Corner,
    neighbor: &Corner,
    neighbor_index: usize,
    params: &GridGraphParams,
) -> Option<NodeNeighbor> {
    let tol = params.orientation_tolerance_deg.to_radians();
    if !is_orthogonal(corner.orientation, neighbor.orientation, tol) {
        return None;
    }

    let v = neighbor.position - corner.position;
    let distance = v.norm();
    if distance < params.min_spacing_pix || distance > params.max_spacing_pix {
        return None;
    }

    let edge_angle = v.y.atan2(v.x);
    let score_corner = (axis_vec_diff(corner.orientation, edge_angle) - FRAC_PI_4).abs();
    let score_neighbor = (axis_vec_diff(neighbor.orientation, edge_angle) - FRAC_PI_4).abs();
    if score_corner > tol || score_neighbor > tol {
        return None;
    }

    let score_orientation =
        (FRAC_PI_2 - axis_vec_diff(corner.orientation, neighbor.orientation)).abs();

    Some(NodeNeighbor {
        direction: direction_quadrant(&v),
        index: neighbor_index,
        distance,
        score: score_corner + score_neighbor + score_orientation,
    })
}

/// At most one neighbour per direction: lowest score, then shortest edge.
fn select_neighbors(candidates: Vec<NodeNeighbor>) -> Vec<NodeNeighbor> {
    let mut best: [Option<NodeNeighbor>; 4] = [None, None, None, None];
    for candidate in candidates {
        let slot = &mut best[candidate.direction.slot()];
        let replace = match slot {
            None => true,
            Some(current) => {
                candidate.score < current.score
                    || (candidate.score == current.score && candidate.distance < current.distance)
            }
        };
        if replace {
            *slot = Some(candidate);
        }
    }
    best.into_iter().flatten().collect()
}

/// 4-connected corner graph.
pub struct GridGraph {
    pub neighbors: Vec<Vec<NodeNeighbor>>,
}

impl GridGraph {
    pub fn new(corners: &[Corner], params: &GridGraphParams) -> Self {
        let coords: Vec<[f32; 2]> = corners
            .iter()
            .map(|c| [c.position.x, c.position.y])
            .collect();
        let tree: KdTree<f32, 2> = (&coords).into();
        let k = params.k_neighbors + 1;

        let neighbors = corners
            .iter()
            .enumerate()
            .map(|(i, corner)| {
                let query = [corner.position.x, corner.position.y];
                let candidates = tree
                    .nearest_n::<SquaredEuclidean>(&query, k)
                    .into_iter()
                    .map(|nn| nn.item as usize)
                    .filter(|&j| j != i)
                    .filter_map(|j| is_good_neighbor(corner, &corners[j], j, params))
                    .collect();
                select_neighbors(candidates)
            })
            .collect();

        Self { neighbors }
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

/// Connected components, largest first.
pub fn connected_components(graph: &GridGraph) -> Vec<Vec<usize>> {
    let mut visited = vec![false; graph.len()];
    let mut components = Vec::new();

    for start in 0..graph.len() {
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
            stack.extend(
                graph.neighbors[node]
                    .iter()
                    .map(|n| n.index)
                    .filter(|&j| !visited[j]),
            );
        }
        components.push(component);
    }

    components.sort_by_key(|c| std::cmp::Reverse(c.len()));
    components
}

/// BFS integer grid coordinates `(i, j)` for every node of a component.
///
/// `None` when the graph is inconsistent: a node reached at two different
/// coordinates, or two nodes claiming the same cell.
pub fn assign_grid_coordinates(
    graph: &GridGraph,
    component: &[usize],
) -> Option<HashMap<(i32, i32), usize>> {
    let start = *component.first()?;
    let mut coord_of: HashMap<usize, (i32, i32)> = HashMap::new();
    let mut cells: HashMap<(i32, i32), usize> = HashMap::new();
    let mut queue = VecDeque::from([(start, (0, 0))]);

    while let Some((node, ij)) = queue.pop_front() {
        if let Some(&seen) = coord_of.get(&node) {
            if seen != ij {
                log::debug!("grid conflict at node {node}: {seen:?} vs {ij:?}");
                return None;
            }
            continue;
        }
        if cells.insert(ij, node).is_some() {
            log::debug!("grid conflict: cell {ij:?} claimed twice");
            return None;
        }
        coord_of.insert(node, ij);

        for n in &graph.neighbors[node] {
            let (di, dj) = n.direction.step();
            queue.push_back((n.index, (ij.0 + di, ij.1 + dj)));
        }
    }

    Some(cells)
}

/// Order a complete `cols x rows` grid row-major from the top-left cell.
///
/// A grid seen rotated by 90° (`rows` wide, `cols` tall) is read with a
/// quarter turn so the result is still a rigid relabelling of the board.
pub fn order_complete_grid(
    cells: &HashMap<(i32, i32), usize>,
    cols: usize,
    rows: usize,
) -> Option<Vec<usize>> {
    if cells.len() != cols * rows {
        return None;
    }
    let min_i = cells.keys().map(|c| c.0).min()?;
    let max_i = cells.keys().map(|c| c.0).max()?;
    let min_j = cells.keys().map(|c| c.1).min()?;
    let max_j = cells.keys().map(|c| c.1).max()?;
    let width = (max_i - min_i + 1) as usize;
    let height = (max_j - min_j + 1) as usize;

    let mut order = Vec::with_capacity(cols * rows);
    if (width, height) == (cols, rows) {
        for r in 0..rows as i32 {
            for c in 0..cols as i32 {
                order.push(*cells.get(&(min_i + c, min_j + r))?);
            }
        }
    } else if (width, height) == (rows, cols) {
        for r in 0..rows as i32 {
            for c in 0..cols as i32 {
                order.push(*cells.get(&(min_i + r, min_j + cols as i32 - 1 - c))?);
            }
        }
    } else {
        return None;
    }
    Some(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    fn make_corner(x: f32, y: f32, orientation: f32) -> Corner {
        Corner {
            position: Point2::new(x, y),
            orientation,
            strength: 1.0,
        }
    }

    fn grid(cols: usize, rows: usize, spacing: f32) -> Vec<Corner> {
        let mut corners = Vec::new();
        for j in 0..rows {
            for i in 0..cols {
                let o = if (i + j) % 2 == 0 { FRAC_PI_4 } else { 3.0 * FRAC_PI_4 };
                corners.push(make_corner(20.0 + i as f32 * spacing, 30.0 + j as f32 * spacing, o));
            }
        }
        corners
    }

    fn params() -> GridGraphParams {
        GridGraphParams {
            min_spacing_pix: 5.0,
            max_spacing_pix: 15.0,
            ..Default::default()
        }
    }

    fn neighbor_map(neighbors: &[NodeNeighbor]) -> HashMap<NeighborDirection, &NodeNeighbor> {
        neighbors.iter().map(|n| (n.direction, n)).collect()
    }

    #[test]
    fn finds_axis_neighbors_in_regular_grid() {
        let corners = grid(3, 3, 10.0);
        let graph = GridGraph::new(&corners, &params());
        let idx = |i: usize, j: usize| j * 3 + i;

        let center = neighbor_map(&graph.neighbors[idx(1, 1)]);
        assert_eq!(4, center.len());
        assert_eq!(idx(0, 1), center[&NeighborDirection::Left].index);
        assert_eq!(idx(2, 1), center[&NeighborDirection::Right].index);
        assert_eq!(idx(1, 0), center[&NeighborDirection::Up].index);
        assert_eq!(idx(1, 2), center[&NeighborDirection::Down].index);

        assert_eq!(2, graph.neighbors[idx(0, 0)].len());
        assert_eq!(3, graph.neighbors[idx(1, 0)].len());
    }

    #[test]
    fn rejects_parallel_orientations_and_far_corners() {
        let corners = vec![
            make_corner(0.0, 0.0, FRAC_PI_4),
            make_corner(10.0, 0.0, FRAC_PI_4),
            make_corner(40.0, 0.0, 3.0 * FRAC_PI_4),
        ];
        let graph = GridGraph::new(&corners, &params());
        assert!(graph.neighbors.iter().all(|n| n.is_empty()));
    }

    #[test]
    fn keeps_best_candidate_per_direction() {
        let corners = vec![
            make_corner(0.0, 0.0, FRAC_PI_4),
            make_corner(10.0, 0.0, 3.0 * FRAC_PI_4),
            make_corner(12.0, 0.0, 3.0 * FRAC_PI_4 + 0.1),
            make_corner(-10.0, 0.0, 3.0 * FRAC_PI_4),
        ];
        let graph = GridGraph::new(&corners, &params());
        let map = neighbor_map(&graph.neighbors[0]);
        assert_eq!(2, map.len());
        assert_eq!(1, map[&NeighborDirection::Right].index);
        assert_eq!(3, map[&NeighborDirection::Left].index);
    }

    #[test]
    fn orders_complete_grid_row_major() {
        let corners = grid(4, 3, 10.0);
        let graph = GridGraph::new(&corners, &params());
        let components = connected_components(&graph);
        assert_eq!(components[0].len(), 12);

        let cells = assign_grid_coordinates(&graph, &components[0]).unwrap();
        let order = order_complete_grid(&cells, 4, 3).unwrap();
        assert_eq!(order, (0..12).collect::<Vec<_>>());
        assert!(order_complete_grid(&cells, 5, 3).is_none());
    }

    #[test]
    fn transposed_grid_is_read_with_a_quarter_turn() {
        // 3 wide, 4 tall in the image while the board is 4 x 3.
        let corners = grid(3, 4, 10.0);
        let graph = GridGraph::new(&corners, &params());
        let components = connected_components(&graph);
        let cells = assign_grid_coordinates(&graph, &components[0]).unwrap();
        let order = order_complete_grid(&cells, 4, 3).unwrap();

        // First board row runs up the first image column.
        let idx = |i: usize, j: usize| j * 3 + i;
        assert_eq!(&order[..4], &[idx(0, 3), idx(0, 2), idx(0, 1), idx(0, 0)]);
        assert_eq!(order[4], idx(1, 3));
    }

    #[test]
    fn components_are_sorted_by_size() {
        let mut corners = grid(2, 2, 10.0);
        corners.extend(grid(3, 3, 10.0).into_iter().map(|mut c| {
            c.position.x += 200.0;
            c
        }));
        let graph = GridGraph::new(&corners, &params());
        let components = connected_components(&graph);
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].len(), 9);
        assert_eq!(components[1].len(), 4);
    }
}
