use std::collections::{HashSet, VecDeque};

use crate::geometry::Cell;
use crate::world_map::WorldMap;

/// Shortest 4-connected route from `start` to `goal`, both ends included.
///
/// `dynamic_obstacles` are unioned with the map's static collision for this call
/// only. The debug noclip flag is not consulted: routes always respect collision.
/// Returns an empty path when either end is out of bounds or blocked, or when the
/// goal is unreachable. `start == goal` yields `vec![start]`.
pub fn find_path(start: Cell, goal: Cell, map: &WorldMap, dynamic_obstacles: &[Cell]) -> Vec<Cell> {
    let grid = map.grid();
    let (Some(start_index), Some(goal_index)) = (grid.index_of(start), grid.index_of(goal)) else {
        return Vec::new();
    };

    let dynamic: HashSet<Cell> = dynamic_obstacles.iter().copied().collect();
    let is_walkable = |cell: Cell| !map.has_collision(cell) && !dynamic.contains(&cell);
    if !is_walkable(start) || !is_walkable(goal) {
        return Vec::new();
    }
    if start == goal {
        return vec![start];
    }

    let mut parent = vec![None::<usize>; grid.cell_count()];
    let mut visited = vec![false; grid.cell_count()];
    let mut frontier = VecDeque::new();
    visited[start_index] = true;
    frontier.push_back(start);

    while let Some(current) = frontier.pop_front() {
        let Some(current_index) = grid.index_of(current) else {
            continue;
        };
        for neighbor in current.neighbors_4() {
            let Some(neighbor_index) = grid.index_of(neighbor) else {
                continue;
            };
            if visited[neighbor_index] || !is_walkable(neighbor) {
                continue;
            }
            visited[neighbor_index] = true;
            parent[neighbor_index] = Some(current_index);
            if neighbor_index == goal_index {
                return reconstruct_path(&parent, map, start_index, goal_index);
            }
            frontier.push_back(neighbor);
        }
    }

    Vec::new()
}

fn reconstruct_path(
    parent: &[Option<usize>],
    map: &WorldMap,
    start_index: usize,
    goal_index: usize,
) -> Vec<Cell> {
    let grid = map.grid();
    let mut cursor = goal_index;
    let mut indices = vec![cursor];
    while cursor != start_index {
        let Some(next) = parent.get(cursor).and_then(|value| *value) else {
            return Vec::new();
        };
        cursor = next;
        indices.push(cursor);
    }
    indices.reverse();
    indices
        .into_iter()
        .map(|index| grid.cell_of_index(index))
        .collect()
}
