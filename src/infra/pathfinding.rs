use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::infra::{OccupancyMap, Position};

/// Outcome of a single A* search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathResult {
    /// Start to goal, both inclusive.
    Found(Vec<Position>),
    /// Expansion budget exceeded; path from start to the last expanded node.
    Exhausted(Vec<Position>),
    /// Frontier ran dry before reaching the goal.
    Unreachable,
}

impl PathResult {
    pub fn path(&self) -> &[Position] {
        match self {
            PathResult::Found(path) | PathResult::Exhausted(path) => path,
            PathResult::Unreachable => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.path().len()
    }

    pub fn is_empty(&self) -> bool {
        self.path().is_empty()
    }

    pub fn is_found(&self) -> bool {
        matches!(self, PathResult::Found(_))
    }
}

/// Arena entry; `parent` indexes into the same arena.
#[derive(Debug, Clone)]
struct SearchNode {
    pos: Position,
    parent: Option<usize>,
    g: i32,
}

/// Frontier entry. Lowest f first, then lowest h, then earliest insertion.
#[derive(Clone, Eq, PartialEq)]
struct FrontierEntry {
    f: i32,
    h: i32,
    seq: usize,
    node: usize,
}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.h.cmp(&self.h))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A* over an [`OccupancyMap`] with unit edge costs and a Manhattan heuristic.
#[derive(Debug, Clone, Copy, Default)]
pub struct AStar {
    allow_diagonal: bool,
    max_expansions: Option<usize>,
}

impl AStar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_diagonal(mut self, allow_diagonal: bool) -> Self {
        self.allow_diagonal = allow_diagonal;
        self
    }

    /// Overrides the default expansion cap of `10 * width * height / 2`.
    pub fn with_max_expansions(mut self, max_expansions: usize) -> Self {
        self.max_expansions = Some(max_expansions);
        self
    }

    /// Four-directional search with the default budget.
    pub fn find_path(map: &OccupancyMap, start: Position, goal: Position) -> PathResult {
        AStar::new().search(map, start, goal)
    }

    pub fn search(&self, map: &OccupancyMap, start: Position, goal: Position) -> PathResult {
        let cell_count = (map.width.max(0) * map.height.max(0)) as usize;
        let max_expansions = self
            .max_expansions
            .unwrap_or(10 * map.width.max(0) as usize * map.height.max(0) as usize / 2);
        let cell_index = |pos: &Position| (pos.y * map.width + pos.x) as usize;

        let mut arena: Vec<SearchNode> = Vec::new();
        let mut frontier = BinaryHeap::new();
        let mut closed = vec![false; cell_count];
        // best g currently queued per cell
        let mut open_g: Vec<Option<i32>> = vec![None; cell_count];
        let mut seq = 0usize;

        arena.push(SearchNode {
            pos: start,
            parent: None,
            g: 0,
        });
        let start_h = heuristic(start, goal);
        frontier.push(FrontierEntry {
            f: start_h,
            h: start_h,
            seq,
            node: 0,
        });
        if map.contains(&start) {
            open_g[cell_index(&start)] = Some(0);
        }

        let mut expansions = 0usize;
        let mut last_expanded: Option<usize> = None;

        while let Some(entry) = frontier.pop() {
            let current = entry.node;
            let current_pos = arena[current].pos;
            let current_g = arena[current].g;

            if map.contains(&current_pos) {
                let index = cell_index(&current_pos);
                if closed[index] {
                    continue;
                }
                closed[index] = true;
            }

            expansions += 1;
            if expansions > max_expansions {
                tracing::debug!(
                    ?start,
                    ?goal,
                    max_expansions,
                    "A*: expansion budget exceeded, returning partial path"
                );
                let partial = last_expanded
                    .map(|node| reconstruct_path(&arena, node))
                    .unwrap_or_default();
                return PathResult::Exhausted(partial);
            }
            last_expanded = Some(current);

            if current_pos == goal {
                tracing::trace!(?start, ?goal, expansions, "A*: reached goal");
                return PathResult::Found(reconstruct_path(&arena, current));
            }

            for neighbor in self.successors(&current_pos) {
                if !map.is_walkable(&neighbor) {
                    continue;
                }
                let index = cell_index(&neighbor);
                if closed[index] {
                    continue;
                }

                let g = current_g + 1;
                if open_g[index].is_some_and(|queued| queued <= g) {
                    continue;
                }

                let h = heuristic(neighbor, goal);
                arena.push(SearchNode {
                    pos: neighbor,
                    parent: Some(current),
                    g,
                });
                open_g[index] = Some(g);
                seq += 1;
                frontier.push(FrontierEntry {
                    f: g + h,
                    h,
                    seq,
                    node: arena.len() - 1,
                });
            }
        }

        tracing::debug!(?start, ?goal, expansions, "A*: no path");
        PathResult::Unreachable
    }

    fn successors(&self, pos: &Position) -> Vec<Position> {
        let mut successors = pos.neighbors().to_vec();
        if self.allow_diagonal {
            successors.extend(pos.diagonal_neighbors());
        }
        successors
    }
}

fn heuristic(a: Position, b: Position) -> i32 {
    a.distance(&b)
}

fn reconstruct_path(arena: &[SearchNode], mut current: usize) -> Vec<Position> {
    let mut path = vec![arena[current].pos];
    while let Some(parent) = arena[current].parent {
        path.push(arena[parent].pos);
        current = parent;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::infra::{BLOCKED, WALKABLE};

    fn grid(rows: &[&str]) -> OccupancyMap {
        let width = rows[0].len() as i32;
        let cells = rows
            .iter()
            .flat_map(|row| row.chars().map(|c| if c == '#' { BLOCKED } else { WALKABLE }))
            .collect();
        OccupancyMap::from_cells(width, rows.len() as i32, cells).unwrap()
    }

    fn assert_valid_path(path: &[Position], start: Position, goal: Position, map: &OccupancyMap) {
        assert_eq!(path.first(), Some(&start));
        assert_eq!(path.last(), Some(&goal));
        for pair in path.windows(2) {
            assert!(pair[0].is_adjacent(&pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
            assert!(map.is_walkable(&pair[1]));
        }
    }

    fn bfs_length(map: &OccupancyMap, start: Position, goal: Position) -> Option<usize> {
        let mut seen = vec![false; (map.width * map.height) as usize];
        let mut queue = VecDeque::new();
        seen[(start.y * map.width + start.x) as usize] = true;
        queue.push_back((start, 1usize));
        while let Some((pos, len)) = queue.pop_front() {
            if pos == goal {
                return Some(len);
            }
            for next in pos.neighbors() {
                if map.is_walkable(&next) && !seen[(next.y * map.width + next.x) as usize] {
                    seen[(next.y * map.width + next.x) as usize] = true;
                    queue.push_back((next, len + 1));
                }
            }
        }
        None
    }

    #[test]
    fn test_open_grid_corner_to_corner() {
        let map = OccupancyMap::open(5, 5);
        let start = Position::new(0, 0);
        let goal = Position::new(4, 4);

        let result = AStar::find_path(&map, start, goal);
        assert!(result.is_found());
        assert_eq!(result.len(), 9);
        assert_valid_path(result.path(), start, goal, &map);
    }

    #[test]
    fn test_start_equals_goal() {
        let map = OccupancyMap::open(3, 3);
        let pos = Position::new(1, 1);
        assert_eq!(AStar::find_path(&map, pos, pos), PathResult::Found(vec![pos]));
    }

    #[test]
    fn test_path_avoids_walls() {
        let map = grid(&["...", ".#.", "..."]);
        let start = Position::new(0, 1);
        let goal = Position::new(2, 1);

        let result = AStar::find_path(&map, start, goal);
        assert_eq!(result.len(), 5);
        assert!(!result.path().contains(&Position::new(1, 1)));
        assert_valid_path(result.path(), start, goal, &map);
    }

    #[test]
    fn test_enclosed_goal_is_unreachable() {
        let map = grid(&["..#..", ".#.#.", "..#.."]);
        let result = AStar::find_path(&map, Position::new(0, 0), Position::new(2, 1));
        assert_eq!(result, PathResult::Unreachable);
        assert!(result.is_empty());
    }

    #[test]
    fn test_blocked_goal_is_unreachable() {
        let map = grid(&["..#"]);
        let result = AStar::find_path(&map, Position::new(0, 0), Position::new(2, 0));
        assert_eq!(result, PathResult::Unreachable);
    }

    #[test]
    fn test_budget_exhaustion_returns_partial_path() {
        let map = OccupancyMap::open(10, 1);
        let start = Position::new(0, 0);
        let goal = Position::new(9, 0);

        let result = AStar::new()
            .with_max_expansions(3)
            .search(&map, start, goal);

        match result {
            PathResult::Exhausted(path) => {
                assert_eq!(path.first(), Some(&start));
                assert_ne!(path.last(), Some(&goal));
                assert_eq!(path.len(), 3);
            }
            other => panic!("expected exhausted search, got {:?}", other),
        }
    }

    #[test]
    fn test_diagonal_movement_shortens_path() {
        let map = OccupancyMap::open(5, 5);
        let start = Position::new(0, 0);
        let goal = Position::new(4, 4);

        let result = AStar::new().with_diagonal(true).search(&map, start, goal);
        assert!(result.is_found());
        assert_eq!(result.len(), 5);
        for pair in result.path().windows(2) {
            assert_eq!((pair[0].x - pair[1].x).abs().max((pair[0].y - pair[1].y).abs()), 1);
        }
    }

    #[test]
    fn test_matches_bfs_on_random_maps() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let width = rng.random_range(2..12);
            let height = rng.random_range(2..12);
            let cells = (0..width * height)
                .map(|_| if rng.random_bool(0.25) { BLOCKED } else { WALKABLE })
                .collect();
            let mut map = OccupancyMap::from_cells(width, height, cells).unwrap();
            let start = Position::new(rng.random_range(0..width), rng.random_range(0..height));
            let goal = Position::new(rng.random_range(0..width), rng.random_range(0..height));
            map.set(start, WALKABLE);
            map.set(goal, WALKABLE);

            let result = AStar::find_path(&map, start, goal);
            match bfs_length(&map, start, goal) {
                Some(expected) => {
                    assert!(result.is_found(), "{:?} -> {:?}", start, goal);
                    assert_eq!(result.len(), expected);
                    assert_valid_path(result.path(), start, goal, &map);
                }
                None => assert_eq!(result, PathResult::Unreachable),
            }
        }
    }
}
