mod config;
mod dataset;
mod default_observer;
mod game_observer;
mod occupancy;
mod pathfinding;
mod simulator;
mod types;

pub use config::{ConfigError, Settings};
pub use dataset::{DatasetError, DatasetWriter, SampleRecord, read_batch, run_writer};
pub use default_observer::DefaultObserver;
pub use game_observer::GameObserver;
pub use occupancy::{BLOCKED, OccupancyMap, WALKABLE, preprocess};
pub use pathfinding::{AStar, PathResult};
pub use simulator::{Simulator, StepInfo, StepOutcome};
pub use types::{Action, Position};

// ============================================================================
// Helper functions
// ============================================================================

/// Converts consecutive path cells into moves. Stops at the first step that has
/// no single-move equivalent.
pub fn actions_from_path(path: &[Position]) -> Vec<Action> {
    path.windows(2)
        .map_while(|pair| Action::from_delta(pair[1].x - pair[0].x, pair[1].y - pair[0].y))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actions_from_path() {
        let path = [
            Position::new(0, 0),
            Position::new(0, 1),
            Position::new(1, 1),
            Position::new(1, 0),
            Position::new(0, 0),
        ];
        assert_eq!(
            actions_from_path(&path),
            vec![Action::Down, Action::Right, Action::Up, Action::Left]
        );
        assert!(actions_from_path(&path[..1]).is_empty());
    }

    #[test]
    fn test_actions_stop_at_diagonal_step() {
        let path = [Position::new(0, 0), Position::new(1, 0), Position::new(2, 1)];
        assert_eq!(actions_from_path(&path), vec![Action::Right]);
    }
}
