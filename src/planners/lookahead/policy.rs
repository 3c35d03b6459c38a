//! Greedy single-agent policy: follow the shortest path to the current target,
//! ignoring every other agent.

use crate::infra::{AStar, Action, PathResult, actions_from_path, preprocess};
use crate::state::GridSnapshot;

pub struct GreedyPolicy;

impl GreedyPolicy {
    /// First move toward the agent's target, or `Stay`.
    pub fn decide(snapshot: &GridSnapshot, agent: usize) -> Action {
        Self::plan(snapshot, agent)
            .first()
            .copied()
            .unwrap_or(Action::Stay)
    }

    /// Every move toward the agent's target. Never empty: `[Stay]` when there is nothing to do.
    pub fn decide_sequence(snapshot: &GridSnapshot, agent: usize) -> Vec<Action> {
        let actions = Self::plan(snapshot, agent);
        if actions.is_empty() {
            vec![Action::Stay]
        } else {
            actions
        }
    }

    fn plan(snapshot: &GridSnapshot, agent: usize) -> Vec<Action> {
        let Some(target) = snapshot.target(agent) else {
            return Vec::new();
        };
        let Some(start) = snapshot.agent_position(agent) else {
            tracing::debug!(agent, "Agent not on the map");
            return Vec::new();
        };

        let occupancy = preprocess(&snapshot.map, target);
        match AStar::find_path(&occupancy, start, target) {
            PathResult::Found(path) => actions_from_path(&path),
            PathResult::Exhausted(path) => {
                tracing::debug!(agent, ?start, ?target, "Following partial path");
                actions_from_path(&path)
            }
            PathResult::Unreachable => {
                tracing::warn!(agent, ?start, ?target, "Target unreachable, staying put");
                Vec::new()
            }
        }
    }
}
