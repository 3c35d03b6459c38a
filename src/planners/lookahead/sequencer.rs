use rand::Rng;
use rand::seq::IndexedRandom;

use super::LookaheadConfig;
use super::evaluator::{CandidateRewards, LookaheadEvaluator};
use crate::infra::{AStar, Action, OccupancyMap, PathResult, Position, Simulator, preprocess};
use crate::state::GridSnapshot;

/// Path length charged to a move that leaves the agent without a route.
pub const UNREACHABLE_PATH_LENGTH: usize = 100;

const REWARD_COMPARISON_EPSILON: f32 = 0.001;

/// Decides a joint action one agent at a time.
#[derive(Debug, Clone, Copy)]
pub struct TurnSequencer {
    evaluator: LookaheadEvaluator,
}

impl TurnSequencer {
    pub fn new(evaluator: LookaheadEvaluator) -> Self {
        Self { evaluator }
    }

    pub fn from_config(config: &LookaheadConfig) -> Self {
        Self::new(LookaheadEvaluator::from_config(config))
    }

    /// One action per agent. Agents are decided in `agent_order`, each seeing the
    /// choices of those before it; agents missing from the order stay put.
    #[tracing::instrument(level = "debug", skip_all, fields(tick = snapshot.tick))]
    pub fn decide_step<S, R>(
        &self,
        sim: &mut S,
        snapshot: &GridSnapshot,
        agent_order: &[usize],
        seed: Option<&[Action]>,
        rng: &mut R,
    ) -> Vec<Action>
    where
        S: Simulator + Clone + Send,
        R: Rng + ?Sized,
    {
        let mut committed: Vec<Option<Action>> = vec![None; snapshot.num_agents()];

        for &agent in agent_order {
            if agent >= committed.len() {
                tracing::warn!(agent, "Agent in turn order does not exist");
                continue;
            }
            let rewards = self.evaluator.evaluate(sim, snapshot, agent, &committed, seed);
            let candidates = best_candidates(&rewards);
            let action = Self::break_tie(snapshot, agent, &candidates, rng);
            tracing::debug!(agent, ?candidates, ?action, "Committed move");
            committed[agent] = Some(action);
        }

        committed
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect()
    }

    /// Picks among equally rewarded moves: the one leaving the shortest path to the
    /// agent's target, at random among equals. Without a target, any of them.
    pub fn break_tie<R: Rng + ?Sized>(
        snapshot: &GridSnapshot,
        agent: usize,
        candidates: &[Action],
        rng: &mut R,
    ) -> Action {
        let (Some(target), Some(pos)) = (snapshot.target(agent), snapshot.agent_position(agent))
        else {
            return candidates.choose(rng).copied().unwrap_or_default();
        };

        let occupancy = preprocess(&snapshot.map, target);
        let lengths: Vec<usize> = candidates
            .iter()
            .map(|action| remaining_path_length(&occupancy, pos.apply(*action), target))
            .collect();
        let Some(&shortest) = lengths.iter().min() else {
            return Action::Stay;
        };

        let shortest_moves: Vec<Action> = candidates
            .iter()
            .zip(&lengths)
            .filter(|&(_, &length)| length == shortest)
            .map(|(action, _)| *action)
            .collect();
        shortest_moves.choose(rng).copied().unwrap_or_default()
    }
}

/// Every move whose reward is within epsilon of the best one, in action-code order.
pub fn best_candidates(rewards: &CandidateRewards) -> Vec<Action> {
    let best = rewards.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    Action::ALL
        .into_iter()
        .filter(|action| (rewards[action.code() as usize] - best).abs() < REWARD_COMPARISON_EPSILON)
        .collect()
}

fn remaining_path_length(occupancy: &OccupancyMap, from: Position, target: Position) -> usize {
    if !occupancy.is_walkable(&from) {
        return UNREACHABLE_PATH_LENGTH;
    }
    match AStar::find_path(occupancy, from, target) {
        PathResult::Unreachable => UNREACHABLE_PATH_LENGTH,
        result => result.len(),
    }
}
