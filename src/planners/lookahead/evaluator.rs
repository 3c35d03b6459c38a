use std::collections::VecDeque;

use rayon::prelude::*;

use super::LookaheadConfig;
use super::policy::GreedyPolicy;
use crate::infra::{Action, Position, Simulator};
use crate::state::GridSnapshot;

/// Simulated reward per candidate move, indexed by action code.
pub type CandidateRewards = [f32; Action::COUNT];

/// Scores an agent's candidate moves with short rollouts.
#[derive(Debug, Clone, Copy)]
pub struct LookaheadEvaluator {
    horizon: usize,
    parallel: bool,
}

/// Greedy plan an agent follows during one rollout.
#[derive(Default, Clone)]
struct RolloutPlan {
    /// Target the plan was computed for; `None` until the first plan.
    planned_for: Option<Option<Position>>,
    actions: VecDeque<Action>,
}

impl LookaheadEvaluator {
    pub fn new(horizon: usize) -> Self {
        Self {
            horizon,
            parallel: false,
        }
    }

    pub fn from_config(config: &LookaheadConfig) -> Self {
        Self::new(config.horizon).with_parallel(config.parallel_rollouts)
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Rolls out every candidate move of `agent` from `snapshot`.
    ///
    /// Other agents use their `committed` action when decided, otherwise the
    /// matching `seed` action, otherwise their greedy first move. The shared
    /// simulator is left restored to `snapshot`.
    pub fn evaluate<S>(
        &self,
        sim: &mut S,
        snapshot: &GridSnapshot,
        agent: usize,
        committed: &[Option<Action>],
        seed: Option<&[Action]>,
    ) -> CandidateRewards
    where
        S: Simulator + Clone + Send,
    {
        let mut rewards = [0.0; Action::COUNT];
        if self.horizon == 0 {
            return rewards;
        }

        let base = Self::joint_actions(snapshot, agent, committed, seed);
        let with_candidate = |candidate: Action| {
            let mut actions = base.clone();
            if let Some(slot) = actions.get_mut(agent) {
                *slot = candidate;
            }
            actions
        };

        if self.parallel {
            let replicas: Vec<S> = Action::ALL.iter().map(|_| sim.clone()).collect();
            let sums: Vec<f32> = replicas
                .into_par_iter()
                .enumerate()
                .map(|(code, mut replica)| {
                    self.rollout(&mut replica, snapshot, with_candidate(Action::ALL[code]))
                })
                .collect();
            rewards.copy_from_slice(&sums);
        } else {
            for candidate in Action::ALL {
                rewards[candidate.code() as usize] =
                    self.rollout(sim, snapshot, with_candidate(candidate));
            }
            sim.reset(Some(snapshot));
        }

        tracing::trace!(agent, ?rewards, "Candidate rewards");
        rewards
    }

    /// Opening joint action with `agent`'s slot left at `Stay`.
    fn joint_actions(
        snapshot: &GridSnapshot,
        agent: usize,
        committed: &[Option<Action>],
        seed: Option<&[Action]>,
    ) -> Vec<Action> {
        (0..snapshot.num_agents())
            .map(|other| {
                if other == agent {
                    return Action::Stay;
                }
                committed
                    .get(other)
                    .copied()
                    .flatten()
                    .or_else(|| seed.and_then(|seed| seed.get(other).copied()))
                    .unwrap_or_else(|| GreedyPolicy::decide(snapshot, other))
            })
            .collect()
    }

    fn rollout<S: Simulator>(&self, sim: &mut S, snapshot: &GridSnapshot, mut actions: Vec<Action>) -> f32 {
        sim.reset(Some(snapshot));
        let mut plans = vec![RolloutPlan::default(); actions.len()];
        let mut total = 0.0;

        for _ in 0..self.horizon {
            let outcome = sim.step(&actions);
            total += outcome.reward;
            if outcome.done {
                break;
            }

            for (agent, plan) in plans.iter_mut().enumerate() {
                let target = outcome.snapshot.target(agent);
                if plan.planned_for != Some(target) || plan.actions.is_empty() {
                    plan.actions = GreedyPolicy::decide_sequence(&outcome.snapshot, agent).into();
                    plan.planned_for = Some(target);
                }
                actions[agent] = plan.actions.pop_front().unwrap_or_default();
            }
        }

        total
    }
}
