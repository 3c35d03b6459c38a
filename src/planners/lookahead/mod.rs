//! Lookahead planner: picks every agent's move by rolling the world forward.
//!
//! Each agent in turn scores its five candidate moves by simulating a short
//! horizon in which everybody else follows its greedy shortest path. Moves that
//! collide in the real world are reverted and retried.
//!
//! # Architecture
//!
//! ```text
//! GridSnapshot
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CollisionResolver                                          │
//! │  - Owns the attempt state (order, carried-forward actions)  │
//! │  - Reverts and retries steps that score below threshold     │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  TurnSequencer                                              │
//! │  - Visits agents in order, committing one move at a time    │
//! │  - Breaks reward ties by remaining path length              │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  LookaheadEvaluator                                         │
//! │  - Restores the simulator, rolls out each candidate         │
//! │  - Other agents follow GreedyPolicy (A* on occupancy map)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod evaluator;
mod game;
mod policy;
mod resolution;
mod sequencer;

pub use evaluator::{CandidateRewards, LookaheadEvaluator};
pub use game::{Episode, EpisodeRunner, RunStats, Sample};
pub use policy::GreedyPolicy;
pub use resolution::{AttemptPhase, AttemptState, CollisionResolver, RetryStrategy, StepResolution};
pub use sequencer::{TurnSequencer, UNREACHABLE_PATH_LENGTH};

/// Planner tuning, shared by every lookahead component.
#[derive(Debug, Clone, PartialEq)]
pub struct LookaheadConfig {
    /// Rollout length per candidate move
    pub horizon: usize,
    /// Roll out the five candidates on independent simulator replicas
    pub parallel_rollouts: bool,
    /// Reverted attempts allowed per time-step
    pub max_attempts: usize,
    /// What changes between two attempts of the same time-step
    pub retry_strategy: RetryStrategy,
    /// A step is rejected when its reward is below `-(collision_factor * agents)`.
    /// Must exceed the worst per-agent cost of a collision-free step.
    pub collision_factor: f32,
}

impl Default for LookaheadConfig {
    fn default() -> Self {
        Self {
            horizon: 20,
            parallel_rollouts: false,
            max_attempts: 80,
            retry_strategy: RetryStrategy::ShuffleOrder,
            collision_factor: 4.0,
        }
    }
}

impl LookaheadConfig {
    /// Reward below which a real step counts as colliding.
    pub fn collision_threshold(&self, num_agents: usize) -> f32 {
        -(self.collision_factor * num_agents as f32)
    }
}
