use crate::planners::lookahead::{Episode, RunStats, StepResolution};
use crate::state::GridSnapshot;

/// Trait for observing episode events during generation
pub trait GameObserver {
    /// Called after the simulator produced the opening state of an episode
    fn on_episode_start(&mut self, episode: usize, snapshot: &GridSnapshot);

    /// Called once per committed time-step with the state the step started from
    fn on_step_committed(&mut self, before: &GridSnapshot, resolution: &StepResolution);

    /// Called when the episode is done and judged
    fn on_episode_finished(&mut self, episode: &Episode, stats: &RunStats);
}
