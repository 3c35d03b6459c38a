use crate::infra::Action;
use crate::state::GridSnapshot;

/// Additional information from a step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepInfo {
    /// Tick after the step
    pub tick: u32,
    /// Colliding agent pairs detected this step
    pub collisions: usize,
    /// Boxes picked up this step
    pub pickups: usize,
    /// Boxes delivered this step
    pub deliveries: usize,
    /// Every task finished
    pub completed: bool,
    /// Hit the step limit before finishing
    pub truncated: bool,
}

/// Step result from the simulator
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub snapshot: GridSnapshot,
    pub reward: f32,
    pub done: bool,
    pub info: StepInfo,
}

/// Grid world the planner drives.
///
/// Implementations must replay deterministically: after `reset(Some(s))` the same
/// sequence of `step` calls must always produce the same outcomes.
pub trait Simulator {
    fn num_agents(&self) -> usize;

    /// Starts a fresh episode, or restores the world to `snapshot` when given.
    fn reset(&mut self, snapshot: Option<&GridSnapshot>) -> GridSnapshot;

    /// Advances one tick with one action per agent.
    fn step(&mut self, actions: &[Action]) -> StepOutcome;

    /// Optional human-readable drawing of the current state.
    fn render(&self) -> Option<String> {
        None
    }
}
