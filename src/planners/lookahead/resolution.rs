use std::fmt;

use rand::Rng;
use rand::seq::SliceRandom;

use super::LookaheadConfig;
use super::sequencer::TurnSequencer;
use crate::infra::{Action, Simulator, StepOutcome};
use crate::state::GridSnapshot;

/// What changes between two attempts at the same time-step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryStrategy {
    /// Visit the agents in a new random order.
    #[default]
    ShuffleOrder,
    /// Keep the order; undecided agents assume the rejected joint action.
    CarryForward,
}

impl RetryStrategy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "shuffle" => Some(RetryStrategy::ShuffleOrder),
            "carry" => Some(RetryStrategy::CarryForward),
            _ => None,
        }
    }
}

impl fmt::Display for RetryStrategy {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RetryStrategy::ShuffleOrder => write!(formatter, "shuffle"),
            RetryStrategy::CarryForward => write!(formatter, "carry"),
        }
    }
}

/// Where a time-step is in the attempt protocol.
#[derive(Debug, Clone)]
pub enum AttemptPhase {
    /// Decide a joint action and perform it
    Attempt,
    /// The performed joint action collided and will be reverted
    Aborted(Vec<Action>),
    /// Final; carries the committed step
    Committed(StepResolution),
}

/// Progress through one time-step.
#[derive(Debug, Clone)]
pub struct AttemptState {
    /// Last known-good state; every attempt starts from here
    pub snapshot: GridSnapshot,
    pub attempts: usize,
    pub agent_order: Vec<usize>,
    /// Joint action of the last rejected attempt
    pub rejected: Option<Vec<Action>>,
    pub phase: AttemptPhase,
}

impl AttemptState {
    pub fn new(snapshot: GridSnapshot) -> Self {
        let agent_order = (0..snapshot.num_agents()).collect();
        Self {
            snapshot,
            attempts: 0,
            agent_order,
            rejected: None,
            phase: AttemptPhase::Attempt,
        }
    }

    /// Counts the rejected `actions` and prepares the next attempt.
    pub fn retry<R: Rng + ?Sized>(&mut self, actions: Vec<Action>, strategy: RetryStrategy, rng: &mut R) {
        self.attempts += 1;
        match strategy {
            RetryStrategy::ShuffleOrder => self.agent_order.shuffle(rng),
            RetryStrategy::CarryForward => self.rejected = Some(actions),
        }
        self.phase = AttemptPhase::Attempt;
    }
}

/// Result of resolving one time-step.
#[derive(Debug, Clone)]
pub struct StepResolution {
    pub actions: Vec<Action>,
    pub outcome: StepOutcome,
    /// Attempts reverted before the commit
    pub attempts: usize,
    /// Committed while still colliding because the attempt bound was hit
    pub forced: bool,
}

/// Commits one joint action per time-step, reverting and retrying steps whose
/// reward says agents got in each other's way.
#[derive(Debug, Clone)]
pub struct CollisionResolver {
    sequencer: TurnSequencer,
    config: LookaheadConfig,
}

impl CollisionResolver {
    pub fn new(config: LookaheadConfig) -> Self {
        Self {
            sequencer: TurnSequencer::from_config(&config),
            config,
        }
    }

    /// Decides and performs the real step from `snapshot`. The simulator is left in
    /// the committed post-step state.
    #[tracing::instrument(level = "debug", skip_all, fields(tick = snapshot.tick))]
    pub fn resolve_step<S, R>(&self, sim: &mut S, snapshot: &GridSnapshot, rng: &mut R) -> StepResolution
    where
        S: Simulator + Clone + Send,
        R: Rng + ?Sized,
    {
        let mut state = AttemptState::new(snapshot.clone());

        loop {
            let phase = std::mem::replace(&mut state.phase, AttemptPhase::Attempt);
            state.phase = match phase {
                AttemptPhase::Attempt => self.attempt(sim, &state, rng),
                AttemptPhase::Aborted(actions) => {
                    sim.reset(Some(&state.snapshot));
                    state.retry(actions, self.config.retry_strategy, rng);
                    continue;
                }
                AttemptPhase::Committed(resolution) => return resolution,
            };
        }
    }

    /// Decides and performs one joint action from the state's snapshot.
    fn attempt<S, R>(&self, sim: &mut S, state: &AttemptState, rng: &mut R) -> AttemptPhase
    where
        S: Simulator + Clone + Send,
        R: Rng + ?Sized,
    {
        let actions = self.sequencer.decide_step(
            sim,
            &state.snapshot,
            &state.agent_order,
            state.rejected.as_deref(),
            rng,
        );

        sim.reset(Some(&state.snapshot));
        let outcome = sim.step(&actions);
        let colliding = outcome.reward < self.config.collision_threshold(state.snapshot.num_agents());

        if colliding && state.attempts < self.config.max_attempts {
            tracing::debug!(
                attempt = state.attempts + 1,
                reward = outcome.reward,
                ?actions,
                strategy = %self.config.retry_strategy,
                "Collision detected, retrying step"
            );
            return AttemptPhase::Aborted(actions);
        }

        if colliding {
            tracing::warn!(
                attempts = state.attempts,
                reward = outcome.reward,
                ?actions,
                "Attempt bound reached, committing colliding step"
            );
        }

        AttemptPhase::Committed(StepResolution {
            actions,
            outcome,
            attempts: state.attempts,
            forced: colliding,
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::infra::Position;
    use crate::state::{Map, Warehouse, WarehouseLayout, WarehouseRewards};

    /// Both agents' shortest paths run through (2, 2).
    fn crossing() -> (Warehouse, GridSnapshot) {
        let snapshot = GridSnapshot::new(
            Map::parse("######\n#.1..#\n#0..$#\n#.$.D#\n######").unwrap(),
            vec![Some(Position::new(4, 2)), Some(Position::new(2, 3))],
            0,
        );
        let sim = Warehouse::from_snapshot(&snapshot, WarehouseRewards::default(), 100);
        (sim, snapshot)
    }

    fn config(horizon: usize, max_attempts: usize, retry_strategy: RetryStrategy) -> LookaheadConfig {
        LookaheadConfig {
            horizon,
            max_attempts,
            retry_strategy,
            ..LookaheadConfig::default()
        }
    }

    #[test]
    fn test_retry_strategy_parse() {
        assert_eq!(RetryStrategy::parse("shuffle"), Some(RetryStrategy::ShuffleOrder));
        assert_eq!(RetryStrategy::parse(" Carry "), Some(RetryStrategy::CarryForward));
        assert_eq!(RetryStrategy::parse("random"), None);
        assert_eq!(RetryStrategy::CarryForward.to_string(), "carry");
    }

    #[test]
    fn test_clean_step_commits_first_attempt() {
        let snapshot = GridSnapshot::new(
            Map::parse("######\n#0$.D#\n######").unwrap(),
            vec![Some(Position::new(2, 1))],
            0,
        );
        let mut sim = Warehouse::from_snapshot(&snapshot, WarehouseRewards::default(), 100);
        let resolver = CollisionResolver::new(config(3, 5, RetryStrategy::ShuffleOrder));
        let mut rng = StdRng::seed_from_u64(0);

        let resolution = resolver.resolve_step(&mut sim, &snapshot, &mut rng);
        assert_eq!(resolution.actions, vec![Action::Right]);
        assert_eq!(resolution.attempts, 0);
        assert!(!resolution.forced);
        assert_eq!(resolution.outcome.reward, 11.0);
        assert_eq!(sim.observe(), resolution.outcome.snapshot);
    }

    #[test]
    fn test_greedy_collision_is_retried_until_bound() {
        for strategy in [RetryStrategy::ShuffleOrder, RetryStrategy::CarryForward] {
            let (mut sim, snapshot) = crossing();
            let resolver = CollisionResolver::new(config(0, 3, strategy));
            let mut rng = StdRng::seed_from_u64(0);

            let resolution = resolver.resolve_step(&mut sim, &snapshot, &mut rng);
            assert_eq!(resolution.actions, vec![Action::Right, Action::Down]);
            assert_eq!(resolution.attempts, 3, "{}", strategy);
            assert!(resolution.forced);
            assert_eq!(resolution.outcome.info.collisions, 1);
            assert_eq!(resolution.outcome.reward, -2.0 - 2.0 * 200.0);
        }
    }

    #[test]
    fn test_collision_among_many_agents_is_retried() {
        // agents 0 and 1 both step into (2, 1); the other six sit on their targets
        let mut targets = vec![Some(Position::new(2, 1)); 2];
        targets.extend((1..=6).map(|x| Some(Position::new(x, 2))));
        let snapshot = GridSnapshot::new(
            Map::parse("#######\n#0.1..#\n#234567\n#######").unwrap(),
            targets,
            0,
        );
        for strategy in [RetryStrategy::ShuffleOrder, RetryStrategy::CarryForward] {
            let mut sim = Warehouse::from_snapshot(&snapshot, WarehouseRewards::default(), 100);
            let resolver = CollisionResolver::new(config(0, 5, strategy));
            let mut rng = StdRng::seed_from_u64(7);

            let resolution = resolver.resolve_step(&mut sim, &snapshot, &mut rng);
            assert_eq!(resolution.actions[..2], [Action::Right, Action::Left]);
            assert!(resolution.actions[2..].iter().all(|a| *a == Action::Stay));
            assert_eq!(resolution.outcome.info.collisions, 1);
            assert_eq!(resolution.attempts, 5, "{}", strategy);
            assert!(resolution.forced);
        }
    }

    #[test]
    fn test_retry_prepares_next_attempt() {
        let (_, snapshot) = crossing();
        let mut rng = StdRng::seed_from_u64(0);
        let rejected = vec![Action::Right, Action::Down];

        let mut state = AttemptState::new(snapshot.clone());
        state.phase = AttemptPhase::Aborted(rejected.clone());
        state.retry(rejected.clone(), RetryStrategy::CarryForward, &mut rng);
        assert!(matches!(state.phase, AttemptPhase::Attempt));
        assert_eq!(state.attempts, 1);
        assert_eq!(state.rejected, Some(rejected.clone()));
        assert_eq!(state.agent_order, vec![0, 1]);

        let mut state = AttemptState::new(snapshot);
        state.retry(rejected, RetryStrategy::ShuffleOrder, &mut rng);
        assert_eq!(state.attempts, 1);
        assert_eq!(state.rejected, None);
        let mut order = state.agent_order.clone();
        order.sort();
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn test_zero_attempts_commits_immediately() {
        let (mut sim, snapshot) = crossing();
        let resolver = CollisionResolver::new(config(0, 0, RetryStrategy::ShuffleOrder));
        let mut rng = StdRng::seed_from_u64(0);

        let resolution = resolver.resolve_step(&mut sim, &snapshot, &mut rng);
        assert_eq!(resolution.attempts, 0);
        assert!(resolution.forced);
    }

    #[test]
    fn test_lookahead_avoids_the_crossing() {
        let (mut sim, snapshot) = crossing();
        let resolver = CollisionResolver::new(config(1, 3, RetryStrategy::ShuffleOrder));
        let mut rng = StdRng::seed_from_u64(0);

        let resolution = resolver.resolve_step(&mut sim, &snapshot, &mut rng);
        assert_eq!(resolution.attempts, 0);
        assert!(!resolution.forced);
        assert_eq!(resolution.outcome.info.collisions, 0);
    }

    #[test]
    fn test_attempts_never_exceed_bound() {
        let layout = WarehouseLayout {
            agents: 6,
            ..WarehouseLayout::default()
        };
        for (seed, strategy) in [
            (1, RetryStrategy::ShuffleOrder),
            (2, RetryStrategy::CarryForward),
            (3, RetryStrategy::ShuffleOrder),
        ] {
            let mut sim = Warehouse::new(layout.clone(), WarehouseRewards::default(), Some(seed)).unwrap();
            let resolver = CollisionResolver::new(config(2, 4, strategy));
            let mut rng = StdRng::seed_from_u64(seed);
            let mut snapshot = sim.reset(None);

            for _ in 0..10 {
                let resolution = resolver.resolve_step(&mut sim, &snapshot, &mut rng);
                assert!(resolution.attempts <= 4);
                assert_eq!(resolution.actions.len(), 6);
                assert_eq!(resolution.forced, resolution.outcome.info.collisions > 0);
                if resolution.outcome.done {
                    break;
                }
                snapshot = resolution.outcome.snapshot;
            }
        }
    }
}
