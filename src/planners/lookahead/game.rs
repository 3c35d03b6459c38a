use rand::SeedableRng;
use rand::rngs::StdRng;

use super::LookaheadConfig;
use super::resolution::CollisionResolver;
use crate::infra::{Action, GameObserver, Simulator};
use crate::state::GridSnapshot;

/// One decided time-step: the state it started from and the joint action taken.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub snapshot: GridSnapshot,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Default)]
pub struct Episode {
    pub index: usize,
    pub samples: Vec<Sample>,
    pub total_reward: f32,
    pub steps: usize,
    /// Every task finished before the step limit
    pub completed: bool,
    pub accepted: bool,
    pub retries: usize,
    pub forced_commits: usize,
}

// Statistics persistent across episodes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub episodes: usize,
    pub accepted: usize,
    pub retries: usize,
    pub forced_commits: usize,
}

impl RunStats {
    pub fn success_rate(&self) -> f32 {
        if self.episodes == 0 {
            0.0
        } else {
            self.accepted as f32 / self.episodes as f32
        }
    }
}

/// Plays whole episodes with the lookahead planner.
pub struct EpisodeRunner<S> {
    sim: S,
    resolver: CollisionResolver,
    observer: Box<dyn GameObserver + Send>,
    rng: StdRng,
    min_reward: Option<f32>,
    stats: RunStats,
}

impl<S: Simulator + Clone + Send> EpisodeRunner<S> {
    pub fn new(
        sim: S,
        config: LookaheadConfig,
        observer: impl GameObserver + Send + 'static,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            sim,
            resolver: CollisionResolver::new(config),
            observer: Box::new(observer),
            rng,
            min_reward: None,
            stats: RunStats::default(),
        }
    }

    /// Episodes scoring below `min_reward` are rejected even when completed.
    pub fn with_min_reward(mut self, min_reward: Option<f32>) -> Self {
        self.min_reward = min_reward;
        self
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Plays a freshly generated episode.
    pub fn run_episode(&mut self) -> Episode {
        self.run_from(None)
    }

    /// Plays an episode starting at `start`, or at a fresh level when `None`.
    #[tracing::instrument(skip_all, fields(episode = self.stats.episodes))]
    pub fn run_from(&mut self, start: Option<&GridSnapshot>) -> Episode {
        let mut snapshot = self.sim.reset(start);
        let mut episode = Episode {
            index: self.stats.episodes,
            ..Episode::default()
        };
        self.observer.on_episode_start(episode.index, &snapshot);

        loop {
            let resolution = self
                .resolver
                .resolve_step(&mut self.sim, &snapshot, &mut self.rng);
            self.observer.on_step_committed(&snapshot, &resolution);

            episode.total_reward += resolution.outcome.reward;
            episode.steps += 1;
            episode.retries += resolution.attempts;
            if resolution.forced {
                episode.forced_commits += 1;
            }

            let done = resolution.outcome.done;
            episode.completed = resolution.outcome.info.completed;
            let next = resolution.outcome.snapshot;
            episode.samples.push(Sample {
                snapshot: std::mem::replace(&mut snapshot, next),
                actions: resolution.actions,
            });

            if done {
                break;
            }
        }

        episode.accepted = self.is_acceptable(&episode);

        self.stats.episodes += 1;
        self.stats.retries += episode.retries;
        self.stats.forced_commits += episode.forced_commits;
        if episode.accepted {
            self.stats.accepted += 1;
        }

        self.observer.on_episode_finished(&episode, &self.stats);
        episode
    }

    fn is_acceptable(&self, episode: &Episode) -> bool {
        episode.completed
            && self
                .min_reward
                .is_none_or(|min_reward| episode.total_reward >= min_reward)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::infra::Position;
    use crate::planners::lookahead::StepResolution;
    use crate::state::{Map, Warehouse, WarehouseLayout, WarehouseRewards};

    #[derive(Default)]
    struct Counts {
        starts: usize,
        steps: usize,
        finished: usize,
    }

    struct CountingObserver(Arc<Mutex<Counts>>);

    impl GameObserver for CountingObserver {
        fn on_episode_start(&mut self, _episode: usize, _snapshot: &GridSnapshot) {
            self.0.lock().unwrap().starts += 1;
        }

        fn on_step_committed(&mut self, _before: &GridSnapshot, _resolution: &StepResolution) {
            self.0.lock().unwrap().steps += 1;
        }

        fn on_episode_finished(&mut self, _episode: &Episode, _stats: &RunStats) {
            self.0.lock().unwrap().finished += 1;
        }
    }

    fn corridor() -> GridSnapshot {
        GridSnapshot::new(
            Map::parse("######\n#0$.D#\n######").unwrap(),
            vec![Some(Position::new(2, 1))],
            0,
        )
    }

    fn config(horizon: usize) -> LookaheadConfig {
        LookaheadConfig {
            horizon,
            max_attempts: 3,
            ..LookaheadConfig::default()
        }
    }

    #[test]
    fn test_corridor_episode_completes() {
        let start = corridor();
        let sim = Warehouse::from_snapshot(&start, WarehouseRewards::default(), 50);
        let counts = Arc::new(Mutex::new(Counts::default()));
        let mut runner = EpisodeRunner::new(sim, config(3), CountingObserver(counts.clone()), Some(1));

        let episode = runner.run_from(Some(&start));
        assert!(episode.completed);
        assert!(episode.accepted);
        assert_eq!(episode.steps, 3);
        assert_eq!(episode.total_reward, 11.0 + 1.0 + 101.0);
        assert_eq!(episode.samples.len(), 3);
        assert_eq!(episode.samples[0].snapshot, start);
        assert!(episode.samples.iter().all(|s| s.actions == vec![Action::Right]));
        assert_eq!(episode.samples[2].snapshot.tick, 2);

        let counts = counts.lock().unwrap();
        assert_eq!((counts.starts, counts.steps, counts.finished), (1, 3, 1));
        assert_eq!(runner.stats().accepted, 1);
        assert_eq!(runner.stats().success_rate(), 1.0);
    }

    #[test]
    fn test_min_reward_rejects_episode() {
        let start = corridor();
        let sim = Warehouse::from_snapshot(&start, WarehouseRewards::default(), 50);
        let counts = Arc::new(Mutex::new(Counts::default()));
        let mut runner = EpisodeRunner::new(sim, config(3), CountingObserver(counts), Some(1))
            .with_min_reward(Some(500.0));

        let episode = runner.run_from(Some(&start));
        assert!(episode.completed);
        assert!(!episode.accepted);
        assert_eq!(runner.stats().episodes, 1);
        assert_eq!(runner.stats().accepted, 0);
    }

    #[test]
    fn test_truncated_episode_is_rejected() {
        // the agent is walled off from its box
        let start = GridSnapshot::new(
            Map::parse("######\n#0#$D#\n######").unwrap(),
            vec![Some(Position::new(3, 1))],
            0,
        );
        let sim = Warehouse::from_snapshot(&start, WarehouseRewards::default(), 4);
        let counts = Arc::new(Mutex::new(Counts::default()));
        let mut runner = EpisodeRunner::new(sim, config(2), CountingObserver(counts), Some(1));

        let episode = runner.run_from(Some(&start));
        assert!(!episode.completed);
        assert!(!episode.accepted);
        assert_eq!(episode.steps, 4);
        assert_eq!(runner.stats().success_rate(), 0.0);
    }

    #[test]
    fn test_default_settings_complete_episodes() {
        let layout = WarehouseLayout::default();
        let sim = Warehouse::new(layout.clone(), WarehouseRewards::default(), Some(1)).unwrap();
        let counts = Arc::new(Mutex::new(Counts::default()));
        let mut runner =
            EpisodeRunner::new(sim, LookaheadConfig::default(), CountingObserver(counts), Some(1));

        for _ in 0..3 {
            let episode = runner.run_episode();
            if episode.accepted {
                assert!(episode.completed);
                assert!(episode.steps < layout.max_steps as usize);
            }
        }
        assert!(runner.stats().accepted >= 1, "{:?}", runner.stats());
    }

    #[test]
    fn test_generated_episodes_are_recorded() {
        let layout = WarehouseLayout {
            agents: 2,
            blocks: 1,
            max_steps: 30,
            ..WarehouseLayout::default()
        };
        let sim = Warehouse::new(layout, WarehouseRewards::default(), Some(4)).unwrap();
        let counts = Arc::new(Mutex::new(Counts::default()));
        let mut runner = EpisodeRunner::new(sim, config(4), CountingObserver(counts.clone()), Some(4));

        for index in 0..2 {
            let episode = runner.run_episode();
            assert_eq!(episode.index, index);
            assert!(episode.steps <= 30);
            assert_eq!(episode.samples.len(), episode.steps);
            for (tick, sample) in episode.samples.iter().enumerate() {
                assert_eq!(sample.snapshot.tick as usize, tick);
                assert_eq!(sample.actions.len(), 2);
            }
        }

        assert_eq!(runner.stats().episodes, 2);
        assert_eq!(counts.lock().unwrap().finished, 2);
    }
}
