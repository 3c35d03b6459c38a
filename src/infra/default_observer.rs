use tracing::{Level, info};

use crate::infra::GameObserver;
use crate::planners::lookahead::{Episode, RunStats, StepResolution};
use crate::state::GridSnapshot;

pub struct DefaultObserver;

impl GameObserver for DefaultObserver {
    fn on_episode_start(&mut self, episode: usize, snapshot: &GridSnapshot) {
        info!("Episode {} started", episode);
        info!("- map size: {}x{}", snapshot.map.width, snapshot.map.height);
        info!("- agents: {}", snapshot.num_agents());
    }

    fn on_step_committed(&mut self, before: &GridSnapshot, resolution: &StepResolution) {
        tracing::debug!(
            "tick: {}, actions: {:?}, reward: {}, retries: {}{}",
            before.tick,
            resolution.actions,
            resolution.outcome.reward,
            resolution.attempts,
            if resolution.forced { " [forced]" } else { "" },
        );

        if tracing::enabled!(Level::TRACE) {
            tracing::trace!("\n{}", resolution.outcome.snapshot.map.draw_ascii_map());
        }
    }

    fn on_episode_finished(&mut self, episode: &Episode, stats: &RunStats) {
        info!(
            "Episode {} finished after {} steps with reward {} ({})",
            episode.index,
            episode.steps,
            episode.total_reward,
            if episode.accepted { "accepted" } else { "rejected" },
        );
        info!(
            "- retries: {}, forced commits: {}",
            episode.retries, episode.forced_commits
        );
        info!(
            "Accepted {}/{} episodes ({:.1}%)",
            stats.accepted,
            stats.episodes,
            stats.success_rate() * 100.0
        );
    }
}
