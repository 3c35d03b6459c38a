use dotenv::dotenv;
use rollbot::infra::{DatasetWriter, DefaultObserver, Settings, run_writer};
use rollbot::planners::lookahead::EpisodeRunner;
use rollbot::state::Warehouse;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rollbot=info,warn"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    let settings = Settings::from_env()?;
    tracing::info!(
        "Warehouse: {} agents, {}x{} box clusters, {} steps max",
        settings.layout.agents,
        settings.layout.blocks,
        settings.layout.blocks,
        settings.layout.max_steps
    );
    tracing::info!(
        "Lookahead: horizon {}, {} attempts ({}), parallel rollouts: {}",
        settings.lookahead.horizon,
        settings.lookahead.max_attempts,
        settings.lookahead.retry_strategy,
        settings.lookahead.parallel_rollouts
    );

    let warehouse = Warehouse::new(settings.layout.clone(), settings.rewards.clone(), settings.seed)?;
    let writer = DatasetWriter::new(&settings.dataset_folder, settings.flush_interval)?;
    let (tx, rx) = mpsc::channel(16);
    let writer_task = tokio::spawn(run_writer(writer, rx));

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, stopping after the current episode");
                stop.store(true, Ordering::Relaxed);
            }
        });
    }

    let mut runner = EpisodeRunner::new(
        warehouse,
        settings.lookahead.clone(),
        DefaultObserver,
        settings.seed.map(|seed| seed.wrapping_add(1)),
    )
    .with_min_reward(settings.min_reward);
    let episodes = settings.episodes;

    let generator = tokio::task::spawn_blocking(move || {
        while !stop.load(Ordering::Relaxed)
            && episodes.is_none_or(|limit| runner.stats().episodes < limit)
        {
            let episode = runner.run_episode();
            if episode.accepted && tx.blocking_send(episode).is_err() {
                tracing::warn!("Dataset writer stopped, ending generation");
                break;
            }
        }
        runner.stats().clone()
    });

    let stats = generator.await?;
    let files = writer_task.await??;

    tracing::info!(
        "Done: {}/{} episodes accepted, {} retries, {} forced commits, {} dataset files",
        stats.accepted,
        stats.episodes,
        stats.retries,
        stats.forced_commits,
        files
    );

    Ok(())
}
