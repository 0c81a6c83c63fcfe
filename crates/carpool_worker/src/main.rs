mod fixture;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use carpool_core::clock::{Clock, SystemClock};
use carpool_core::config::MatchingConfig;
use carpool_core::matching::{Collaborators, MatchOrchestrator};
use carpool_core::notify::LogNotifier;
use carpool_core::routing::build_distance_provider;
use carpool_core::runner::MatchingRound;
use carpool_core::store::InMemoryStore;
use carpool_core::telemetry::{init_tracing, LogFormat};

use crate::fixture::Fixture;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(
    name = "carpool-worker",
    about = "Periodically pairs available drivers with passengers"
)]
struct Cli {
    /// JSON matching config; defaults apply to missing fields
    #[arg(long, env = "CARPOOL_CONFIG")]
    config: Option<PathBuf>,
    /// JSON file with users and ride requests to seed the in-memory store
    #[arg(long)]
    fixture: Option<PathBuf>,
    /// Run a single round, wait for it, then exit
    #[arg(long)]
    once: bool,
    /// Log output format (pretty or json)
    #[arg(long, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_tracing(cli.log_format) {
        eprintln!("failed to initialize logging: {err}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "worker stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    let config = match &cli.config {
        Some(path) => MatchingConfig::from_json_file(path)?,
        None => MatchingConfig::default(),
    };
    info!(?config, "configuration loaded");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(InMemoryStore::new());
    if let Some(path) = &cli.fixture {
        Fixture::load(path)?.seed(&store, clock.now())?;
    }

    let routing = build_distance_provider(&config.routing, config.route_cache_capacity())?;
    let collaborators = Collaborators {
        requests: store.clone(),
        rides: store.clone(),
        users: store.clone(),
        notifier: Arc::new(LogNotifier),
        routing,
        clock,
    };
    let interval = config.round_interval();
    let round = MatchingRound::new(Arc::new(MatchOrchestrator::new(collaborators, config)));

    if cli.once {
        round.run_once().await?.join().await;
        info!(rides = store.rides().len(), "single round finished");
        return Ok(());
    }

    info!(interval_secs = interval.as_secs(), "matching loop started");
    round.run_periodic(interval, shutdown_signal()).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for ctrl-c, running until killed");
        std::future::pending::<()>().await;
    }
}
