//! Matching rounds: one detached attempt per AVAILABLE driver request.
//!
//! Attempts in a round run concurrently and may contend for the same
//! passengers. The conditional status writes in the committer decide every
//! such race, so the round itself needs no locking.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, info_span, warn, Instrument};

use crate::error::StoreError;
use crate::matching::MatchOrchestrator;
use crate::model::Role;

pub struct MatchingRound {
    orchestrator: Arc<MatchOrchestrator>,
    rounds_started: AtomicU64,
}

/// Tasks spawned by one round. Dropping it leaves them running.
#[derive(Debug)]
pub struct RoundHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl RoundHandle {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every attempt of the round to finish.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(failure) = task.await {
                error!(error = %failure, "matching attempt task panicked");
            }
        }
    }
}

impl MatchingRound {
    pub fn new(orchestrator: Arc<MatchOrchestrator>) -> Self {
        Self {
            orchestrator,
            rounds_started: AtomicU64::new(0),
        }
    }

    pub fn rounds_started(&self) -> u64 {
        self.rounds_started.load(Ordering::Relaxed)
    }

    /// Spawn one attempt per AVAILABLE driver request and return without waiting.
    pub async fn run_once(&self) -> Result<RoundHandle, StoreError> {
        let round = self.rounds_started.fetch_add(1, Ordering::Relaxed) + 1;
        let span = info_span!("matching_round", round);
        let drivers = self
            .orchestrator
            .requests()
            .find_available(Role::Driver)
            .instrument(span.clone())
            .await?;
        span.in_scope(|| info!(drivers = drivers.len(), "starting matching round"));

        let tasks = drivers
            .into_iter()
            .map(|driver| {
                let orchestrator = Arc::clone(&self.orchestrator);
                tokio::spawn(
                    async move { orchestrator.match_and_notify(&driver).await }
                        .instrument(span.clone()),
                )
            })
            .collect();
        Ok(RoundHandle { tasks })
    }

    /// Start a round every `interval` until `shutdown` resolves.
    ///
    /// The first round starts immediately. Rounds are not awaited, so a slow
    /// round may still be running when the next one starts.
    pub async fn run_periodic<F>(&self, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("matching loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(failure) = self.run_once().await {
                        warn!(error = %failure, "could not start matching round");
                    }
                }
            }
        }
    }
}
