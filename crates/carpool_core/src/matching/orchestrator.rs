//! One matching attempt for one driver, end to end.

use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn, Instrument};

use super::committer::{CommitOutcome, MatchCommitter};
use super::ranker::Ranker;
use super::selector::CandidateSelector;
use crate::clock::Clock;
use crate::config::MatchingConfig;
use crate::error::{MatchError, ValidationError};
use crate::model::{RequestStatus, Ride, RideRequest, Role, User};
use crate::notify::{Notification, NotificationKind, Notifier};
use crate::routing::DistanceProvider;
use crate::store::{RideRequestStore, RideStore, UserDirectory};

/// External services an orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub requests: Arc<dyn RideRequestStore>,
    pub rides: Arc<dyn RideStore>,
    pub users: Arc<dyn UserDirectory>,
    pub notifier: Arc<dyn Notifier>,
    pub routing: Arc<dyn DistanceProvider>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// Nothing eligible could be scored for this driver.
    NoCandidates,
    /// Every attempted commit lost a race, or the driver was already taken.
    Conflict,
    Matched(Ride),
}

pub struct MatchOrchestrator {
    collaborators: Collaborators,
    selector: CandidateSelector,
    ranker: Ranker,
    committer: MatchCommitter,
    config: MatchingConfig,
}

impl MatchOrchestrator {
    pub fn new(collaborators: Collaborators, config: MatchingConfig) -> Self {
        let selector = CandidateSelector::new(Arc::clone(&collaborators.requests));
        let ranker = Ranker::new(
            Arc::clone(&collaborators.routing),
            config.scoring_policy(),
            config.max_concurrent_scores,
        );
        let committer = MatchCommitter::new(
            Arc::clone(&collaborators.requests),
            config.compensation_retries,
            config.compensation_backoff(),
        );
        Self {
            collaborators,
            selector,
            ranker,
            committer,
            config,
        }
    }

    pub fn requests(&self) -> &Arc<dyn RideRequestStore> {
        &self.collaborators.requests
    }

    /// Run one attempt and log the result. Never fails.
    pub async fn match_and_notify(&self, driver: &RideRequest) {
        let span = info_span!("match_attempt", driver_request = %driver.id);
        async {
            match self.try_match(driver).await {
                Ok(MatchOutcome::Matched(ride)) => info!(
                    ride_id = %ride.id,
                    passenger_request = %ride.passenger_request.id,
                    "ride organized"
                ),
                Ok(MatchOutcome::NoCandidates) => debug!("no eligible passengers"),
                Ok(MatchOutcome::Conflict) => debug!("lost every commit race this round"),
                Err(failure) if failure.is_consistency_gap() => error!(
                    alert = "consistency_gap",
                    error = %failure,
                    "matching attempt left a request stuck"
                ),
                Err(failure) => warn!(error = %failure, "matching attempt failed"),
            }
        }
        .instrument(span)
        .await
    }

    pub async fn try_match(&self, driver: &RideRequest) -> Result<MatchOutcome, MatchError> {
        if driver.role != Role::Driver {
            return Err(ValidationError::UnexpectedRole {
                id: driver.id.clone(),
                actual: driver.role,
                expected: Role::Driver,
            }
            .into());
        }

        // The snapshot handed to us may be stale by the time this task runs.
        let current = self
            .collaborators
            .requests
            .find_by_id(&driver.id)
            .await?
            .ok_or_else(|| MatchError::UnknownRequest(driver.id.clone()))?;
        if current.status != RequestStatus::Available {
            return Ok(MatchOutcome::Conflict);
        }

        let candidates = self.selector.candidates_for(&current).await?;
        if candidates.is_empty() {
            return Ok(MatchOutcome::NoCandidates);
        }

        let ranked = self
            .ranker
            .rank(&current, candidates, self.config.top_k)
            .await;
        if ranked.is_empty() {
            return Ok(MatchOutcome::NoCandidates);
        }

        let attempts = if self.config.fallback_to_lower_ranks {
            ranked.len()
        } else {
            1
        };
        for (rank, container) in ranked.iter().take(attempts).enumerate() {
            let passenger = container.passenger();
            match self.committer.commit_pair(&current.id, &passenger.id).await? {
                CommitOutcome::Committed { driver, passenger } => {
                    let ride = self.open_ride(driver, passenger).await?;
                    self.notify(&ride).await?;
                    return Ok(MatchOutcome::Matched(ride));
                }
                CommitOutcome::DriverUnavailable | CommitOutcome::BothUnavailable => {
                    debug!(rank, "driver claimed by another attempt");
                    return Ok(MatchOutcome::Conflict);
                }
                CommitOutcome::PassengerUnavailable => {
                    debug!(rank, passenger_request = %passenger.id, "passenger already taken");
                }
            }
        }
        Ok(MatchOutcome::Conflict)
    }

    /// Persist the ride for a committed pair, releasing both requests if that fails.
    async fn open_ride(
        &self,
        driver: RideRequest,
        passenger: RideRequest,
    ) -> Result<Ride, MatchError> {
        let driver_id = driver.id.clone();
        let passenger_id = passenger.id.clone();
        match self.persist_ride(driver, passenger).await {
            Ok(ride) => Ok(ride),
            Err(failure) => {
                warn!(error = %failure, "ride could not be created, releasing both requests");
                let (driver_release, passenger_release) = tokio::join!(
                    self.committer.release(&driver_id),
                    self.committer.release(&passenger_id)
                );
                driver_release?;
                passenger_release?;
                Err(failure)
            }
        }
    }

    async fn persist_ride(
        &self,
        driver: RideRequest,
        passenger: RideRequest,
    ) -> Result<Ride, MatchError> {
        let (driver_user, passenger_user) =
            tokio::try_join!(self.resolve_user(&driver.owner), self.resolve_user(&passenger.owner))?;
        let ride = Ride::open(
            &driver_user,
            &passenger_user,
            driver,
            passenger,
            self.collaborators.clock.now(),
        )?;
        Ok(self.collaborators.rides.save(ride).await?)
    }

    async fn resolve_user(&self, id: &str) -> Result<User, MatchError> {
        self.collaborators
            .users
            .find_by_id(id)
            .await?
            .ok_or_else(|| MatchError::UnknownUser(id.to_string()))
    }

    /// Two "ride organized" messages now, two reminders before the ride.
    async fn notify(&self, ride: &Ride) -> Result<(), MatchError> {
        let notifier = &self.collaborators.notifier;
        let [to_driver, to_passenger] = Notification::for_both(ride, NotificationKind::RideOrganized);
        tokio::try_join!(notifier.send_now(to_driver), notifier.send_now(to_passenger))?;

        let remind_at = ride.reminder_time(self.config.reminder_lead());
        let [to_driver, to_passenger] = Notification::for_both(ride, NotificationKind::RideReminder);
        if remind_at <= self.collaborators.clock.now() {
            debug!(%remind_at, "reminder time already passed, sending now");
            tokio::try_join!(notifier.send_now(to_driver), notifier.send_now(to_passenger))?;
        } else {
            tokio::try_join!(
                notifier.send_scheduled(to_driver, remind_at),
                notifier.send_scheduled(to_passenger, remind_at)
            )?;
        }
        Ok(())
    }
}
