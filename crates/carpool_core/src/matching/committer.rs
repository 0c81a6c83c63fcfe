//! Two-sided match commit with compensation.
//!
//! Both requests move AVAILABLE → MATCHED through independent conditional
//! writes issued concurrently. If only one side moved, that side is moved back
//! MATCHED → AVAILABLE before returning, so a lost race never leaves a
//! half-matched pair behind. A compensating write that cannot be confirmed is
//! a consistency gap: the request may no longer be picked up by any round.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::{CommitError, StoreError};
use crate::model::{RequestStatus, RideRequest};
use crate::store::RideRequestStore;

/// Result of one paired commit attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// Both sides are MATCHED. Holds the records as written.
    Committed {
        driver: RideRequest,
        passenger: RideRequest,
    },
    /// The driver request was no longer AVAILABLE; the passenger side was restored.
    DriverUnavailable,
    /// The passenger request was no longer AVAILABLE; the driver side was restored.
    PassengerUnavailable,
    BothUnavailable,
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }
}

pub struct MatchCommitter {
    store: Arc<dyn RideRequestStore>,
    compensation_retries: u32,
    compensation_backoff: Duration,
}

impl MatchCommitter {
    pub fn new(
        store: Arc<dyn RideRequestStore>,
        compensation_retries: u32,
        compensation_backoff: Duration,
    ) -> Self {
        Self {
            store,
            compensation_retries,
            compensation_backoff,
        }
    }

    /// `Ok(true)` when both requests are now MATCHED, `Ok(false)` when the
    /// attempt lost a race and nothing changed.
    pub async fn commit_match(
        &self,
        driver_request_id: &str,
        passenger_request_id: &str,
    ) -> Result<bool, CommitError> {
        self.commit_pair(driver_request_id, passenger_request_id)
            .await
            .map(|outcome| outcome.is_committed())
    }

    pub async fn commit_pair(
        &self,
        driver_request_id: &str,
        passenger_request_id: &str,
    ) -> Result<CommitOutcome, CommitError> {
        let (driver, passenger) = tokio::join!(
            self.claim(driver_request_id),
            self.claim(passenger_request_id)
        );

        match (driver, passenger) {
            (Ok(Some(driver)), Ok(Some(passenger))) => {
                debug!(
                    driver_request = %driver_request_id,
                    passenger_request = %passenger_request_id,
                    "match committed"
                );
                Ok(CommitOutcome::Committed { driver, passenger })
            }
            (Ok(Some(_)), Ok(None)) => {
                self.release(driver_request_id).await?;
                Ok(CommitOutcome::PassengerUnavailable)
            }
            (Ok(None), Ok(Some(_))) => {
                self.release(passenger_request_id).await?;
                Ok(CommitOutcome::DriverUnavailable)
            }
            (Ok(None), Ok(None)) => Ok(CommitOutcome::BothUnavailable),
            // A failed write may or may not have been applied; only the side we
            // know we claimed can be released.
            (Ok(Some(_)), Err(failure)) => {
                self.release(driver_request_id).await?;
                Err(failure.into())
            }
            (Err(failure), Ok(Some(_))) => {
                self.release(passenger_request_id).await?;
                Err(failure.into())
            }
            (Err(failure), _) | (_, Err(failure)) => Err(failure.into()),
        }
    }

    async fn claim(&self, request_id: &str) -> Result<Option<RideRequest>, StoreError> {
        self.store
            .conditional_update_status(
                request_id,
                RequestStatus::Available,
                RequestStatus::Matched,
            )
            .await
    }

    /// Move a request claimed by this attempt back to AVAILABLE.
    ///
    /// The compensating write is issued once. When it does not report the
    /// reverted record, the request is read back (retrying the read only) and
    /// anything still MATCHED is a [`CommitError::ConsistencyGap`]: by then the
    /// MATCHED status may belong to a competing attempt, so it is never
    /// written again.
    pub async fn release(&self, request_id: &str) -> Result<(), CommitError> {
        let write = match self
            .store
            .conditional_update_status(
                request_id,
                RequestStatus::Matched,
                RequestStatus::Available,
            )
            .await
        {
            Ok(Some(_)) => {
                info!(request = %request_id, "released half-committed request");
                return Ok(());
            }
            Ok(None) => "rollback found the request outside MATCHED".to_string(),
            Err(failure) => failure.to_string(),
        };

        match self.read_back(request_id).await {
            Ok(Some(current)) if current.status != RequestStatus::Matched => {
                warn!(
                    request = %request_id,
                    status = ?current.status,
                    %write,
                    "rollback unconfirmed, request has left MATCHED"
                );
                Ok(())
            }
            Ok(Some(_)) => Err(self.consistency_gap(
                request_id,
                format!("request still MATCHED after rollback: {write}"),
            )),
            Ok(None) => Err(self.consistency_gap(
                request_id,
                format!("request disappeared during rollback: {write}"),
            )),
            Err(failure) => Err(self.consistency_gap(
                request_id,
                format!("{write}; read-back failed: {failure}"),
            )),
        }
    }

    async fn read_back(&self, request_id: &str) -> Result<Option<RideRequest>, StoreError> {
        let mut attempt = 0u32;
        loop {
            match self.store.find_by_id(request_id).await {
                Err(failure) if attempt < self.compensation_retries => {
                    attempt += 1;
                    warn!(
                        request = %request_id,
                        attempt,
                        error = %failure,
                        "retrying rollback read-back"
                    );
                    tokio::time::sleep(self.compensation_backoff * attempt).await;
                }
                result => return result,
            }
        }
    }

    fn consistency_gap(&self, request_id: &str, reason: String) -> CommitError {
        error!(
            alert = "consistency_gap",
            request = %request_id,
            %reason,
            "rollback unconfirmed, request may be stuck in MATCHED"
        );
        CommitError::ConsistencyGap {
            request_id: request_id.to_string(),
            reason,
        }
    }
}
