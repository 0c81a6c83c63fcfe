use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::{RideRequest, Role};
use crate::store::RideRequestStore;

/// Finds passenger requests a driver could be matched with.
pub struct CandidateSelector {
    store: Arc<dyn RideRequestStore>,
}

impl CandidateSelector {
    pub fn new(store: Arc<dyn RideRequestStore>) -> Self {
        Self { store }
    }

    /// AVAILABLE passengers not owned by `exclude_owner` whose window overlaps `[start, end]`.
    pub async fn available_passengers_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_owner: &str,
    ) -> Result<Vec<RideRequest>, StoreError> {
        let found = self
            .store
            .find_available_in_window(Role::Passenger, start, end, exclude_owner)
            .await?;
        // Store queries may be coarser than the predicate; the predicate wins.
        Ok(found
            .into_iter()
            .filter(|candidate| is_eligible(candidate, start, end, exclude_owner))
            .collect())
    }

    pub async fn candidates_for(
        &self,
        driver: &RideRequest,
    ) -> Result<Vec<RideRequest>, StoreError> {
        self.available_passengers_in_window(
            driver.window.start(),
            driver.window.end(),
            &driver.owner,
        )
        .await
    }
}

pub fn is_eligible(
    candidate: &RideRequest,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude_owner: &str,
) -> bool {
    candidate.role == Role::Passenger
        && candidate.is_available()
        && candidate.owner != exclude_owner
        && candidate.window.overlaps(start, end)
}
