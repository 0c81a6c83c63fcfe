//! Storage collaborators used by the matching core.
//!
//! The only synchronization primitive the protocol relies on is
//! [`RideRequestStore::conditional_update_status`], which must be atomic per
//! document. Implementations must not emulate it with a read followed by a write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::{RequestStatus, Ride, RideRequest, Role, User};

mod memory;

pub use memory::InMemoryStore;

#[async_trait]
pub trait RideRequestStore: Send + Sync {
    /// Set `status = to` where the current status is `from`.
    ///
    /// Returns the updated record, or `None` when the record is missing or its
    /// status was not `from`.
    async fn conditional_update_status(
        &self,
        id: &str,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<Option<RideRequest>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<RideRequest>, StoreError>;

    /// AVAILABLE requests of `role` whose window overlaps `[start, end]`,
    /// excluding those owned by `exclude_owner`, in insertion order.
    async fn find_available_in_window(
        &self,
        role: Role,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_owner: &str,
    ) -> Result<Vec<RideRequest>, StoreError>;

    /// All AVAILABLE requests of `role`, in insertion order.
    async fn find_available(&self, role: Role) -> Result<Vec<RideRequest>, StoreError>;

    async fn save(&self, request: RideRequest) -> Result<RideRequest, StoreError>;
}

#[async_trait]
pub trait RideStore: Send + Sync {
    async fn save(&self, ride: Ride) -> Result<Ride, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Ride>, StoreError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;
}

/// Withdraw an AVAILABLE request. Returns `false` if it was already matched or canceled.
pub async fn cancel_request(store: &dyn RideRequestStore, id: &str) -> Result<bool, StoreError> {
    let updated = store
        .conditional_update_status(id, RequestStatus::Available, RequestStatus::Canceled)
        .await?;
    Ok(updated.is_some())
}
