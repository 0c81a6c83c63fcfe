//! Test helpers shared by unit tests, integration tests and benches.
//!
//! Fixed instants, request builders, a scripted routing backend and store
//! wrappers that lose races or fail writes on demand.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::error::{RoutingError, StoreError};
use crate::model::{Interval, Position, RequestStatus, Ride, RideRequest, Role, User};
use crate::routing::DistanceProvider;
use crate::store::{InMemoryStore, RideRequestStore, RideStore};

/// 2030-01-01 08:00 UTC. "Now" in most tests.
///
/// # Panics
///
/// Never in practice; the literal is a valid timestamp.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 8, 0, 0)
        .single()
        .expect("fixed test instant should be valid")
}

/// `test_now()` plus the given offset in minutes.
pub fn minutes_from_now(minutes: i64) -> DateTime<Utc> {
    test_now() + Duration::minutes(minutes)
}

/// # Panics
///
/// Panics if `start_min >= end_min`.
pub fn window(start_min: i64, end_min: i64) -> Interval {
    Interval::new(minutes_from_now(start_min), minutes_from_now(end_min))
        .expect("test window should be non-empty")
}

/// Berlin Alexanderplatz.
pub fn origin() -> Position {
    position(52.5219, 13.4132)
}

/// # Panics
///
/// Panics if the coordinates are out of range.
pub fn position(lat: f64, lng: f64) -> Position {
    Position::new(lat, lng).expect("test position should be valid")
}

/// A point roughly `metres` north of [`origin`].
pub fn north_of_origin(metres: f64) -> Position {
    position(origin().lat() + metres / 111_195.0, origin().lng())
}

pub fn driver_request(id: &str, owner: &str, window: Interval, departure: Position) -> RideRequest {
    RideRequest::new(owner, Role::Driver, window, departure, origin()).with_id(id)
}

pub fn passenger_request(
    id: &str,
    owner: &str,
    window: Interval,
    departure: Position,
) -> RideRequest {
    RideRequest::new(owner, Role::Passenger, window, departure, origin()).with_id(id)
}

pub fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        name: format!("User {id}"),
        chat_handle: Some(format!("@{id}")),
    }
}

/// Distances keyed by destination point, haversine for anything unscripted.
#[derive(Debug, Default)]
pub struct ScriptedDistanceProvider {
    distances: HashMap<(u64, u64), f64>,
    failures: HashSet<(u64, u64)>,
    calls: AtomicUsize,
}

impl ScriptedDistanceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_distance(mut self, to: Position, metres: f64) -> Self {
        self.distances.insert(to.key(), metres);
        self
    }

    pub fn with_failure(mut self, to: Position) -> Self {
        self.failures.insert(to.key());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DistanceProvider for ScriptedDistanceProvider {
    async fn distance(&self, from: Position, to: Position) -> Result<f64, RoutingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failures.contains(&to.key()) {
            return Err(RoutingError::Backend("scripted failure".into()));
        }
        Ok(self
            .distances
            .get(&to.key())
            .copied()
            .unwrap_or_else(|| from.haversine_m(&to)))
    }
}

/// Which writes a [`FlakyRequestStore`] interferes with.
#[derive(Debug, Default)]
struct Faults {
    /// Claims on these ids lose to a competitor that claims first.
    stolen: HashSet<String>,
    /// Claims on these ids fail with a backend error, without being applied.
    failing_claims: HashSet<String>,
    /// Rollbacks on these ids fail with a backend error, without being applied.
    failing_releases: HashSet<String>,
    /// Rollbacks on these ids are applied, a competitor claims the request,
    /// and then the rollback reports a timeout.
    reclaimed_after_release: HashSet<String>,
    /// Lookups of these ids fail with a backend error.
    failing_lookups: HashSet<String>,
}

/// Delegates to an [`InMemoryStore`], injecting lost races and write failures.
pub struct FlakyRequestStore {
    inner: Arc<InMemoryStore>,
    faults: Mutex<Faults>,
    releases_attempted: AtomicUsize,
}

impl FlakyRequestStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Faults::default()),
            releases_attempted: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &Arc<InMemoryStore> {
        &self.inner
    }

    /// The next claim on `id` finds it already MATCHED by someone else.
    pub fn steal_on_claim(&self, id: &str) {
        self.with_faults(|faults| faults.stolen.insert(id.to_string()));
    }

    pub fn fail_claims(&self, id: &str) {
        self.with_faults(|faults| faults.failing_claims.insert(id.to_string()));
    }

    pub fn fail_releases(&self, id: &str) {
        self.with_faults(|faults| faults.failing_releases.insert(id.to_string()));
    }

    /// The next rollback of `id` lands, loses its acknowledgement, and a
    /// competitor claims `id` before the caller hears back.
    pub fn reclaim_after_release(&self, id: &str) {
        self.with_faults(|faults| faults.reclaimed_after_release.insert(id.to_string()));
    }

    pub fn fail_lookups(&self, id: &str) {
        self.with_faults(|faults| faults.failing_lookups.insert(id.to_string()));
    }

    /// MATCHED → AVAILABLE writes seen, including failed ones.
    pub fn releases_attempted(&self) -> usize {
        self.releases_attempted.load(Ordering::SeqCst)
    }

    fn with_faults<R>(&self, f: impl FnOnce(&mut Faults) -> R) -> R {
        let mut faults = self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut faults)
    }
}

#[async_trait]
impl RideRequestStore for FlakyRequestStore {
    async fn conditional_update_status(
        &self,
        id: &str,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<Option<RideRequest>, StoreError> {
        let claim = from == RequestStatus::Available && to == RequestStatus::Matched;
        let release = from == RequestStatus::Matched && to == RequestStatus::Available;
        if release {
            self.releases_attempted.fetch_add(1, Ordering::SeqCst);
            if self.with_faults(|faults| faults.failing_releases.contains(id)) {
                return Err(StoreError::Backend(format!("injected rollback failure for {id}")));
            }
            if self.with_faults(|faults| faults.reclaimed_after_release.remove(id)) {
                self.inner.conditional_update_status(id, from, to).await?;
                self.inner.conditional_update_status(id, to, from).await?;
                return Err(StoreError::Backend(format!("rollback of {id} timed out")));
            }
        }
        if claim {
            if self.with_faults(|faults| faults.failing_claims.contains(id)) {
                return Err(StoreError::Backend(format!("injected claim failure for {id}")));
            }
            if self.with_faults(|faults| faults.stolen.remove(id)) {
                self.inner.conditional_update_status(id, from, to).await?;
            }
        }
        self.inner.conditional_update_status(id, from, to).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<RideRequest>, StoreError> {
        if self.with_faults(|faults| faults.failing_lookups.contains(id)) {
            return Err(StoreError::Backend(format!("injected lookup failure for {id}")));
        }
        RideRequestStore::find_by_id(self.inner.as_ref(), id).await
    }

    async fn find_available_in_window(
        &self,
        role: Role,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_owner: &str,
    ) -> Result<Vec<RideRequest>, StoreError> {
        self.inner
            .find_available_in_window(role, start, end, exclude_owner)
            .await
    }

    async fn find_available(&self, role: Role) -> Result<Vec<RideRequest>, StoreError> {
        self.inner.find_available(role).await
    }

    async fn save(&self, request: RideRequest) -> Result<RideRequest, StoreError> {
        RideRequestStore::save(self.inner.as_ref(), request).await
    }
}

/// Ride store whose writes always fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingRideStore;

#[async_trait]
impl RideStore for FailingRideStore {
    async fn save(&self, _ride: Ride) -> Result<Ride, StoreError> {
        Err(StoreError::Backend("ride store unavailable".into()))
    }

    async fn find_by_id(&self, _id: &str) -> Result<Option<Ride>, StoreError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn north_of_origin_is_roughly_that_far() {
        let distance = origin().haversine_m(&north_of_origin(1_000.0));
        assert!((distance - 1_000.0).abs() < 5.0, "got {distance}");
    }

    #[tokio::test]
    async fn scripted_provider_prefers_script_then_haversine() {
        let near = north_of_origin(100.0);
        let broken = north_of_origin(200.0);
        let routing = ScriptedDistanceProvider::new()
            .with_distance(near, 42.0)
            .with_failure(broken);

        assert_eq!(routing.distance(origin(), near).await.unwrap(), 42.0);
        assert!(routing.distance(origin(), broken).await.is_err());
        let fallback = routing.distance(origin(), north_of_origin(300.0)).await.unwrap();
        assert!((fallback - 300.0).abs() < 5.0);
        assert_eq!(routing.calls(), 3);
    }

    #[tokio::test]
    async fn stolen_claim_leaves_request_matched_by_competitor() {
        let inner = Arc::new(InMemoryStore::new());
        inner
            .insert_request(passenger_request("p1", "bob", window(60, 120), origin()))
            .unwrap();
        let store = FlakyRequestStore::new(Arc::clone(&inner));
        store.steal_on_claim("p1");

        let claimed = store
            .conditional_update_status("p1", RequestStatus::Available, RequestStatus::Matched)
            .await
            .unwrap();
        assert!(claimed.is_none());
        assert_eq!(inner.status_of("p1"), Some(RequestStatus::Matched));
    }
}
