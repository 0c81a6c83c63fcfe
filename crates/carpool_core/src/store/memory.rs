use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{RideRequestStore, RideStore, UserDirectory};
use crate::error::StoreError;
use crate::model::{RequestStatus, Ride, RideRequest, Role, User};

/// Insertion-ordered table keyed by id.
#[derive(Debug)]
struct Table<T> {
    order: Vec<String>,
    by_id: HashMap<String, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            by_id: HashMap::new(),
        }
    }
}

impl<T: Clone> Table<T> {
    fn upsert(&mut self, id: &str, value: T) {
        if self.by_id.insert(id.to_string(), value).is_none() {
            self.order.push(id.to_string());
        }
    }

    fn values(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }
}

/// Process-local store for requests, rides and users.
///
/// Each operation holds the table lock for its whole duration, which makes
/// `conditional_update_status` a true per-document compare-and-swap.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    requests: Mutex<Table<RideRequest>>,
    rides: Mutex<Table<Ride>>,
    users: Mutex<Table<User>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex.lock().map_err(|_| StoreError::Poisoned)
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: User) -> Result<(), StoreError> {
        let id = user.id.clone();
        lock(&self.users)?.upsert(&id, user);
        Ok(())
    }

    pub fn insert_request(&self, request: RideRequest) -> Result<(), StoreError> {
        let id = request.id.clone();
        lock(&self.requests)?.upsert(&id, request);
        Ok(())
    }

    pub fn request(&self, id: &str) -> Option<RideRequest> {
        lock(&self.requests).ok()?.by_id.get(id).cloned()
    }

    pub fn status_of(&self, id: &str) -> Option<RequestStatus> {
        self.request(id).map(|request| request.status)
    }

    /// Snapshot of all rides in creation order.
    pub fn rides(&self) -> Vec<Ride> {
        lock(&self.rides)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RideRequestStore for InMemoryStore {
    async fn conditional_update_status(
        &self,
        id: &str,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<Option<RideRequest>, StoreError> {
        let mut table = lock(&self.requests)?;
        match table.by_id.get_mut(id) {
            Some(request) if request.status == from => {
                request.status = to;
                Ok(Some(request.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<RideRequest>, StoreError> {
        Ok(lock(&self.requests)?.by_id.get(id).cloned())
    }

    async fn find_available_in_window(
        &self,
        role: Role,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_owner: &str,
    ) -> Result<Vec<RideRequest>, StoreError> {
        let table = lock(&self.requests)?;
        Ok(table
            .values()
            .filter(|request| {
                request.role == role
                    && request.is_available()
                    && request.owner != exclude_owner
                    && request.window.overlaps(start, end)
            })
            .cloned()
            .collect())
    }

    async fn find_available(&self, role: Role) -> Result<Vec<RideRequest>, StoreError> {
        let table = lock(&self.requests)?;
        Ok(table
            .values()
            .filter(|request| request.role == role && request.is_available())
            .cloned()
            .collect())
    }

    async fn save(&self, request: RideRequest) -> Result<RideRequest, StoreError> {
        self.insert_request(request.clone())?;
        Ok(request)
    }
}

#[async_trait]
impl RideStore for InMemoryStore {
    async fn save(&self, ride: Ride) -> Result<Ride, StoreError> {
        let id = ride.id.clone();
        lock(&self.rides)?.upsert(&id, ride.clone());
        Ok(ride)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Ride>, StoreError> {
        Ok(lock(&self.rides)?.by_id.get(id).cloned())
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(lock(&self.users)?.by_id.get(id).cloned())
    }
}
