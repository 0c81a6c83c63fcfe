#![allow(dead_code)]

use std::sync::Arc;

use carpool_core::clock::FixedClock;
use carpool_core::config::MatchingConfig;
use carpool_core::matching::{Collaborators, MatchOrchestrator};
use carpool_core::model::{RequestStatus, Ride, RideRequest};
use carpool_core::notify::RecordingNotifier;
use carpool_core::store::{InMemoryStore, RideStore};
use carpool_core::test_helpers::{
    test_now, user, FailingRideStore, FlakyRequestStore, ScriptedDistanceProvider,
};
use chrono::{DateTime, Utc};

/// Everything a matching test needs to drive and inspect one attempt.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub requests: Arc<FlakyRequestStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub routing: Arc<ScriptedDistanceProvider>,
    pub orchestrator: Arc<MatchOrchestrator>,
}

impl Harness {
    pub fn status(&self, id: &str) -> Option<RequestStatus> {
        self.store.status_of(id)
    }

    pub fn request(&self, id: &str) -> RideRequest {
        self.store
            .request(id)
            .unwrap_or_else(|| panic!("request {id} should exist"))
    }

    pub fn rides(&self) -> Vec<Ride> {
        self.store.rides()
    }
}

/// Builder for reproducible matching harnesses.
pub struct HarnessBuilder {
    config: MatchingConfig,
    routing: ScriptedDistanceProvider,
    now: DateTime<Utc>,
    users: Vec<String>,
    requests: Vec<RideRequest>,
    failing_rides: bool,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            config: MatchingConfig {
                compensation_backoff_ms: 1,
                ..MatchingConfig::default()
            },
            routing: ScriptedDistanceProvider::new(),
            now: test_now(),
            users: Vec::new(),
            requests: Vec::new(),
            failing_rides: false,
        }
    }
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: MatchingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn without_fallback(mut self) -> Self {
        self.config.fallback_to_lower_ranks = false;
        self
    }

    pub fn with_routing(mut self, routing: ScriptedDistanceProvider) -> Self {
        self.routing = routing;
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_users(mut self, ids: &[&str]) -> Self {
        self.users.extend(ids.iter().map(|id| id.to_string()));
        self
    }

    /// Registers the request and, unless already present, its owner.
    pub fn with_request(mut self, request: RideRequest) -> Self {
        if !self.users.contains(&request.owner) {
            self.users.push(request.owner.clone());
        }
        self.requests.push(request);
        self
    }

    /// Request whose owner is not in the user directory.
    pub fn with_orphan_request(mut self, request: RideRequest) -> Self {
        self.requests.push(request);
        self
    }

    pub fn with_failing_ride_store(mut self) -> Self {
        self.failing_rides = true;
        self
    }

    pub fn build(self) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        for id in &self.users {
            store.insert_user(user(id)).expect("insert user");
        }
        for request in self.requests {
            store.insert_request(request).expect("insert request");
        }

        let requests = Arc::new(FlakyRequestStore::new(Arc::clone(&store)));
        let notifier = Arc::new(RecordingNotifier::new());
        let routing = Arc::new(self.routing);
        let rides: Arc<dyn RideStore> = if self.failing_rides {
            Arc::new(FailingRideStore)
        } else {
            store.clone()
        };

        let collaborators = Collaborators {
            requests: requests.clone(),
            rides,
            users: store.clone(),
            notifier: notifier.clone(),
            routing: routing.clone(),
            clock: Arc::new(FixedClock(self.now)),
        };
        let orchestrator = Arc::new(MatchOrchestrator::new(collaborators, self.config));

        Harness {
            store,
            requests,
            notifier,
            routing,
            orchestrator,
        }
    }
}
