//! Seed data for running the worker against the in-memory store.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use carpool_core::error::StoreError;
use carpool_core::model::{RideRequest, User};
use carpool_core::store::InMemoryStore;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub requests: Vec<RideRequest>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub requests: usize,
    pub skipped: usize,
}

impl Fixture {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Insert everything into `store`, skipping requests whose window ended before `now`.
    pub fn seed(self, store: &InMemoryStore, now: DateTime<Utc>) -> Result<SeedSummary, StoreError> {
        let mut summary = SeedSummary::default();
        for user in self.users {
            store.insert_user(user)?;
            summary.users += 1;
        }
        for request in self.requests {
            if request.window.end() < now {
                warn!(request = %request.id, end = %request.window.end(), "skipping expired request");
                summary.skipped += 1;
                continue;
            }
            store.insert_request(request)?;
            summary.requests += 1;
        }
        info!(
            users = summary.users,
            requests = summary.requests,
            skipped = summary.skipped,
            "fixture loaded"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carpool_core::model::RequestStatus;
    use carpool_core::test_helpers::{
        driver_request, minutes_from_now, origin, passenger_request, test_now, user, window,
    };
    use std::io::Write;

    #[test]
    fn loads_and_seeds_from_json_file() {
        let fixture = Fixture {
            users: vec![user("alice"), user("bob")],
            requests: vec![
                driver_request("d1", "alice", window(60, 120), origin()),
                passenger_request("p1", "bob", window(60, 120), origin()),
                passenger_request("old", "bob", window(-120, -60), origin()),
            ],
        };
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&fixture).unwrap().as_bytes())
            .unwrap();

        let store = InMemoryStore::new();
        let summary = Fixture::load(file.path())
            .unwrap()
            .seed(&store, test_now())
            .unwrap();

        assert_eq!(
            summary,
            SeedSummary {
                users: 2,
                requests: 2,
                skipped: 1
            }
        );
        assert_eq!(store.status_of("d1"), Some(RequestStatus::Available));
        assert_eq!(store.status_of("old"), None);
        assert_eq!(
            store.request("p1").map(|r| r.window.start()),
            Some(minutes_from_now(60))
        );
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let fixture: Fixture = serde_json::from_str("{}").unwrap();
        assert!(fixture.users.is_empty() && fixture.requests.is_empty());
    }

    #[test]
    fn invalid_positions_are_rejected_on_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"requests": [{{"id": "x", "owner": "a", "role": "DRIVER",
                "window": {{"start": "2030-01-01T09:00:00Z", "end": "2030-01-01T10:00:00Z"}},
                "departure": {{"lat": 95.0, "lng": 0.0}},
                "destination": {{"lat": 0.0, "lng": 0.0}},
                "status": "AVAILABLE"}}]}}"#
        )
        .unwrap();
        assert!(Fixture::load(file.path()).is_err());
    }
}
