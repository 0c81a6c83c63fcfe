//! Error taxonomy for the matching core.
//!
//! Races lost to another attempt are not errors: they surface as
//! `Ok(false)` from the committer and `MatchOutcome::Conflict` from the
//! orchestrator. Everything here is either malformed input, a failing
//! collaborator, or a consistency gap that needs an operator.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{RequestStatus, Role};

/// Malformed positions, windows or ride snapshots. Rejected before any store write.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("latitude {0} is outside [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    Longitude(f64),
    #[error("interval start {start} must be before end {end}")]
    EmptyInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("interval start {start} is in the past (now {now})")]
    StartInPast {
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    },
    #[error("request {id} has role {actual:?}, expected {expected:?}")]
    UnexpectedRole {
        id: String,
        actual: Role,
        expected: Role,
    },
    #[error("request {id} has status {actual:?}, expected {expected:?}")]
    UnexpectedStatus {
        id: String,
        actual: RequestStatus,
        expected: RequestStatus,
    },
    #[error("driver and passenger requests share owner {0}")]
    SameOwner(String),
}

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("no route between ({from_lat}, {from_lng}) and ({to_lat}, {to_lng})")]
    NoRoute {
        from_lat: f64,
        from_lng: f64,
        to_lat: f64,
        to_lng: f64,
    },
    #[error("routing backend returned {0}")]
    Backend(String),
    #[cfg(feature = "osrm")]
    #[error("routing request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Why a driver/passenger pair could not be scored. The pair is dropped from ranking.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error("departure points coincide and zero distances are rejected")]
    ZeroDistance,
    #[error("routing returned an unusable distance of {0} m")]
    InvalidDistance(f64),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
    #[error("store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommitError {
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The compensating write could not be confirmed; the request may be stuck
    /// in MATCHED with no ride.
    #[error("request {request_id} may be stuck in MATCHED after an unconfirmed rollback ({reason})")]
    ConsistencyGap { request_id: String, reason: String },
}

/// Failure of a single matching attempt. Never escapes the attempt's task.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
    #[error("unknown ride request {0}")]
    UnknownRequest(String),
    #[error("unknown user {0}")]
    UnknownUser(String),
}

impl MatchError {
    /// True when the failure left a request stuck and must be escalated.
    pub fn is_consistency_gap(&self) -> bool {
        matches!(self, MatchError::Commit(CommitError::ConsistencyGap { .. }))
    }
}
