//! Domain records: ride requests, rides, users and their value types.

use chrono::{DateTime, Duration, Utc};
use h3o::LatLng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Latitude/longitude pair in degrees. Always finite and in range.
///
/// The degrees are kept as given; `point` is only used for distances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PositionRepr", into = "PositionRepr")]
pub struct Position {
    lat: f64,
    lng: f64,
    point: LatLng,
}

#[derive(Serialize, Deserialize)]
struct PositionRepr {
    lat: f64,
    lng: f64,
}

impl Position {
    pub fn new(lat: f64, lng: f64) -> Result<Self, ValidationError> {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(ValidationError::Latitude(lat));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(ValidationError::Longitude(lng));
        }
        let point = LatLng::new(lat, lng).map_err(|_| ValidationError::Latitude(lat))?;
        Ok(Self { lat, lng, point })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    /// Great-circle distance in metres.
    pub fn haversine_m(&self, other: &Position) -> f64 {
        self.point.distance_m(other.point)
    }

    /// Bit-exact key for caches.
    pub(crate) fn key(&self) -> (u64, u64) {
        (self.lat.to_bits(), self.lng.to_bits())
    }
}

impl TryFrom<PositionRepr> for Position {
    type Error = ValidationError;

    fn try_from(repr: PositionRepr) -> Result<Self, Self::Error> {
        Position::new(repr.lat, repr.lng)
    }
}

impl From<Position> for PositionRepr {
    fn from(position: Position) -> Self {
        PositionRepr {
            lat: position.lat(),
            lng: position.lng(),
        }
    }
}

/// Half-open departure window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "IntervalRepr", into = "IntervalRepr")]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct IntervalRepr {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if start >= end {
            return Err(ValidationError::EmptyInterval { start, end });
        }
        Ok(Self { start, end })
    }

    /// Like [`Interval::new`], additionally rejecting windows that already started.
    pub fn new_upcoming(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if start < now {
            return Err(ValidationError::StartInPast { start, now });
        }
        Self::new(start, end)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Candidate-window test: `self.end >= start && self.start <= end`.
    ///
    /// Inclusive on both sides, so windows that merely touch still overlap.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.end >= start && self.start <= end
    }
}

impl TryFrom<IntervalRepr> for Interval {
    type Error = ValidationError;

    fn try_from(repr: IntervalRepr) -> Result<Self, Self::Error> {
        Interval::new(repr.start, repr.end)
    }
}

impl From<Interval> for IntervalRepr {
    fn from(interval: Interval) -> Self {
        IntervalRepr {
            start: interval.start,
            end: interval.end,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Driver,
    Passenger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Available,
    Matched,
    Canceled,
}

/// A party's offer to ride within a window. Status only changes through
/// conditional store writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideRequest {
    pub id: String,
    pub owner: String,
    pub role: Role,
    pub window: Interval,
    pub departure: Position,
    pub destination: Position,
    pub status: RequestStatus,
}

impl RideRequest {
    /// New AVAILABLE request with a fresh id.
    pub fn new(
        owner: impl Into<String>,
        role: Role,
        window: Interval,
        departure: Position,
        destination: Position,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner: owner.into(),
            role,
            window,
            departure,
            destination,
            status: RequestStatus::Available,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_available(&self) -> bool {
        self.status == RequestStatus::Available
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub chat_handle: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    Opened,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    /// 1 to 5.
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

/// A committed match. Holds snapshots of both requests as they were right
/// after the commit, not live references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    pub id: String,
    pub driver_user: String,
    pub passenger_user: String,
    pub driver_request: RideRequest,
    pub passenger_request: RideRequest,
    pub status: RideStatus,
    pub driver_feedback: Option<Feedback>,
    pub passenger_feedback: Option<Feedback>,
    pub created_at: DateTime<Utc>,
}

impl Ride {
    /// Open a ride from two freshly committed snapshots.
    pub fn open(
        driver: &User,
        passenger: &User,
        driver_request: RideRequest,
        passenger_request: RideRequest,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        expect_role(&driver_request, Role::Driver)?;
        expect_role(&passenger_request, Role::Passenger)?;
        expect_matched(&driver_request)?;
        expect_matched(&passenger_request)?;
        if driver_request.owner == passenger_request.owner {
            return Err(ValidationError::SameOwner(driver_request.owner));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            driver_user: driver.id.clone(),
            passenger_user: passenger.id.clone(),
            driver_request,
            passenger_request,
            status: RideStatus::Opened,
            driver_feedback: None,
            passenger_feedback: None,
            created_at,
        })
    }

    /// Earliest moment both parties can leave.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.driver_request
            .window
            .start()
            .max(self.passenger_request.window.start())
    }

    pub fn reminder_time(&self, lead: Duration) -> DateTime<Utc> {
        self.start_time() - lead
    }
}

fn expect_role(request: &RideRequest, expected: Role) -> Result<(), ValidationError> {
    if request.role != expected {
        return Err(ValidationError::UnexpectedRole {
            id: request.id.clone(),
            actual: request.role,
            expected,
        });
    }
    Ok(())
}

fn expect_matched(request: &RideRequest) -> Result<(), ValidationError> {
    if request.status != RequestStatus::Matched {
        return Err(ValidationError::UnexpectedStatus {
            id: request.id.clone(),
            actual: request.status,
            expected: RequestStatus::Matched,
        });
    }
    Ok(())
}
