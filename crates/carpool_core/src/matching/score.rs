//! Inverse-distance compatibility between a driver and a passenger.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::error::ScoreError;
use crate::model::{Position, RideRequest};
use crate::routing::DistanceProvider;

/// What to do when both departure points coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroDistancePolicy {
    /// Fail the score; the pair is excluded from ranking.
    Reject,
    /// Treat the distance as `min_distance_m`, the best finite score.
    #[default]
    Clamp,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringPolicy {
    pub zero_distance: ZeroDistancePolicy,
    pub min_distance_m: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            zero_distance: ZeroDistancePolicy::Clamp,
            min_distance_m: 1.0,
        }
    }
}

impl ScoringPolicy {
    /// Highest score this policy can produce.
    pub fn max_score(&self) -> f64 {
        1.0 / self.min_distance_m
    }
}

/// `1 / distance`, with sub-minimum distances handled per `policy`.
pub fn score_from_distance(distance_m: f64, policy: &ScoringPolicy) -> Result<f64, ScoreError> {
    if !distance_m.is_finite() || distance_m < 0.0 {
        return Err(ScoreError::InvalidDistance(distance_m));
    }
    if distance_m < policy.min_distance_m {
        return match policy.zero_distance {
            ZeroDistancePolicy::Reject => Err(ScoreError::ZeroDistance),
            ZeroDistancePolicy::Clamp => Ok(policy.max_score()),
        };
    }
    Ok(1.0 / distance_m)
}

pub async fn score(
    routing: &dyn DistanceProvider,
    driver: Position,
    passenger: Position,
    policy: &ScoringPolicy,
) -> Result<f64, ScoreError> {
    let distance_m = routing.distance(driver, passenger).await?;
    score_from_distance(distance_m, policy)
}

/// One driver paired with one passenger candidate, plus the pair's score
/// once it has been computed.
///
/// Owned by a single ranking pass. The score is computed at most once;
/// failed computations are not cached.
#[derive(Debug)]
pub struct ScoringContainer {
    driver: Arc<RideRequest>,
    passenger: RideRequest,
    score: OnceCell<f64>,
}

impl ScoringContainer {
    pub fn new(driver: Arc<RideRequest>, passenger: RideRequest) -> Self {
        Self {
            driver,
            passenger,
            score: OnceCell::new(),
        }
    }

    pub fn driver(&self) -> &RideRequest {
        &self.driver
    }

    pub fn passenger(&self) -> &RideRequest {
        &self.passenger
    }

    /// Score from departure to departure, computing it on first use.
    pub async fn score(
        &self,
        routing: &dyn DistanceProvider,
        policy: &ScoringPolicy,
    ) -> Result<f64, ScoreError> {
        self.score
            .get_or_try_init(|| {
                score(
                    routing,
                    self.driver.departure,
                    self.passenger.departure,
                    policy,
                )
            })
            .await
            .copied()
    }

    pub fn cached_score(&self) -> Option<f64> {
        self.score.get().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RoutingError;
    use crate::model::{Interval, Role};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedDistance {
        metres: Result<f64, ()>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DistanceProvider for FixedDistance {
        async fn distance(&self, _from: Position, _to: Position) -> Result<f64, RoutingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.metres
                .map_err(|_| RoutingError::Backend("unavailable".into()))
        }
    }

    fn fixed(metres: Result<f64, ()>) -> FixedDistance {
        FixedDistance {
            metres,
            calls: AtomicUsize::new(0),
        }
    }

    fn container() -> ScoringContainer {
        let start = Utc.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap();
        let window = Interval::new(start, start + chrono::Duration::hours(1)).unwrap();
        let here = Position::new(52.52, 13.40).unwrap();
        let there = Position::new(52.53, 13.41).unwrap();
        ScoringContainer::new(
            Arc::new(RideRequest::new("d", Role::Driver, window, here, there)),
            RideRequest::new("p", Role::Passenger, window, there, here),
        )
    }

    #[test]
    fn score_is_inverse_distance() {
        let policy = ScoringPolicy::default();
        assert_eq!(score_from_distance(250.0, &policy).unwrap(), 0.004);
        assert_eq!(score_from_distance(1.0, &policy).unwrap(), 1.0);
    }

    #[test]
    fn zero_distance_is_clamped_by_default() {
        let policy = ScoringPolicy::default();
        assert_eq!(score_from_distance(0.0, &policy).unwrap(), policy.max_score());
        assert_eq!(score_from_distance(0.5, &policy).unwrap(), policy.max_score());
    }

    #[test]
    fn zero_distance_can_be_rejected() {
        let policy = ScoringPolicy {
            zero_distance: ZeroDistancePolicy::Reject,
            min_distance_m: 1.0,
        };
        assert!(matches!(
            score_from_distance(0.0, &policy),
            Err(ScoreError::ZeroDistance)
        ));
    }

    #[test]
    fn unusable_distances_are_errors() {
        let policy = ScoringPolicy::default();
        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                score_from_distance(bad, &policy),
                Err(ScoreError::InvalidDistance(_))
            ));
        }
    }

    #[tokio::test]
    async fn container_memoizes_score() {
        let routing = fixed(Ok(500.0));
        let container = container();
        let policy = ScoringPolicy::default();

        assert_eq!(container.cached_score(), None);
        assert_eq!(container.score(&routing, &policy).await.unwrap(), 0.002);
        assert_eq!(container.score(&routing, &policy).await.unwrap(), 0.002);
        assert_eq!(container.cached_score(), Some(0.002));
        assert_eq!(routing.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn routing_failure_fails_score_and_is_not_cached() {
        let routing = fixed(Err(()));
        let container = container();
        let policy = ScoringPolicy::default();

        assert!(matches!(
            container.score(&routing, &policy).await,
            Err(ScoreError::Routing(_))
        ));
        assert_eq!(container.cached_score(), None);
        assert!(container.score(&routing, &policy).await.is_err());
        assert_eq!(routing.calls.load(Ordering::SeqCst), 2);
    }
}
