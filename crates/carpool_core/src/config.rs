//! Matching configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Load with [`MatchingConfig::from_json_file`] and always
//! [`validate`](MatchingConfig::validate) before use.

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matching::ranker::DEFAULT_TOP_K;
use crate::matching::score::{ScoringPolicy, ZeroDistancePolicy};
use crate::routing::RoutingKind;

/// Default route cache capacity for remote routing backends.
const DEFAULT_ROUTE_CACHE_CAPACITY: usize = 20_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Ranked candidates kept per driver.
    pub top_k: usize,
    /// Minutes between matching rounds.
    pub round_interval_minutes: u64,
    /// Reminders fire this many minutes before ride start.
    pub reminder_lead_minutes: i64,
    /// Try rank 2..K within the same attempt when rank 1 was taken.
    pub fallback_to_lower_ranks: bool,
    /// Extra read-backs of an unconfirmed compensating write before declaring a consistency gap.
    pub compensation_retries: u32,
    /// Base backoff between read-backs, multiplied by the attempt number.
    pub compensation_backoff_ms: u64,
    /// Routing lookups in flight per ranking pass.
    pub max_concurrent_scores: usize,
    pub zero_distance: ZeroDistancePolicy,
    /// Distances below this (metres) count as zero.
    pub min_distance_m: f64,
    pub routing: RoutingKind,
    pub route_cache_capacity: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            round_interval_minutes: 5,
            reminder_lead_minutes: 30,
            fallback_to_lower_ranks: true,
            compensation_retries: 3,
            compensation_backoff_ms: 50,
            max_concurrent_scores: 16,
            zero_distance: ZeroDistancePolicy::Clamp,
            min_distance_m: 1.0,
            routing: RoutingKind::default(),
            route_cache_capacity: DEFAULT_ROUTE_CACHE_CAPACITY,
        }
    }
}

impl MatchingConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be at least 1".into()));
        }
        if self.round_interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "round_interval_minutes must be at least 1".into(),
            ));
        }
        if self.reminder_lead_minutes < 0 {
            return Err(ConfigError::Invalid(
                "reminder_lead_minutes must not be negative".into(),
            ));
        }
        if self.max_concurrent_scores == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_scores must be at least 1".into(),
            ));
        }
        if !(self.min_distance_m.is_finite() && self.min_distance_m > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "min_distance_m must be positive, got {}",
                self.min_distance_m
            )));
        }
        if self.route_cache_capacity == 0 {
            return Err(ConfigError::Invalid(
                "route_cache_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn scoring_policy(&self) -> ScoringPolicy {
        ScoringPolicy {
            zero_distance: self.zero_distance,
            min_distance_m: self.min_distance_m,
        }
    }

    pub fn round_interval(&self) -> Duration {
        Duration::from_secs(self.round_interval_minutes.saturating_mul(60))
    }

    pub fn reminder_lead(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.reminder_lead_minutes)
    }

    pub fn compensation_backoff(&self) -> Duration {
        Duration::from_millis(self.compensation_backoff_ms)
    }

    pub fn route_cache_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.route_cache_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
