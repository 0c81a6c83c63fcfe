//! Pluggable distance providers backing the compatibility score.
//!
//! Two implementations, selectable via [`RoutingKind`]:
//!
//! - **`HaversineDistanceProvider`**: great-circle distance. Zero dependencies, never fails.
//! - **`OsrmDistanceProvider`** (feature `osrm`): road distance from an OSRM HTTP endpoint.
//!
//! Providers are shared as `Arc<dyn DistanceProvider>`; [`build_distance_provider`]
//! wraps remote backends in a [`CachedDistanceProvider`].

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RoutingError;
use crate::model::Position;

#[cfg(feature = "osrm")]
pub mod osrm;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Which routing backend to use.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoutingKind {
    #[default]
    Haversine,
    /// OSRM HTTP endpoint (e.g. `"http://localhost:5000"`).
    #[cfg(feature = "osrm")]
    Osrm { endpoint: String },
}

/// Distance between two positions in metres.
#[async_trait]
pub trait DistanceProvider: Send + Sync {
    async fn distance(&self, from: Position, to: Position) -> Result<f64, RoutingError>;
}

// ---------------------------------------------------------------------------
// Haversine provider (always available)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct HaversineDistanceProvider;

#[async_trait]
impl DistanceProvider for HaversineDistanceProvider {
    async fn distance(&self, from: Position, to: Position) -> Result<f64, RoutingError> {
        Ok(from.haversine_m(&to))
    }
}

// ---------------------------------------------------------------------------
// Caching wrapper
// ---------------------------------------------------------------------------

type RouteKey = ((u64, u64), (u64, u64));

/// LRU-cached wrapper around any [`DistanceProvider`].
///
/// Keys are directional. Failures are not cached; with `fallback_to_haversine`
/// a failing inner provider is replaced by the great-circle distance.
pub struct CachedDistanceProvider {
    inner: Arc<dyn DistanceProvider>,
    cache: Mutex<LruCache<RouteKey, f64>>,
    fallback_to_haversine: bool,
}

impl CachedDistanceProvider {
    pub fn new(
        inner: Arc<dyn DistanceProvider>,
        capacity: NonZeroUsize,
        fallback_to_haversine: bool,
    ) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
            fallback_to_haversine,
        }
    }

    fn cached(&self, key: &RouteKey) -> Option<f64> {
        // A poisoned cache only costs a lookup.
        let mut cache = self.cache.lock().ok()?;
        cache.get(key).copied()
    }
}

#[async_trait]
impl DistanceProvider for CachedDistanceProvider {
    async fn distance(&self, from: Position, to: Position) -> Result<f64, RoutingError> {
        let key = (from.key(), to.key());
        if let Some(distance) = self.cached(&key) {
            return Ok(distance);
        }

        let distance = match self.inner.distance(from, to).await {
            Ok(distance) => distance,
            Err(error) if self.fallback_to_haversine => {
                warn!(%error, "routing backend failed, using great-circle distance");
                return Ok(from.haversine_m(&to));
            }
            Err(error) => return Err(error),
        };

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, distance);
        }
        Ok(distance)
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Construct a shared provider from a [`RoutingKind`] descriptor.
///
/// `Haversine` is returned uncached; remote backends are cached with
/// great-circle fallback.
pub fn build_distance_provider(
    kind: &RoutingKind,
    cache_capacity: NonZeroUsize,
) -> Result<Arc<dyn DistanceProvider>, RoutingError> {
    match kind {
        RoutingKind::Haversine => {
            debug!(?cache_capacity, "haversine routing needs no cache");
            Ok(Arc::new(HaversineDistanceProvider))
        }

        #[cfg(feature = "osrm")]
        RoutingKind::Osrm { endpoint } => {
            let inner = Arc::new(osrm::OsrmDistanceProvider::new(endpoint)?);
            Ok(Arc::new(CachedDistanceProvider::new(
                inner,
                cache_capacity,
                true,
            )))
        }
    }
}
