//! Top-K selection of scored candidates.
//!
//! [`TopK`] is a bounded accumulator plus an associative [`TopK::merge`], so the
//! same reduction can run sequentially or split across rayon workers. For any
//! contiguous partitioning of the input both give the global top-K by score,
//! with ties kept in encounter order:
//!
//! - `push` never lets an equal score overtake an earlier one, so each partial
//!   result holds the earliest-encountered members of every tie run.
//! - `merge` takes from the left list on ties, and the left list always covers
//!   the earlier part of the input.
//! - Every member of the global top-K is in the top-K of its own partition, so
//!   truncating the merge to K loses nothing.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use rayon::prelude::*;
use tracing::{debug, warn};

use super::score::{ScoringContainer, ScoringPolicy};
use crate::model::RideRequest;
use crate::routing::DistanceProvider;

pub const DEFAULT_TOP_K: usize = 3;

/// Above this many scored pairs the reduction runs on the rayon pool.
const PARALLEL_REDUCTION_THRESHOLD: usize = 2_048;

/// Items sorted by descending score, at most `k` of them.
#[derive(Debug, Clone)]
pub struct TopK<T> {
    k: usize,
    entries: Vec<(f64, T)>,
}

impl<T> TopK<T> {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            entries: Vec::with_capacity(k),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert before the first strictly lower score, else append while there is room.
    pub fn push(&mut self, score: f64, item: T) {
        match self.entries.iter().position(|(existing, _)| *existing < score) {
            Some(idx) => {
                self.entries.insert(idx, (score, item));
                self.entries.truncate(self.k);
            }
            None if self.entries.len() < self.k => self.entries.push((score, item)),
            None => {}
        }
    }

    /// Interleave two sorted partial results, left first on ties, truncated to K.
    ///
    /// `self` must come from the earlier part of the input.
    pub fn merge(self, other: TopK<T>) -> TopK<T> {
        let k = self.k;
        let mut merged = Vec::with_capacity(k);
        let mut left = self.entries.into_iter().peekable();
        let mut right = other.entries.into_iter().peekable();

        while merged.len() < k {
            let take_left = match (left.peek(), right.peek()) {
                (Some((l, _)), Some((r, _))) => l >= r,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            let next = if take_left { left.next() } else { right.next() };
            merged.extend(next);
        }

        TopK { k, entries: merged }
    }

    pub fn from_scored(k: usize, scored: impl IntoIterator<Item = (f64, T)>) -> Self {
        scored.into_iter().fold(TopK::new(k), |mut acc, (score, item)| {
            acc.push(score, item);
            acc
        })
    }

    pub fn scores(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|(score, _)| *score)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, item)| item)
    }

    pub fn into_items(self) -> Vec<T> {
        self.entries.into_iter().map(|(_, item)| item).collect()
    }
}

impl<T: Send> TopK<T> {
    /// Same result as [`TopK::from_scored`], reduced on the rayon pool.
    pub fn from_scored_parallel(k: usize, scored: Vec<(f64, T)>) -> Self {
        scored
            .into_par_iter()
            .fold(
                || TopK::new(k),
                |mut acc, (score, item)| {
                    acc.push(score, item);
                    acc
                },
            )
            .reduce(|| TopK::new(k), TopK::merge)
    }
}

/// Scores a driver against candidates and keeps the best K.
pub struct Ranker {
    routing: Arc<dyn DistanceProvider>,
    policy: ScoringPolicy,
    max_concurrent_scores: usize,
}

impl Ranker {
    pub fn new(
        routing: Arc<dyn DistanceProvider>,
        policy: ScoringPolicy,
        max_concurrent_scores: usize,
    ) -> Self {
        Self {
            routing,
            policy,
            max_concurrent_scores: max_concurrent_scores.max(1),
        }
    }

    /// Up to `k` containers, best first. Pairs that cannot be scored are left out.
    pub async fn rank(
        &self,
        driver: &RideRequest,
        candidates: Vec<RideRequest>,
        k: usize,
    ) -> Vec<ScoringContainer> {
        let driver = Arc::new(driver.clone());
        let containers: Vec<ScoringContainer> = candidates
            .into_iter()
            .map(|candidate| ScoringContainer::new(Arc::clone(&driver), candidate))
            .collect();

        // A stream over the borrowing closure is not `Send`; collect first.
        // `buffered` keeps input order, which the tie-break depends on.
        let pending: Vec<_> = containers
            .iter()
            .map(|container| container.score(self.routing.as_ref(), &self.policy))
            .collect();
        let results: Vec<_> = stream::iter(pending)
            .buffered(self.max_concurrent_scores)
            .collect()
            .await;

        let mut scored = Vec::with_capacity(containers.len());
        for (container, result) in containers.into_iter().zip(results) {
            match result {
                Ok(score) => scored.push((score, container)),
                Err(error) => warn!(
                    driver_request = %driver.id,
                    passenger_request = %container.passenger().id,
                    %error,
                    "excluding candidate that could not be scored"
                ),
            }
        }

        let top = if scored.len() >= PARALLEL_REDUCTION_THRESHOLD {
            TopK::from_scored_parallel(k, scored)
        } else {
            TopK::from_scored(k, scored)
        };
        debug!(
            driver_request = %driver.id,
            ranked = top.len(),
            best = ?top.scores().next(),
            "ranked candidates"
        );
        top.into_items()
    }
}
