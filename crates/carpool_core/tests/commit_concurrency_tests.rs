use std::sync::Arc;
use std::time::Duration;

use carpool_core::error::CommitError;
use carpool_core::matching::{CommitOutcome, MatchCommitter};
use carpool_core::model::RequestStatus;
use carpool_core::store::InMemoryStore;
use carpool_core::test_helpers::{
    driver_request, origin, passenger_request, window, FlakyRequestStore,
};

fn store_with(drivers: usize, passengers: usize) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    for i in 0..drivers {
        store
            .insert_request(driver_request(
                &format!("d{i}"),
                &format!("driver{i}"),
                window(60, 120),
                origin(),
            ))
            .unwrap();
    }
    for i in 0..passengers {
        store
            .insert_request(passenger_request(
                &format!("p{i}"),
                &format!("passenger{i}"),
                window(60, 120),
                origin(),
            ))
            .unwrap();
    }
    store
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contended_passenger_is_committed_exactly_once() {
    let store = store_with(16, 1);
    let committer = Arc::new(MatchCommitter::new(store.clone(), 3, Duration::from_millis(1)));

    let attempts: Vec<_> = (0..16)
        .map(|i| {
            let committer = Arc::clone(&committer);
            tokio::spawn(async move { committer.commit_match(&format!("d{i}"), "p0").await })
        })
        .collect();
    let results = futures::future::join_all(attempts).await;

    let winners: Vec<usize> = results
        .into_iter()
        .enumerate()
        .filter_map(|(i, joined)| joined.unwrap().unwrap().then_some(i))
        .collect();
    assert_eq!(winners.len(), 1, "winners: {winners:?}");

    assert_eq!(store.status_of("p0"), Some(RequestStatus::Matched));
    for i in 0..16 {
        let expected = if i == winners[0] {
            RequestStatus::Matched
        } else {
            RequestStatus::Available
        };
        assert_eq!(store.status_of(&format!("d{i}")), Some(expected), "driver d{i}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disjoint_pairs_all_commit() {
    let store = store_with(8, 8);
    let committer = Arc::new(MatchCommitter::new(store.clone(), 3, Duration::from_millis(1)));

    let attempts: Vec<_> = (0..8)
        .map(|i| {
            let committer = Arc::clone(&committer);
            tokio::spawn(async move {
                committer
                    .commit_pair(&format!("d{i}"), &format!("p{i}"))
                    .await
            })
        })
        .collect();

    for joined in futures::future::join_all(attempts).await {
        assert!(joined.unwrap().unwrap().is_committed());
    }
    for i in 0..8 {
        assert_eq!(store.status_of(&format!("d{i}")), Some(RequestStatus::Matched));
        assert_eq!(store.status_of(&format!("p{i}")), Some(RequestStatus::Matched));
    }
}

#[tokio::test]
async fn driver_taken_elsewhere_restores_passenger() {
    let store = store_with(1, 1);
    let flaky = Arc::new(FlakyRequestStore::new(store.clone()));
    flaky.steal_on_claim("d0");
    let committer = MatchCommitter::new(flaky.clone(), 3, Duration::from_millis(1));

    assert_eq!(
        committer.commit_pair("d0", "p0").await.unwrap(),
        CommitOutcome::DriverUnavailable
    );
    assert_eq!(store.status_of("d0"), Some(RequestStatus::Matched));
    assert_eq!(store.status_of("p0"), Some(RequestStatus::Available));
    assert_eq!(flaky.releases_attempted(), 1);
}

#[tokio::test]
async fn claim_failure_releases_the_side_that_was_claimed() {
    let store = store_with(1, 1);
    let flaky = Arc::new(FlakyRequestStore::new(store.clone()));
    flaky.fail_claims("p0");
    let committer = MatchCommitter::new(flaky.clone(), 3, Duration::from_millis(1));

    let err = committer.commit_pair("d0", "p0").await.unwrap_err();
    assert!(matches!(err, CommitError::Store(_)));
    assert_eq!(store.status_of("d0"), Some(RequestStatus::Available));
    assert_eq!(store.status_of("p0"), Some(RequestStatus::Available));
}

#[tokio::test]
async fn failed_rollback_write_is_a_consistency_gap() {
    let store = store_with(1, 1);
    let flaky = Arc::new(FlakyRequestStore::new(store.clone()));
    flaky.steal_on_claim("p0");
    flaky.fail_releases("d0");
    let committer = MatchCommitter::new(flaky.clone(), 2, Duration::from_millis(1));

    let err = committer.commit_match("d0", "p0").await.unwrap_err();
    match err {
        CommitError::ConsistencyGap { request_id, reason } => {
            assert_eq!(request_id, "d0");
            assert!(reason.contains("still MATCHED"), "{reason}");
            assert!(reason.contains("injected rollback failure"), "{reason}");
        }
        other => panic!("expected a consistency gap, got {other:?}"),
    }
    // The read-back still shows MATCHED, which cannot be told apart from a
    // competitor's claim, so the write is not reissued.
    assert_eq!(flaky.releases_attempted(), 1);
    assert_eq!(store.status_of("d0"), Some(RequestStatus::Matched));
}

#[tokio::test]
async fn unacknowledged_rollback_never_reverts_a_competitors_claim() {
    let store = store_with(1, 1);
    let flaky = Arc::new(FlakyRequestStore::new(store.clone()));
    flaky.steal_on_claim("p0");
    flaky.reclaim_after_release("d0");
    let committer = MatchCommitter::new(flaky.clone(), 3, Duration::from_millis(1));

    let err = committer.commit_match("d0", "p0").await.unwrap_err();
    assert!(
        matches!(&err, CommitError::ConsistencyGap { request_id, .. } if request_id == "d0"),
        "{err:?}"
    );
    assert_eq!(flaky.releases_attempted(), 1);
    assert_eq!(store.status_of("d0"), Some(RequestStatus::Matched));
}

#[tokio::test]
async fn unreadable_rollback_is_a_consistency_gap_after_retried_reads() {
    let store = store_with(1, 1);
    let flaky = Arc::new(FlakyRequestStore::new(store.clone()));
    flaky.steal_on_claim("p0");
    flaky.fail_releases("d0");
    flaky.fail_lookups("d0");
    let committer = MatchCommitter::new(flaky.clone(), 2, Duration::from_millis(1));

    match committer.commit_match("d0", "p0").await.unwrap_err() {
        CommitError::ConsistencyGap { request_id, reason } => {
            assert_eq!(request_id, "d0");
            assert!(reason.contains("injected lookup failure"), "{reason}");
        }
        other => panic!("expected a consistency gap, got {other:?}"),
    }
    assert_eq!(flaky.releases_attempted(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_pair_committed_concurrently_succeeds_exactly_once() {
    let store = store_with(1, 1);
    let committer = Arc::new(MatchCommitter::new(store.clone(), 3, Duration::from_millis(1)));

    let attempts: Vec<_> = (0..16)
        .map(|_| {
            let committer = Arc::clone(&committer);
            tokio::spawn(async move { committer.commit_match("d0", "p0").await })
        })
        .collect();
    let wins = futures::future::join_all(attempts)
        .await
        .into_iter()
        .filter(|joined| *joined.as_ref().unwrap().as_ref().unwrap())
        .count();

    assert_eq!(wins, 1);
    assert_eq!(store.status_of("d0"), Some(RequestStatus::Matched));
    assert_eq!(store.status_of("p0"), Some(RequestStatus::Matched));
}
