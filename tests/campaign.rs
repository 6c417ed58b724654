use std::sync::Arc;
use std::time::Duration;
use tenure::{
    test_utils::{init_tracing, wait_for},
    Coordination, MemCoordination, OwnerManager, BG_OWNER_KEY, OWNER_KEY,
};

const SETTLE: Duration = Duration::from_secs(2);

#[tokio::test]
async fn lone_candidate_becomes_owner_of_both_duties() {
    init_tracing();
    let service = Arc::new(MemCoordination::new());
    let manager = OwnerManager::new(service.clone(), "p1");
    assert_eq!(manager.id(), "p1");
    assert!(!manager.is_owner());
    assert!(!manager.is_background_owner());

    let handles = manager.campaign_owners().await.unwrap();
    assert_eq!(handles.len(), 2);

    let m = manager.clone();
    assert!(wait_for(move || m.is_owner(), SETTLE).await);
    let m = manager.clone();
    assert!(wait_for(move || m.is_background_owner(), SETTLE).await);

    // The recorded winner for both duty keys is this process.
    assert_eq!(service.leader(OWNER_KEY).await.unwrap().value, "p1");
    assert_eq!(service.leader(BG_OWNER_KEY).await.unwrap().value, "p1");

    manager.cancel();
    futures::future::join_all(handles).await;
    assert!(!manager.is_owner());
    assert!(!manager.is_background_owner());
}

#[tokio::test]
async fn exactly_one_of_two_candidates_owns_a_duty() {
    init_tracing();
    let service = Arc::new(MemCoordination::new());
    let p1 = OwnerManager::new(service.clone(), "p1");
    let p2 = OwnerManager::new(service.clone(), "p2");

    let h1 = p1.campaign_owners().await.unwrap();
    let h2 = p2.campaign_owners().await.unwrap();

    // Steady state: some candidate owns the duty.
    let (a, b) = (p1.clone(), p2.clone());
    assert!(wait_for(move || a.is_owner() || b.is_owner(), SETTLE).await);

    // Never both, and never neither once a winner exists.
    for _ in 0..50 {
        assert!(!(p1.is_owner() && p2.is_owner()));
        assert!(!(p1.is_background_owner() && p2.is_background_owner()));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(p1.is_owner() ^ p2.is_owner());

    p1.cancel();
    p2.cancel();
    futures::future::join_all(h1.into_iter().chain(h2)).await;
}

#[tokio::test]
async fn losing_leadership_clears_flag_and_hands_over() {
    init_tracing();
    let service = Arc::new(MemCoordination::new());
    let p1 = OwnerManager::new(service.clone(), "p1");
    let h1 = p1.campaign_owners().await.unwrap();
    let m = p1.clone();
    assert!(wait_for(move || m.is_owner(), SETTLE).await);

    let p2 = OwnerManager::new(service.clone(), "p2");
    let h2 = p2.campaign_owners().await.unwrap();
    // Let p2's campaigns queue up behind p1 before the handover.
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Delete p1's records by expiring its session; its flags must clear and
    // p2 must take over.
    let lease = find_lease_of(&service, "p1").await;
    service.expire_session(lease);

    let m = p2.clone();
    assert!(wait_for(move || m.is_owner(), SETTLE).await);
    let m = p2.clone();
    assert!(wait_for(move || m.is_background_owner(), SETTLE).await);
    assert_eq!(service.leader(OWNER_KEY).await.unwrap().value, "p2");
    assert!(!p1.is_owner());
    assert!(!p1.is_background_owner());

    p1.cancel();
    p2.cancel();
    futures::future::join_all(h1.into_iter().chain(h2)).await;
}

#[tokio::test]
async fn watch_cancellation_forces_a_fresh_campaign() {
    init_tracing();
    let service = Arc::new(MemCoordination::new());
    let manager = OwnerManager::new(service.clone(), "p1");
    let handles = manager.campaign_owners().await.unwrap();
    let m = manager.clone();
    assert!(wait_for(move || m.is_owner(), SETTLE).await);

    // Compaction cancels the watch; the loop re-campaigns and, still being
    // the recorded winner, confirms ownership again.
    let record = service.leader(OWNER_KEY).await.unwrap();
    service.cancel_watch(&record.key);

    let m = manager.clone();
    assert!(wait_for(move || m.is_owner(), SETTLE).await);
    assert_eq!(service.leader(OWNER_KEY).await.unwrap().value, "p1");

    manager.cancel();
    futures::future::join_all(handles).await;
}

/// Lease behind `value`'s primary-duty win in the fake service.
async fn find_lease_of(service: &Arc<MemCoordination>, value: &str) -> tenure::LeaseId {
    let record = service.leader(OWNER_KEY).await.unwrap();
    assert_eq!(record.value, value);
    service.holder_of(OWNER_KEY).unwrap()
}
