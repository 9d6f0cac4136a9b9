//! End-to-end check-in flows through `CheckInService`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

use checkin_core::environment::Clock;
use checkin_guests::mocks::{InMemoryGuestBackend, InMemorySnapshotCache};
use checkin_guests::{
    CheckInService, FileSnapshotCache, GuestEnvironment, ScanResult, ScanStatus, ServiceConfig,
    SnapshotCache,
    SnapshotSource,
};
use checkin_testing::{test_clock, SequentialIdGenerator};
use std::sync::Arc;
use std::time::Duration;

fn environment(cache: Arc<dyn SnapshotCache>) -> GuestEnvironment {
    GuestEnvironment::new(Arc::new(test_clock()), Arc::new(SequentialIdGenerator::new()), cache)
}

fn online_station(backend: &InMemoryGuestBackend) -> CheckInService {
    let env = environment(Arc::new(InMemorySnapshotCache::new()))
        .with_backend(Arc::new(backend.clone()));
    CheckInService::new(env, ServiceConfig::default())
}

fn local_station(cache: &InMemorySnapshotCache) -> CheckInService {
    CheckInService::new(environment(Arc::new(cache.clone())), ServiceConfig::default())
}

#[tokio::test]
async fn ana_lee_scenario_with_backend() {
    let backend = InMemoryGuestBackend::new();
    let station = online_station(&backend);

    let ana = station.register("Ana", "Lee", "ana@x.com").await.unwrap();
    assert!(!ana.scanned);
    assert!(ana.scanned_at.is_none());
    assert_eq!(backend.guests().len(), 1);

    let first = station.check_in(ana.id.as_str()).await;
    assert_eq!(first, ScanResult::confirmed("Ana Lee".into(), false));

    let second = station.check_in(ana.id.as_str()).await;
    assert_eq!(second.status, ScanStatus::Warning);
    assert_eq!(second.full_name.as_deref(), Some("Ana Lee"));
    assert!(!second.success);

    let unknown = station.check_in("nonexistent").await;
    assert_eq!(unknown, ScanResult::not_found());

    assert!(backend.guests()[0].scanned);
    station.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn ana_lee_scenario_on_local_only_station() {
    let cache = InMemorySnapshotCache::new();
    let station = local_station(&cache);

    let ana = station.register("Ana", "Lee", "ana@x.com").await.unwrap();
    assert_eq!(station.unsynced_registrations().await, vec![ana.id.clone()]);

    let first = station.check_in(ana.id.as_str()).await;
    assert!(first.success);
    assert!(first.local_only);

    let second = station.check_in(ana.id.as_str()).await;
    assert_eq!(second, ScanResult::already_scanned("Ana Lee".into()));
    assert_eq!(station.unsynced_check_ins().await, vec![ana.id.clone()]);

    station.shutdown(Duration::from_secs(1)).await.unwrap();
    assert!(cache.stored().unwrap()[0].scanned);
}

#[tokio::test]
async fn repeated_scans_never_move_scanned_at() {
    let backend = InMemoryGuestBackend::new();
    let station = online_station(&backend);
    let ana = station.register("Ana", "Lee", "ana@x.com").await.unwrap();

    station.check_in(ana.id.as_str()).await;
    let checked_in_at = station.snapshot().await[0].scanned_at;
    assert_eq!(checked_in_at, Some(test_clock().now()));

    for _ in 0..3 {
        let again = station.check_in(ana.id.as_str()).await;
        assert_eq!(again, ScanResult::already_scanned("Ana Lee".into()));
        assert_eq!(station.snapshot().await[0].scanned_at, checked_in_at);
    }
}

#[tokio::test]
async fn short_code_behaves_like_full_id() {
    let backend = InMemoryGuestBackend::new();
    let station = online_station(&backend);
    let ana = station.register("Ana", "Lee", "ana@x.com").await.unwrap();

    let by_short = station.check_in(&format!("  {}\n", ana.id.short_code())).await;
    assert_eq!(by_short, ScanResult::confirmed("Ana Lee".into(), false));

    let by_full = station.check_in(ana.id.as_str()).await;
    assert_eq!(by_full, ScanResult::already_scanned("Ana Lee".into()));
}

#[tokio::test]
async fn partial_code_checks_nobody_in() {
    let backend = InMemoryGuestBackend::new();
    let desk = online_station(&backend);
    let door = online_station(&backend);
    let ana = desk.register("Ana", "Lee", "ana@x.com").await.unwrap();
    let partial = &ana.id.as_str()[..3];

    assert_eq!(desk.check_in(partial).await, ScanResult::not_found());
    assert_eq!(door.check_in(partial).await, ScanResult::not_found());
    assert_eq!(door.check_in(&ana.id.as_str()[..7]).await, ScanResult::not_found());

    assert_eq!(backend.lookups(), 0);
    assert!(!backend.guests()[0].scanned);
    assert!(!desk.snapshot().await[0].scanned);
    assert!(door.snapshot().await.is_empty());
}

#[tokio::test]
async fn backend_lookup_ignores_partial_prefixes() {
    use checkin_guests::GuestBackend;

    let backend = InMemoryGuestBackend::new();
    let ana = online_station(&backend).register("Ana", "Lee", "ana@x.com").await.unwrap();

    let partial = backend.find_by_id_or_prefix(ana.id.as_str()[..3].to_string()).await.unwrap();
    let short = backend.find_by_id_or_prefix(ana.id.short_code().to_string()).await.unwrap();

    assert_eq!(partial, None);
    assert_eq!(short.map(|guest| guest.id), Some(ana.id));
}

#[tokio::test]
async fn two_stations_racing_yield_one_success() {
    let backend = InMemoryGuestBackend::new();
    let north = online_station(&backend);
    let south = online_station(&backend);

    let ana = north.register("Ana", "Lee", "ana@x.com").await.unwrap();
    south.fetch_all().await;

    let (a, b) = tokio::join!(north.check_in(ana.id.as_str()), south.check_in(ana.id.as_str()));

    let successes = [&a, &b].iter().filter(|r| r.status == ScanStatus::Success).count();
    let warnings = [&a, &b].iter().filter(|r| r.status == ScanStatus::Warning).count();
    assert_eq!((successes, warnings), (1, 1), "north: {a:?}, south: {b:?}");

    assert!(north.snapshot().await[0].scanned);
    assert!(south.snapshot().await[0].scanned);
}

#[tokio::test]
async fn scan_on_second_station_finds_guest_remotely() {
    let backend = InMemoryGuestBackend::new();
    let desk = online_station(&backend);
    let door = online_station(&backend);

    let ana = desk.register("Ana", "Lee", "ana@x.com").await.unwrap();

    let result = door.check_in(ana.id.short_code()).await;
    assert_eq!(result, ScanResult::confirmed("Ana Lee".into(), false));
    assert_eq!(door.snapshot().await.len(), 1);
    assert_eq!(backend.lookups(), 1);
}

#[tokio::test]
async fn outage_falls_back_to_snapshot_and_refuses_to_fake_success() {
    let dir = tempfile::tempdir().unwrap();
    let backend = InMemoryGuestBackend::new();

    let env = environment(Arc::new(FileSnapshotCache::new(dir.path())))
        .with_backend(Arc::new(backend.clone()));
    let before = CheckInService::new(env, ServiceConfig::default());
    let ana = before.register("Ana", "Lee", "ana@x.com").await.unwrap();
    before.shutdown(Duration::from_secs(1)).await.unwrap();

    backend.set_available(false);
    let env = environment(Arc::new(FileSnapshotCache::new(dir.path())))
        .with_backend(Arc::new(backend.clone()));
    let station = CheckInService::new(env, ServiceConfig::default());

    let report = station.fetch_all().await;
    assert_eq!(report.source, SnapshotSource::Cache);
    assert_eq!(report.guests, vec![ana.clone()]);
    assert!(report.degraded_reason.is_some());
    assert!(!station.is_online().await);

    let during = station.check_in(ana.id.as_str()).await;
    assert_eq!(during, ScanResult::retry());
    assert!(!station.snapshot().await[0].scanned);

    backend.set_available(true);
    let after = station.check_in(ana.id.as_str()).await;
    assert_eq!(after.status, ScanStatus::Success);
    assert!(station.is_online().await);
    assert!(station.last_error().await.is_none());
}

#[tokio::test]
async fn duplicate_email_is_a_validation_error() {
    let backend = InMemoryGuestBackend::new();
    let station = online_station(&backend);

    station.register("Ana", "Lee", "ana@x.com").await.unwrap();
    let duplicate = station.register("Ana", "Lee", "ana@x.com").await;

    assert!(matches!(duplicate, Err(checkin_guests::GuestError::Validation(_))));
    assert_eq!(station.snapshot().await.len(), 1);
}

#[tokio::test]
async fn overlapping_fetches_each_get_a_report() {
    let backend = InMemoryGuestBackend::new();
    let desk = online_station(&backend);
    desk.register("Ana", "Lee", "ana@x.com").await.unwrap();

    let door = online_station(&backend);
    let (first, second) = tokio::join!(door.fetch_all(), door.fetch_all());

    for report in [first, second] {
        assert_eq!(report.source, SnapshotSource::Remote);
        assert_eq!(report.degraded_reason, None);
        assert_eq!(report.guests.len(), 1);
    }
}

#[tokio::test]
async fn newest_registration_is_listed_first() {
    let cache = InMemorySnapshotCache::new();
    let station = local_station(&cache);

    station.register("Ana", "Lee", "ana@x.com").await.unwrap();
    station.register("Bo", "Kim", "bo@x.com").await.unwrap();

    let names: Vec<_> = station.snapshot().await.iter().map(|g| g.full_name()).collect();
    assert_eq!(names, vec!["Bo Kim", "Ana Lee"]);
}

#[tokio::test]
async fn last_scan_can_be_cleared() {
    let station = local_station(&InMemorySnapshotCache::new());

    station.check_in("nobody").await;
    assert_eq!(station.last_scan().await, Some(ScanResult::not_found()));

    station.clear_scan_result().await;
    assert!(station.last_scan().await.is_none());
}

#[tokio::test]
async fn calls_after_shutdown_degrade_instead_of_failing() {
    let station = local_station(&InMemorySnapshotCache::new());
    station.shutdown(Duration::from_secs(1)).await.unwrap();

    assert_eq!(station.check_in("anything").await, ScanResult::retry());
    assert!(station.register("Ana", "Lee", "ana@x.com").await.is_err());
}
