// Debounced route-table writes and the session's persistence behaviour.
// Time is paused so debounce windows elapse deterministically.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use greenroute_core::{config::SyncConfig, JobId};
use greenroute_scheduler::{
    CompletionOutcome, Job, JobFailure, MemoryRouteStore, PushRequest, PushScope, PushTarget,
    PushUnit, RawWeeklyRoutes, RecurrencePattern, RouteSlot, RouteSynchronizer, SchedulingSession,
    SchedulingStore, Weekday,
};

const DEBOUNCE_MS: u64 = 1_000;

fn config() -> SyncConfig {
    SyncConfig {
        debounce_ms: DEBOUNCE_MS,
        ..SyncConfig::default()
    }
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[tokio::test(start_paused = true)]
async fn bursts_of_mutations_coalesce_into_one_write() {
    let backend = Arc::new(MemoryRouteStore::default());
    let mut sync = RouteSynchronizer::spawn(backend.clone(), &config());
    let mut store = SchedulingStore::new();

    for i in 0..5 {
        store.create_route(Weekday::Monday, Some(format!("extra {i}")));
        sync.schedule(store.to_record());
        tokio::time::sleep(ms(200)).await;
    }
    // Each snapshot restarted the window.
    assert_eq!(backend.route_saves(), 0);
    assert!(sync.is_dirty());

    let mut status = sync.status();
    status.wait_for(|s| s.flushed == 5).await.unwrap();
    assert_eq!(backend.route_saves(), 1);
    assert!(!sync.is_dirty());

    let written = backend.last_record().await.unwrap();
    assert_eq!(written.days[&Weekday::Monday].len(), 6);
}

#[tokio::test(start_paused = true)]
async fn failed_flush_is_reported_and_retry_succeeds() {
    let backend = Arc::new(MemoryRouteStore::default());
    backend.set_fail_route_saves(true);
    let mut sync = RouteSynchronizer::spawn(backend.clone(), &config());
    let record = SchedulingStore::new().to_record();

    let generation = sync.schedule(record.clone());
    let mut status = sync.status();
    status
        .wait_for(|s| s.last_error.is_some())
        .await
        .unwrap();
    let failure = status.borrow().last_error.clone().unwrap();
    assert_eq!(failure.generation, generation);
    assert!(sync.is_dirty());
    assert_eq!(backend.route_saves(), 0);

    backend.set_fail_route_saves(false);
    sync.flush_now(record).await.unwrap();
    assert_eq!(backend.route_saves(), 1);
    assert!(status.borrow().last_error.is_none());
    assert!(!sync.is_dirty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_writes_the_pending_snapshot() {
    let backend = Arc::new(MemoryRouteStore::default());
    let mut sync = RouteSynchronizer::spawn(backend.clone(), &config());
    sync.schedule(SchedulingStore::new().to_record());
    tokio::time::sleep(ms(10)).await;
    assert_eq!(backend.route_saves(), 0);

    sync.shutdown().await;
    assert_eq!(backend.route_saves(), 1);
}

fn seeded_backend() -> Arc<MemoryRouteStore> {
    let at = Utc.with_ymd_and_hms(2026, 8, 3, 7, 0, 0).unwrap();
    let jobs = vec![
        Job::recurring("Mow", RecurrencePattern::Weekly)
            .unwrap()
            .with_id("mow")
            .with_last_service_date(at),
        Job::recurring("Hedges", RecurrencePattern::Monthly)
            .unwrap()
            .with_id("hedge")
            .with_last_service_date(at),
        Job::one_time("Mulch").with_id("mulch"),
    ];
    let raw: RawWeeklyRoutes = serde_json::from_str(
        r#"{ "Monday": [{ "index": 0, "jobs": ["mow", "hedge", "ghost"] }] }"#,
    )
    .unwrap();
    Arc::new(MemoryRouteStore::new(jobs, raw))
}

#[tokio::test(start_paused = true)]
async fn session_hydrates_repairs_and_persists_mutations() {
    let backend = seeded_backend();
    let (mut session, report) = SchedulingSession::hydrate(backend.clone(), &config())
        .await
        .unwrap();
    assert_eq!(report.stale_references.len(), 1);
    // The repaired table is queued for writing.
    assert!(session.is_dirty());

    // Tuesday had no routes in storage.
    assert!(session.store().table().routes(Weekday::Tuesday).is_empty());
    let tue = session.create_route(Weekday::Tuesday, None);
    session
        .move_from_pool_to_route(&JobId::from("mulch"), tue)
        .unwrap();
    session
        .assign_owner(tue, greenroute_scheduler::OwnerKind::Employee, "emp-7")
        .unwrap();

    let mut status = session.sync_status();
    status.wait_for(|s| s.flushed >= 4).await.unwrap();
    assert_eq!(backend.route_saves(), 1);

    let written = backend.last_record().await.unwrap();
    let monday = &written.days[&Weekday::Monday][0];
    assert_eq!(monday.jobs, vec![JobId::from("mow"), JobId::from("hedge")]);
    let tuesday = &written.days[&Weekday::Tuesday][0];
    assert_eq!(tuesday.jobs, vec![JobId::from("mulch")]);
    assert_eq!(tuesday.employee_id.as_ref().map(|e| e.as_str()), Some("emp-7"));

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn job_write_failure_keeps_local_change_and_is_reported_per_job() {
    let backend = seeded_backend();
    backend.fail_job_saves("hedge").await;
    let (mut session, _) = SchedulingSession::hydrate(backend.clone(), &config())
        .await
        .unwrap();

    let now = Utc.with_ymd_and_hms(2026, 9, 10, 12, 0, 0).unwrap();
    let ids = [JobId::from("mow"), JobId::from("hedge")];
    let CompletionOutcome::Completed { report } = session.complete_jobs(&ids, now, None).await
    else {
        panic!("both jobs are due");
    };
    assert!(report.outcome(&ids[0]).unwrap().is_ok());
    assert!(matches!(
        report.outcome(&ids[1]),
        Some(Err(JobFailure::Persistence { .. }))
    ));

    // In-memory state is the source of truth either way.
    assert_eq!(session.store().job(&ids[1]).unwrap().completion_count, 1);
    assert_eq!(backend.stored_job(&ids[0]).await.unwrap().completion_count, 1);
    assert_eq!(backend.stored_job(&ids[1]).await.unwrap().completion_count, 0);

    backend.clear_job_failures().await;
    let push = PushRequest {
        target: PushTarget::Route {
            slot: RouteSlot::new(Weekday::Monday, 0),
        },
        count: 1,
        unit: PushUnit::Week,
        scope: PushScope::Single,
    };
    let pushed = session.push(&push).await.unwrap();
    assert!(pushed.report.all_succeeded());
    let stored = backend.stored_job(&ids[1]).await.unwrap();
    assert_eq!(stored.last_service_date, Some(now + chrono::Duration::days(7)));

    session.flush_now().await.unwrap();
    assert!(!session.is_dirty());
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn deleted_jobs_stay_deleted_after_reload() {
    let backend = seeded_backend();
    let (mut session, _) = SchedulingSession::hydrate(backend.clone(), &config())
        .await
        .unwrap();

    // One pool job and one assigned job.
    session.delete_job(&JobId::from("mulch")).await.unwrap();
    session.delete_job(&JobId::from("mow")).await.unwrap();
    assert!(backend.stored_job(&JobId::from("mulch")).await.is_none());
    assert!(backend.stored_job(&JobId::from("mow")).await.is_none());
    session.flush_now().await.unwrap();
    session.shutdown().await;

    let (reloaded, report) = SchedulingSession::hydrate(backend.clone(), &config())
        .await
        .unwrap();
    assert!(report.is_clean());
    assert!(reloaded.store().pool_ids().is_empty());
    assert!(reloaded.store().job(&JobId::from("mulch")).is_none());
    assert!(reloaded.store().job(&JobId::from("mow")).is_none());
    let monday = reloaded.store().table().routes(Weekday::Monday);
    assert_eq!(monday[0].jobs(), &[JobId::from("hedge")]);
    reloaded.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn normalized_job_records_are_written_back_on_hydrate() {
    let mut odd = Job::one_time("Aerate").with_id("aerate");
    odd.recurrence = RecurrencePattern::Weekly;
    let backend = Arc::new(MemoryRouteStore::new(vec![odd], RawWeeklyRoutes::default()));

    let (session, report) = SchedulingSession::hydrate(backend.clone(), &config())
        .await
        .unwrap();
    assert_eq!(report.normalized_jobs, vec![JobId::from("aerate")]);

    let stored = backend.stored_job(&JobId::from("aerate")).await.unwrap();
    assert_eq!(stored.recurrence, RecurrencePattern::None);
    session.shutdown().await;
}
