use std::sync::Arc;
use std::thread;

use chrono::{Duration, TimeZone, Utc};
use trellis_core::clock::SteppingClock;
use trellis_core::db::{open_store, open_store_in_memory};
use trellis_core::db::query::{
    ActivityFilter, ProjectFilter, find_project_by_external_identity, list_activity, list_projects,
};
use trellis_core::model::project::{ExternalIdentity, Project, ProjectPatch, ProjectStatus};
use trellis_core::{Actor, Coordinator, ExternalProject, ProjectFeed, Reconciler};

fn record(name: &str, status: &str) -> ExternalProject {
    ExternalProject {
        status: Some(status.to_string()),
        description: Some(format!("{name} from the vault")),
        ..ExternalProject::new(name)
    }
}

fn feed() -> Vec<ExternalProject> {
    vec![
        record("Atlas", "active"),
        record("Beacon", "paused"),
        record("Cinder", "idea"),
    ]
}

#[test]
fn second_run_updates_instead_of_creating() {
    let conn = open_store_in_memory().expect("store");
    let reconciler = Reconciler::new(&conn, "knowledge");

    let first = reconciler.reconcile(&feed());
    assert_eq!((first.synced, first.created, first.updated, first.errors), (3, 3, 0, 0));
    assert_eq!(first.names, vec!["Atlas", "Beacon", "Cinder"]);

    let second = reconciler.reconcile(&feed());
    assert_eq!((second.synced, second.created, second.updated, second.errors), (3, 0, 3, 0));

    let projects = list_projects(&conn, &ProjectFilter::default()).expect("list");
    assert_eq!(projects.len(), 3);
    assert!(projects.iter().all(|p| p.external_source.as_deref() == Some("knowledge")));
}

#[test]
fn same_identity_keeps_the_same_row() {
    let conn = open_store_in_memory().expect("store");
    let clock = Arc::new(SteppingClock::new(
        Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap(),
        Duration::minutes(1),
    ));
    let reconciler = Reconciler::with_clock(&conn, "knowledge", clock);
    reconciler.reconcile(&[record("Atlas", "active")]);

    let identity = ExternalIdentity::new("knowledge", "Atlas");
    let original = find_project_by_external_identity(&conn, &identity)
        .expect("lookup")
        .expect("present");

    let mut changed = record("Atlas", "shipped");
    changed.description = Some("now shipped".to_string());
    let result = reconciler.reconcile(&[changed]);
    assert_eq!(result.updated, 1);

    let refreshed = find_project_by_external_identity(&conn, &identity)
        .expect("lookup")
        .expect("present");
    assert_eq!(refreshed.id, original.id);
    assert_eq!(refreshed.created_at, original.created_at);
    assert!(refreshed.updated_at > original.updated_at);
    assert_eq!(refreshed.status, ProjectStatus::Shipped);
    assert_eq!(refreshed.description.as_deref(), Some("now shipped"));
}

#[test]
fn malformed_record_is_skipped_and_counted() {
    let conn = open_store_in_memory().expect("store");
    let reconciler = Reconciler::new(&conn, "knowledge");
    let records = vec![
        record("One", "active"),
        record("Two", "paused"),
        record("Three", "abandoned"),
        record("Four", "shipped"),
        record("Five", "idea"),
    ];

    let result = reconciler.reconcile(&records);
    assert_eq!(result.errors, 1);
    assert_eq!(result.synced, 4);
    assert_eq!(result.created, 4);
    assert_eq!(result.names, vec!["One", "Two", "Four", "Five"]);

    let missing = ExternalIdentity::new("knowledge", "Three");
    assert!(find_project_by_external_identity(&conn, &missing).expect("lookup").is_none());
}

#[test]
fn local_color_survives_sync() {
    let conn = open_store_in_memory().expect("store");
    let reconciler = Reconciler::new(&conn, "knowledge");
    reconciler.reconcile(&[record("Atlas", "active")]);

    let identity = ExternalIdentity::new("knowledge", "Atlas");
    let imported = find_project_by_external_identity(&conn, &identity)
        .expect("lookup")
        .expect("present");
    assert_eq!(imported.color, "#6B7280");

    let coordinator = Coordinator::new(&conn);
    let recolor = ProjectPatch {
        color: Some("#10B981".to_string()),
        ..ProjectPatch::default()
    };
    coordinator
        .apply::<Project>(&imported.id, &recolor, &Actor::human("dana"))
        .expect("recolor");

    reconciler.reconcile(&[record("Atlas", "paused")]);
    let refreshed = find_project_by_external_identity(&conn, &identity)
        .expect("lookup")
        .expect("present");
    assert_eq!(refreshed.color, "#10B981");
    assert_eq!(refreshed.status, ProjectStatus::Paused);
}

#[test]
fn sources_do_not_collide() {
    let conn = open_store_in_memory().expect("store");
    Reconciler::new(&conn, "knowledge").reconcile(&[record("Atlas", "active")]);
    let other = Reconciler::new(&conn, "roadmap").reconcile(&[record("Atlas", "idea")]);
    assert_eq!(other.created, 1);

    let filter = ProjectFilter {
        external_source: Some("roadmap".to_string()),
        ..ProjectFilter::default()
    };
    assert_eq!(list_projects(&conn, &filter).expect("list").len(), 1);
    assert_eq!(list_projects(&conn, &ProjectFilter::default()).expect("list").len(), 2);
}

#[test]
fn sync_writes_no_activity() {
    let conn = open_store_in_memory().expect("store");
    let reconciler = Reconciler::new(&conn, "knowledge");
    let result = reconciler.sync_from(&feed()).expect("sync");
    assert_eq!(result.synced, 3);
    assert!(list_activity(&conn, &ActivityFilter::default()).expect("activity").is_empty());
}

struct BrokenFeed;

impl ProjectFeed for BrokenFeed {
    fn records(&self) -> anyhow::Result<Vec<ExternalProject>> {
        anyhow::bail!("vault unreachable")
    }
}

#[test]
fn unreadable_feed_is_an_error() {
    let conn = open_store_in_memory().expect("store");
    let err = Reconciler::new(&conn, "knowledge").sync_from(&BrokenFeed).unwrap_err();
    assert!(format!("{err:#}").contains("vault unreachable"));
}

#[test]
fn locked_store_counts_records_as_errors() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("trellis.sqlite3");
    let holder = open_store(&path).expect("open holder");
    let conn = open_store(&path).expect("open syncer");
    conn.busy_timeout(std::time::Duration::from_millis(20))
        .expect("busy timeout");
    let reconciler = Reconciler::new(&conn, "knowledge");

    holder.execute_batch("BEGIN IMMEDIATE").expect("take write lock");
    let blocked = reconciler.reconcile(&feed());
    assert_eq!((blocked.synced, blocked.created, blocked.updated, blocked.errors), (0, 0, 0, 3));
    assert!(blocked.names.is_empty());

    holder.execute_batch("ROLLBACK").expect("release write lock");
    let retried = reconciler.reconcile(&feed());
    assert_eq!((retried.synced, retried.created, retried.updated, retried.errors), (3, 3, 0, 0));
}

#[test]
fn concurrent_syncs_keep_one_row_per_identity() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("trellis.sqlite3");
    let connections = [
        open_store(&path).expect("open first"),
        open_store(&path).expect("open second"),
    ];

    let handles: Vec<_> = connections
        .into_iter()
        .map(|conn| thread::spawn(move || Reconciler::new(&conn, "knowledge").reconcile(&feed())))
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("sync thread"))
        .collect();

    assert!(results.iter().all(|result| result.errors == 0 && result.synced == 3));
    assert_eq!(results.iter().map(|result| result.created).sum::<usize>(), 3);
    assert_eq!(results.iter().map(|result| result.updated).sum::<usize>(), 3);

    let conn = open_store(&path).expect("reopen");
    assert_eq!(list_projects(&conn, &ProjectFilter::default()).expect("list").len(), 3);
}
