//! E2E CLI tests for `trellis sync`: idempotent reconciliation from a JSON
//! feed, per-record error counting, and feed resolution.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

fn trellis(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("trellis"));
    cmd.current_dir(dir);
    for key in ["TRELLIS_ACTOR", "TRELLIS_ACTOR_TYPE", "TRELLIS_DB", "TRELLIS_FORMAT"] {
        cmd.env_remove(key);
    }
    cmd.env("XDG_CONFIG_HOME", dir.join(".config"));
    cmd.env("AGENT", "sync-agent");
    cmd.env("TRELLIS_LOG", "error");
    cmd
}

fn init_project() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    trellis(dir.path()).arg("init").assert().success();
    dir
}

fn run_json(cmd: &mut Command) -> Value {
    let output = cmd.arg("--json").output().expect("command should not crash");
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON")
}

const FEED: &str = r#"[
    {"name": "Atlas", "description": "Map tiles", "status": "active", "tags": ["rust"]},
    {"name": "Beacon", "status": "paused"},
    {"name": "Compass"}
]"#;

#[test]
fn second_sync_updates_instead_of_creating() {
    let dir = init_project();
    std::fs::write(dir.path().join("projects.json"), FEED).unwrap();

    let first = run_json(trellis(dir.path()).args(["sync", "--feed", "projects.json"]));
    assert_eq!(first["created"], 3);
    assert_eq!(first["updated"], 0);
    assert_eq!(first["synced"], 3);
    assert_eq!(first["errors"], 0);

    let second = run_json(trellis(dir.path()).args(["sync", "--feed", "projects.json"]));
    assert_eq!(second["created"], 0);
    assert_eq!(second["updated"], 3);
    assert_eq!(second["synced"], 3);

    let projects = run_json(trellis(dir.path()).args(["project", "list", "--source", "knowledge"]));
    assert_eq!(projects.as_array().unwrap().len(), 3);
}

#[test]
fn bad_records_are_counted_not_fatal() {
    let dir = init_project();
    let feed = r#"[
        {"name": "Atlas"},
        {"name": "Beacon", "status": "abandoned"},
        {"status": "active"},
        {"name": "Compass", "status": "shipped"}
    ]"#;
    std::fs::write(dir.path().join("feed.json"), feed).unwrap();

    let result = run_json(trellis(dir.path()).args(["sync", "--feed", "feed.json"]));
    assert_eq!(result["synced"], 2);
    assert_eq!(result["errors"], 2);
    assert_eq!(result["names"], serde_json::json!(["Atlas", "Compass"]));
}

#[test]
fn configured_feed_and_source_are_used() {
    let dir = init_project();
    std::fs::write(dir.path().join("notes.json"), FEED).unwrap();
    std::fs::write(
        dir.path().join(".trellis/config.toml"),
        "[sync]\nsource = \"notes\"\nfeed = \"notes.json\"\n",
    )
    .unwrap();

    let result = run_json(trellis(dir.path()).arg("sync"));
    assert_eq!(result["created"], 3);

    let projects = run_json(trellis(dir.path()).args(["project", "list", "--source", "notes"]));
    assert_eq!(projects.as_array().unwrap().len(), 3);
    assert_eq!(projects[0]["external_source"], "notes");
}

#[test]
fn feed_can_come_from_stdin() {
    let dir = init_project();
    let result = run_json(
        trellis(dir.path())
            .args(["sync", "--feed", "-"])
            .write_stdin(r#"[{"name": "Dial"}]"#),
    );
    assert_eq!(result["created"], 1);
}

#[test]
fn sync_leaves_local_fields_alone() {
    let dir = init_project();
    std::fs::write(dir.path().join("projects.json"), FEED).unwrap();
    run_json(trellis(dir.path()).args(["sync", "--feed", "projects.json"]));

    let projects = run_json(trellis(dir.path()).args(["project", "list"]));
    let atlas = projects
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["name"] == "Atlas")
        .unwrap();
    let id = atlas["id"].as_str().unwrap();
    run_json(trellis(dir.path()).args(["project", "update", id, "--color", "#EF4444"]));

    run_json(trellis(dir.path()).args(["sync", "--feed", "projects.json"]));
    let projects = run_json(trellis(dir.path()).args(["project", "list"]));
    let atlas = projects
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["name"] == "Atlas")
        .unwrap();
    assert_eq!(atlas["id"], id);
    assert_eq!(atlas["color"], "#EF4444");
}

#[test]
fn missing_feed_is_unreadable() {
    let dir = init_project();
    trellis(dir.path())
        .args(["sync", "--feed", "absent.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E6001]"));

    trellis(dir.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--feed"));
}

#[test]
fn broken_config_is_a_config_error() {
    let dir = init_project();
    std::fs::write(dir.path().join(".trellis/config.toml"), "[sync\n").unwrap();
    trellis(dir.path())
        .args(["project", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E1002]"));
}
