//! CLI integration tests for the timeline binary
//!
//! These tests drive complete workflows from workspace initialization
//! through item transitions, analysis and notifications.

use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Get a command instance for the timeline binary
fn timeline_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("timeline"));
    cmd.env_remove("TIMELINE_ID").env_remove("RUST_LOG");
    cmd
}

/// Command running inside the given workspace
fn in_dir(dir: &Path) -> assert_cmd::Command {
    let mut cmd = timeline_cmd();
    cmd.current_dir(dir);
    cmd
}

/// Create a temporary directory and initialize a workspace
fn setup_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    timeline_cmd().arg("init").arg(dir.path()).assert().success();
    dir
}

/// Workspace with one timeline holding build -> deploy -> ga
fn setup_release() -> TempDir {
    let dir = setup_workspace();
    let path = dir.path();

    in_dir(path)
        .args(["new", "Release v1", "--id", "tl-release"])
        .assert()
        .success();
    in_dir(path)
        .args(["stage", "add", "Build", "--id", "build", "--priority", "high"])
        .assert()
        .success();
    in_dir(path)
        .args(["stage", "add", "Deploy", "--id", "deploy"])
        .assert()
        .success();
    in_dir(path)
        .args(["milestone", "add", "GA", "--id", "ga", "--target", "2030-01-01"])
        .assert()
        .success();
    in_dir(path)
        .args(["dep", "add", "deploy", "build"])
        .assert()
        .success();
    in_dir(path)
        .args(["dep", "add", "ga", "deploy"])
        .assert()
        .success();
    dir
}

fn json_stdout(cmd: &mut assert_cmd::Command) -> serde_json::Value {
    let assert = cmd.assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    serde_json::from_str(stdout.trim()).unwrap()
}

fn ids(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["id"].as_str().unwrap().to_string())
        .collect()
}

// =============================================================================
// Workspace Tests
// =============================================================================

#[test]
fn test_init_creates_structure() {
    let dir = TempDir::new().unwrap();

    timeline_cmd()
        .arg("init")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized timeline workspace"));

    assert!(dir.path().join(".timeline/timelines").is_dir());
    assert!(dir.path().join(".timeline/config.toml").is_file());
    assert!(dir.path().join(".timeline/.gitignore").is_file());
}

#[test]
fn test_init_is_idempotent() {
    let dir = TempDir::new().unwrap();

    timeline_cmd().arg("init").arg(dir.path()).assert().success();
    timeline_cmd().arg("init").arg(dir.path()).assert().success();
}

#[test]
fn test_commands_outside_workspace_fail() {
    let dir = TempDir::new().unwrap();

    in_dir(dir.path())
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not in a timeline workspace"));
}

// =============================================================================
// Timeline Tests
// =============================================================================

#[test]
fn test_new_and_list() {
    let dir = setup_workspace();

    let created = json_stdout(in_dir(dir.path()).args(["new", "Release v1", "--format", "json"]));
    let id = created["id"].as_str().unwrap();
    assert!(id.starts_with("tl-"));
    assert!(dir
        .path()
        .join(format!(".timeline/timelines/{}.json", id))
        .is_file());

    in_dir(dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Release v1"));
}

#[test]
fn test_new_records_release_label() {
    let dir = setup_workspace();

    in_dir(dir.path())
        .args(["new", "Spring launch", "--id", "tl-spring", "--release", "2.4.0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created timeline: tl-spring"));

    let doc = json_stdout(in_dir(dir.path()).args(["show", "--format", "json"]));
    assert_eq!(doc["version"], "2.4.0");

    timeline_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_duplicate_timeline_id_is_rejected() {
    let dir = setup_workspace();

    in_dir(dir.path())
        .args(["new", "One", "--id", "tl-one"])
        .assert()
        .success();
    in_dir(dir.path())
        .args(["new", "Again", "--id", "tl-one"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_commands_need_a_timeline() {
    let dir = setup_workspace();

    in_dir(dir.path())
        .arg("ready")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No timelines yet"));
}

#[test]
fn test_several_timelines_need_selection() {
    let dir = setup_workspace();
    in_dir(dir.path())
        .args(["new", "First", "--id", "tl-first"])
        .assert()
        .success();
    in_dir(dir.path())
        .args(["new", "Second", "--id", "tl-second"])
        .assert()
        .success();

    in_dir(dir.path())
        .args(["stage", "add", "Build"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--timeline"));

    in_dir(dir.path())
        .args(["-t", "tl-second", "stage", "add", "Build", "--id", "build"])
        .assert()
        .success();

    in_dir(dir.path())
        .env("TIMELINE_ID", "tl-second")
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"));
}

#[test]
fn test_show_lists_items_and_dependencies() {
    let dir = setup_release();

    in_dir(dir.path())
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("Release v1"))
        .stdout(predicate::str::contains("FS:build"))
        .stdout(predicate::str::contains("milestone"));
}

#[test]
fn test_show_json_uses_camel_case() {
    let dir = setup_release();

    let doc = json_stdout(in_dir(dir.path()).args(["show", "--format", "json"]));
    assert_eq!(doc["id"], "tl-release");
    assert!(doc["createdAt"].is_string());
    assert_eq!(doc["stages"].as_array().unwrap().len(), 2);
    assert_eq!(doc["milestones"][0]["plannedEndDate"], "2030-01-01T00:00:00Z");
}

#[test]
fn test_delete_timeline() {
    let dir = setup_release();

    in_dir(dir.path())
        .args(["delete", "tl-release"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted timeline"));

    in_dir(dir.path())
        .args(["delete", "tl-release"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_timeline_launch_and_finish() {
    let dir = setup_release();

    in_dir(dir.path()).arg("finish").assert().failure();
    in_dir(dir.path()).arg("launch").assert().success();
    in_dir(dir.path())
        .arg("launch")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot start timeline"));
    in_dir(dir.path())
        .arg("finish")
        .assert()
        .success()
        .stdout(predicate::str::contains("Completed timeline tl-release"));
}

// =============================================================================
// Transition Tests
// =============================================================================

#[test]
fn test_dependencies_gate_transitions() {
    let dir = setup_release();
    let path = dir.path();

    let ready = json_stdout(in_dir(path).args(["ready", "--format", "json"]));
    assert_eq!(ids(&ready), vec!["build"]);

    in_dir(path)
        .args(["start", "deploy"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("waiting on build"));

    in_dir(path).args(["start", "build"]).assert().success();
    in_dir(path)
        .args(["complete", "build"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Completed build"));

    let ready = json_stdout(in_dir(path).args(["ready", "--format", "json"]));
    assert_eq!(ids(&ready), vec!["deploy"]);

    in_dir(path)
        .args(["reach", "ga"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("waiting on deploy"));

    in_dir(path).args(["start", "deploy"]).assert().success();
    in_dir(path).args(["complete", "deploy"]).assert().success();
    in_dir(path)
        .args(["reach", "ga"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Reached ga"));
}

#[test]
fn test_illegal_transition_is_rejected() {
    let dir = setup_release();

    in_dir(dir.path())
        .args(["complete", "build"])
        .assert()
        .failure();
    in_dir(dir.path())
        .args(["resume", "build"])
        .assert()
        .failure();
}

#[test]
fn test_pause_and_resume() {
    let dir = setup_release();
    let path = dir.path();

    in_dir(path).args(["start", "build"]).assert().success();
    in_dir(path)
        .args(["pause", "build", "--reason", "incident"])
        .assert()
        .success();

    let status = json_stdout(in_dir(path).args(["resume", "build", "--format", "json"]));
    assert_eq!(status["status"], "in_progress");
}

#[test]
fn test_delay_rejects_bad_dates() {
    let dir = setup_release();

    in_dir(dir.path())
        .args(["delay", "ga", "next tuesday"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid date"));

    in_dir(dir.path())
        .args(["delay", "ga", "2030-02-01", "--reason", "freeze"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Delayed ga"));
}

#[test]
fn test_fail_and_cancel() {
    let dir = setup_release();
    let path = dir.path();

    in_dir(path).args(["start", "build"]).assert().success();
    in_dir(path)
        .args(["fail", "build", "--reason", "tests red"])
        .assert()
        .success();
    in_dir(path)
        .args(["cancel", "deploy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cancelled deploy"));
    in_dir(path)
        .args(["miss", "ga"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Missed ga"));
}

// =============================================================================
// Dependency Tests
// =============================================================================

#[test]
fn test_cycles_are_rejected_by_default() {
    let dir = setup_release();

    in_dir(dir.path())
        .args(["dep", "add", "build", "ga"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cycle"));
}

#[test]
fn test_cycles_allowed_when_eager_check_is_off() {
    let dir = setup_release();
    let config_path = dir.path().join(".timeline/config.toml");
    let config = fs::read_to_string(&config_path).unwrap();
    fs::write(
        &config_path,
        config.replace("eager_cycle_check = true", "eager_cycle_check = false"),
    )
    .unwrap();

    in_dir(dir.path())
        .args(["dep", "add", "build", "ga"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Dependency cycle"));

    in_dir(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("cycle"));

    in_dir(dir.path()).arg("critical-path").assert().failure();
    in_dir(dir.path())
        .arg("estimate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot estimate"));
}

#[test]
fn test_dep_remove() {
    let dir = setup_release();
    let path = dir.path();

    in_dir(path)
        .args(["dep", "remove", "deploy", "build"])
        .assert()
        .success();
    in_dir(path)
        .args(["dep", "remove", "deploy", "build"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not depend on"));

    let ready = json_stdout(in_dir(path).args(["ready", "--format", "json"]));
    assert_eq!(ids(&ready), vec!["build", "deploy"]);
}

#[test]
fn test_advisory_dependency_does_not_block() {
    let dir = setup_workspace();
    let path = dir.path();
    in_dir(path).args(["new", "Docs"]).assert().success();
    in_dir(path)
        .args(["stage", "add", "Write", "--id", "write"])
        .assert()
        .success();
    in_dir(path)
        .args(["stage", "add", "Review", "--id", "review"])
        .assert()
        .success();
    in_dir(path)
        .args(["dep", "add", "review", "write", "--advisory"])
        .assert()
        .success();

    in_dir(path).args(["start", "review"]).assert().success();
}

// =============================================================================
// Analysis Tests
// =============================================================================

#[test]
fn test_tasks_drive_progress_and_critical_path() {
    let dir = setup_release();
    let path = dir.path();

    in_dir(path)
        .args(["task", "add", "build", "Compile", "--estimate", "8"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added task task-1"));
    in_dir(path)
        .args(["task", "add", "deploy", "Roll out", "--estimate", "16"])
        .assert()
        .success();
    in_dir(path)
        .args(["task", "done", "build", "task-1", "--hours", "6"])
        .assert()
        .success()
        .stdout(predicate::str::contains("100% of tasks done"));

    let path_json = json_stdout(in_dir(path).args(["critical-path", "--format", "json"]));
    let items: Vec<&str> = path_json["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    // ga adds no duration, so the earlier deploy ends the path
    assert_eq!(items, vec!["build", "deploy"]);
    assert_eq!(path_json["totalHours"], 24.0);

    let progress = json_stdout(in_dir(path).args([
        "progress",
        "--strategy",
        "time",
        "--format",
        "json",
    ]));
    let overall = progress["overall"].as_f64().unwrap();
    assert!((overall - 100.0 / 3.0).abs() < 1e-6);
    assert_eq!(progress["milestones"]["ga"], false);
}

#[test]
fn test_task_add_records_assignee_and_estimate() {
    let dir = setup_release();

    in_dir(dir.path())
        .args([
            "task",
            "add",
            "build",
            "Sign artifacts",
            "--id",
            "sign",
            "--estimate",
            "3",
            "--assignee",
            "dana",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added task sign to build"));

    let doc = json_stdout(in_dir(dir.path()).args(["show", "--format", "json"]));
    let build = doc["stages"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["id"] == "build")
        .unwrap();
    assert_eq!(build["tasks"][0]["id"], "sign");
    assert_eq!(build["tasks"][0]["assignee"], "dana");
    assert_eq!(build["tasks"][0]["estimatedHours"], 3.0);
}

#[test]
fn test_progress_strategy_can_be_saved() {
    let dir = setup_release();

    in_dir(dir.path())
        .args(["progress", "--strategy", "priority", "--save"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(priority)"));

    let config = fs::read_to_string(dir.path().join(".timeline/config.toml")).unwrap();
    assert!(config.contains("progress_strategy = \"priority\""));

    in_dir(dir.path())
        .arg("progress")
        .assert()
        .success()
        .stdout(predicate::str::contains("(priority)"));
}

#[test]
fn test_next_prefers_priority() {
    let dir = setup_workspace();
    let path = dir.path();
    in_dir(path).args(["new", "Parallel"]).assert().success();
    in_dir(path)
        .args(["stage", "add", "Docs", "--id", "docs", "--priority", "low"])
        .assert()
        .success();
    in_dir(path)
        .args(["stage", "add", "Hotfix", "--id", "hotfix", "--priority", "critical"])
        .assert()
        .success();

    let next = json_stdout(in_dir(path).args(["next", "--limit", "1", "--format", "json"]));
    assert_eq!(ids(&next), vec!["hotfix"]);
}

#[test]
fn test_validate_reports_warnings_but_succeeds() {
    let dir = setup_release();

    in_dir(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("warning:"))
        .stdout(predicate::str::contains("is valid"));

    let report = json_stdout(in_dir(dir.path()).args(["validate", "--format", "json"]));
    assert_eq!(report["valid"], true);
    assert!(report["errors"].as_array().unwrap().is_empty());
}

#[test]
fn test_estimate_prints_a_date() {
    let dir = setup_release();

    let estimate = json_stdout(in_dir(dir.path()).args(["estimate", "--format", "json"]));
    assert!(estimate["estimatedCompletion"].is_string());
}

// =============================================================================
// Notification Tests
// =============================================================================

#[test]
fn test_transition_fires_console_notification() {
    let dir = setup_release();
    let path = dir.path();

    in_dir(path)
        .args([
            "notify",
            "add",
            "--trigger",
            "stage_complete",
            "--template",
            "${item.name} finished in ${timeline.name}",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added notification [0]"));

    in_dir(path).args(["start", "build"]).assert().success();
    in_dir(path)
        .args(["complete", "build"])
        .assert()
        .success()
        .stderr(predicate::str::contains(
            "[notify:console] Build finished in Release v1",
        ));
}

#[test]
fn test_notification_condition_filters_items() {
    let dir = setup_release();
    let path = dir.path();

    in_dir(path)
        .args([
            "notify",
            "add",
            "--trigger",
            "stage_start",
            "--template",
            "started ${item.id}",
            "--min-priority",
            "high",
        ])
        .assert()
        .success();

    in_dir(path)
        .args(["start", "build"])
        .assert()
        .success()
        .stderr(predicate::str::contains("started build"));
    in_dir(path).args(["complete", "build"]).assert().success();
    in_dir(path)
        .args(["start", "deploy"])
        .assert()
        .success()
        .stderr(predicate::str::contains("started deploy").not());
}

#[test]
fn test_missing_channel_handler_is_a_warning() {
    let dir = setup_release();
    let path = dir.path();

    in_dir(path)
        .args([
            "notify",
            "add",
            "--trigger",
            "stage_start",
            "--channel",
            "slack",
            "--template",
            "go",
        ])
        .assert()
        .success();

    in_dir(path)
        .args(["start", "build"])
        .assert()
        .success()
        .stderr(predicate::str::contains("No handler registered"));
}

#[test]
fn test_notify_test_and_fire() {
    let dir = setup_release();
    let path = dir.path();

    in_dir(path)
        .args([
            "notify",
            "add",
            "--trigger",
            "custom:rollback",
            "--template",
            "rolling back ${item.name}",
            "--recipient",
            "ops@example.com",
        ])
        .assert()
        .success();

    in_dir(path)
        .args(["notify", "test", "0", "--item", "deploy"])
        .assert()
        .success()
        .stderr(predicate::str::contains("rolling back Deploy"));

    in_dir(path)
        .args(["notify", "fire", "rollback", "--item", "build"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 of 1 notification(s) delivered"))
        .stderr(predicate::str::contains("rolling back Build"));

    in_dir(path)
        .args(["notify", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ops@example.com"));

    in_dir(path)
        .args(["notify", "remove", "0"])
        .assert()
        .success();
    in_dir(path)
        .args(["notify", "test", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No notification rule"));
}

#[test]
fn test_invalid_trigger_is_rejected() {
    let dir = setup_release();

    in_dir(dir.path())
        .args(["notify", "add", "--trigger", "whenever", "--template", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown trigger"));
}
