//! End-to-End Tests for the timetrack binary.
//!
//! These tests run the compiled CLI:
//! - Help and completions output
//! - Argument validation
//! - Commands failing cleanly when no daemon is running
//! - A daemon process serving the CLI

use std::path::Path;
use std::process::{Child, Command as StdCommand, Stdio};
use std::time::{Duration, Instant};

use assert_cmd::Command;
use predicates::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

/// The CLI with its data directory pointed at `home`.
fn timetrack(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("timetrack").unwrap();
    cmd.env("TIMETRACK_HOME", home).env_remove("RUST_LOG");
    cmd
}

/// Kills the daemon when the test ends.
struct DaemonProcess(Child);

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

/// Starts `timetrack daemon` without the tray and waits for its socket.
fn spawn_daemon(home: &Path) -> DaemonProcess {
    std::fs::write(home.join("config.toml"), "[tray]\nenabled = false\n").unwrap();

    let child = StdCommand::new(assert_cmd::cargo::cargo_bin("timetrack"))
        .arg("daemon")
        .env("TIMETRACK_HOME", home)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let daemon = DaemonProcess(child);

    let socket = home.join("timetrack.sock");
    let deadline = Instant::now() + Duration::from_secs(10);
    while !socket.exists() {
        assert!(Instant::now() < deadline, "daemon did not start");
        std::thread::sleep(Duration::from_millis(50));
    }
    daemon
}

// ============================================================================
// Help and completions
// ============================================================================

#[test]
fn test_help_lists_commands() {
    let home = tempfile::tempdir().unwrap();

    timetrack(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("report"))
        .stdout(predicate::str::contains("project"));
}

#[test]
fn test_no_args_prints_help() {
    let home = tempfile::tempdir().unwrap();

    timetrack(home.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_completions_bash() {
    let home = tempfile::tempdir().unwrap();

    timetrack(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("timetrack"));
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_invalid_month_is_rejected_by_parser() {
    let home = tempfile::tempdir().unwrap();

    timetrack(home.path())
        .args(["report", "2024-13"])
        .assert()
        .failure();
}

#[test]
fn test_edit_project_conflicts_with_unassign() {
    let home = tempfile::tempdir().unwrap();

    timetrack(home.path())
        .args([
            "edit",
            "00000000-0000-0000-0000-000000000000",
            "--project",
            "a",
            "--unassign",
        ])
        .assert()
        .failure();
}

#[test]
fn test_malformed_config_fails() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(home.path().join("config.toml"), "recent_limit = \"many\"").unwrap();

    timetrack(home.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("設定ファイル"));
}

// ============================================================================
// Without daemon
// ============================================================================

#[test]
fn test_status_without_daemon_fails() {
    let home = tempfile::tempdir().unwrap();

    timetrack(home.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("timetrack daemon"));
}

// ============================================================================
// With daemon
// ============================================================================

#[test]
fn test_start_status_stop_with_daemon() {
    let home = tempfile::tempdir().unwrap();
    let _daemon = spawn_daemon(home.path());

    timetrack(home.path())
        .args(["start", "e2e作業"])
        .assert()
        .success()
        .stdout(predicate::str::contains("e2e作業"));

    timetrack(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("記録中"));

    timetrack(home.path())
        .arg("start")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ヒント"));

    timetrack(home.path())
        .arg("stop")
        .assert()
        .success();

    timetrack(home.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("e2e作業"));

    timetrack(home.path())
        .args(["watch", "--once"])
        .assert()
        .success()
        .stdout(predicate::str::contains("停止中"));
}

#[test]
fn test_session_survives_daemon_restart() {
    let home = tempfile::tempdir().unwrap();

    {
        let _daemon = spawn_daemon(home.path());
        timetrack(home.path())
            .args(["start", "再起動"])
            .assert()
            .success();
    }
    // SIGKILL leaves the socket file behind; the next daemon replaces it.
    std::fs::remove_file(home.path().join("timetrack.sock")).ok();

    let _daemon = spawn_daemon(home.path());
    timetrack(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("記録中"))
        .stdout(predicate::str::contains("再起動"));
}
