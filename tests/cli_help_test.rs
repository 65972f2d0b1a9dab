// CLI surface tests: help text, configuration output and the simulated run

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn fabflow(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("fabflow").unwrap();
    cmd.current_dir(dir.path()).env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();

    fabflow(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("reset"))
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("--json-logs"));
}

#[test]
fn test_run_requires_a_file() {
    let dir = TempDir::new().unwrap();

    fabflow(&dir)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<FILE>"));
}

#[test]
fn test_config_prints_defaults() {
    let dir = TempDir::new().unwrap();

    fabflow(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[machine]"))
        .stdout(predicate::str::contains("move_to_origin_command"))
        .stdout(predicate::str::contains("[simulator]"));
}

#[test]
fn test_config_file_and_environment_overrides() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("fabflow.toml"),
        "[simulator]\nmotion_millis = 42\n",
    )
    .unwrap();

    fabflow(&dir)
        .arg("config")
        .env("FABFLOW_SIMULATOR__POLL_MILLIS", "7")
        .assert()
        .success()
        .stdout(predicate::str::contains("motion_millis = 42"))
        .stdout(predicate::str::contains("poll_millis = 7"));
}

#[test]
fn test_config_save_writes_file() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("saved.toml");

    fabflow(&dir)
        .args(["config", "--save"])
        .arg(&target)
        .assert()
        .success();

    let saved = std::fs::read_to_string(&target).unwrap();
    assert!(saved.contains("eject_command"));
}

#[test]
fn test_reset_reports_alarm_with_homing() {
    let dir = TempDir::new().unwrap();

    fabflow(&dir)
        .arg("reset")
        .assert()
        .success()
        .stdout(predicate::str::contains("ALARM"));
}

#[test]
fn test_run_against_simulator_finishes() {
    let dir = TempDir::new().unwrap();

    fabflow(&dir)
        .args(["run", "part.nc", "--motion-ms", "20"])
        .env("FABFLOW_SIMULATOR__POLL_MILLIS", "5")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("part.nc processed"));
}

#[test]
fn test_run_records_file_in_history() {
    let dir = TempDir::new().unwrap();

    fabflow(&dir)
        .args(["run", "part.nc", "--motion-ms", "20"])
        .env("FABFLOW_SIMULATOR__POLL_MILLIS", "5")
        .env("RUST_LOG", "off")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("📋 part.nc"));
}

#[test]
fn test_run_with_motion_shorter_than_poll_interval() {
    let dir = TempDir::new().unwrap();

    // Default poll interval is 250 ms
    fabflow(&dir)
        .args(["run", "part.nc", "--motion-ms", "20"])
        .env("RUST_LOG", "off")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("part.nc processed"));
}
