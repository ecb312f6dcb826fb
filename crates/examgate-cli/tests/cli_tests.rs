//! CLI integration tests using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn examgate() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("examgate").unwrap()
}

const MISMATCH_SCENARIO: &str = r#"
[scenario]
id = "mismatch"
name = "Mismatch"

[[courses]]
id = 1
teacher = "t"

[[principals]]
token = "tok-t"
identity = "t"

[[steps]]
as = "tok-t"
action = "create-test"
course = 1
title = "Quiz"
expect = "forbidden"
"#;

#[test]
fn validate_lifecycle_scenario() {
    examgate()
        .arg("validate")
        .arg("--scenario")
        .arg("../../scenarios/course-lifecycle.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("Course lifecycle"))
        .stdout(predicate::str::contains("20 steps"))
        .stdout(predicate::str::contains("All scenarios valid"));
}

#[test]
fn validate_directory() {
    examgate()
        .arg("validate")
        .arg("--scenario")
        .arg("../../scenarios")
        .assert()
        .success()
        .stdout(predicate::str::contains("Course lifecycle"))
        .stdout(predicate::str::contains("Results visibility"));
}

#[test]
fn validate_nonexistent_file() {
    examgate()
        .arg("validate")
        .arg("--scenario")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn validate_reports_warnings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("warn.toml");
    std::fs::write(
        &path,
        r#"
[scenario]
id = "warn"
name = "Warn"

[[steps]]
as = "tok"
action = "start-attempt"
test = "missing"
"#,
    )
    .unwrap();

    examgate()
        .arg("validate")
        .arg("--scenario")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("[step 1] WARNING"))
        .stdout(predicate::str::contains("warning(s) found"));
}

#[test]
fn run_lifecycle_scenario() {
    examgate()
        .arg("run")
        .arg("--scenario")
        .arg("../../scenarios/course-lifecycle.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("20/20 steps matched"))
        .stdout(predicate::str::contains("PASS"));
}

#[test]
fn run_scenario_directory() {
    examgate()
        .arg("run")
        .arg("--scenario")
        .arg("../../scenarios")
        .assert()
        .success()
        .stdout(predicate::str::contains("18/18 steps matched"));
}

#[test]
fn run_mismatch_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mismatch.toml");
    std::fs::write(&path, MISMATCH_SCENARIO).unwrap();

    examgate()
        .arg("run")
        .arg("--scenario")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAIL"))
        .stderr(predicate::str::contains("did not match"));
}

#[test]
fn run_json_writes_report() {
    let dir = TempDir::new().unwrap();

    examgate()
        .arg("run")
        .arg("--scenario")
        .arg("../../scenarios/results-visibility.toml")
        .arg("--format")
        .arg("json")
        .arg("--output")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"scenario_id\": \"results-visibility\""))
        .stdout(predicate::str::contains("\"passed\": true"));

    let reports: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "json"))
        .collect();
    assert_eq!(reports.len(), 1);
}

#[test]
fn run_with_missing_config_fails() {
    examgate()
        .arg("run")
        .arg("--scenario")
        .arg("../../scenarios/course-lifecycle.toml")
        .arg("--config")
        .arg("nope.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn run_rejects_unknown_format() {
    examgate()
        .arg("run")
        .arg("--scenario")
        .arg("../../scenarios/course-lifecycle.toml")
        .arg("--format")
        .arg("html")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown format"));
}

#[test]
fn enforced_permissions_deny_ungranted_teacher() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("examgate.toml");
    std::fs::write(&config, "enforce_permission_strings = true\n").unwrap();
    let scenario = dir.path().join("enforced.toml");
    std::fs::write(&scenario, MISMATCH_SCENARIO).unwrap();

    // The teacher holds no grants, so the create is refused as the scenario expects.
    examgate()
        .arg("run")
        .arg("--scenario")
        .arg(&scenario)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("1/1 steps matched"));
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    examgate()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created examgate.toml"))
        .stdout(predicate::str::contains("Created scenarios/example.toml"));

    assert!(dir.path().join("examgate.toml").exists());
    assert!(dir.path().join("scenarios/example.toml").exists());

    examgate()
        .current_dir(dir.path())
        .arg("run")
        .arg("--scenario")
        .arg("scenarios/example.toml")
        .assert()
        .success();
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("examgate.toml"), "store_timeout_ms = 500\n").unwrap();

    examgate()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn help_output() {
    examgate()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("init"));
}
