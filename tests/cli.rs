//! End-to-end tests of the rassemble binary

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

const PROJECTS: &str = r#"
projects:
  - name: base
    title: Shared layout
    tasks:
      - name: layout
        ensure-dir: { path: var/log }

  - name: app
    requires: [base]
    settings:
      - name: port
        default: "8000"
        help: Port the app listens on
      - name: url
        default: "http://localhost:{{config.port}}/"
    tasks:
      - name: app config
        ensure-file:
          path: etc/app.conf
          content: "url={{config.url}}\n"
"#;

fn rassemble(project_file: &Path) -> Command {
    let mut cmd = Command::cargo_bin("rassemble").unwrap();
    let settings = project_file.with_file_name("settings.yml");
    if !settings.exists() {
        fs::write(&settings, "").unwrap();
    }
    cmd.env("NO_COLOR", "1")
        .env_remove("RASSEMBLE_LOG")
        .arg("-f")
        .arg(project_file)
        .arg("--config")
        .arg(settings);
    cmd
}

#[test]
fn test_list_projects() {
    let (_temp_dir, path) = common::create_test_project(PROJECTS);

    rassemble(&path)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("base - Shared layout"))
        .stdout(predicate::str::contains("app (requires: base) [1 tasks]"));
}

#[test]
fn test_check_accepts_valid_file() {
    let (_temp_dir, path) = common::create_test_project(PROJECTS);

    rassemble(&path)
        .arg("check")
        .assert()
        .success()
        .stderr(predicate::str::contains("2 project(s) OK"));
}

#[test]
fn test_check_reports_broken_template() {
    let yaml = r#"
projects:
  - name: app
    tasks:
      - name: layout
        ensure-dir: { path: "{{if env.simulate}}var" }
"#;
    let (_temp_dir, path) = common::create_test_project(yaml);

    rassemble(&path)
        .arg("check")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("app / layout / path"))
        .stderr(predicate::str::contains("1 template problem(s) found"));
}

#[test]
fn test_simulate_changes_nothing() {
    let (temp_dir, path) = common::create_test_project(PROJECTS);

    rassemble(&path)
        .args(["run", "app", "base", "--simulate"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Would run ensure-dir task"))
        .stderr(predicate::str::contains("base: 1 simulated, 0 up to date"));

    assert!(!temp_dir.path().join("var").exists());
    assert!(!temp_dir.path().join("etc").exists());
}

#[test]
fn test_run_applies_overrides() {
    let (temp_dir, path) = common::create_test_project(PROJECTS);

    rassemble(&path)
        .args(["run", "base", "app", "--set", "app.port=9000"])
        .assert()
        .success();

    assert!(temp_dir.path().join("var/log").is_dir());
    assert_eq!(
        fs::read_to_string(temp_dir.path().join("etc/app.conf")).unwrap(),
        "url=http://localhost:9000/\n"
    );

    rassemble(&path)
        .args(["run", "app", "--set", "app.port=9000"])
        .assert()
        .success()
        .stderr(predicate::str::contains("app: 0 done, 1 up to date"));
}

#[test]
fn test_base_path_option() {
    let (temp_dir, path, sub_dir) = common::create_test_project_in_subdir(PROJECTS);

    rassemble(&path)
        .arg("--base-path")
        .arg(&sub_dir)
        .args(["run", "base"])
        .assert()
        .success();

    assert!(sub_dir.join("var/log").is_dir());
    assert!(!temp_dir.path().join("var").exists());
}

#[cfg(unix)]
#[test]
fn test_failing_task_stops_the_run() {
    let yaml = r#"
projects:
  - name: app
    tasks:
      - name: boom
        script:
          command: [sh, -c, "echo broken >&2; exit 3"]
      - name: after
        ensure-dir: { path: never }
"#;
    let (temp_dir, path) = common::create_test_project(yaml);

    rassemble(&path)
        .args(["run", "app"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Task 'boom' failed"))
        .stderr(predicate::str::contains("exit code Some(3)"));

    assert!(!temp_dir.path().join("never").exists());
}

#[test]
fn test_unknown_project() {
    let (_temp_dir, path) = common::create_test_project(PROJECTS);

    rassemble(&path)
        .args(["run", "web"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Project 'web' is not defined"));
}

#[test]
fn test_settings_shows_resolved_values() {
    let (temp_dir, path) = common::create_test_project(PROJECTS);
    fs::write(temp_dir.path().join("settings.yml"), "app:\n  port: 9100\n").unwrap();

    rassemble(&path)
        .args(["settings", "app"])
        .assert()
        .success()
        .stdout(predicate::str::contains("port = 9100"))
        .stdout(predicate::str::contains("url = http://localhost:9100/"))
        .stdout(predicate::str::contains("Port the app listens on"));
}

#[test]
fn test_completions() {
    Command::cargo_bin("rassemble")
        .unwrap()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rassemble"));
}
