use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const MISSING_ENGINE: &str = "agentpod-test-missing-engine";

fn agentpod(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("agentpod").unwrap();
    cmd.env_remove("ANTHROPIC_API_KEY")
        .env_remove("GITHUB_TOKEN")
        .env_remove("SEARCH_API_KEY")
        .env_remove("AGENTPOD_LOG_LEVEL")
        .env_remove("AGENTPOD_REGISTRY")
        .arg("--workdir")
        .arg(workdir)
        .arg("--log-dir")
        .arg(workdir.join("logs"))
        .arg("--runtime")
        .arg(MISSING_ENGINE);
    cmd
}

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("agentpod")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("stop"));
}

#[test]
fn build_without_credential_is_a_configuration_error() {
    let dir = TempDir::new().unwrap();
    agentpod(dir.path())
        .args(["build", "--context"])
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("ANTHROPIC_API_KEY"));
    assert!(!dir.path().join(".agentpod.env").exists());
}

#[test]
fn start_without_credential_fails_before_touching_the_engine() {
    let dir = TempDir::new().unwrap();
    agentpod(dir.path())
        .args(["--no-log-file", "start"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains(MISSING_ENGINE).not());
}

#[test]
fn unknown_mode_is_a_configuration_error() {
    let dir = TempDir::new().unwrap();
    agentpod(dir.path())
        .env("ANTHROPIC_API_KEY", "sk-test-0123456789abcdefghij")
        .args(["--no-log-file", "start", "--mode", "bogus"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("bogus"));
}

#[test]
fn unknown_log_level_is_a_configuration_error() {
    let dir = TempDir::new().unwrap();
    agentpod(dir.path())
        .args(["--log-level", "chatty", "stop"])
        .assert()
        .code(2);
}

#[test]
fn build_writes_descriptor_then_reports_engine_failure() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(".dockerignore"), ".agentpod.env\nlogs/\n").unwrap();
    let secret = "sk-test-0123456789abcdefghij";
    agentpod(dir.path())
        .env("ANTHROPIC_API_KEY", secret)
        .args(["build", "--context"])
        .arg(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains(secret).not());

    let descriptor = dir.path().join(".agentpod.env");
    let content = fs::read_to_string(&descriptor).unwrap();
    assert!(content.contains(&format!("ANTHROPIC_API_KEY={}", secret)));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&descriptor).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    let log = fs::read_to_string(dir.path().join("logs").join("agentpod.log")).unwrap();
    assert!(!log.contains(secret));
    let records: Vec<serde_json::Value> = log
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(records.iter().any(|r| r["level"] == "ERROR" && r["operation"] == "image_build"));
    assert!(records.iter().all(|r| r["timestamp"].is_string() && r["source"].is_string()));
}

#[test]
fn stop_without_engine_cannot_confirm_cleanup() {
    let dir = TempDir::new().unwrap();
    agentpod(dir.path())
        .args(["--no-log-file", "stop"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("could not confirm cleanup"));
}

#[test]
fn build_refuses_descriptor_inside_context() {
    let dir = TempDir::new().unwrap();
    agentpod(dir.path())
        .env("ANTHROPIC_API_KEY", "sk-test-0123456789abcdefghij")
        .args(["--no-log-file", "build", "--push", "--registry", "reg.local", "--context"])
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains(".dockerignore"))
        .stderr(predicate::str::contains(MISSING_ENGINE).not());
    assert!(!dir.path().join(".agentpod.env").exists());
}

#[test]
fn build_with_context_outside_workdir_writes_descriptor() {
    let workdir = TempDir::new().unwrap();
    let context = TempDir::new().unwrap();
    agentpod(workdir.path())
        .env("ANTHROPIC_API_KEY", "sk-test-0123456789abcdefghij")
        .args(["--no-log-file", "build", "--context"])
        .arg(context.path())
        .assert()
        .code(1);
    assert!(workdir.path().join(".agentpod.env").exists());
    assert!(!context.path().join(".agentpod.env").exists());
}

#[test]
fn verify_json_keeps_stdout_parseable() {
    let dir = TempDir::new().unwrap();
    let assert = agentpod(dir.path())
        .args(["--no-log-file", "verify", "--json"])
        .assert()
        .code(1);

    let output = assert.get_output();
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["failed"], 1);
    assert!(report["results"].is_array());
    assert!(!output.stderr.is_empty());
}
