//! End-to-end CLI tests using `assert_cmd`
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::print_stdout,
        clippy::print_stderr,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Helper to get cargo binary or fail test
fn cargo_bin() -> Command {
    Command::cargo_bin("nexus").unwrap_or_else(|err| panic!("Binary not found: {err}"))
}

/// Helper to create temp dir or fail test
fn temp_dir() -> TempDir {
    TempDir::new().unwrap_or_else(|err| panic!("Failed to create temp dir: {err}"))
}

/// Binary pointed at `temp` with the mock provider and a private config
fn mock_session(temp: &TempDir) -> Command {
    let mut command = cargo_bin();
    command
        .arg("--provider")
        .arg("mock")
        .arg("--workspace")
        .arg(temp.path())
        .arg("--config")
        .arg(temp.path().join("config.toml"))
        .arg("--conversation")
        .arg("e2e");
    command
}

#[test]
fn test_cli_help() {
    cargo_bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_invalid_argument() {
    cargo_bin().arg("--no-such-flag").assert().failure();
}

#[test]
fn test_cli_invalid_provider() {
    cargo_bin()
        .arg("--provider")
        .arg("llama")
        .assert()
        .failure()
        .stderr(predicate::str::contains("llama"));
}

#[test]
fn test_json_session_streams_events() {
    let temp = temp_dir();

    mock_session(&temp)
        .arg("--format")
        .arg("json")
        .write_stdin("hello\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"type\":\"message_complete\""))
        .stdout(predicate::str::contains("Mock response for: hello"));

    assert!(temp.path().join("config.toml").exists());
    assert!(temp.path().join(".nexus").join("debug.log").exists());
}

#[test]
fn test_text_session_prints_reply() {
    let temp = temp_dir();

    mock_session(&temp)
        .write_stdin("\nhello\n/quit\nignored\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Mock response for: hello"))
        .stdout(predicate::str::contains("ignored").not());
}

#[test]
fn test_session_uses_existing_config() {
    let temp = temp_dir();
    let config = "[workspace]\nroot = \"convos\"\n\n[events]\nheartbeat_seconds = 0\n";
    fs::write(temp.path().join("config.toml"), config).unwrap();

    mock_session(&temp)
        .write_stdin("hello\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Mock response for: hello"));

    assert_eq!(fs::read_to_string(temp.path().join("config.toml")).unwrap(), config);
}
