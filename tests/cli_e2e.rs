//! End-to-end CLI tests for the playlist-dl binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("playlist-dl").unwrap();
    // Keep any user config file out of the tests.
    cmd.env("XDG_CONFIG_HOME", std::env::temp_dir().join("playlist-dl-e2e-no-config"));
    cmd
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Download a music playlist"))
        .stdout(predicate::str::contains("--skip-trial"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("playlist-dl"));
}

/// Test that a missing reference is a usage error.
#[test]
fn test_binary_requires_reference() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("REFERENCE"));
}

/// Test that an unsupported quality is rejected before any network call.
#[test]
fn test_binary_rejects_invalid_quality() {
    cmd()
        .args(["123456", "--quality", "256"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("256"));
}

/// Test that an unrecognized reference exits with code 1.
#[test]
fn test_binary_unrecognized_reference_is_fatal() {
    cmd()
        .args(["https://example.com/not-music", "--quiet"])
        .assert()
        .code(1);
}
