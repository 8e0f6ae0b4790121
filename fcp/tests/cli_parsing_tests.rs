//! CLI Argument Parsing Compatibility Tests for fcp
//!
//! These tests verify that command-line arguments are parsed correctly and maintain
//! backward compatibility. The focus is on argument values, aliases and formats, not on
//! running transfers.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_runs() {
    Command::cargo_bin("fcp")
        .unwrap()
        .arg("--help")
        .assert()
        .success();
}

#[test]
fn test_version_runs() {
    Command::cargo_bin("fcp")
        .unwrap()
        .arg("--version")
        .assert()
        .success();
}

#[test]
fn test_help_lists_option_groups() {
    Command::cargo_bin("fcp")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Transfer options"))
        .stdout(predicate::str::contains("Fan-out"))
        .stdout(predicate::str::contains("Credentials"))
        .stdout(predicate::str::contains("Progress & output"));
}

#[test]
fn test_password_value_is_never_shown_in_help() {
    Command::cargo_bin("fcp")
        .unwrap()
        .env("FCP_PASSWORD", "hunter2")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("hunter2").not());
}

// ============================================================================
// ProgressType Argument Parsing Tests
// ============================================================================

#[test]
fn test_progress_type_auto_lowercase() {
    Command::cargo_bin("fcp")
        .unwrap()
        .args(["--progress-type", "auto", "--help"])
        .assert()
        .success();
}

#[test]
fn test_progress_type_auto_capitalized() {
    Command::cargo_bin("fcp")
        .unwrap()
        .args(["--progress-type", "Auto", "--help"])
        .assert()
        .success();
}

#[test]
fn test_progress_type_progress_bar_pascal_case() {
    Command::cargo_bin("fcp")
        .unwrap()
        .args(["--progress-type", "ProgressBar", "--help"])
        .assert()
        .success();
}

#[test]
fn test_progress_type_text_updates_kebab_case() {
    Command::cargo_bin("fcp")
        .unwrap()
        .args(["--progress-type", "text-updates", "--help"])
        .assert()
        .success();
}

#[test]
fn test_progress_type_invalid() {
    Command::cargo_bin("fcp")
        .unwrap()
        .args(["--progress-type", "spinner", "--help"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid value 'spinner'"));
}

// ============================================================================
// Numeric and Duration Argument Parsing Tests
// ============================================================================

#[test]
fn test_parallel_short_and_long() {
    for flag in ["-p", "--parallel"] {
        Command::cargo_bin("fcp")
            .unwrap()
            .args([flag, "25", "--help"])
            .assert()
            .success();
    }
}

#[test]
fn test_non_numeric_retry_is_a_config_error() {
    Command::cargo_bin("fcp")
        .unwrap()
        .args(["--retry", "twice", "--hosts", "hosts.txt", "src", "dst"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--retry"));
}

#[test]
fn test_negative_parallel_is_a_config_error() {
    Command::cargo_bin("fcp")
        .unwrap()
        .args(["-p", "-3", "--hosts", "hosts.txt", "src", "dst"])
        .assert()
        .code(1);
}

#[test]
fn test_poll_interval_human_readable() {
    for value in ["50ms", "1s", "2min"] {
        Command::cargo_bin("fcp")
            .unwrap()
            .args(["--poll-interval", value, "--help"])
            .assert()
            .success();
    }
}

#[test]
fn test_retry_delay_rejects_garbage() {
    Command::cargo_bin("fcp")
        .unwrap()
        .args(["--retry-delay", "soon", "--hosts", "hosts.txt", "src", "dst"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--retry-delay"));
}

#[test]
fn test_tool_option_repeatable() {
    Command::cargo_bin("fcp")
        .unwrap()
        .args([
            "-o",
            "StrictHostKeyChecking=no",
            "--tool-option",
            "Compression=yes",
            "--help",
        ])
        .assert()
        .success();
}

#[test]
fn test_verbose_count() {
    Command::cargo_bin("fcp")
        .unwrap()
        .args(["-vvv", "--help"])
        .assert()
        .success();
}

#[test]
fn test_hosts_is_required() {
    Command::cargo_bin("fcp")
        .unwrap()
        .args(["src", "dst"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--hosts"));
}
