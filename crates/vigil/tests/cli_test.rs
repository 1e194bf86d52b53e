//! Integration tests for the `vigil` binary.
//!
//! Every test points `--config` at a temp file (or a missing one) so the
//! user's real configuration is never read.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

fn vigil_cmd(config: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("vigil");
    cmd.env("HOME", "/tmp/vigil-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/vigil-cli-test-nonexistent")
        .env_remove("RUST_LOG")
        .env_remove("VIGIL_CONFIG")
        .arg("--config")
        .arg(config);
    cmd
}

fn with_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

fn empty_config() -> (tempfile::TempDir, std::path::PathBuf) {
    with_config("")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = cargo_bin_cmd!("vigil").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"), "missing usage:\n{stderr}");
}

#[test]
fn test_help_lists_subcommands() {
    cargo_bin_cmd!("vigil").arg("--help").assert().success().stdout(
        predicate::str::contains("run")
            .and(predicate::str::contains("invoke"))
            .and(predicate::str::contains("commands")),
    );
}

#[test]
fn test_version_flag() {
    cargo_bin_cmd!("vigil")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("vigil"));
}

#[test]
fn test_completions_bash() {
    cargo_bin_cmd!("vigil")
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vigil"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_follows_flag() {
    let (_dir, path) = empty_config();
    vigil_cmd(&path)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(path.display().to_string()));
}

#[test]
fn test_config_show_masks_token() {
    let (_dir, path) = with_config(
        r#"
        [workspace]
        token = "ya29.very-secret"
        "#,
    );
    vigil_cmd(&path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("********").and(predicate::str::contains("ya29").not()));
}

#[test]
fn test_invalid_url_is_a_usage_error() {
    let (_dir, path) = with_config(
        r#"
        [feed]
        url = "not a url"
        "#,
    );
    vigil_cmd(&path)
        .arg("commands")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("feed.url"));
}

#[test]
fn test_zero_interval_is_a_usage_error() {
    let (_dir, path) = empty_config();
    vigil_cmd(&path)
        .env("VIGIL_INTERVALS__FEED", "0")
        .arg("commands")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("intervals.feed"));
}

// ── Catalog ─────────────────────────────────────────────────────────

#[test]
fn test_commands_without_sources() {
    let (_dir, path) = empty_config();
    let output = vigil_cmd(&path)
        .args(["commands", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let catalog: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<_> = catalog
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(names, vec!["get_state"]);
}

#[test]
fn test_commands_table_with_feed() {
    let (_dir, path) = with_config(
        r#"
        [feed]
        url = "https://news.example/"
        "#,
    );
    vigil_cmd(&path)
        .arg("commands")
        .assert()
        .success()
        .stdout(predicate::str::contains("get_news").and(predicate::str::contains("get_state")));
}

// ── Invoke ──────────────────────────────────────────────────────────

#[test]
fn test_invoke_get_state() {
    let (_dir, path) = empty_config();
    let output = vigil_cmd(&path)
        .args(["invoke", "get_state", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let response: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(response["status"], "ok");
    assert!(response["result"]["telemetry"]["data"].is_object());
}

#[test]
fn test_invoke_unconfigured_source() {
    let (_dir, path) = empty_config();
    vigil_cmd(&path)
        .args(["invoke", "get_news", "-o", "json"])
        .assert()
        .code(7)
        .stdout(predicate::str::contains("\"unavailable\""));
}

#[test]
fn test_invoke_unknown_command() {
    let (_dir, path) = empty_config();
    vigil_cmd(&path)
        .args(["invoke", "launch_rockets"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("unknown_command"));
}

#[test]
fn test_invoke_rejects_non_object_args() {
    let (_dir, path) = empty_config();
    vigil_cmd(&path)
        .args(["invoke", "get_state", "--args", "[1]"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid --args"));
}
