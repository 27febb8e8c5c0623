//! Integration tests for the `fleetdiag` binary.
//!
//! Argument parsing, configuration commands, completions and the fatal
//! startup paths, all without a controller or network access.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a command with env isolation: no `FLEETDIAG_*` overrides and a
/// config directory that does not exist.
fn fleetdiag_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("fleetdiag");
    cmd.env("HOME", "/tmp/fleetdiag-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/fleetdiag-cli-test-nonexistent")
        .env_remove("FLEETDIAG_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

/// A config whose feeds, certs and server file all live under `dir`.
/// Snapshot files keep their `global`/`ledconfig` keys; none exist yet.
fn write_config(dir: &Path) -> std::path::PathBuf {
    let d = dir.display();
    let config = format!(
        r#"
server_file = "{d}/server"

[certs]
device_cert = "{d}/device.cert.pem"
device_key = "{d}/device.key.pem"
onboard_cert = "{d}/onboard.cert.pem"
onboard_key = "{d}/onboard.key.pem"
controller_signing_cert = "{d}/signing.pem"
root_ca = "{d}/root.pem"

[feeds]
global_config = "{d}/ConfigItemValueMap/global.json"
led_counter = "{d}/LedBlinkCounter/ledconfig.json"
network_status = "{d}/DeviceNetworkStatus/global.json"
port_config_list = "{d}/DevicePortConfigList/global.json"
onboarding_status = "{d}/OnboardingStatus/global.json"
poll_interval_ms = 20
"#
    );
    let path = dir.join("config.toml");
    std::fs::write(&path, config).unwrap();
    path
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn no_args_shows_help() {
    let output = fleetdiag_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));
}

#[test]
fn help_lists_commands() {
    fleetdiag_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("PASS/INFO/WARNING/ERROR")
            .and(predicate::str::contains("run"))
            .and(predicate::str::contains("config"))
            .and(predicate::str::contains("completions")),
    );
}

#[test]
fn run_help_lists_agent_flags() {
    fleetdiag_cmd().args(["run", "--help"]).assert().success().stdout(
        predicate::str::contains("--forever")
            .and(predicate::str::contains("--pac-contents"))
            .and(predicate::str::contains("--simulate-dns-failure"))
            .and(predicate::str::contains("--simulate-ping-failure"))
            .and(predicate::str::contains("--output")),
    );
}

#[test]
fn version_flag() {
    fleetdiag_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fleetdiag"));
}

#[test]
fn completions_bash() {
    fleetdiag_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Config commands ─────────────────────────────────────────────────

#[test]
fn config_path_honors_flag() {
    fleetdiag_cmd()
        .args(["config", "path", "--config", "/tmp/elsewhere.toml"])
        .assert()
        .success()
        .stdout("/tmp/elsewhere.toml\n");
}

#[test]
fn config_show_reflects_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "forever = true\n[probe]\nmax_retries = 2\n").unwrap();

    fleetdiag_cmd()
        .args(["config", "show", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("forever = true")
                .and(predicate::str::contains("max_retries = 2")),
        );
}

#[test]
fn config_init_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    fleetdiag_cmd()
        .args(["config", "init", "--config"])
        .arg(&path)
        .assert()
        .success();
    assert!(path.exists());

    fleetdiag_cmd()
        .args(["config", "init", "--config"])
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn invalid_config_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[probe]\ninternet_probe_urls = []\n").unwrap();

    fleetdiag_cmd()
        .args(["run", "--config"])
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("internet_probe_urls"));
}

// ── Fatal startup paths ─────────────────────────────────────────────

#[test]
fn missing_server_file_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    fleetdiag_cmd()
        .args(["run", "--config"])
        .arg(&config)
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Cannot read controller address"));
}

#[test]
fn missing_certificates_exit_three() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    std::fs::write(dir.path().join("server"), "ctrl.example.net\n").unwrap();

    fleetdiag_cmd()
        .args(["run", "--config"])
        .arg(&config)
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .code(3)
        .stdout(predicate::str::starts_with(
            "ERROR: no device cert and no onboarding cert at ",
        ));
}
