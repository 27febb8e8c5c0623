#![allow(clippy::unwrap_used)]

use std::path::PathBuf;
use std::time::Duration;

use fleetdiag_config::{ConfigError, load_config};

#[test]
fn partial_file_overrides_only_named_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
server_file = "/tmp/server"
output = "/dev/console"

[probe]
max_retries = 3
retry_delay_ms = 250
internet_probe_urls = ["https://example.org"]

[feeds]
poll_interval_ms = 500
"#,
    )
    .unwrap();

    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.output, Some(PathBuf::from("/dev/console")));
    assert_eq!(config.metrics_interval_secs, 30);
    assert!(config.probe.v2_api);

    let diag = config.to_diag_config().unwrap();
    assert_eq!(diag.server_file, PathBuf::from("/tmp/server"));
    assert_eq!(diag.probe.max_retries, 3);
    assert_eq!(diag.probe.retry_delay, Duration::from_millis(250));
    assert_eq!(diag.probe.internet_probe_urls[0].as_str(), "https://example.org/");
    assert_eq!(diag.feeds.poll_interval, Duration::from_millis(500));
    assert_eq!(
        diag.feeds.led_counter,
        PathBuf::from("/run/LedBlinkCounter/ledconfig.json")
    );
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config, fleetdiag_config::Config::default());
}

#[test]
fn mistyped_value_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[probe]\nmax_retries = \"many\"\n").unwrap();

    let err = load_config(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::Figment(_)));
}
