//! Configuration for the fleetdiag agent.
//!
//! One TOML file plus `FLEETDIAG_` environment overrides, layered over
//! built-in defaults, and translation to `fleetdiag_core::DiagConfig`.
//! Nested keys use a double underscore in the environment, e.g.
//! `FLEETDIAG_PROBE__MAX_RETRIES=3`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use fleetdiag_core::{CertPaths, DiagConfig, FeedConfig, ProbeConfig};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// File holding `host[:port]` of the controller.
    pub server_file: PathBuf,

    /// Report destination; stdout when unset.
    pub output: Option<PathBuf>,

    /// Where each metrics snapshot is written as JSON; not written when unset.
    pub metrics_file: Option<PathBuf>,

    /// Seconds between metrics publications.
    pub metrics_interval_secs: u64,

    /// Keep reporting after the first full pass.
    pub forever: bool,

    /// Print decoded PAC scripts.
    pub pac_contents: bool,

    pub probe: Probe,
    pub certs: Certs,
    pub feeds: Feeds,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_file: PathBuf::from("/config/server"),
            output: None,
            metrics_file: None,
            metrics_interval_secs: 30,
            forever: false,
            pac_contents: false,
            probe: Probe::default(),
            certs: Certs::default(),
            feeds: Feeds::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Probe {
    /// Retries after the first attempt; `0` retries forever.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Use the v2 edge-device API paths.
    pub v2_api: bool,
    pub simulate_dns_failure: bool,
    pub simulate_ping_failure: bool,
    /// Tried in order when the controller ping fails.
    pub internet_probe_urls: Vec<String>,
    /// Also probe non-management ports that have an address.
    pub probe_app_ports: bool,
    pub dns_timeout_secs: u64,
}

impl Default for Probe {
    fn default() -> Self {
        let core = ProbeConfig::default();
        Self {
            max_retries: core.max_retries,
            retry_delay_ms: millis(core.retry_delay),
            v2_api: core.v2_api,
            simulate_dns_failure: false,
            simulate_ping_failure: false,
            internet_probe_urls: core
                .internet_probe_urls
                .iter()
                .map(ToString::to_string)
                .collect(),
            probe_app_ports: false,
            dns_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Certs {
    pub device_cert: PathBuf,
    pub device_key: PathBuf,
    pub onboard_cert: PathBuf,
    pub onboard_key: PathBuf,
    pub controller_signing_cert: PathBuf,
    pub root_ca: PathBuf,
    /// Skip controller TLS verification. Lab use only.
    pub insecure: bool,
}

impl Default for Certs {
    fn default() -> Self {
        let core = CertPaths::default();
        Self {
            device_cert: core.device_cert,
            device_key: core.device_key,
            onboard_cert: core.onboard_cert,
            onboard_key: core.onboard_key,
            controller_signing_cert: core.controller_signing_cert,
            root_ca: core.root_ca,
            insecure: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Feeds {
    pub global_config: PathBuf,
    pub led_counter: PathBuf,
    pub network_status: PathBuf,
    pub port_config_list: PathBuf,
    pub onboarding_status: PathBuf,
    pub poll_interval_ms: u64,
}

impl Default for Feeds {
    fn default() -> Self {
        let core = FeedConfig::default();
        Self {
            global_config: core.global_config,
            led_counter: core.led_counter,
            network_status: core.network_status,
            port_config_list: core.port_config_list,
            onboarding_status: core.onboarding_status,
            poll_interval_ms: millis(core.poll_interval),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "fleetdiag", "fleetdiag").map_or_else(
        || PathBuf::from("/etc/fleetdiag/config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Defaults, then the TOML file (if present), then the environment.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("FLEETDIAG_").split("__"))
}

/// Load the config from `path`, or from [`config_path`] when `None`.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    let config: Config = figment(&path).extract()?;
    Ok(config)
}

/// Serialize `config` as pretty TOML.
pub fn to_toml(config: &Config) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(config)?)
}

/// Write `config` to `path`, creating parent directories.
pub fn save_config(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, to_toml(config)?)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

fn nonzero(field: &str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}

impl Config {
    /// Validate and build the runtime configuration.
    pub fn to_diag_config(&self) -> Result<DiagConfig, ConfigError> {
        let internet_probe_urls = self
            .probe
            .internet_probe_urls
            .iter()
            .map(|raw| {
                Url::parse(raw).map_err(|e| ConfigError::Validation {
                    field: "probe.internet_probe_urls".into(),
                    reason: format!("{raw}: {e}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if internet_probe_urls.is_empty() {
            return Err(ConfigError::Validation {
                field: "probe.internet_probe_urls".into(),
                reason: "at least one URL is required".into(),
            });
        }

        let metrics_interval = nonzero("metrics_interval_secs", self.metrics_interval_secs)?;
        let poll_interval = nonzero("feeds.poll_interval_ms", self.feeds.poll_interval_ms)?;

        Ok(DiagConfig {
            server_file: self.server_file.clone(),
            certs: CertPaths {
                device_cert: self.certs.device_cert.clone(),
                device_key: self.certs.device_key.clone(),
                onboard_cert: self.certs.onboard_cert.clone(),
                onboard_key: self.certs.onboard_key.clone(),
                controller_signing_cert: self.certs.controller_signing_cert.clone(),
                root_ca: self.certs.root_ca.clone(),
            },
            probe: ProbeConfig {
                max_retries: self.probe.max_retries,
                retry_delay: Duration::from_millis(self.probe.retry_delay_ms),
                v2_api: self.probe.v2_api,
                simulate_dns_failure: self.probe.simulate_dns_failure,
                simulate_ping_failure: self.probe.simulate_ping_failure,
                internet_probe_urls,
                probe_app_ports: self.probe.probe_app_ports,
            },
            feeds: FeedConfig {
                global_config: self.feeds.global_config.clone(),
                led_counter: self.feeds.led_counter.clone(),
                network_status: self.feeds.network_status.clone(),
                port_config_list: self.feeds.port_config_list.clone(),
                onboarding_status: self.feeds.onboarding_status.clone(),
                poll_interval: Duration::from_millis(poll_interval),
            },
            pac_contents: self.pac_contents,
            forever: self.forever,
            metrics_interval: Duration::from_secs(metrics_interval),
        })
    }

    /// DNS query timeout for the interface resolver.
    pub fn dns_timeout(&self) -> Duration {
        Duration::from_secs(self.probe.dns_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_translate_to_core_defaults() {
        let diag = Config::default().to_diag_config().unwrap();
        assert_eq!(diag, DiagConfig::default());
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut config = Config::default();
        config.feeds.poll_interval_ms = 0;
        let err = config.to_diag_config().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "feeds.poll_interval_ms"));
    }

    #[test]
    fn bad_oracle_url_is_rejected() {
        let mut config = Config::default();
        config.probe.internet_probe_urls = vec!["not a url".into()];
        let err = config.to_diag_config().unwrap_err();
        assert!(err.to_string().starts_with("invalid probe.internet_probe_urls: not a url"));
    }

    #[test]
    fn toml_round_trips_through_the_file_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut config = Config::default();
        config.forever = true;
        config.probe.max_retries = 0;
        save_config(&config, &path).unwrap();

        assert_eq!(load_config(Some(&path)).unwrap(), config);
    }
}
