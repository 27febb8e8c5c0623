// ── Runtime diagnostic configuration ──
//
// These types describe *what* to probe and *where* the device keeps its
// state. They never touch disk themselves: the binary loads them through
// fleetdiag-config and hands a `DiagConfig` in.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

/// Client and controller certificate locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertPaths {
    pub device_cert: PathBuf,
    pub device_key: PathBuf,
    pub onboard_cert: PathBuf,
    pub onboard_key: PathBuf,
    /// Controller signing certificate used by the envelope layer.
    pub controller_signing_cert: PathBuf,
    /// Root CA the controller's TLS certificate chains to.
    pub root_ca: PathBuf,
}

impl Default for CertPaths {
    fn default() -> Self {
        Self {
            device_cert: PathBuf::from("/config/device.cert.pem"),
            device_key: PathBuf::from("/config/device.key.pem"),
            onboard_cert: PathBuf::from("/config/onboard.cert.pem"),
            onboard_key: PathBuf::from("/config/onboard.key.pem"),
            controller_signing_cert: PathBuf::from("/persist/certs/server-signing-cert.pem"),
            root_ca: PathBuf::from("/config/root-certificate.pem"),
        }
    }
}

/// Prober tuning and fault injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Retries after the first attempt; `0` retries forever.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub v2_api: bool,
    /// Fail DNS after an otherwise successful lookup.
    pub simulate_dns_failure: bool,
    /// Fail ping after an otherwise successful request.
    pub simulate_ping_failure: bool,
    /// Reachability oracles tried when the controller ping fails.
    pub internet_probe_urls: Vec<Url>,
    /// Also probe non-management ports that have an address.
    pub probe_app_ports: bool,
}

impl ProbeConfig {
    pub const DEFAULT_MAX_RETRIES: u32 = 5;

    pub fn default_internet_probe_urls() -> Vec<Url> {
        ["http://www.google.com", "https://www.google.com"]
            .iter()
            .filter_map(|u| Url::parse(u).ok())
            .collect()
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_retries: Self::DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs(1),
            v2_api: true,
            simulate_dns_failure: false,
            simulate_ping_failure: false,
            internet_probe_urls: Self::default_internet_probe_urls(),
            probe_app_ports: false,
        }
    }
}

/// Snapshot files polled by the feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    pub global_config: PathBuf,
    pub led_counter: PathBuf,
    pub network_status: PathBuf,
    pub port_config_list: PathBuf,
    pub onboarding_status: PathBuf,
    pub poll_interval: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            global_config: PathBuf::from(
                "/persist/status/zedagent/ConfigItemValueMap/global.json",
            ),
            led_counter: PathBuf::from("/run/LedBlinkCounter/ledconfig.json"),
            network_status: PathBuf::from("/run/nim/DeviceNetworkStatus/global.json"),
            port_config_list: PathBuf::from(
                "/persist/status/nim/DevicePortConfigList/global.json",
            ),
            onboarding_status: PathBuf::from(
                "/persist/status/zedclient/OnboardingStatus/global.json",
            ),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Everything the diagnostic loop needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagConfig {
    /// File holding `host[:port]` of the controller.
    pub server_file: PathBuf,
    pub certs: CertPaths,
    pub probe: ProbeConfig,
    pub feeds: FeedConfig,
    /// Print decoded PAC scripts.
    pub pac_contents: bool,
    /// Keep reporting after the first full pass.
    pub forever: bool,
    pub metrics_interval: Duration,
}

impl Default for DiagConfig {
    fn default() -> Self {
        Self {
            server_file: PathBuf::from("/config/server"),
            certs: CertPaths::default(),
            probe: ProbeConfig::default(),
            feeds: FeedConfig::default(),
            pac_contents: false,
            forever: false,
            metrics_interval: Duration::from_secs(30),
        }
    }
}
