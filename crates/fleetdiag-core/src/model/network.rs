// ── Network status domain types ──

use std::fmt;
use std::net::IpAddr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use super::{MostlyEqual, null_as_default};

// ── Enums ───────────────────────────────────────────────────────────

/// Addressing mode of a port. Only `Static` and `Client` are in real use.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize_repr, Deserialize_repr)]
pub enum DhcpType {
    #[default]
    Noop = 0,
    Static = 1,
    None = 2,
    Deprecated = 3,
    Client = 4,
}

/// Progress of the active port configuration.
#[repr(u8)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize_repr, Deserialize_repr, strum::Display,
)]
pub enum DpcState {
    #[default]
    #[strum(serialize = "DPC_NONE")]
    None = 0,
    #[strum(serialize = "DPC_FAIL")]
    Fail = 1,
    #[strum(serialize = "DPC_FAIL_WITH_IPANDDNS")]
    FailWithIpAndDns = 2,
    #[strum(serialize = "DPC_SUCCESS")]
    Success = 3,
    #[strum(serialize = "DPC_IPDNS_WAIT")]
    IpDnsWait = 4,
    #[strum(serialize = "DPC_PCI_WAIT")]
    PciWait = 5,
    #[strum(serialize = "DPC_INTF_WAIT")]
    IntfWait = 6,
    #[strum(serialize = "DPC_REMOTE_WAIT")]
    RemoteWait = 7,
    #[strum(serialize = "DPC_ASYNC_WAIT")]
    AsyncWait = 8,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize_repr, Deserialize_repr)]
pub enum ProxyType {
    Http = 0,
    Https = 1,
    Socks = 2,
    Ftp = 3,
    #[default]
    NoProxy = 4,
    Last = 255,
}

// ── Proxy configuration ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ProxyEntry {
    #[serde(rename = "type")]
    pub proxy_type: ProxyType,
    pub server: String,
    pub port: u32,
}

impl ProxyEntry {
    /// `server[:port]`
    pub fn endpoint(&self) -> String {
        if self.port > 0 {
            format!("{}:{}", self.server, self.port)
        } else {
            self.server.clone()
        }
    }
}

/// Per-port proxy settings.
///
/// With `network_proxy_enable` set the auto-config file is discovered
/// (from `network_proxy_url`, else via WPAD); otherwise the explicit
/// `proxies` apply. A non-empty `pacfile` always wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ProxyConfig {
    #[serde(deserialize_with = "null_as_default")]
    pub proxies: Vec<ProxyEntry>,
    pub exceptions: String,
    /// Base64-encoded auto-config script.
    pub pacfile: String,
    pub network_proxy_enable: bool,
    #[serde(rename = "NetworkProxyURL")]
    pub network_proxy_url: String,
    #[serde(rename = "WpadURL")]
    pub wpad_url: String,
    /// Base64-encoded PEM bundles.
    #[serde(
        rename = "pubsub-large-ProxyCertPEM",
        alias = "ProxyCertPEM",
        deserialize_with = "null_as_default"
    )]
    pub proxy_cert_pem: Vec<String>,
}

// ── Addresses ───────────────────────────────────────────────────────

/// Geolocation of a public address; all-empty means "not geolocated".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoInfo {
    pub ip: String,
    pub hostname: String,
    pub city: String,
    pub region: String,
    pub country: String,
    pub loc: String,
    pub org: String,
    pub postal: String,
}

impl GeoInfo {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for GeoInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{IP:{} Hostname:{} City:{} Region:{} Country:{} Loc:{} Org:{} Postal:{}}}",
            self.ip, self.hostname, self.city, self.region, self.country, self.loc, self.org,
            self.postal
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddrInfo {
    pub addr: IpAddr,
    #[serde(default, deserialize_with = "null_as_default")]
    pub geo: GeoInfo,
    #[serde(default)]
    pub last_geo_timestamp: DateTime<Utc>,
}

impl AddrInfo {
    pub fn new(addr: IpAddr) -> Self {
        Self {
            addr,
            geo: GeoInfo::default(),
            last_geo_timestamp: DateTime::default(),
        }
    }
}

/// `net.IPNet` as the networking agent writes it: base address plus a
/// base64 netmask.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct IpSubnet {
    #[serde(rename = "IP")]
    pub ip: Option<IpAddr>,
    pub mask: String,
}

impl IpSubnet {
    pub fn prefix_len(&self) -> Option<u32> {
        let bytes = STANDARD.decode(&self.mask).ok()?;
        Some(bytes.iter().map(|b| b.count_ones()).sum())
    }
}

impl fmt::Display for IpSubnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.ip, self.prefix_len()) {
            (Some(ip), Some(len)) => write!(f, "{ip}/{len}"),
            (Some(ip), None) => write!(f, "{ip}"),
            (None, _) => f.write_str("<nil>"),
        }
    }
}

/// Returns `true` for IPv4 169.254/16 and IPv6 fe80::/10.
pub fn is_link_local(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_unicast_link_local(),
    }
}

// ── Test results ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TestResults {
    pub last_failed: DateTime<Utc>,
    pub last_succeeded: DateTime<Utc>,
    pub last_error: String,
}

impl TestResults {
    pub fn has_error(&self) -> bool {
        !self.last_error.is_empty()
    }
}

// ── Ports ───────────────────────────────────────────────────────────

/// One network attachment point as seen by the networking agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Port {
    pub if_name: String,
    pub is_mgmt: bool,
    /// Lower is preferred; 0 is the free (no usage charge) sentinel.
    pub cost: u8,
    pub dhcp: DhcpType,
    #[serde(rename = "IPv4Subnet", alias = "Subnet")]
    pub subnet: IpSubnet,
    #[serde(deserialize_with = "null_as_default")]
    pub default_routers: Vec<IpAddr>,
    pub domain_name: String,
    pub ntp_server: String,
    #[serde(rename = "DNSServers", deserialize_with = "null_as_default")]
    pub dns_servers: Vec<IpAddr>,
    #[serde(deserialize_with = "null_as_default")]
    pub addr_info_list: Vec<AddrInfo>,
    #[serde(flatten)]
    pub proxy_config: ProxyConfig,
    #[serde(flatten)]
    pub test_results: TestResults,
}

impl Port {
    pub const COST_FREE: u8 = 0;

    /// Addresses that can source controller traffic (non-link-local).
    pub fn usable_addrs(&self) -> impl Iterator<Item = &AddrInfo> {
        self.addr_info_list.iter().filter(|ai| !is_link_local(&ai.addr))
    }

    pub fn usable_addr_count(&self) -> usize {
        self.usable_addrs().count()
    }

    pub fn first_usable_addr(&self) -> Option<IpAddr> {
        self.usable_addrs().next().map(|ai| ai.addr)
    }

    /// Copy with the fields excluded from [`MostlyEqual`] reset.
    fn without_cosmetics(&self) -> Self {
        let mut port = self.clone();
        port.test_results.last_failed = DateTime::default();
        port.test_results.last_succeeded = DateTime::default();
        for ai in &mut port.addr_info_list {
            ai.geo = GeoInfo::default();
            ai.last_geo_timestamp = DateTime::default();
        }
        port
    }
}

// ── Radio silence ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RadioSilence {
    pub imposed: bool,
    pub change_in_progress: bool,
    pub change_requested_at: DateTime<Utc>,
    pub config_error: String,
}

// ── NetworkStatus ───────────────────────────────────────────────────

/// Whole-device network view; always replaced, never patched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NetworkStatus {
    #[serde(rename = "DPCKey")]
    pub dpc_key: String,
    pub version: u32,
    pub testing: bool,
    pub state: DpcState,
    pub current_index: i32,
    pub radio_silence: RadioSilence,
    #[serde(deserialize_with = "null_as_default")]
    pub ports: Vec<Port>,
}

impl NetworkStatus {
    /// Non-link-local addresses across every port.
    pub fn usable_addr_count(&self) -> usize {
        self.ports.iter().map(Port::usable_addr_count).sum()
    }

    pub fn mgmt_port_count(&self) -> usize {
        self.ports.iter().filter(|p| p.is_mgmt).count()
    }
}

/// Excluded: per-port `LastFailed`/`LastSucceeded` timestamps, address
/// geolocation and its timestamp, and `RadioSilence.ChangeRequestedAt`.
impl MostlyEqual for NetworkStatus {
    fn mostly_eq(&self, other: &Self) -> bool {
        self.dpc_key == other.dpc_key
            && self.version == other.version
            && self.testing == other.testing
            && self.state == other.state
            && self.current_index == other.current_index
            && self.radio_silence.imposed == other.radio_silence.imposed
            && self.radio_silence.change_in_progress == other.radio_silence.change_in_progress
            && self.radio_silence.config_error == other.radio_silence.config_error
            && self.ports.len() == other.ports.len()
            && self
                .ports
                .iter()
                .zip(&other.ports)
                .all(|(a, b)| a.without_cosmetics() == b.without_cosmetics())
    }
}
