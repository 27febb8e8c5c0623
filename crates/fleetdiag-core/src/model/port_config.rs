// ── Port configuration list ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::network::{DhcpType, DpcState, ProxyConfig, TestResults};
use super::{MostlyEqual, null_as_default};

/// Per-port slice of a candidate configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PortSettings {
    pub if_name: String,
    pub is_mgmt: bool,
    pub cost: u8,
    pub dhcp: DhcpType,
    #[serde(flatten)]
    pub proxy_config: ProxyConfig,
}

/// One candidate device port configuration (DPC).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PortConfigEntry {
    pub version: u32,
    pub key: String,
    pub time_priority: DateTime<Utc>,
    pub state: DpcState,
    #[serde(flatten)]
    pub test_results: TestResults,
    #[serde(rename = "LastIPAndDNS")]
    pub last_ip_and_dns: DateTime<Utc>,
    #[serde(deserialize_with = "null_as_default")]
    pub ports: Vec<PortSettings>,
}

impl PortConfigEntry {
    pub fn last_error(&self) -> &str {
        &self.test_results.last_error
    }
}

/// Candidate configurations in descending priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PortConfigList {
    /// Index of the active entry; `-1` when none works.
    pub current_index: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub port_config_list: Vec<PortConfigEntry>,
}

impl Default for PortConfigList {
    fn default() -> Self {
        Self {
            current_index: -1,
            port_config_list: Vec::new(),
        }
    }
}

/// Excluded per entry: `TimePriority`, `LastFailed`, `LastSucceeded`,
/// `LastError` and `LastIPAndDNS`.
impl MostlyEqual for PortConfigList {
    fn mostly_eq(&self, other: &Self) -> bool {
        self.current_index == other.current_index
            && self.port_config_list.len() == other.port_config_list.len()
            && self
                .port_config_list
                .iter()
                .zip(&other.port_config_list)
                .all(|(a, b)| {
                    a.key == b.key
                        && a.version == b.version
                        && a.state == b.state
                        && a.ports == b.ports
                })
    }
}
