// ── Onboarding and global tunables ──

use std::collections::BTreeMap;
use std::time::Duration;

use fleetdiag_api::Timeouts;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::null_as_default;

// ── Onboarding ──────────────────────────────────────────────────────

/// Device identity as recorded by the onboarding client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OnboardingStatus {
    #[serde(rename = "DeviceUUID")]
    pub device_uuid: Option<Uuid>,
}

impl OnboardingStatus {
    /// The device id, `None` while unset or nil.
    pub fn device_id(&self) -> Option<Uuid> {
        self.device_uuid.filter(|id| !id.is_nil())
    }
}

// ── Global tunables ─────────────────────────────────────────────────

pub const SEND_TIMEOUT_KEY: &str = "timer.send.timeout";
pub const DIAL_TIMEOUT_KEY: &str = "timer.dial.timeout";

const DEFAULT_SEND_TIMEOUT: u32 = 120;
const DEFAULT_DIAL_TIMEOUT: u32 = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ConfigItemValue {
    pub key: String,
    pub item_type: u8,
    pub int_value: u32,
    pub str_value: String,
    pub bool_value: bool,
}

/// Subset of the device-wide configuration map this agent reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GlobalConfig {
    #[serde(deserialize_with = "null_as_default")]
    pub global_settings: BTreeMap<String, ConfigItemValue>,
}

impl GlobalConfig {
    fn int_or(&self, key: &str, default: u32) -> u32 {
        self.global_settings
            .get(key)
            .map(|item| item.int_value)
            .filter(|v| *v > 0)
            .unwrap_or(default)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(
            self.int_or(SEND_TIMEOUT_KEY, DEFAULT_SEND_TIMEOUT),
        ))
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(
            self.int_or(DIAL_TIMEOUT_KEY, DEFAULT_DIAL_TIMEOUT),
        ))
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            send: self.send_timeout(),
            dial: self.dial_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn nil_uuid_is_unset() {
        let status = OnboardingStatus {
            device_uuid: Some(Uuid::nil()),
        };
        assert_eq!(status.device_id(), None);

        let id = Uuid::new_v4();
        let status = OnboardingStatus {
            device_uuid: Some(id),
        };
        assert_eq!(status.device_id(), Some(id));
    }

    #[test]
    fn timeouts_default_when_absent() {
        let config = GlobalConfig::default();
        assert_eq!(config.send_timeout(), Duration::from_secs(120));
        assert_eq!(config.dial_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn timeouts_read_from_settings() {
        let json = r#"{
            "GlobalSettings": {
                "timer.send.timeout": {"Key": "timer.send.timeout", "ItemType": 1, "IntValue": 60},
                "timer.dial.timeout": {"Key": "timer.dial.timeout", "ItemType": 1, "IntValue": 0}
            }
        }"#;
        let config: GlobalConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.send_timeout(), Duration::from_secs(60));
        // Zero falls back to the default.
        assert_eq!(config.dial_timeout(), Duration::from_secs(10));
    }
}
