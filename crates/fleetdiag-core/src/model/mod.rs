// ── Domain model ──
//
// Snapshot types published by the device's networking, LED, onboarding
// and configuration agents. Field names follow the JSON those agents
// write (PascalCase, nil slices as `null`).

mod device;
mod led;
mod network;
mod port_config;

use serde::{Deserialize, Deserializer};

pub use device::{
    ConfigItemValue, DIAL_TIMEOUT_KEY, GlobalConfig, OnboardingStatus, SEND_TIMEOUT_KEY,
};
pub use led::{LedBlinkCounter, LedCounter};
pub use network::{
    AddrInfo, DhcpType, DpcState, GeoInfo, IpSubnet, NetworkStatus, Port, ProxyConfig,
    ProxyEntry, ProxyType, RadioSilence, TestResults, is_link_local,
};
pub use port_config::{PortConfigEntry, PortConfigList, PortSettings};

/// Equality that ignores fields which change without being report-worthy.
///
/// Each implementor documents its exclusion list; everything not listed
/// takes part in the comparison.
pub trait MostlyEqual {
    fn mostly_eq(&self, other: &Self) -> bool;
}

/// Deserialize `null` as `T::default()`.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
