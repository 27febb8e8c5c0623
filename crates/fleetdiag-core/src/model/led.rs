// ── LED blink counter ──

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Ordinal connectivity signal driven onto the device LED.
///
/// Values `0..=5` form the progress ladder; `10..` are failure codes the
/// onboarding and envelope layers raise.
#[repr(u8)]
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize_repr,
    Deserialize_repr,
)]
pub enum LedCounter {
    #[default]
    Undefined = 0,
    WaitingForIp = 1,
    ConnectingToController = 2,
    ConnectedToController = 3,
    Onboarded = 4,
    RadioSilence = 5,
    OnboardingFailure = 10,
    RespWithoutTls = 12,
    RespWithoutOcsp = 13,
    InvalidControllerCert = 14,
    InvalidAuthContainer = 15,
}

impl LedCounter {
    pub const ALL: [Self; 11] = [
        Self::Undefined,
        Self::WaitingForIp,
        Self::ConnectingToController,
        Self::ConnectedToController,
        Self::Onboarded,
        Self::RadioSilence,
        Self::OnboardingFailure,
        Self::RespWithoutTls,
        Self::RespWithoutOcsp,
        Self::InvalidControllerCert,
        Self::InvalidAuthContainer,
    ];
}

impl fmt::Display for LedCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Undefined => "Undefined",
            Self::WaitingForIp => "Waiting for DHCP IP address(es)",
            Self::ConnectingToController => "Trying to connect to EV Controller",
            Self::ConnectedToController => "Connected to EV Controller but not onboarded",
            Self::Onboarded => "Connected to EV Controller and onboarded",
            Self::RadioSilence => "Radio silence is imposed",
            Self::OnboardingFailure => "Onboarding failure or conflict",
            Self::RespWithoutTls => "Response without TLS - ignored",
            Self::RespWithoutOcsp => "Response without OSCP or bad OSCP - ignored",
            Self::InvalidControllerCert => "Invalid controller certificate",
            Self::InvalidAuthContainer => "Invalid auth container",
        };
        f.write_str(s)
    }
}

/// LED topic payload, published under the `ledconfig` key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LedBlinkCounter {
    pub blink_counter: LedCounter,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn decodes_numeric_counter() {
        let led: LedBlinkCounter = serde_json::from_str(r#"{"BlinkCounter": 4}"#).unwrap();
        assert_eq!(led.blink_counter, LedCounter::Onboarded);

        let led: LedBlinkCounter = serde_json::from_str(r#"{"BlinkCounter": 14}"#).unwrap();
        assert_eq!(led.blink_counter, LedCounter::InvalidControllerCert);
    }

    #[test]
    fn unknown_counter_is_rejected() {
        assert!(serde_json::from_str::<LedBlinkCounter>(r#"{"BlinkCounter": 99}"#).is_err());
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(
            LedCounter::WaitingForIp.to_string(),
            "Waiting for DHCP IP address(es)"
        );
        assert_eq!(LedCounter::RadioSilence.to_string(), "Radio silence is imposed");
    }
}
