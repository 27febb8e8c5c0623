// ── Client certificate selection ──
//
// The device certificate is preferred. Before onboarding completes only
// the bootstrap (onboarding) pair exists; a run that starts on it switches
// to the device certificate as soon as that appears on disk.

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use fleetdiag_api::ClientIdentity;
use tracing::info;

use crate::config::CertPaths;
use crate::error::CoreError;
use crate::report::Report;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum CertKind {
    Device,
    Onboarding,
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn load(cert: &Path, key: &Path) -> Result<ClientIdentity, CoreError> {
    Ok(ClientIdentity::from_files(cert, key)?)
}

/// Which client certificate the prober presents.
#[derive(Debug, Clone)]
pub struct CertSelector {
    paths: CertPaths,
    kind: CertKind,
}

impl CertSelector {
    /// Pick the initial certificate, reporting an onboarding fallback.
    ///
    /// With neither certificate present the `ERROR` line is written and
    /// [`CoreError::NoCertificate`] returned.
    pub fn select(
        paths: CertPaths,
        report: &mut Report,
    ) -> Result<(Self, ClientIdentity), CoreError> {
        if paths.device_cert.exists() {
            let identity = load(&paths.device_cert, &paths.device_key)?;
            info!(cert = %paths.device_cert.display(), "using device cert");
            let selector = Self {
                paths,
                kind: CertKind::Device,
            };
            return Ok((selector, identity));
        }

        if paths.onboard_cert.exists() && paths.onboard_key.exists() {
            let identity = load(&paths.onboard_cert, &paths.onboard_key)?;
            report.warn(format_args!(
                "no device cert; using onboarding cert at {}",
                now_rfc3339()
            ))?;
            let selector = Self {
                paths,
                kind: CertKind::Onboarding,
            };
            return Ok((selector, identity));
        }

        let timestamp = now_rfc3339();
        report.error(format_args!(
            "no device cert and no onboarding cert at {timestamp}"
        ))?;
        Err(CoreError::NoCertificate { timestamp })
    }

    pub fn kind(&self) -> CertKind {
        self.kind
    }

    /// Switch to the device certificate if it appeared since the last
    /// check. Returns the new identity when a switch happened.
    pub fn check_switch(
        &mut self,
        report: &mut Report,
    ) -> Result<Option<ClientIdentity>, CoreError> {
        if self.kind != CertKind::Onboarding || !self.paths.device_cert.exists() {
            return Ok(None);
        }
        report.warn("Switching from onboard to device cert")?;
        let identity = load(&self.paths.device_cert, &self.paths.device_key)?;
        self.kind = CertKind::Device;
        Ok(Some(identity))
    }
}
