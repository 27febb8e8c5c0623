// ── Core error types ──
//
// Errors surfaced by fleetdiag-core. Per-port probe failures are not
// errors: they become report lines. What remains here stops a whole
// report pass or the diagnostic loop itself. The `From<fleetdiag_api::Error>`
// impl folds wire-side failures into these variants.

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration-fatal ──────────────────────────────────────────
    #[error("no device cert and no onboarding cert at {timestamp}")]
    NoCertificate { timestamp: String },

    #[error("Cannot read controller address from {}: {source}", path.display())]
    ControllerFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Controller address file {} is empty", path.display())]
    EmptyControllerFile { path: PathBuf },

    #[error("Cannot load client certificate: {message}")]
    Certificate { message: String },

    // ── Proxy discovery ──────────────────────────────────────────────
    #[error("{message}")]
    ProxyDiscovery { message: String },

    // ── Snapshot feeds ───────────────────────────────────────────────
    #[error("Cannot decode {topic} snapshot: {source}")]
    Decode {
        topic: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Input channel {0} closed")]
    ChannelClosed(&'static str),

    // ── Wire-side errors (wrapped) ───────────────────────────────────
    #[error("{message}")]
    Api {
        message: String,
        status: fleetdiag_api::SenderStatus,
    },

    // ── Report sink ──────────────────────────────────────────────────
    #[error("Cannot write report: {0}")]
    Report(#[from] std::io::Error),
}

// ── Conversion from wire-side errors ─────────────────────────────────

impl From<fleetdiag_api::Error> for CoreError {
    fn from(err: fleetdiag_api::Error) -> Self {
        match err {
            fleetdiag_api::Error::Tls(message) => CoreError::Certificate { message },
            fleetdiag_api::Error::Io(e) => CoreError::Report(e),
            other => CoreError::Api {
                status: other.sender_status(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use fleetdiag_api::SenderStatus;

    use super::*;

    #[test]
    fn classified_send_error_keeps_status() {
        let err: CoreError = fleetdiag_api::Error::Send {
            status: SenderStatus::NotFound,
            message: "gone".into(),
        }
        .into();
        assert!(matches!(
            err,
            CoreError::Api {
                status: SenderStatus::NotFound,
                ..
            }
        ));
    }

    #[test]
    fn tls_material_is_a_certificate_error() {
        let err: CoreError = fleetdiag_api::Error::Tls("bad key".into()).into();
        assert!(matches!(err, CoreError::Certificate { .. }));
        assert_eq!(err.to_string(), "Cannot load client certificate: bad key");
    }
}
