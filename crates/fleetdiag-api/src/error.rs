use thiserror::Error;

use crate::sender::SenderStatus;

/// Top-level error type for the `fleetdiag-api` crate.
///
/// Covers every failure mode of the wire-side collaborators: HTTP transport,
/// TLS material, DNS resolution and the authenticated envelope.
/// `fleetdiag-core` renders these into report lines; it switches on
/// [`Error::sender_status`], never on the message text.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error that did not match a known classification.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Transport failure classified into a sender status.
    #[error("{message}")]
    Send { status: SenderStatus, message: String },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// No response within the send timeout.
    #[error("{url}: request timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    // ── TLS material ────────────────────────────────────────────────
    /// Client certificate, key or root CA could not be loaded.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── DNS ─────────────────────────────────────────────────────────
    /// Lookup through the interface's own name servers failed.
    #[error("DNS lookup of {host} failed: {message}")]
    Resolve { host: String, message: String },

    // ── Envelope ────────────────────────────────────────────────────
    /// The signed response could not be opened or verified.
    #[error("Envelope verification failed: {0}")]
    Envelope(String),

    // ── IO ──────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The transport classification carried by this error.
    ///
    /// Everything that is not an explicit [`Error::Send`] classifies as
    /// [`SenderStatus::None`], the generic bucket.
    pub fn sender_status(&self) -> SenderStatus {
        match self {
            Self::Send { status, .. } => *status,
            _ => SenderStatus::None,
        }
    }

    /// Returns `true` if the envelope layer is missing the controller
    /// certificate.
    pub fn is_cert_miss(&self) -> bool {
        self.sender_status() == SenderStatus::CertMiss
    }
}
