// Authenticated envelope seam.
//
// The probe hands request payloads to `seal` and response bodies to `open`.
// The envelope format itself belongs to the device's auth subsystem; the
// probe only needs the success/failure outcome and the cert-miss signal.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::sender::SenderStatus;

pub trait Envelope: Send + Sync {
    /// Wrap an outgoing payload.
    fn seal(&self, payload: Bytes) -> Result<Bytes, Error>;

    /// Verify and unwrap a response body received from `url`.
    fn open(&self, url: &Url, body: Bytes) -> Result<Bytes, Error>;

    /// Drop the cached controller certificate so the next call reloads it.
    fn clear_controller_cert(&self);
}

/// Envelope for controllers that exchange bare payloads but still require
/// the controller signing certificate to be present on the device.
pub struct SigningCertEnvelope {
    path: PathBuf,
    cert: ArcSwapOption<Vec<u8>>,
}

impl SigningCertEnvelope {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cert: ArcSwapOption::empty(),
        }
    }

    fn controller_cert(&self) -> Result<Arc<Vec<u8>>, Error> {
        if let Some(cert) = self.cert.load_full() {
            return Ok(cert);
        }
        match std::fs::read(&self.path) {
            Ok(bytes) if !bytes.is_empty() => {
                debug!(path = %self.path.display(), "loaded controller signing cert");
                let cert = Arc::new(bytes);
                self.cert.store(Some(Arc::clone(&cert)));
                Ok(cert)
            }
            _ => Err(Error::Send {
                status: SenderStatus::CertMiss,
                message: format!(
                    "controller signing certificate {} unavailable",
                    self.path.display()
                ),
            }),
        }
    }
}

impl Envelope for SigningCertEnvelope {
    fn seal(&self, payload: Bytes) -> Result<Bytes, Error> {
        self.controller_cert()?;
        Ok(payload)
    }

    fn open(&self, url: &Url, body: Bytes) -> Result<Bytes, Error> {
        self.controller_cert()?;
        debug!(%url, len = body.len(), "opened response");
        Ok(body)
    }

    fn clear_controller_cert(&self) {
        self.cert.store(None);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn url() -> Url {
        Url::parse("https://ctrl.example.net/api/v2/edgedevice/uuid").unwrap()
    }

    #[test]
    fn missing_cert_is_cert_miss() {
        let dir = tempfile::tempdir().unwrap();
        let envelope = SigningCertEnvelope::new(dir.path().join("signing.pem"));

        let err = envelope.open(&url(), Bytes::from_static(b"{}")).unwrap_err();
        assert!(err.is_cert_miss(), "got {err:?}");
    }

    #[test]
    fn present_cert_passes_payload_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signing.pem");
        std::fs::write(&path, b"-----BEGIN CERTIFICATE-----").unwrap();
        let envelope = SigningCertEnvelope::new(&path);

        let sealed = envelope.seal(Bytes::from_static(b"{}")).unwrap();
        assert_eq!(&sealed[..], b"{}");
        let opened = envelope.open(&url(), Bytes::from_static(b"{\"uuid\":\"x\"}")).unwrap();
        assert_eq!(&opened[..], b"{\"uuid\":\"x\"}");
    }

    #[test]
    fn clearing_forces_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signing.pem");
        std::fs::write(&path, b"cert").unwrap();
        let envelope = SigningCertEnvelope::new(&path);
        envelope.seal(Bytes::new()).unwrap();

        std::fs::remove_file(&path).unwrap();
        // Still cached.
        envelope.seal(Bytes::new()).unwrap();

        envelope.clear_controller_cert();
        assert!(envelope.seal(Bytes::new()).unwrap_err().is_cert_miss());
    }
}
