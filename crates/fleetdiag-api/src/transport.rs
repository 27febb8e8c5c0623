// Shared transport configuration for building reqwest::Client instances.
//
// Every probe is bound to one port: its source address, its explicit
// proxies and the client identity currently in use. Controller, WPAD and
// internet probes all build their clients through this module.

use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretSlice};

use crate::error::Error;

const USER_AGENT: &str = concat!("fleetdiag/", env!("CARGO_PKG_VERSION"));

/// TLS verification mode.
#[derive(Debug, Clone)]
pub enum TlsMode {
    /// Use the built-in root store.
    System,
    /// Trust the controller root CA from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (internet reachability probes only).
    DangerAcceptInvalid,
}

/// Send and dial timeouts, taken from the device's global tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub send: Duration,
    pub dial: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            send: Duration::from_secs(120),
            dial: Duration::from_secs(10),
        }
    }
}

// ── Proxies ─────────────────────────────────────────────────────────

/// Which request scheme an explicit proxy serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyScheme {
    Http,
    Https,
}

/// One explicit proxy, e.g. `http://proxy.corp:3128` for https requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyRoute {
    pub scheme: ProxyScheme,
    pub url: String,
}

// ── Client identity ─────────────────────────────────────────────────

/// Client certificate and private key presented to the controller.
pub struct ClientIdentity {
    cert_pem: Vec<u8>,
    key_pem: SecretSlice<u8>,
}

impl ClientIdentity {
    pub fn from_pem(cert_pem: Vec<u8>, key_pem: Vec<u8>) -> Self {
        Self {
            cert_pem,
            key_pem: SecretSlice::from(key_pem),
        }
    }

    /// Load a certificate/key pair from disk.
    pub fn from_files(cert: &Path, key: &Path) -> Result<Self, Error> {
        let cert_pem = std::fs::read(cert)
            .map_err(|e| Error::Tls(format!("failed to read {}: {e}", cert.display())))?;
        let key_pem = std::fs::read(key)
            .map_err(|e| Error::Tls(format!("failed to read {}: {e}", key.display())))?;
        Ok(Self::from_pem(cert_pem, key_pem))
    }

    fn to_reqwest(&self) -> Result<reqwest::Identity, Error> {
        let key = self.key_pem.expose_secret();
        let mut pem = Vec::with_capacity(self.cert_pem.len() + key.len() + 1);
        pem.extend_from_slice(&self.cert_pem);
        pem.push(b'\n');
        pem.extend_from_slice(key);
        reqwest::Identity::from_pem(&pem)
            .map_err(|e| Error::Tls(format!("invalid client certificate: {e}")))
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("cert_pem_len", &self.cert_pem.len())
            .field("key_pem", &"[REDACTED]")
            .finish()
    }
}

// ── TransportConfig ─────────────────────────────────────────────────

/// Transport configuration for building one interface-bound HTTP client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeouts: Timeouts,
    pub identity: Option<Arc<ClientIdentity>>,
    pub local_addr: Option<IpAddr>,
    pub proxies: Vec<ProxyRoute>,
    /// Comma-separated hosts and domains that bypass the proxies.
    pub exceptions: String,
    pub allow_proxy: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeouts: Timeouts::default(),
            identity: None,
            local_addr: None,
            proxies: Vec::new(),
            exceptions: String::new(),
            allow_proxy: true,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeouts.send)
            .connect_timeout(self.timeouts.dial)
            .user_agent(USER_AGENT)
            .local_address(self.local_addr);

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        if let Some(ref identity) = self.identity {
            builder = builder.identity(identity.to_reqwest()?);
        }

        if !self.allow_proxy || self.proxies.is_empty() {
            builder = builder.no_proxy();
        } else {
            for route in &self.proxies {
                let proxy = match route.scheme {
                    ProxyScheme::Http => reqwest::Proxy::http(&route.url)?,
                    ProxyScheme::Https => reqwest::Proxy::https(&route.url)?,
                };
                let proxy = proxy.no_proxy(reqwest::NoProxy::from_string(&self.exceptions));
                builder = builder.proxy(proxy);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}
