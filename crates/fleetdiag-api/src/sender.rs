// Interface-bound request sender.
//
// A `Sender` issues one HTTP request over one port and classifies
// connection-level failures into the closed `SenderStatus` set. The
// reqwest-backed `HttpSender` caches one client per route and swaps its
// client identity and timeouts at runtime.

use std::error::Error as StdError;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::{ArcSwap, ArcSwapOption};
use bytes::Bytes;
use dashmap::DashMap;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::metrics::AgentMetrics;
use crate::transport::{ClientIdentity, ProxyRoute, Timeouts, TlsMode, TransportConfig};

// ── SenderStatus ────────────────────────────────────────────────────

/// Transport-layer outcome classification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, strum::Display,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SenderStatus {
    /// Generic failure, nothing more specific is known.
    #[default]
    None,
    /// Controller answered 503 while upgrading.
    Upgrade,
    /// Connection refused (ECONNREFUSED).
    Refused,
    /// Certificate outside its validity window.
    CertInvalid,
    /// Controller signing certificate unavailable to the envelope layer.
    CertMiss,
    /// Controller answered 404, e.g. the device was deleted.
    NotFound,
}

// ── Request / response ──────────────────────────────────────────────

/// Where a request leaves the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub ifname: String,
    pub local_addr: Option<IpAddr>,
    pub proxies: Vec<ProxyRoute>,
    pub exceptions: String,
    pub verify_tls: bool,
}

impl Route {
    /// A proxy-less route bound to `local_addr`.
    pub fn direct(ifname: impl Into<String>, local_addr: Option<IpAddr>) -> Self {
        Self {
            ifname: ifname.into(),
            local_addr,
            proxies: Vec::new(),
            exceptions: String::new(),
            verify_tls: true,
        }
    }
}

/// A GET (no body) or POST (JSON body).
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub url: Url,
    pub body: Option<Bytes>,
}

impl SendRequest {
    pub fn get(url: Url) -> Self {
        Self { url, body: None }
    }

    pub fn post(url: Url, body: Bytes) -> Self {
        Self {
            url,
            body: Some(body),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SendResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl SendResponse {
    /// Canonical reason phrase for the status code, empty if unknown.
    pub fn status_text(&self) -> &'static str {
        StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("")
    }

    /// Media type without parameters, lowercased.
    pub fn media_type(&self) -> Option<String> {
        self.content_type.as_deref().map(media_type)
    }
}

/// Strip parameters (`; charset=...`) from a Content-Type value.
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

// ── Sender trait ────────────────────────────────────────────────────

/// Sends one request over one port.
pub trait Sender: Send + Sync {
    fn send(
        &self,
        route: &Route,
        request: SendRequest,
    ) -> impl Future<Output = Result<SendResponse, Error>> + Send;

    /// Replace the client identity presented on subsequent requests.
    fn set_identity(&self, _identity: Option<Arc<ClientIdentity>>) {}

    /// Replace the send and dial timeouts.
    fn set_timeouts(&self, _timeouts: Timeouts) {}
}

impl<T: Sender> Sender for &T {
    fn send(
        &self,
        route: &Route,
        request: SendRequest,
    ) -> impl Future<Output = Result<SendResponse, Error>> + Send {
        (**self).send(route, request)
    }

    fn set_identity(&self, identity: Option<Arc<ClientIdentity>>) {
        (**self).set_identity(identity);
    }

    fn set_timeouts(&self, timeouts: Timeouts) {
        (**self).set_timeouts(timeouts);
    }
}

impl<T: Sender> Sender for Arc<T> {
    fn send(
        &self,
        route: &Route,
        request: SendRequest,
    ) -> impl Future<Output = Result<SendResponse, Error>> + Send {
        (**self).send(route, request)
    }

    fn set_identity(&self, identity: Option<Arc<ClientIdentity>>) {
        (**self).set_identity(identity);
    }

    fn set_timeouts(&self, timeouts: Timeouts) {
        (**self).set_timeouts(timeouts);
    }
}

// ── HttpSender ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    local_addr: Option<IpAddr>,
    proxies: Vec<ProxyRoute>,
    exceptions: String,
    verify_tls: bool,
}

impl From<&Route> for ClientKey {
    fn from(route: &Route) -> Self {
        Self {
            local_addr: route.local_addr,
            proxies: route.proxies.clone(),
            exceptions: route.exceptions.clone(),
            verify_tls: route.verify_tls,
        }
    }
}

/// reqwest-backed [`Sender`].
pub struct HttpSender {
    tls: TlsMode,
    timeouts: ArcSwap<Timeouts>,
    identity: ArcSwapOption<ClientIdentity>,
    clients: DashMap<ClientKey, reqwest::Client>,
    metrics: Arc<AgentMetrics>,
}

impl HttpSender {
    pub fn new(tls: TlsMode, metrics: Arc<AgentMetrics>) -> Self {
        Self {
            tls,
            timeouts: ArcSwap::from_pointee(Timeouts::default()),
            identity: ArcSwapOption::empty(),
            clients: DashMap::new(),
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<AgentMetrics> {
        &self.metrics
    }

    fn client_for(&self, route: &Route) -> Result<reqwest::Client, Error> {
        let key = ClientKey::from(route);
        if let Some(client) = self.clients.get(&key) {
            return Ok(client.clone());
        }

        let config = TransportConfig {
            tls: if route.verify_tls {
                self.tls.clone()
            } else {
                TlsMode::DangerAcceptInvalid
            },
            timeouts: **self.timeouts.load(),
            identity: self.identity.load_full(),
            local_addr: route.local_addr,
            proxies: route.proxies.clone(),
            exceptions: route.exceptions.clone(),
            allow_proxy: true,
        };
        let client = config.build_client()?;
        self.clients.insert(key, client.clone());
        Ok(client)
    }
}

impl Sender for HttpSender {
    async fn send(&self, route: &Route, request: SendRequest) -> Result<SendResponse, Error> {
        let client = self.client_for(route)?;
        let url = request.url;
        let started = Instant::now();

        let (builder, sent) = match request.body {
            Some(body) => {
                debug!(ifname = %route.ifname, "POST {}", url);
                let len = body.len();
                let builder = client
                    .post(url.clone())
                    .header(CONTENT_TYPE, "application/json")
                    .body(body);
                (builder, len)
            }
            None => {
                debug!(ifname = %route.ifname, "GET {}", url);
                (client.get(url.clone()), 0)
            }
        };

        let send_timeout = self.timeouts.load().send;
        let resp = match builder.send().await {
            Ok(resp) => resp,
            Err(e) => {
                self.metrics.record_failure(&route.ifname, url.as_str());
                return Err(classify(e, send_timeout));
            }
        };

        let status = resp.status();
        let classified = match status {
            StatusCode::NOT_FOUND => Some(SenderStatus::NotFound),
            StatusCode::SERVICE_UNAVAILABLE => Some(SenderStatus::Upgrade),
            _ => None,
        };
        if let Some(sender_status) = classified {
            self.metrics.record_failure(&route.ifname, url.as_str());
            return Err(Error::Send {
                status: sender_status,
                message: format!("{url} returned {status}"),
            });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = resp
            .bytes()
            .await
            .map_err(|e| classify(e, send_timeout))?;

        self.metrics
            .record_success(&route.ifname, url.as_str(), sent, body.len(), started.elapsed());

        Ok(SendResponse {
            status: status.as_u16(),
            content_type,
            body,
        })
    }

    fn set_identity(&self, identity: Option<Arc<ClientIdentity>>) {
        self.identity.store(identity);
        self.clients.clear();
    }

    fn set_timeouts(&self, timeouts: Timeouts) {
        if **self.timeouts.load() != timeouts {
            self.timeouts.store(Arc::new(timeouts));
            self.clients.clear();
        }
    }
}

// ── Failure classification ──────────────────────────────────────────

/// Map a reqwest failure onto a [`SenderStatus`] by walking its source
/// chain for typed io and rustls errors. Timeouts keep the generic status.
fn classify(err: reqwest::Error, send_timeout: Duration) -> Error {
    if err.is_timeout() {
        return Error::Timeout {
            url: err.url().map(ToString::to_string).unwrap_or_default(),
            timeout_secs: send_timeout.as_secs(),
        };
    }
    match classify_chain(&err) {
        Some(status) => Error::Send {
            status,
            message: err.to_string(),
        },
        None => Error::Transport(err),
    }
}

fn classify_chain(err: &reqwest::Error) -> Option<SenderStatus> {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return Some(SenderStatus::Refused);
            }
            if let Some(tls) = io.get_ref().and_then(|i| i.downcast_ref::<rustls::Error>()) {
                if is_invalid_time(tls) {
                    return Some(SenderStatus::CertInvalid);
                }
            }
        }
        if let Some(tls) = e.downcast_ref::<rustls::Error>() {
            if is_invalid_time(tls) {
                return Some(SenderStatus::CertInvalid);
            }
        }
        source = e.source();
    }
    None
}

fn is_invalid_time(err: &rustls::Error) -> bool {
    matches!(
        err,
        rustls::Error::InvalidCertificate(
            rustls::CertificateError::Expired
                | rustls::CertificateError::NotValidYet
                | rustls::CertificateError::ExpiredContext { .. }
                | rustls::CertificateError::NotValidYetContext { .. }
        )
    )
}
