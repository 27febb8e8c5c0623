// Proxy auto-config fetcher.
//
// WPAD fetches never go through a proxy and are bound to the port's own
// address; the media-type check lives with the caller.

use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::metrics::AgentMetrics;
use crate::transport::{Timeouts, TlsMode, TransportConfig};

const PAC_TIMEOUT: Duration = Duration::from_secs(15);

/// A fetched auto-config candidate.
#[derive(Debug, Clone)]
pub struct PacResponse {
    pub content_type: Option<String>,
    pub body: Bytes,
}

pub trait PacFetcher: Send + Sync {
    fn fetch(
        &self,
        url: &Url,
        ifname: &str,
        local_addr: Option<IpAddr>,
    ) -> impl Future<Output = Result<PacResponse, Error>> + Send;
}

/// reqwest-backed [`PacFetcher`] with a fixed 15 second budget.
pub struct HttpPacFetcher {
    metrics: Arc<AgentMetrics>,
}

impl HttpPacFetcher {
    pub fn new(metrics: Arc<AgentMetrics>) -> Self {
        Self { metrics }
    }
}

impl PacFetcher for HttpPacFetcher {
    async fn fetch(
        &self,
        url: &Url,
        ifname: &str,
        local_addr: Option<IpAddr>,
    ) -> Result<PacResponse, Error> {
        let client = TransportConfig {
            tls: TlsMode::System,
            timeouts: Timeouts {
                send: PAC_TIMEOUT,
                dial: PAC_TIMEOUT,
            },
            local_addr,
            allow_proxy: false,
            ..TransportConfig::default()
        }
        .build_client()?;

        debug!(ifname, "GET {}", url);
        let started = Instant::now();
        let resp = match client.get(url.clone()).send().await {
            Ok(resp) => resp,
            Err(e) => {
                self.metrics.record_failure(ifname, url.as_str());
                return Err(Error::Transport(e));
            }
        };

        if !resp.status().is_success() {
            self.metrics.record_failure(ifname, url.as_str());
            return Err(Error::Send {
                status: crate::sender::SenderStatus::None,
                message: format!("{url} returned {}", resp.status()),
            });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = resp.bytes().await?;
        self.metrics
            .record_success(ifname, url.as_str(), 0, body.len(), started.elapsed());

        Ok(PacResponse { content_type, body })
    }
}
