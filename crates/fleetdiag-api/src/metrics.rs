//! Cumulative send counters, keyed by interface and by remote URL.
//!
//! Every [`HttpSender`](crate::HttpSender) request lands here. The
//! orchestrator periodically takes a [`MetricsSnapshot`] and publishes it.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceMetrics {
    pub success_count: u64,
    pub failure_count: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UrlMetrics {
    pub try_count: u64,
    pub success_count: u64,
    pub sent_bytes: u64,
    pub recv_bytes: u64,
    pub total_time_ms: u64,
}

/// Serializable point-in-time copy of [`AgentMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub interfaces: BTreeMap<String, InterfaceMetrics>,
    pub urls: BTreeMap<String, UrlMetrics>,
}

/// Lock-free counters shared between the sender and the orchestrator.
#[derive(Debug, Default)]
pub struct AgentMetrics {
    interfaces: DashMap<String, InterfaceMetrics>,
    urls: DashMap<String, UrlMetrics>,
}

impl AgentMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(
        &self,
        ifname: &str,
        url: &str,
        sent_bytes: usize,
        recv_bytes: usize,
        elapsed: Duration,
    ) {
        {
            let mut intf = self.interfaces.entry(ifname.to_owned()).or_default();
            intf.success_count += 1;
            intf.last_success = Some(Utc::now());
        }
        let mut entry = self.urls.entry(url.to_owned()).or_default();
        entry.try_count += 1;
        entry.success_count += 1;
        entry.sent_bytes += u64::try_from(sent_bytes).unwrap_or(u64::MAX);
        entry.recv_bytes += u64::try_from(recv_bytes).unwrap_or(u64::MAX);
        entry.total_time_ms += u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    }

    pub fn record_failure(&self, ifname: &str, url: &str) {
        {
            let mut intf = self.interfaces.entry(ifname.to_owned()).or_default();
            intf.failure_count += 1;
            intf.last_failure = Some(Utc::now());
        }
        self.urls.entry(url.to_owned()).or_default().try_count += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            interfaces: self
                .interfaces
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            urls: self
                .urls
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        }
    }
}
