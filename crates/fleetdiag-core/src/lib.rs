//! Connectivity verification between an edge device and its fleet
//! controller.
//!
//! This crate owns the diagnostic logic on top of `fleetdiag-api`:
//!
//! - **[`Diagnostics`]**: Single-owner event loop. Consumes whole-object
//!   snapshot changes over typed channels ([`Inputs`]), waits for the
//!   global configuration, selects a client certificate, then renders a
//!   report pass whenever every input has arrived and something
//!   report-worthy changes. Metrics snapshots are published on a
//!   `tokio::sync::watch` channel.
//!
//! - **[`Prober`]**: Per-port controller reachability: DNS through the
//!   port's own servers, an unauthenticated ping, an envelope-wrapped UUID
//!   round-trip, bounded retries, and an Internet diagnosis when the
//!   controller itself is unreachable.
//!
//! - **[`WpadResolver`]**: Web Proxy Auto-Discovery over the domain
//!   suffix walk, writing the fetched PAC script back onto the port.
//!
//! - **[`status::derive`]**: Reduction of the raw LED counter, address
//!   availability and radio silence into one reported status.
//!
//! - **Feeds** ([`feed`]): Polling file watchers that turn the snapshot
//!   files written by the device's other agents into [`Change`] events.

pub mod certs;
pub mod config;
pub mod diag;
pub mod error;
pub mod fallback;
pub mod feed;
pub mod model;
pub mod pass;
pub mod prober;
pub mod proxy;
pub mod report;
pub mod server;
pub mod status;

// ── Primary re-exports ──────────────────────────────────────────────
pub use certs::{CertKind, CertSelector};
pub use config::{CertPaths, DiagConfig, FeedConfig, ProbeConfig};
pub use diag::{Diagnostics, RunSummary};
pub use error::CoreError;
pub use feed::{Change, InputSenders, Inputs, channels, spawn_feeds};
pub use pass::{PassInput, PassOptions, PassSummary, run_pass};
pub use prober::{PortProbe, ProbeOutcome, ProbeResult, ProbeStep, Prober};
pub use proxy::WpadResolver;
pub use report::{MemorySink, Report, Severity};
pub use server::ControllerAddress;
pub use status::StatusTracker;

pub use model::{
    GlobalConfig, LedBlinkCounter, LedCounter, MostlyEqual, NetworkStatus, OnboardingStatus,
    Port, PortConfigList,
};
