// fleetdiag-api: Interface-bound HTTP, DNS and envelope plumbing for controller probes

pub mod envelope;
pub mod error;
pub mod metrics;
pub mod pac;
pub mod resolver;
pub mod sender;
pub mod transport;
pub mod urls;

pub use envelope::{Envelope, SigningCertEnvelope};
pub use error::Error;
pub use metrics::{AgentMetrics, MetricsSnapshot};
pub use pac::{HttpPacFetcher, PacFetcher, PacResponse};
pub use resolver::{HostResolver, InterfaceResolver};
pub use sender::{HttpSender, Route, SendRequest, SendResponse, Sender, SenderStatus};
pub use transport::{ClientIdentity, ProxyRoute, ProxyScheme, Timeouts, TlsMode, TransportConfig};
pub use urls::controller_url;
