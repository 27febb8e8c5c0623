// ── Diagnostic orchestrator ──
//
// Single event loop owning all snapshot state. It waits for the global
// configuration, picks the client certificate, then reacts to the input
// topics: a report pass runs once every input has arrived and again on
// each report-worthy change. Metrics are flushed on a fixed period.

use std::sync::Arc;

use fleetdiag_api::{AgentMetrics, Envelope, HostResolver, MetricsSnapshot, PacFetcher, Sender};
use tokio::sync::watch;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::certs::CertSelector;
use crate::config::DiagConfig;
use crate::error::CoreError;
use crate::feed::{Change, Inputs};
use crate::model::{
    GlobalConfig, LedBlinkCounter, LedCounter, MostlyEqual, NetworkStatus, OnboardingStatus,
    PortConfigList,
};
use crate::pass::{PassInput, PassOptions, run_pass};
use crate::prober::Prober;
use crate::proxy::WpadResolver;
use crate::report::Report;
use crate::server::ControllerAddress;
use crate::status::StatusTracker;

const GLOBAL_KEY: &str = "global";
const LED_KEY: &str = "ledconfig";

/// What a finished run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passes: usize,
}

// ── Snapshot state ──────────────────────────────────────────────────

#[derive(Debug, Default)]
struct State {
    global: GlobalConfig,
    network: NetworkStatus,
    port_configs: PortConfigList,
    onboarding: OnboardingStatus,
    status: StatusTracker,
    got_global: bool,
    got_network: bool,
    got_port_configs: bool,
    got_led: bool,
    got_onboarding: bool,
}

impl State {
    /// Every input a pass renders from has been seen at least once.
    fn ready(&self) -> bool {
        self.got_network && self.got_port_configs && self.got_led && self.got_onboarding
    }

    /// Returns `true` when the timeouts may have changed.
    fn apply_global(&mut self, change: Change<GlobalConfig>) -> bool {
        if change.key() != GLOBAL_KEY {
            debug!(key = change.key(), "ignoring global config key");
            return false;
        }
        self.got_global = true;
        let next = match change {
            Change::Upsert { value, .. } => value,
            Change::Delete { .. } => GlobalConfig::default(),
        };
        if next == self.global {
            return false;
        }
        self.global = next;
        true
    }

    fn apply_led(&mut self, change: Change<LedBlinkCounter>) -> bool {
        if change.key() != LED_KEY {
            debug!(key = change.key(), "ignoring LED counter key");
            return false;
        }
        self.got_led = true;
        match change {
            Change::Upsert { value, .. } => self.status.update_led(value.blink_counter),
            Change::Delete { .. } => false,
        }
    }

    fn apply_network(&mut self, change: Change<NetworkStatus>) -> bool {
        if change.key() != GLOBAL_KEY {
            debug!(key = change.key(), "ignoring network status key");
            return false;
        }
        self.got_network = true;
        let next = match change {
            Change::Upsert { value, .. } => value,
            Change::Delete { .. } => NetworkStatus::default(),
        };
        if next == self.network {
            return false;
        }
        if self.status.update_network(&next) {
            info!(
                status = %self.status.derived(),
                radio_silence = self.status.radio_silence(),
                "derived status changed"
            );
        }
        let trigger = !self.network.mostly_eq(&next);
        self.network = next;
        trigger
    }

    fn apply_port_configs(&mut self, change: Change<PortConfigList>) -> bool {
        if change.key() != GLOBAL_KEY {
            debug!(key = change.key(), "ignoring port config key");
            return false;
        }
        self.got_port_configs = true;
        let next = match change {
            Change::Upsert { value, .. } => value,
            Change::Delete { .. } => PortConfigList::default(),
        };
        if self.port_configs.mostly_eq(&next) {
            return false;
        }
        self.port_configs = next;
        true
    }

    fn apply_onboarding(&mut self, change: Change<OnboardingStatus>) -> bool {
        self.got_onboarding = true;
        let next = match change {
            Change::Upsert { value, .. } => value,
            Change::Delete { .. } => OnboardingStatus::default(),
        };
        let changed = next.device_id() != self.onboarding.device_id();
        if changed {
            if let Some(id) = next.device_id() {
                info!(uuid = %id, "device onboarded");
            }
        }
        self.onboarding = next;
        changed
    }
}

// ── Diagnostics ─────────────────────────────────────────────────────

/// The diagnostic event loop and everything it owns.
pub struct Diagnostics<S, R, E, P> {
    config: DiagConfig,
    report: Report,
    prober: Prober<S, R, E>,
    wpad: WpadResolver<P>,
    metrics: Arc<AgentMetrics>,
    metrics_tx: watch::Sender<MetricsSnapshot>,
    state: State,
}

impl<S, R, E, P> Diagnostics<S, R, E, P>
where
    S: Sender,
    R: HostResolver,
    E: Envelope,
    P: PacFetcher,
{
    pub fn new(
        config: DiagConfig,
        report: Report,
        sender: S,
        resolver: R,
        envelope: E,
        fetcher: P,
        metrics: Arc<AgentMetrics>,
    ) -> Self {
        let prober = Prober::new(sender, resolver, envelope, config.probe.clone());
        let (metrics_tx, _) = watch::channel(MetricsSnapshot::default());
        Self {
            config,
            report,
            prober,
            wpad: WpadResolver::new(fetcher),
            metrics,
            metrics_tx,
            state: State::default(),
        }
    }

    /// Receive every published metrics snapshot.
    pub fn subscribe_metrics(&self) -> watch::Receiver<MetricsSnapshot> {
        self.metrics_tx.subscribe()
    }

    /// Current derived device status.
    pub fn status(&self) -> LedCounter {
        self.state.status.derived()
    }

    /// Run until cancelled or, without `forever`, until the first full
    /// report pass completes.
    pub async fn run(
        mut self,
        mut inputs: Inputs,
        cancel: CancellationToken,
    ) -> Result<RunSummary, CoreError> {
        let mut summary = RunSummary::default();

        // Timeouts come from the global config; nothing is sent before it.
        while !self.state.got_global {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(summary),
                change = inputs.global_config.recv() => {
                    let change = change.ok_or(CoreError::ChannelClosed("global config"))?;
                    self.on_global(change);
                }
            }
        }
        info!("global config initialized");

        let mut server = ControllerAddress::read(&self.config.server_file)?;
        let (mut certs, identity) = CertSelector::select(self.config.certs.clone(), &mut self.report)?;
        self.prober.sender().set_identity(Some(Arc::new(identity)));
        info!(server = %server, cert = %certs.kind(), "diagnostics started");

        let period = self.config.metrics_interval;
        let mut flush = interval_at(Instant::now() + period, period);

        loop {
            let was_ready = self.state.ready();
            let trigger = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = flush.tick() => {
                    self.metrics_tx.send_replace(self.metrics.snapshot());
                    debug!("metrics published");
                    false
                }
                change = inputs.global_config.recv() => {
                    let change = change.ok_or(CoreError::ChannelClosed("global config"))?;
                    self.on_global(change);
                    false
                }
                change = inputs.led.recv() => {
                    let change = change.ok_or(CoreError::ChannelClosed("LED counter"))?;
                    self.state.apply_led(change)
                }
                change = inputs.network.recv() => {
                    let change = change.ok_or(CoreError::ChannelClosed("network status"))?;
                    self.state.apply_network(change)
                }
                change = inputs.port_configs.recv() => {
                    let change = change.ok_or(CoreError::ChannelClosed("port config list"))?;
                    self.state.apply_port_configs(change)
                }
                change = inputs.onboarding.recv() => {
                    let change = change.ok_or(CoreError::ChannelClosed("onboarding status"))?;
                    self.state.apply_onboarding(change)
                }
            };

            let ready = self.state.ready();
            if ready && (trigger || !was_ready) {
                if !self.report_pass(&server, &cancel).await? {
                    break;
                }
                summary.passes += 1;
                if !self.config.forever {
                    break;
                }
            }

            if let Some(identity) = certs.check_switch(&mut self.report)? {
                self.prober.sender().set_identity(Some(Arc::new(identity)));
            }

            match ControllerAddress::read(&self.config.server_file) {
                Ok(current) if current != server => {
                    warn!(old = %server, new = %current, "controller address changed");
                    server = current;
                }
                Ok(_) => {}
                Err(e) => error!("{e}"),
            }
        }

        info!(passes = summary.passes, "diagnostics stopped");
        Ok(summary)
    }

    fn on_global(&mut self, change: Change<GlobalConfig>) {
        if self.state.apply_global(change) {
            let timeouts = self.state.global.timeouts();
            debug!(send = ?timeouts.send, dial = ?timeouts.dial, "applying timeouts");
            self.prober.sender().set_timeouts(timeouts);
        }
    }

    /// Render one pass. Returns `false` if cancelled midway.
    async fn report_pass(
        &mut self,
        server: &ControllerAddress,
        cancel: &CancellationToken,
    ) -> Result<bool, CoreError> {
        let input = PassInput {
            network: &self.state.network,
            port_configs: &self.state.port_configs,
            status: self.state.status.derived(),
            server,
        };
        let options = PassOptions {
            pac_contents: self.config.pac_contents,
            probe_app_ports: self.config.probe.probe_app_ports,
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => Ok(false),
            result = run_pass(&mut self.report, &mut self.prober, &self.wpad, input, options) => {
                let pass = result?;
                debug!(eligible = pass.eligible, passed = pass.passed, "report pass done");
                Ok(true)
            }
        }
    }
}
