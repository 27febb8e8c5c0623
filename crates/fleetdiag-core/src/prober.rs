// ── Controller reachability prober ──
//
// Per port: DNS lookup through the port's own name servers, a ping GET
// and an enveloped uuid POST, each with a fixed-delay retry loop. A failed
// ping triggers a best-effort internet reachability check that never
// counts toward the port's verdict.

use std::fmt;
use std::io;
use std::net::IpAddr;

use bytes::Bytes;
use fleetdiag_api::{
    Envelope, Error as ApiError, HostResolver, Route, SendRequest, SendResponse, Sender,
    SenderStatus, controller_url,
};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ProbeConfig;
use crate::model::Port;
use crate::proxy::{is_proxied, lookup_proxy, route_for};
use crate::report::Report;
use crate::server::ControllerAddress;

// ── Outcomes ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ProbeStep {
    #[strum(serialize = "dns")]
    Dns,
    #[strum(serialize = "ping")]
    Ping,
    #[strum(serialize = "round-trip")]
    RoundTrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Pass,
    /// A failed attempt still within the retry ceiling.
    Retry,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub step: ProbeStep,
    pub result: ProbeResult,
    pub reason: String,
    pub sender_status: Option<SenderStatus>,
}

impl ProbeOutcome {
    fn pass(step: ProbeStep) -> Self {
        Self {
            step,
            result: ProbeResult::Pass,
            reason: String::new(),
            sender_status: None,
        }
    }

    fn fail(step: ProbeStep, reason: impl Into<String>) -> Self {
        Self {
            step,
            result: ProbeResult::Fail,
            reason: reason.into(),
            sender_status: None,
        }
    }

    fn with_status(mut self, status: Option<SenderStatus>) -> Self {
        self.sender_status = status;
        self
    }

    pub fn passed(&self) -> bool {
        self.result == ProbeResult::Pass
    }
}

/// Everything that happened to one port in one report pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortProbe {
    pub ifname: String,
    pub outcomes: Vec<ProbeOutcome>,
}

impl PortProbe {
    fn new(ifname: &str) -> Self {
        Self {
            ifname: ifname.to_owned(),
            outcomes: Vec::new(),
        }
    }

    /// DNS (unless skipped), ping and round-trip all passed.
    pub fn passed(&self) -> bool {
        [ProbeStep::Ping, ProbeStep::RoundTrip].iter().all(|step| {
            self.outcomes
                .iter()
                .any(|o| o.step == *step && o.passed())
        }) && self.outcomes.iter().all(|o| o.result != ProbeResult::Fail)
    }

    /// Number of attempts made for `step`.
    pub fn attempts(&self, step: ProbeStep) -> usize {
        self.outcomes.iter().filter(|o| o.step == step).count()
    }
}

// ── Attempts ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Get,
    Post,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "get",
            Self::Post => "post",
        })
    }
}

/// Why an attempt failed.
struct Failure {
    reason: String,
    status: Option<SenderStatus>,
}

/// One attempt's result.
enum Attempt {
    Done(SendResponse),
    Failed(Failure),
}

fn status_label(status: u16) -> Option<&'static str> {
    match status {
        200 => Some("StatusOK"),
        201 => Some("StatusCreated"),
        304 => Some("StatusNotModified"),
        _ => None,
    }
}

fn accepted(verb: Verb, status: u16) -> bool {
    match verb {
        Verb::Get => matches!(status, 200 | 304),
        Verb::Post => matches!(status, 200 | 201 | 304),
    }
}

#[derive(Debug, Deserialize)]
struct UuidResponse {
    uuid: String,
}

// ── Prober ──────────────────────────────────────────────────────────

pub struct Prober<S, R, E> {
    sender: S,
    resolver: R,
    envelope: E,
    config: ProbeConfig,
    last_uuid: Option<String>,
}

impl<S: Sender, R: HostResolver, E: Envelope> Prober<S, R, E> {
    pub fn new(sender: S, resolver: R, envelope: E, config: ProbeConfig) -> Self {
        Self {
            sender,
            resolver,
            envelope,
            config,
            last_uuid: None,
        }
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Identity most recently returned by the controller.
    pub fn last_uuid(&self) -> Option<&str> {
        self.last_uuid.as_deref()
    }

    /// Run DNS, ping and round-trip on `port`, stopping at the first
    /// failing step. Writes a `PASS` line when all succeed.
    pub async fn probe_port(
        &mut self,
        report: &mut Report,
        port: &Port,
        server: &ControllerAddress,
    ) -> io::Result<PortProbe> {
        let mut probe = PortProbe::new(&port.if_name);

        // An explicit proxy resolves names itself.
        if !is_proxied(&port.proxy_config, server.name()) {
            let dns = self.lookup(report, port, server).await?;
            let ok = dns.passed();
            probe.outcomes.push(dns);
            if !ok {
                return Ok(probe);
            }
        }

        let ping = self.ping(report, port, server, &mut probe.outcomes).await?;
        if !ping {
            report.error(format_args!(
                "{}: ping failed to {server}; trying {}",
                port.if_name,
                join_urls(&self.config.internet_probe_urls, ", ")
            ))?;
            self.diagnose_internet(report, port, server).await?;
            return Ok(probe);
        }

        if !self.post_uuid(report, port, server, &mut probe.outcomes).await? {
            return Ok(probe);
        }

        report.pass(format_args!(
            "port {} fully connected to EV controller {}",
            port.if_name,
            server.name()
        ))?;
        Ok(probe)
    }

    // ── DNS ─────────────────────────────────────────────────────────

    /// Resolve the controller through the port's own DNS servers, trying
    /// each usable source address until one gets an answer.
    pub async fn lookup(
        &self,
        report: &mut Report,
        port: &Port,
        server: &ControllerAddress,
    ) -> io::Result<ProbeOutcome> {
        let ifname = &port.if_name;
        let name = server.name();
        let sources: Vec<IpAddr> = port.usable_addrs().map(|ai| ai.addr).collect();

        if sources.is_empty() {
            report.error(format_args!(
                "{ifname}: DNS lookup of {name} not possible since no IP address"
            ))?;
            return Ok(ProbeOutcome::fail(ProbeStep::Dns, "no IP address"));
        }
        if port.dns_servers.is_empty() {
            report.error(format_args!(
                "{ifname}: DNS lookup of {name} not possible: no DNS servers available"
            ))?;
            return Ok(ProbeOutcome::fail(ProbeStep::Dns, "no DNS servers available"));
        }

        for source in sources {
            debug!(ifname, %source, "DNS lookup");
            let ips = match self.resolver.lookup(name, source, &port.dns_servers).await {
                Ok(ips) => ips,
                Err(e) => {
                    let reason = match e {
                        ApiError::Resolve { message, .. } => message,
                        other => other.to_string(),
                    };
                    report.error(format_args!(
                        "{ifname}: DNS lookup of {name} failed: {reason}"
                    ))?;
                    continue;
                }
            };
            if ips.is_empty() {
                report.error(format_args!(
                    "{ifname}: DNS lookup of {name} returned no answers"
                ))?;
                return Ok(ProbeOutcome::fail(ProbeStep::Dns, "no answers"));
            }
            for ip in &ips {
                report.info(format_args!("{ifname}: DNS lookup of {name} returned {ip}"))?;
            }
            if self.config.simulate_dns_failure {
                report.info(format_args!("{ifname}: Simulate DNS lookup failure"))?;
                return Ok(ProbeOutcome::fail(ProbeStep::Dns, "simulated failure"));
            }
            return Ok(ProbeOutcome::pass(ProbeStep::Dns));
        }

        Ok(ProbeOutcome::fail(
            ProbeStep::Dns,
            "lookup failed from every source address",
        ))
    }

    // ── Ping ────────────────────────────────────────────────────────

    /// GET the controller ping endpoint with retries. Appends one outcome
    /// per attempt and returns whether the step passed.
    pub async fn ping(
        &self,
        report: &mut Report,
        port: &Port,
        server: &ControllerAddress,
        outcomes: &mut Vec<ProbeOutcome>,
    ) -> io::Result<bool> {
        let url = match controller_url(server.name_and_port(), self.config.v2_api, None, "ping")
        {
            Ok(url) => url,
            Err(e) => {
                report.error(format_args!("{}: ping: {e}", port.if_name))?;
                outcomes.push(ProbeOutcome::fail(ProbeStep::Ping, e.to_string()));
                return Ok(false);
            }
        };
        let route = route_for(port, port.first_usable_addr(), true);
        if !self.get_with_retries(report, port, &route, &url, outcomes).await? {
            return Ok(false);
        }
        if self.config.simulate_ping_failure {
            report.info(format_args!("{}: Simulate ping failure", port.if_name))?;
            if let Some(last) = outcomes.last_mut() {
                last.result = ProbeResult::Fail;
                "simulated failure".clone_into(&mut last.reason);
            }
            return Ok(false);
        }
        Ok(true)
    }

    async fn get_with_retries(
        &self,
        report: &mut Report,
        port: &Port,
        route: &Route,
        url: &Url,
        outcomes: &mut Vec<ProbeOutcome>,
    ) -> io::Result<bool> {
        let mut retries = 0u32;
        loop {
            match self.attempt(report, port, route, Verb::Get, url, None).await? {
                Attempt::Done(_) => {
                    outcomes.push(ProbeOutcome::pass(ProbeStep::Ping));
                    return Ok(true);
                }
                Attempt::Failed(Failure { reason, status }) => {
                    retries += 1;
                    if self.exceeded(retries) {
                        report.error(format_args!(
                            "{}: Exceeded {} retries for ping",
                            port.if_name, self.config.max_retries
                        ))?;
                        outcomes.push(
                            ProbeOutcome::fail(ProbeStep::Ping, reason).with_status(status),
                        );
                        return Ok(false);
                    }
                    outcomes.push(ProbeOutcome {
                        step: ProbeStep::Ping,
                        result: ProbeResult::Retry,
                        reason,
                        sender_status: status,
                    });
                }
            }
            tokio::time::sleep(self.config.retry_delay).await;
        }
    }

    // ── Round-trip ──────────────────────────────────────────────────

    /// POST an empty uuid request through the envelope with retries.
    ///
    /// A missing controller certificate clears the envelope's cached copy
    /// and fails the step without further retries.
    pub async fn post_uuid(
        &mut self,
        report: &mut Report,
        port: &Port,
        server: &ControllerAddress,
        outcomes: &mut Vec<ProbeOutcome>,
    ) -> io::Result<bool> {
        let url = match controller_url(server.name_and_port(), self.config.v2_api, None, "uuid")
        {
            Ok(url) => url,
            Err(e) => {
                report.error(format_args!("{}: uuid: {e}", port.if_name))?;
                outcomes.push(ProbeOutcome::fail(ProbeStep::RoundTrip, e.to_string()));
                return Ok(false);
            }
        };
        let route = route_for(port, port.first_usable_addr(), true);

        let mut retries = 0u32;
        loop {
            let Failure { reason, status } = match self.round_trip(report, port, &route, &url).await? {
                Ok(body) => {
                    self.remember_uuid(body.as_ref());
                    outcomes.push(ProbeOutcome::pass(ProbeStep::RoundTrip));
                    return Ok(true);
                }
                Err(failure) => failure,
            };

            if status == Some(SenderStatus::CertMiss) {
                self.envelope.clear_controller_cert();
                outcomes.push(
                    ProbeOutcome::fail(ProbeStep::RoundTrip, reason).with_status(status),
                );
                return Ok(false);
            }

            retries += 1;
            if self.exceeded(retries) {
                report.error(format_args!(
                    "{}: Exceeded {} retries for uuid",
                    port.if_name, self.config.max_retries
                ))?;
                outcomes.push(ProbeOutcome::fail(ProbeStep::RoundTrip, reason).with_status(status));
                return Ok(false);
            }
            outcomes.push(ProbeOutcome {
                step: ProbeStep::RoundTrip,
                result: ProbeResult::Retry,
                reason,
                sender_status: status,
            });
            tokio::time::sleep(self.config.retry_delay).await;
        }
    }

    /// One sealed POST plus opening of the response.
    ///
    /// Returns the opened body (`None` for 304 or an empty body).
    async fn round_trip(
        &self,
        report: &mut Report,
        port: &Port,
        route: &Route,
        url: &Url,
    ) -> io::Result<Result<Option<Bytes>, Failure>> {
        let ifname = &port.if_name;
        let payload = match self.envelope.seal(Bytes::from_static(b"{}")) {
            Ok(p) => p,
            Err(e) => {
                report.error(format_args!("{ifname}: post {url} failed: {e}"))?;
                return Ok(Err(Failure {
                    reason: e.to_string(),
                    status: Some(e.sender_status()),
                }));
            }
        };

        let resp = match self
            .attempt(report, port, route, Verb::Post, url, Some(payload))
            .await?
        {
            Attempt::Done(resp) => resp,
            Attempt::Failed(failure) => return Ok(Err(failure)),
        };

        if resp.status == 304 {
            debug!(ifname, "uuid not modified");
            return Ok(Ok(None));
        }
        if resp.body.is_empty() {
            return Ok(Ok(None));
        }
        match self.envelope.open(url, resp.body.clone()) {
            Ok(body) => {
                if resp.media_type().as_deref() != Some("application/json") {
                    warn!(
                        ifname,
                        content_type = ?resp.content_type,
                        "uuid response is not JSON"
                    );
                    return Ok(Ok(None));
                }
                Ok(Ok(Some(body)))
            }
            Err(e) => {
                report.error(format_args!(
                    "{ifname}: {url} envelope verification failed: {e}"
                ))?;
                Ok(Err(Failure {
                    reason: e.to_string(),
                    status: Some(e.sender_status()),
                }))
            }
        }
    }

    fn remember_uuid(&mut self, body: Option<&Bytes>) {
        let Some(body) = body else { return };
        match serde_json::from_slice::<UuidResponse>(body) {
            Ok(resp) => {
                if self.last_uuid.as_deref() != Some(resp.uuid.as_str()) {
                    info!(uuid = %resp.uuid, "controller returned new uuid");
                    self.last_uuid = Some(resp.uuid);
                }
            }
            Err(e) => warn!(error = %e, "cannot parse uuid response"),
        }
    }

    // ── Internet diagnosis ──────────────────────────────────────────

    /// Probe the configured oracle URLs with TLS verification off.
    ///
    /// Returns `true` if any answered.
    pub async fn diagnose_internet(
        &self,
        report: &mut Report,
        port: &Port,
        server: &ControllerAddress,
    ) -> io::Result<bool> {
        let route = route_for(port, port.first_usable_addr(), false);
        let mut scratch = Vec::new();
        for url in &self.config.internet_probe_urls {
            if self
                .get_with_retries(report, port, &route, url, &mut scratch)
                .await?
            {
                report.warn(format_args!(
                    "{}: Can reach {url} but not https://{server}",
                    port.if_name
                ))?;
                return Ok(true);
            }
        }
        report.error(format_args!(
            "{}: Can't reach {}; likely lack of Internet connectivity",
            port.if_name,
            join_urls(&self.config.internet_probe_urls, " or ")
        ))?;
        Ok(false)
    }

    // ── Shared ──────────────────────────────────────────────────────

    fn exceeded(&self, retries: u32) -> bool {
        self.config.max_retries != 0 && retries > self.config.max_retries
    }

    /// Send one request and render its outcome.
    async fn attempt(
        &self,
        report: &mut Report,
        port: &Port,
        route: &Route,
        verb: Verb,
        url: &Url,
        body: Option<Bytes>,
    ) -> io::Result<Attempt> {
        let ifname = &port.if_name;
        if let Some(proxy) = lookup_proxy(&port.proxy_config, url) {
            report.info(format_args!("{ifname}: Proxy {proxy} to reach {url}"))?;
        }

        let request = match body {
            Some(body) => SendRequest::post(url.clone(), body),
            None => SendRequest::get(url.clone()),
        };
        let resp = match self.sender.send(route, request).await {
            Ok(resp) => resp,
            Err(e) => {
                let status = e.sender_status();
                let what = match status {
                    SenderStatus::Upgrade => "Controller upgrade in progress".to_owned(),
                    SenderStatus::Refused => "Controller returned ECONNREFUSED".to_owned(),
                    SenderStatus::CertInvalid => {
                        "Controller certificate invalid time".to_owned()
                    }
                    SenderStatus::CertMiss => "Controller certificate miss".to_owned(),
                    SenderStatus::NotFound => "Did controller delete the device?".to_owned(),
                    SenderStatus::None => format!("failed: {e}"),
                };
                report.error(format_args!("{ifname}: {verb} {url} {what}"))?;
                return Ok(Attempt::Failed(Failure {
                    reason: e.to_string(),
                    status: Some(status),
                }));
            }
        };

        if accepted(verb, resp.status) {
            if let Some(label) = status_label(resp.status) {
                report.info(format_args!("{ifname}: {url} {label}"))?;
            }
            return Ok(Attempt::Done(resp));
        }

        report.error(format_args!(
            "{ifname}: {url} statuscode {} {}",
            resp.status,
            resp.status_text()
        ))?;
        report.error(format_args!(
            "{ifname}: Received {}",
            String::from_utf8_lossy(&resp.body)
        ))?;
        Ok(Attempt::Failed(Failure {
            reason: format!("statuscode {}", resp.status),
            status: None,
        }))
    }
}

fn join_urls(urls: &[Url], sep: &str) -> String {
    urls.iter().map(Url::as_str).collect::<Vec<_>>().join(sep)
}
