// ── Report pass ──
//
// One full rendering of the device's connectivity: derived status,
// fallback state, per-port addressing and proxy details, probe results and
// the aggregate verdict.

use std::io;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use fleetdiag_api::{Envelope, HostResolver, PacFetcher, Sender};
use tracing::{debug, warn};

use crate::certs::now_rfc3339;
use crate::fallback;
use crate::model::{DhcpType, DpcState, LedCounter, NetworkStatus, Port, PortConfigList, ProxyType};
use crate::prober::{PortProbe, Prober};
use crate::proxy::{WpadResolver, is_proxy_config_empty};
use crate::report::Report;
use crate::server::ControllerAddress;

/// Snapshots a pass renders from.
#[derive(Debug, Clone, Copy)]
pub struct PassInput<'a> {
    pub network: &'a NetworkStatus,
    pub port_configs: &'a PortConfigList,
    pub status: LedCounter,
    pub server: &'a ControllerAddress,
}

/// Rendering switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassOptions {
    /// Print decoded PAC scripts.
    pub pac_contents: bool,
    /// Also probe non-management ports that have an address.
    pub probe_app_ports: bool,
}

/// Counts behind the aggregate lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub total_ports: usize,
    /// Management ports with at least one usable address.
    pub eligible: usize,
    pub passed: usize,
    /// Non-management ports that reached the controller.
    pub passed_other: usize,
    pub probes: Vec<PortProbe>,
}

/// Render one report pass.
pub async fn run_pass<S, R, E, P>(
    report: &mut Report,
    prober: &mut Prober<S, R, E>,
    wpad: &WpadResolver<P>,
    input: PassInput<'_>,
    options: PassOptions,
) -> io::Result<PassSummary>
where
    S: Sender,
    R: HostResolver,
    E: Envelope,
    P: PacFetcher,
{
    let network = input.network;
    report.raw("")?;
    report.info(format_args!("updated diag information at {}", now_rfc3339()))?;
    render_summary(report, input.status)?;

    fallback::render(report, input.port_configs, network.testing)?;
    if network.testing {
        report.warn("The configuration below is under test hence might report failures")?;
    }
    if network.state != DpcState::Success {
        report.warn(format_args!("state {} not SUCCESS", network.state))?;
    }

    let mut summary = PassSummary {
        total_ports: network.ports.len(),
        ..PassSummary::default()
    };
    report.info(format_args!(
        "Have {} total ports. {} ports should be connected to EV controller",
        summary.total_ports,
        network.mgmt_port_count()
    ))?;

    for original in &network.ports {
        let mut port = original.clone();
        let ifname = port.if_name.clone();
        if let Err(e) = wpad.discover(&mut port).await {
            report.warn(format_args!("{ifname}: {e}"))?;
        }

        render_port(report, &port)?;
        render_proxy(report, &port, options.pac_contents)?;

        let has_addr = port.usable_addr_count() > 0;
        if !port.is_mgmt && !(options.probe_app_ports && has_addr) {
            report.info(format_args!(
                "{ifname}: not intended for EV controller; skipping those tests"
            ))?;
            continue;
        }
        if !has_addr {
            report.error(format_args!(
                "{ifname}: No IP address to connect to EV controller"
            ))?;
            continue;
        }
        if port.is_mgmt {
            summary.eligible += 1;
        }

        let probe = prober.probe_port(report, &port, input.server).await?;
        debug!(ifname, passed = probe.passed(), "port probed");
        if probe.passed() {
            if port.is_mgmt {
                summary.passed += 1;
            } else {
                summary.passed_other += 1;
            }
        }
        summary.probes.push(probe);
    }

    render_aggregate(report, &summary)?;
    Ok(summary)
}

fn render_summary(report: &mut Report, status: LedCounter) -> io::Result<()> {
    match status {
        LedCounter::Onboarded => report.info(format_args!("Summary: {status}")),
        LedCounter::ConnectedToController | LedCounter::RadioSilence => {
            report.warn(format_args!("Summary: {status}"))
        }
        _ => report.error(format_args!("Summary: {status}")),
    }
}

fn render_port(report: &mut Report, port: &Port) -> io::Result<()> {
    let ifname = &port.if_name;
    let kind = if port.cost == Port::COST_FREE {
        "for EV Controller without usage-based charging".to_owned()
    } else if port.is_mgmt {
        format!("for EV Controller (cost {})", port.cost)
    } else {
        "for application use".to_owned()
    };
    report.info(format_args!("Port {ifname}: {kind}"))?;

    let mut count = 0usize;
    for ai in port.usable_addrs() {
        count += 1;
        if ai.geo.is_empty() {
            report.info(format_args!("{ifname}: IP address {} not geolocated", ai.addr))?;
        } else {
            report.info(format_args!(
                "{ifname}: IP address {} geolocated to {}",
                ai.addr, ai.geo
            ))?;
        }
    }
    if count == 0 {
        report.info(format_args!("{ifname}: No IP address"))?;
    }

    let servers: Vec<String> = port.dns_servers.iter().map(ToString::to_string).collect();
    report.info(format_args!("{ifname}: DNS servers: {}", servers.join(", ")))?;

    if port.dhcp == DhcpType::Static {
        report.info(format_args!("{ifname}: Static IP subnet: {}", port.subnet))?;
        for router in &port.default_routers {
            report.info(format_args!("{ifname}: Static IP router: {router}"))?;
        }
        report.info(format_args!("{ifname}: Static Domain Name: {}", port.domain_name))?;
        report.info(format_args!("{ifname}: Static NTP server: {}", port.ntp_server))?;
    }
    Ok(())
}

fn render_proxy(report: &mut Report, port: &Port, pac_contents: bool) -> io::Result<()> {
    let ifname = &port.if_name;
    let config = &port.proxy_config;
    if is_proxy_config_empty(config) {
        return report.info(format_args!("{ifname}: no http(s) proxy"));
    }
    if !config.exceptions.is_empty() {
        report.info(format_args!("{ifname}: proxy exceptions {}", config.exceptions))?;
    }
    if port.test_results.has_error() {
        report.error(format_args!(
            "{ifname}: from WPAD? {}",
            port.test_results.last_error
        ))?;
    }
    if config.network_proxy_enable {
        if config.network_proxy_url.is_empty() && config.wpad_url.is_empty() {
            report.warn(format_args!("{ifname}: WPAD enabled but found no URL"))?;
        } else if config.network_proxy_url.is_empty() {
            report.info(format_args!(
                "{ifname}: WPAD enabled found URL {}",
                config.wpad_url
            ))?;
        } else {
            report.info(format_args!(
                "{ifname}: WPAD fetched from {}",
                config.network_proxy_url
            ))?;
        }
    }

    if !config.pacfile.is_empty() {
        report.info(format_args!(
            "{ifname}: Have PAC file len {}",
            config.pacfile.len()
        ))?;
        if pac_contents {
            match STANDARD.decode(&config.pacfile) {
                Ok(pac) => {
                    report.info(format_args!("{ifname}: PAC file:"))?;
                    report.raw(String::from_utf8_lossy(&pac))?;
                }
                Err(e) => warn!(ifname, error = %e, "decoding proxy file failed"),
            }
        }
        return Ok(());
    }

    for proxy in &config.proxies {
        let scheme = match proxy.proxy_type {
            ProxyType::Http => "http",
            ProxyType::Https => "https",
            _ => continue,
        };
        report.info(format_args!("{ifname}: {scheme} proxy {}", proxy.endpoint()))?;
    }
    if !config.proxy_cert_pem.is_empty() {
        report.info(format_args!(
            "{ifname}: {} proxy certificate(s)",
            config.proxy_cert_pem.len()
        ))?;
    }
    Ok(())
}

fn render_aggregate(report: &mut Report, summary: &PassSummary) -> io::Result<()> {
    if summary.passed_other > 0 {
        report.warn(format_args!(
            "{} non-management ports have connectivity to the EV controller. Is that intentional?",
            summary.passed_other
        ))?;
    }
    if summary.eligible == 0 {
        report.error("No ports specified to have EV controller connectivity")
    } else if summary.passed == summary.eligible {
        report.pass("All ports specified to have EV controller connectivity passed test")
    } else if summary.passed == 0 {
        report.error(format_args!(
            "0 out of {} ports specified to have EV controller connectivity passed test",
            summary.eligible
        ))
    } else {
        report.warn(format_args!(
            "{} out of {} ports specified to have EV controller connectivity passed test",
            summary.passed, summary.eligible
        ))
    }
}
