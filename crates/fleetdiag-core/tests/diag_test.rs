#![allow(clippy::unwrap_used)]
// Report pass and orchestrator behavior against in-process fakes.

use std::net::{IpAddr, TcpListener};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use fleetdiag_api::{
    AgentMetrics, Envelope, Error as ApiError, HostResolver, HttpSender, PacFetcher, PacResponse,
    Route, SendRequest, SendResponse, Sender, SenderStatus, TlsMode,
};
use fleetdiag_core::model::AddrInfo;
use fleetdiag_core::{
    CertPaths, Change, ControllerAddress, CoreError, DiagConfig, Diagnostics, GlobalConfig,
    LedBlinkCounter, LedCounter, MemorySink, NetworkStatus, OnboardingStatus, PassInput,
    PassOptions, Port, PortConfigList, ProbeConfig, Prober, Report, WpadResolver, channels,
    run_pass,
};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Fakes ───────────────────────────────────────────────────────────

/// Controller and oracle stand-in. Requests to hosts in `unreachable`
/// fail with a connection error; everything else answers 200.
#[derive(Default)]
struct FakeNet {
    unreachable: Vec<(&'static str, &'static str)>,
    requests: AtomicU32,
}

impl FakeNet {
    fn blocking(unreachable: &[(&'static str, &'static str)]) -> Self {
        Self {
            unreachable: unreachable.to_vec(),
            ..Self::default()
        }
    }
}

impl Sender for FakeNet {
    async fn send(&self, _route: &Route, request: SendRequest) -> Result<SendResponse, ApiError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let url = &request.url;
        let blocked = self
            .unreachable
            .iter()
            .any(|(scheme, host)| url.scheme() == *scheme && url.host_str() == Some(host));
        if blocked {
            return Err(ApiError::Send {
                status: SenderStatus::None,
                message: format!("{url}: connection timed out"),
            });
        }
        let body = if url.path().ends_with("/uuid") {
            Bytes::from_static(br#"{"uuid":"6ba7b810-9dad-11d1-80b4-00c04fd430c8"}"#)
        } else {
            Bytes::new()
        };
        Ok(SendResponse {
            status: 200,
            content_type: Some("application/json".into()),
            body,
        })
    }
}

struct FixedResolver;

impl HostResolver for FixedResolver {
    async fn lookup(
        &self,
        _host: &str,
        _source: IpAddr,
        _servers: &[IpAddr],
    ) -> Result<Vec<IpAddr>, ApiError> {
        Ok(vec!["203.0.113.7".parse().unwrap()])
    }
}

struct PlainEnvelope;

impl Envelope for PlainEnvelope {
    fn seal(&self, payload: Bytes) -> Result<Bytes, ApiError> {
        Ok(payload)
    }

    fn open(&self, _url: &Url, body: Bytes) -> Result<Bytes, ApiError> {
        Ok(body)
    }

    fn clear_controller_cert(&self) {}
}

struct NoPac;

impl PacFetcher for NoPac {
    async fn fetch(
        &self,
        url: &Url,
        _ifname: &str,
        _local_addr: Option<IpAddr>,
    ) -> Result<PacResponse, ApiError> {
        Err(ApiError::Send {
            status: SenderStatus::NotFound,
            message: format!("{url} returned 404 Not Found"),
        })
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn probe_config() -> ProbeConfig {
    ProbeConfig {
        max_retries: 1,
        retry_delay: Duration::ZERO,
        ..ProbeConfig::default()
    }
}

fn mgmt_port(addr: Option<&str>) -> Port {
    Port {
        if_name: "eth0".into(),
        is_mgmt: true,
        dns_servers: vec!["192.168.1.1".parse().unwrap()],
        addr_info_list: addr
            .map(|a| AddrInfo::new(a.parse().unwrap()))
            .into_iter()
            .collect(),
        ..Port::default()
    }
}

fn network(ports: Vec<Port>) -> NetworkStatus {
    NetworkStatus {
        dpc_key: "zedagent".into(),
        ports,
        ..NetworkStatus::default()
    }
}

async fn render(net: &FakeNet, status: &NetworkStatus) -> Vec<String> {
    let sink = MemorySink::new();
    let mut report = Report::new(sink.clone());
    let mut prober = Prober::new(net, FixedResolver, PlainEnvelope, probe_config());
    let wpad = WpadResolver::new(NoPac);
    let server = ControllerAddress::parse("ctrl.example.net").unwrap();
    let input = PassInput {
        network: status,
        port_configs: &PortConfigList::default(),
        status: LedCounter::Onboarded,
        server: &server,
    };
    run_pass(&mut report, &mut prober, &wpad, input, PassOptions::default())
        .await
        .unwrap();
    sink.lines()
}

// ── Report pass ─────────────────────────────────────────────────────

#[tokio::test]
async fn reachable_controller_passes() {
    let net = FakeNet::default();
    let lines = render(&net, &network(vec![mgmt_port(Some("192.168.1.10"))])).await;

    assert!(lines.contains(&"INFO: Summary: Connected to EV Controller and onboarded".to_owned()));
    assert!(lines.contains(&"INFO: eth0: DNS lookup of ctrl.example.net returned 203.0.113.7".to_owned()));
    assert!(lines.contains(&"PASS: port eth0 fully connected to EV controller ctrl.example.net".to_owned()));
    assert_eq!(
        lines.last().unwrap(),
        "PASS: All ports specified to have EV controller connectivity passed test"
    );
}

#[tokio::test]
async fn port_without_address_is_not_probed() {
    let net = FakeNet::default();
    let lines = render(&net, &network(vec![mgmt_port(None)])).await;

    assert!(lines.contains(&"ERROR: eth0: No IP address to connect to EV controller".to_owned()));
    assert_eq!(
        lines.last().unwrap(),
        "ERROR: No ports specified to have EV controller connectivity"
    );
    assert_eq!(net.requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreachable_controller_with_internet_is_diagnosed() {
    let net = FakeNet::blocking(&[("https", "ctrl.example.net"), ("http", "www.google.com")]);
    let lines = render(&net, &network(vec![mgmt_port(Some("192.168.1.10"))])).await;

    assert!(lines.iter().any(|l| l.starts_with("ERROR: eth0: ping failed to ctrl.example.net")));
    assert!(lines.contains(
        &"WARNING: eth0: Can reach https://www.google.com/ but not https://ctrl.example.net".to_owned()
    ));
    assert!(!lines.iter().any(|l| l.contains("Can't reach")));
    assert_eq!(
        lines.last().unwrap(),
        "ERROR: 0 out of 1 ports specified to have EV controller connectivity passed test"
    );
}

#[tokio::test]
async fn no_controller_and_no_internet_is_diagnosed() {
    let oracles = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .mount(&oracles)
        .await;
    let first = Url::parse(&format!("{}/generate_204", oracles.uri())).unwrap();
    let second = Url::parse(&format!("{}/status", oracles.uri())).unwrap();

    // Nothing listens on the controller port.
    let closed = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let server = ControllerAddress::parse(&format!("127.0.0.1:{closed}")).unwrap();

    let sender = HttpSender::new(TlsMode::System, Arc::new(AgentMetrics::new()));
    let config = ProbeConfig {
        internet_probe_urls: vec![first.clone(), second.clone()],
        ..probe_config()
    };
    let mut prober = Prober::new(sender, FixedResolver, PlainEnvelope, config);
    let wpad = WpadResolver::new(NoPac);
    let status = network(vec![mgmt_port(Some("127.0.0.1"))]);
    let sink = MemorySink::new();
    let mut report = Report::new(sink.clone());
    let input = PassInput {
        network: &status,
        port_configs: &PortConfigList::default(),
        status: LedCounter::Onboarded,
        server: &server,
    };
    let summary = run_pass(&mut report, &mut prober, &wpad, input, PassOptions::default())
        .await
        .unwrap();
    let lines = sink.lines();

    assert_eq!(summary.passed, 0);
    assert!(lines.iter().any(|l| l.starts_with(&format!("ERROR: eth0: ping failed to {server}"))));
    assert!(lines.contains(&format!("ERROR: eth0: {first} statuscode 500 Internal Server Error")));
    assert!(lines.contains(&"ERROR: eth0: Received down".to_owned()));
    assert!(lines.contains(&format!(
        "ERROR: eth0: Can't reach {first} or {second}; likely lack of Internet connectivity"
    )));
    assert!(!lines.iter().any(|l| l.contains("Can reach")));
    // One retry per oracle.
    assert_eq!(oracles.received_requests().await.unwrap().len(), 4);
    assert_eq!(
        lines.last().unwrap(),
        "ERROR: 0 out of 1 ports specified to have EV controller connectivity passed test"
    );
}

#[tokio::test]
async fn application_ports_are_skipped() {
    let net = FakeNet::default();
    let mut app = mgmt_port(Some("10.0.0.5"));
    app.if_name = "eth1".into();
    app.is_mgmt = false;
    app.cost = 5;
    let lines = render(&net, &network(vec![mgmt_port(Some("192.168.1.10")), app])).await;

    assert!(lines.contains(&"INFO: Port eth1: for application use".to_owned()));
    assert!(lines.contains(
        &"INFO: eth1: not intended for EV controller; skipping those tests".to_owned()
    ));
    assert!(lines.contains(&"INFO: Have 2 total ports. 1 ports should be connected to EV controller".to_owned()));
}

// ── Orchestrator ────────────────────────────────────────────────────

fn provision(dir: &Path) -> DiagConfig {
    std::fs::write(dir.join("server"), "ctrl.example.net\n").unwrap();
    let certs = CertPaths {
        device_cert: dir.join("device.cert.pem"),
        device_key: dir.join("device.key.pem"),
        onboard_cert: dir.join("onboard.cert.pem"),
        onboard_key: dir.join("onboard.key.pem"),
        controller_signing_cert: dir.join("signing.pem"),
        root_ca: dir.join("root.pem"),
    };
    std::fs::write(&certs.device_cert, "cert").unwrap();
    std::fs::write(&certs.device_key, "key").unwrap();
    DiagConfig {
        server_file: dir.join("server"),
        certs,
        probe: probe_config(),
        ..DiagConfig::default()
    }
}

fn upsert<T>(key: &str, value: T) -> Change<T> {
    Change::Upsert {
        key: key.into(),
        value,
    }
}

#[tokio::test]
async fn first_pass_waits_for_every_input() {
    let dir = tempfile::tempdir().unwrap();
    let config = provision(dir.path());
    let sink = MemorySink::new();
    let net = Arc::new(FakeNet::default());
    let diag = Diagnostics::new(
        config,
        Report::new(sink.clone()),
        Arc::clone(&net),
        FixedResolver,
        PlainEnvelope,
        NoPac,
        Arc::new(AgentMetrics::new()),
    );

    let (senders, inputs) = channels();
    senders
        .global_config
        .send(upsert("global", GlobalConfig::default()))
        .await
        .unwrap();
    senders
        .led
        .send(upsert(
            "ledconfig",
            LedBlinkCounter {
                blink_counter: LedCounter::Onboarded,
            },
        ))
        .await
        .unwrap();
    senders
        .network
        .send(upsert("global", network(vec![mgmt_port(Some("192.168.1.10"))])))
        .await
        .unwrap();
    senders
        .port_configs
        .send(Change::Delete {
            key: "global".into(),
        })
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let task = tokio::spawn(diag.run(inputs, cancel.clone()));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sink.contents().is_empty(), "no pass before onboarding status arrives");

    senders
        .onboarding
        .send(upsert("global", OnboardingStatus::default()))
        .await
        .unwrap();

    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.passes, 1);
    let lines = sink.lines();
    assert!(lines.contains(&"INFO: Summary: Connected to EV Controller and onboarded".to_owned()));
    assert!(lines.contains(&"ERROR: Have no currently working DevicePortConfig".to_owned()));
    assert_eq!(
        lines.last().unwrap(),
        "PASS: All ports specified to have EV controller connectivity passed test"
    );
}

#[tokio::test]
async fn missing_certificates_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = provision(dir.path());
    std::fs::remove_file(&config.certs.device_cert).unwrap();
    config.certs.device_key = dir.path().join("absent.key.pem");
    let sink = MemorySink::new();
    let diag = Diagnostics::new(
        config,
        Report::new(sink.clone()),
        FakeNet::default(),
        FixedResolver,
        PlainEnvelope,
        NoPac,
        Arc::new(AgentMetrics::new()),
    );

    let (senders, inputs) = channels();
    senders
        .global_config
        .send(Change::Delete {
            key: "global".into(),
        })
        .await
        .unwrap();

    let err = diag.run(inputs, CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, CoreError::NoCertificate { .. }));
    assert!(sink.contents().starts_with("ERROR: no device cert and no onboarding cert at "));
}

#[tokio::test]
async fn cancellation_before_global_config_ends_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let diag = Diagnostics::new(
        provision(dir.path()),
        Report::new(MemorySink::new()),
        FakeNet::default(),
        FixedResolver,
        PlainEnvelope,
        NoPac,
        Arc::new(AgentMetrics::new()),
    );
    let (_senders, inputs) = channels();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = diag.run(inputs, cancel).await.unwrap();
    assert_eq!(summary.passes, 0);
}
