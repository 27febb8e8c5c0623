// ── Proxy resolution ──
//
// WPAD auto-discovery of a port's proxy auto-config script, plus the
// helpers that turn a port's explicit proxies into a send route.

use std::net::IpAddr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use fleetdiag_api::{PacFetcher, ProxyRoute, ProxyScheme, Route, sender::media_type};
use tracing::{debug, warn};
use url::Url;

use crate::error::CoreError;
use crate::model::{Port, ProxyConfig, ProxyEntry, ProxyType};

pub const PAC_MEDIA_TYPE: &str = "application/x-ns-proxy-autoconfig";

// ── WPAD ────────────────────────────────────────────────────────────

/// Fills in a port's PAC script through WPAD.
pub struct WpadResolver<P> {
    fetcher: P,
}

impl<P: PacFetcher> WpadResolver<P> {
    pub fn new(fetcher: P) -> Self {
        Self { fetcher }
    }

    /// Populate `port.proxy_config.pacfile` if discovery is enabled and no
    /// script was supplied.
    ///
    /// An explicit `network_proxy_url` is fetched once. Otherwise
    /// `http://wpad.<dn>/wpad.dat` is tried while `dn` still contains a
    /// dot, dropping the leftmost label after each failure; the producing
    /// URL is recorded in `wpad_url`.
    pub async fn discover(&self, port: &mut Port) -> Result<(), CoreError> {
        let ifname = port.if_name.clone();
        let local_addr = port.first_usable_addr();
        let config = &port.proxy_config;

        if !config.pacfile.is_empty() {
            debug!(ifname, "already have a PAC file");
            return Ok(());
        }
        if !config.network_proxy_enable {
            debug!(ifname, "proxy auto-discovery not enabled");
            return Ok(());
        }

        if !config.network_proxy_url.is_empty() {
            let url = config.network_proxy_url.clone();
            let pac = self
                .fetch_pac(&url, &ifname, local_addr)
                .await
                .map_err(|e| discovery_error(format!("Failed to fetch {url} for {ifname}: {e}")))?;
            port.proxy_config.pacfile = pac;
            return Ok(());
        }

        let mut dn = port.domain_name.trim().to_owned();
        if dn.is_empty() {
            return Err(discovery_error(format!(
                "NetworkProxyEnable for {ifname} but neither a NetworkProxyURL nor a DomainName"
            )));
        }

        let mut last_error = None;
        while dn.contains('.') {
            let url = format!("http://wpad.{dn}/wpad.dat");
            match self.fetch_pac(&url, &ifname, local_addr).await {
                Ok(pac) => {
                    debug!(ifname, %url, "fetched PAC file");
                    port.proxy_config.pacfile = pac;
                    port.proxy_config.wpad_url = url;
                    return Ok(());
                }
                Err(e) => {
                    let msg = format!("Failed to fetch {url} for {ifname}: {e}");
                    warn!("{msg}");
                    last_error = Some(msg);
                }
            }
            dn = match dn.split_once('.') {
                Some((_, rest)) => rest.to_owned(),
                None => break,
            };
        }

        Err(discovery_error(last_error.unwrap_or_else(|| {
            format!("NetworkProxyEnable for {ifname} but DomainName {dn} has no parent domain")
        })))
    }

    /// Fetch one candidate and return it base64-encoded.
    async fn fetch_pac(
        &self,
        url: &str,
        ifname: &str,
        local_addr: Option<IpAddr>,
    ) -> Result<String, String> {
        let parsed = Url::parse(url).map_err(|e| e.to_string())?;
        let resp = self
            .fetcher
            .fetch(&parsed, ifname, local_addr)
            .await
            .map_err(|e| e.to_string())?;
        let Some(content_type) = resp.content_type.as_deref() else {
            return Err(format!("{url} no content-type"));
        };
        let mime = media_type(content_type);
        if mime != PAC_MEDIA_TYPE {
            return Err(format!("Incorrect mime-type {mime} from {url}"));
        }
        Ok(STANDARD.encode(&resp.body))
    }
}

fn discovery_error(message: String) -> CoreError {
    CoreError::ProxyDiscovery { message }
}

// ── Explicit proxies ────────────────────────────────────────────────

/// Whether requests to `host` leave through an explicit HTTP(S) proxy.
///
/// A PAC script alone does not count: it is never evaluated, so such
/// requests go direct and need local name resolution.
pub fn is_proxied(config: &ProxyConfig, host: &str) -> bool {
    config.proxies.iter().any(|p| scheme_of(p).is_some())
        && !is_exception(&config.exceptions, host)
}

pub fn is_proxy_config_empty(config: &ProxyConfig) -> bool {
    config.proxies.is_empty()
        && config.exceptions.is_empty()
        && config.pacfile.is_empty()
        && !config.network_proxy_enable
        && config.network_proxy_url.is_empty()
}

fn proxy_url(entry: &ProxyEntry) -> String {
    format!("http://{}", entry.endpoint())
}

fn scheme_of(entry: &ProxyEntry) -> Option<ProxyScheme> {
    match entry.proxy_type {
        ProxyType::Http => Some(ProxyScheme::Http),
        ProxyType::Https => Some(ProxyScheme::Https),
        _ => None,
    }
}

/// Returns `true` if `host` matches one of the comma-separated exception
/// entries, either exactly or as a domain suffix.
pub fn is_exception(exceptions: &str, host: &str) -> bool {
    exceptions
        .split(',')
        .map(|e| e.trim().trim_start_matches('.'))
        .filter(|e| !e.is_empty())
        .any(|e| host == e || host.ends_with(&format!(".{e}")))
}

/// The explicit proxy a request to `url` goes through, if any.
pub fn lookup_proxy(config: &ProxyConfig, url: &Url) -> Option<String> {
    let wanted = match url.scheme() {
        "http" => ProxyScheme::Http,
        "https" => ProxyScheme::Https,
        _ => return None,
    };
    if let Some(host) = url.host_str() {
        if is_exception(&config.exceptions, host) {
            return None;
        }
    }
    config
        .proxies
        .iter()
        .find(|p| scheme_of(p) == Some(wanted))
        .map(proxy_url)
}

/// Build the send route for `port` sourced from `local_addr`.
pub fn route_for(port: &Port, local_addr: Option<IpAddr>, verify_tls: bool) -> Route {
    let proxies = port
        .proxy_config
        .proxies
        .iter()
        .filter_map(|p| {
            scheme_of(p).map(|scheme| ProxyRoute {
                scheme,
                url: proxy_url(p),
            })
        })
        .collect();
    Route {
        proxies,
        exceptions: port.proxy_config.exceptions.clone(),
        verify_tls,
        ..Route::direct(port.if_name.clone(), local_addr)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::Mutex;

    use bytes::Bytes;
    use fleetdiag_api::{Error as ApiError, PacResponse, SenderStatus};

    use super::*;
    use crate::model::AddrInfo;

    /// Serves one URL with a fixed content type, fails everything else.
    struct FakeFetcher {
        serve: Option<(&'static str, &'static str)>,
        seen: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn new(serve: Option<(&'static str, &'static str)>) -> Self {
            Self {
                serve,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl PacFetcher for &FakeFetcher {
        async fn fetch(
            &self,
            url: &Url,
            _ifname: &str,
            _local_addr: Option<IpAddr>,
        ) -> Result<PacResponse, ApiError> {
            self.seen.lock().unwrap().push(url.to_string());
            match self.serve {
                Some((target, content_type)) if url.as_str() == target => Ok(PacResponse {
                    content_type: Some(content_type.to_owned()),
                    body: Bytes::from_static(b"function FindProxyForURL(u, h) { return \"DIRECT\"; }"),
                }),
                _ => Err(ApiError::Send {
                    status: SenderStatus::None,
                    message: "no such host".into(),
                }),
            }
        }
    }

    fn wpad_port(domain: &str) -> Port {
        Port {
            if_name: "eth0".into(),
            is_mgmt: true,
            domain_name: domain.into(),
            addr_info_list: vec![AddrInfo::new("10.1.2.3".parse().unwrap())],
            proxy_config: ProxyConfig {
                network_proxy_enable: true,
                ..ProxyConfig::default()
            },
            ..Port::default()
        }
    }

    #[tokio::test]
    async fn disabled_or_present_is_noop() {
        let fetcher = FakeFetcher::new(None);
        let resolver = WpadResolver::new(&fetcher);

        let mut port = wpad_port("corp.example.com");
        port.proxy_config.network_proxy_enable = false;
        resolver.discover(&mut port).await.unwrap();

        let mut port = wpad_port("corp.example.com");
        port.proxy_config.pacfile = "ZnVuY3Rpb24=".into();
        let before = port.clone();
        resolver.discover(&mut port).await.unwrap();

        assert_eq!(port, before);
        assert!(fetcher.seen().is_empty());
    }

    #[tokio::test]
    async fn walk_is_bounded_by_dot_count() {
        for (domain, dots) in [
            ("a.b.c.example.com", 4),
            ("corp.example.com", 2),
            ("example.com", 1),
            ("localdomain", 0),
        ] {
            let fetcher = FakeFetcher::new(None);
            let resolver = WpadResolver::new(&fetcher);
            let mut port = wpad_port(domain);

            assert!(resolver.discover(&mut port).await.is_err());
            assert!(fetcher.seen().len() <= dots, "{domain}: {:?}", fetcher.seen());
            assert!(port.proxy_config.pacfile.is_empty());
        }
    }

    #[tokio::test]
    async fn walk_strips_leftmost_label() {
        let fetcher = FakeFetcher::new(Some((
            "http://wpad.example.com/wpad.dat",
            "application/x-ns-proxy-autoconfig; charset=utf-8",
        )));
        let resolver = WpadResolver::new(&fetcher);
        let mut port = wpad_port("lab.corp.example.com");

        resolver.discover(&mut port).await.unwrap();

        assert_eq!(
            fetcher.seen(),
            vec![
                "http://wpad.lab.corp.example.com/wpad.dat",
                "http://wpad.corp.example.com/wpad.dat",
                "http://wpad.example.com/wpad.dat",
            ]
        );
        assert_eq!(port.proxy_config.wpad_url, "http://wpad.example.com/wpad.dat");
        let pac = STANDARD.decode(&port.proxy_config.pacfile).unwrap();
        assert!(pac.starts_with(b"function FindProxyForURL"));
    }

    #[tokio::test]
    async fn wrong_media_type_is_a_failure() {
        let fetcher = FakeFetcher::new(Some(("http://wpad.example.com/wpad.dat", "text/html")));
        let resolver = WpadResolver::new(&fetcher);
        let mut port = wpad_port("example.com");

        let err = resolver.discover(&mut port).await.unwrap_err();
        assert!(err.to_string().contains("Incorrect mime-type text/html"), "{err}");
        assert!(port.proxy_config.pacfile.is_empty());
    }

    #[tokio::test]
    async fn explicit_url_is_fetched_once_without_walk() {
        let fetcher = FakeFetcher::new(None);
        let resolver = WpadResolver::new(&fetcher);
        let mut port = wpad_port("corp.example.com");
        port.proxy_config.network_proxy_url = "http://pac.corp.example.com/proxy.pac".into();

        assert!(resolver.discover(&mut port).await.is_err());
        assert_eq!(fetcher.seen(), vec!["http://pac.corp.example.com/proxy.pac"]);
        assert!(port.proxy_config.wpad_url.is_empty());
    }

    #[tokio::test]
    async fn explicit_url_success_keeps_wpad_url_empty() {
        let fetcher = FakeFetcher::new(Some((
            "http://pac.corp.example.com/proxy.pac",
            PAC_MEDIA_TYPE,
        )));
        let resolver = WpadResolver::new(&fetcher);
        let mut port = wpad_port("corp.example.com");
        port.proxy_config.network_proxy_url = "http://pac.corp.example.com/proxy.pac".into();

        resolver.discover(&mut port).await.unwrap();
        assert!(!port.proxy_config.pacfile.is_empty());
        assert!(port.proxy_config.wpad_url.is_empty());
    }

    #[tokio::test]
    async fn empty_domain_is_an_error() {
        let fetcher = FakeFetcher::new(None);
        let resolver = WpadResolver::new(&fetcher);
        let mut port = wpad_port("");

        let err = resolver.discover(&mut port).await.unwrap_err();
        assert!(err.to_string().contains("neither a NetworkProxyURL nor a DomainName"));
        assert!(fetcher.seen().is_empty());
    }

    #[test]
    fn lookup_matches_scheme_and_honours_exceptions() {
        let config = ProxyConfig {
            proxies: vec![
                ProxyEntry {
                    proxy_type: ProxyType::Http,
                    server: "proxy.corp".into(),
                    port: 3128,
                },
                ProxyEntry {
                    proxy_type: ProxyType::Https,
                    server: "secure.corp".into(),
                    port: 8443,
                },
            ],
            exceptions: "internal.corp, .lab".into(),
            ..ProxyConfig::default()
        };

        let url = Url::parse("https://ctrl.example.net/api/v2/edgedevice/ping").unwrap();
        assert_eq!(
            lookup_proxy(&config, &url).as_deref(),
            Some("http://secure.corp:8443")
        );
        let url = Url::parse("http://www.google.com").unwrap();
        assert_eq!(lookup_proxy(&config, &url).as_deref(), Some("http://proxy.corp:3128"));
        let url = Url::parse("https://ctrl.internal.corp/ping").unwrap();
        assert_eq!(lookup_proxy(&config, &url), None);
        let url = Url::parse("https://box.lab/ping").unwrap();
        assert_eq!(lookup_proxy(&config, &url), None);
    }

    #[test]
    fn only_http_entries_outside_exceptions_proxy_a_host() {
        let mut config = ProxyConfig {
            pacfile: STANDARD.encode("function FindProxyForURL(u, h) { return \"PROXY p:1\"; }"),
            ..ProxyConfig::default()
        };
        assert!(!is_proxied(&config, "ctrl.example.net"));

        config.proxies = vec![ProxyEntry {
            proxy_type: ProxyType::Socks,
            server: "socks.corp".into(),
            port: 1080,
        }];
        assert!(!is_proxied(&config, "ctrl.example.net"));

        config.proxies.push(ProxyEntry {
            proxy_type: ProxyType::Https,
            server: "secure.corp".into(),
            port: 3128,
        });
        assert!(is_proxied(&config, "ctrl.example.net"));

        config.exceptions = "example.net".into();
        assert!(!is_proxied(&config, "ctrl.example.net"));
    }

    #[test]
    fn route_keeps_only_http_proxies() {
        let mut port = wpad_port("corp.example.com");
        port.proxy_config.proxies = vec![
            ProxyEntry {
                proxy_type: ProxyType::Socks,
                server: "socks.corp".into(),
                port: 1080,
            },
            ProxyEntry {
                proxy_type: ProxyType::Https,
                server: "secure.corp".into(),
                port: 0,
            },
        ];

        let route = route_for(&port, port.first_usable_addr(), true);
        assert_eq!(
            route.proxies,
            vec![ProxyRoute {
                scheme: ProxyScheme::Https,
                url: "http://secure.corp".into(),
            }]
        );
        assert_eq!(route.local_addr, Some("10.1.2.3".parse().unwrap()));
    }
}
