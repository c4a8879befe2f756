//! Client for the Channels DVR server.
//!
//! The server is either configured with a fixed base URL or located on the
//! LAN via its `_channels_dvr._tcp` mDNS advertisement. A located server is
//! remembered until a request to it fails or the periodic refresh runs.
use std::{net::IpAddr, sync::Arc, time::Duration};

use anyhow::{Context, bail};
use mdns_sd::{ServiceDaemon, ServiceEvent};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::AppConfig;

const SERVICE_TYPE: &str = "_channels_dvr._tcp.local.";
const DEFAULT_PORT: u16 = 8089;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DvrServer {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone)]
enum Locator {
    Fixed(String),
    Mdns { timeout: Duration },
}

#[derive(Debug, Clone)]
pub struct DvrClient {
    http: reqwest::Client,
    locator: Locator,
    located: Arc<RwLock<Option<DvrServer>>>,
    device: String,
    epg_duration_secs: u64,
    guide_timeout: Duration,
    search_timeout: Duration,
    probe_timeout: Duration,
}

impl DvrClient {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("dvrdeck/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build HTTP client")?;

        let locator = match config.dvr_url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => Locator::Fixed(url.trim_end_matches('/').to_string()),
            None => Locator::Mdns {
                timeout: Duration::from_secs(config.discovery_timeout_secs),
            },
        };

        Ok(Self {
            http,
            locator,
            located: Arc::new(RwLock::new(None)),
            device: config.dvr_device.clone(),
            epg_duration_secs: config.epg_duration_secs,
            guide_timeout: Duration::from_secs(config.http_timeout_secs),
            search_timeout: Duration::from_secs(config.search_fetch_timeout_secs),
            probe_timeout: Duration::from_secs(config.discovery_timeout_secs),
        })
    }

    pub fn uses_discovery(&self) -> bool {
        matches!(self.locator, Locator::Mdns { .. })
    }

    pub fn guide_timeout(&self) -> Duration {
        self.guide_timeout
    }

    pub fn search_timeout(&self) -> Duration {
        self.search_timeout
    }

    /// The DVR server, or `None` when it cannot be found.
    pub async fn locate(&self) -> Option<DvrServer> {
        let timeout = match &self.locator {
            Locator::Fixed(url) => {
                return Some(DvrServer {
                    name: "Channels DVR".to_string(),
                    url: url.clone(),
                });
            }
            Locator::Mdns { timeout } => *timeout,
        };

        if let Some(server) = self.located.read().await.clone() {
            return Some(server);
        }

        match discover(timeout).await {
            Ok(Some(server)) => {
                info!("Found Channels DVR '{}' at {}", server.name, server.url);
                *self.located.write().await = Some(server.clone());
                Some(server)
            }
            Ok(None) => {
                warn!("No Channels DVR server found within {}s", timeout.as_secs());
                None
            }
            Err(e) => {
                warn!("Error discovering DVR server: {e:#}");
                None
            }
        }
    }

    /// Like [`locate`](Self::locate), but a configured URL only counts when
    /// something answers HTTP there.
    pub async fn check(&self) -> Option<DvrServer> {
        let server = self.locate().await?;
        if self.uses_discovery() {
            return Some(server);
        }
        match self
            .http
            .get(format!("{}/status", server.url))
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(_) => Some(server),
            Err(e) => {
                warn!("DVR at {} is not answering: {e}", server.url);
                None
            }
        }
    }

    /// Drop the remembered server so the next call discovers again.
    pub async fn forget(&self) {
        self.located.write().await.take();
    }

    pub fn epg_url(&self, base_url: &str) -> String {
        format!(
            "{base_url}/devices/{}/guide/xmltv?duration={}",
            self.device, self.epg_duration_secs
        )
    }

    pub fn m3u_url(&self, base_url: &str) -> String {
        format!(
            "{base_url}/devices/{}/channels.m3u?format=hls&codec=copy",
            self.device
        )
    }

    /// Download the XMLTV guide.
    pub async fn fetch_xmltv(&self, timeout: Duration) -> anyhow::Result<String> {
        let server = self.locate().await.context("no Channels DVR server found")?;
        self.get_text(&self.epg_url(&server.url), timeout).await
    }

    /// Download the M3U channel lineup.
    pub async fn fetch_m3u(&self) -> anyhow::Result<String> {
        let server = self.locate().await.context("no Channels DVR server found")?;
        self.get_text(&self.m3u_url(&server.url), self.guide_timeout)
            .await
    }

    async fn get_text(&self, url: &str, timeout: Duration) -> anyhow::Result<String> {
        debug!("GET {url}");
        let result = async {
            let resp = self
                .http
                .get(url)
                .timeout(timeout)
                .send()
                .await
                .with_context(|| format!("request {url}"))?;

            if !resp.status().is_success() {
                bail!("DVR returned HTTP {} for {url}", resp.status());
            }
            resp.text().await.context("read DVR response body")
        }
        .await;

        if result.is_err() && self.uses_discovery() {
            self.forget().await;
        }
        result
    }
}

/// Browse mDNS for the DVR advertisement, preferring an IPv4 address.
async fn discover(timeout: Duration) -> anyhow::Result<Option<DvrServer>> {
    let mdns = ServiceDaemon::new().map_err(|e| anyhow::anyhow!("create mDNS daemon: {e}"))?;
    let receiver = mdns
        .browse(SERVICE_TYPE)
        .map_err(|e| anyhow::anyhow!("browse {SERVICE_TYPE}: {e}"))?;

    let start = std::time::Instant::now();
    let mut found = None;
    while start.elapsed() < timeout {
        match receiver.try_recv() {
            Ok(ServiceEvent::ServiceResolved(info)) => {
                let addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
                let Some(ip) = pick_address(&addresses) else {
                    warn!("DVR advertisement without a usable address");
                    continue;
                };
                let port = match info.get_port() {
                    0 => DEFAULT_PORT,
                    p => p,
                };
                found = Some(DvrServer {
                    name: info.get_fullname().to_string(),
                    url: base_url(ip, port),
                });
                break;
            }
            Ok(_) => {}
            Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
        }
    }

    let _ = mdns.stop_browse(SERVICE_TYPE);
    let _ = mdns.shutdown();
    Ok(found)
}

fn pick_address(addresses: &[IpAddr]) -> Option<IpAddr> {
    addresses
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addresses.iter().find(|a| a.is_ipv6()))
        .copied()
}

fn base_url(ip: IpAddr, port: u16) -> String {
    match ip {
        IpAddr::V4(v4) => format!("http://{v4}:{port}"),
        IpAddr::V6(v6) => format!("http://[{v6}]:{port}"),
    }
}
