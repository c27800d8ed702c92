//! Bridge discovery.
//!
//! Two sources. The public N-UPnP endpoint echoes every bridge that
//! reported in from behind the caller's public address. The mDNS browse
//! finds bridges advertising `_hue._tcp` on the local segment, which also
//! works without internet access. Results are merged by bridge id.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::http::HttpConfig;

/// Public discovery endpoint.
pub const DISCOVERY_URL: &str = "https://discovery.meethue.com/";

/// Service type bridges advertise over mDNS.
pub const MDNS_SERVICE: &str = "_hue._tcp.local.";

/// Where a bridge candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverySource {
    #[default]
    Cloud,
    Mdns,
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cloud => "cloud",
            Self::Mdns => "mdns",
        })
    }
}

/// A bridge candidate returned by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredBridge {
    /// Bridge id (EUI-64 derived from the MAC).
    pub id: String,
    /// Address on the local network.
    #[serde(rename = "internalipaddress")]
    pub address: IpAddr,
    /// HTTPS port, normally 443.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub source: DiscoverySource,
}

fn default_port() -> u16 {
    443
}

impl DiscoveredBridge {
    /// Base URL for REST calls against this bridge.
    pub fn base_url(&self) -> Result<Url, Error> {
        let host = match self.address {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{v6}]"),
        };
        Ok(Url::parse(&format!("https://{host}:{}", self.port))?)
    }
}

/// Query the discovery endpoint (pass [`DISCOVERY_URL`] outside of tests).
pub async fn discover(endpoint: &str, config: &HttpConfig) -> Result<Vec<DiscoveredBridge>, Error> {
    let url = Url::parse(endpoint)?;
    // Discovery is a public cloud endpoint: always verify its certificate.
    let config = HttpConfig {
        tls: crate::http::TlsMode::System,
        ..config.clone()
    };
    let http = config.build_client()?;

    debug!("GET {}", url);
    let resp = http.get(url).send().await?;
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        return Err(Error::Api {
            status: status.as_u16(),
            message: body.chars().take(200).collect(),
        });
    }

    let bridges: Vec<DiscoveredBridge> =
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: body.clone(),
        })?;
    debug!(count = bridges.len(), "discovered bridges");
    Ok(bridges)
}

/// Browse the local network for [`MDNS_SERVICE`] until `timeout` elapses.
pub async fn browse_mdns(timeout: Duration) -> Result<Vec<DiscoveredBridge>, Error> {
    let mdns = ServiceDaemon::new().map_err(|e| Error::Mdns(e.to_string()))?;
    let receiver = mdns
        .browse(MDNS_SERVICE)
        .map_err(|e| Error::Mdns(e.to_string()))?;

    let mut bridges = Vec::new();
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
            Ok(Ok(ServiceEvent::ServiceResolved(info))) => {
                debug!(service = info.get_fullname(), "mdns service resolved");
                bridges.extend(bridge_from_service(&info));
            }
            Ok(Ok(_)) => {}
            // Deadline reached or the daemon hung up.
            Ok(Err(_)) | Err(_) => break,
        }
    }

    if let Err(e) = mdns.shutdown() {
        debug!(error = %e, "mdns daemon shutdown failed");
    }
    debug!(count = bridges.len(), "mdns browse finished");
    Ok(bridges)
}

fn bridge_from_service(info: &ServiceInfo) -> Option<DiscoveredBridge> {
    // Prefer IPv4: the bridge REST API and streaming port are reached over it.
    let mut addresses: Vec<IpAddr> = info
        .get_addresses()
        .iter()
        .filter_map(|a| a.to_string().parse().ok())
        .collect();
    addresses.sort_by_key(|a| !a.is_ipv4());
    let address = *addresses.first()?;

    let id = info.get_property_val_str("bridgeid").map_or_else(
        || instance_name(info.get_fullname()).to_owned(),
        str::to_owned,
    );
    Some(DiscoveredBridge {
        id,
        address,
        port: default_port(),
        source: DiscoverySource::Mdns,
    })
}

/// `Hue Bridge - 6A1B2C._hue._tcp.local.` becomes `Hue Bridge - 6A1B2C`.
fn instance_name(fullname: &str) -> &str {
    fullname
        .strip_suffix(MDNS_SERVICE)
        .map_or(fullname, |name| name.trim_end_matches('.'))
}

/// Which discovery sources to query.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    /// N-UPnP endpoint; `None` skips the cloud query.
    pub endpoint: Option<String>,
    /// mDNS browse window; `None` skips the local browse.
    pub mdns_timeout: Option<Duration>,
}

/// Query every enabled source concurrently and merge the results.
///
/// A failing source is logged and skipped as long as another source
/// answered; the error surfaces only when nothing did.
pub async fn discover_all(
    options: &DiscoveryOptions,
    config: &HttpConfig,
) -> Result<Vec<DiscoveredBridge>, Error> {
    let cloud = async {
        match options.endpoint.as_deref() {
            Some(endpoint) => Some(discover(endpoint, config).await),
            None => None,
        }
    };
    let local = async {
        match options.mdns_timeout {
            Some(timeout) => Some(browse_mdns(timeout).await),
            None => None,
        }
    };
    let (cloud, local) = tokio::join!(cloud, local);
    combine(local, cloud)
}

/// Fold per-source outcomes, earlier sources taking precedence.
fn combine(
    first: Option<Result<Vec<DiscoveredBridge>, Error>>,
    second: Option<Result<Vec<DiscoveredBridge>, Error>>,
) -> Result<Vec<DiscoveredBridge>, Error> {
    let mut found = Vec::new();
    let mut failure = None;
    let mut answered = false;
    for outcome in [first, second].into_iter().flatten() {
        match outcome {
            Ok(bridges) => {
                answered = true;
                found.push(bridges);
            }
            Err(e) => {
                warn!(error = %e, "discovery source failed");
                failure.get_or_insert(e);
            }
        }
    }
    match failure {
        Some(e) if !answered => Err(e),
        _ => Ok(merge_bridges(found)),
    }
}

/// Merge candidate lists, keeping the first entry per bridge.
///
/// Ids compare case-insensitively (the cloud reports lowercase, mDNS TXT
/// records uppercase). An entry whose address was already claimed by
/// another id is dropped too, which folds mDNS instances that carry no
/// `bridgeid` record into their cloud counterpart.
pub fn merge_bridges(
    sources: impl IntoIterator<Item = Vec<DiscoveredBridge>>,
) -> Vec<DiscoveredBridge> {
    let mut ids = HashSet::new();
    let mut addresses = HashSet::new();
    let mut merged = Vec::new();
    for mut bridge in sources.into_iter().flatten() {
        bridge.id = bridge.id.to_ascii_lowercase();
        if ids.contains(&bridge.id) || addresses.contains(&bridge.address) {
            continue;
        }
        ids.insert(bridge.id.clone());
        addresses.insert(bridge.address);
        merged.push(bridge);
    }
    merged
}
