//! Bridge discovery handler.

use std::time::Duration;

use tabled::Tabled;

use huestream_api::{DiscoveredBridge, DiscoveryOptions, HttpConfig, discovery};

use crate::cli::{DiscoverArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct BridgeRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Port")]
    port: u16,
    #[tabled(rename = "Source")]
    source: String,
}

impl From<&DiscoveredBridge> for BridgeRow {
    fn from(b: &DiscoveredBridge) -> Self {
        Self {
            id: b.id.clone(),
            address: b.address.to_string(),
            port: b.port,
            source: b.source.to_string(),
        }
    }
}

pub async fn handle(args: DiscoverArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut http = HttpConfig::default();
    if let Some(secs) = global.timeout {
        http.timeout = Duration::from_secs(secs);
    }

    let options = discovery_options(&args);
    let bridges = discovery::discover_all(&options, &http).await?;
    tracing::debug!(count = bridges.len(), "discovery finished");

    if bridges.is_empty() {
        output::status(global.quiet, "No bridges found on this network.");
        return Ok(());
    }

    let out = output::render_list(global.output, &bridges, |b| BridgeRow::from(b), |b| {
        b.address.to_string()
    });
    output::print_output(&out, global.quiet);
    Ok(())
}

fn discovery_options(args: &DiscoverArgs) -> DiscoveryOptions {
    DiscoveryOptions {
        endpoint: (!args.no_cloud).then(|| args.endpoint.clone()),
        mdns_timeout: (!args.no_mdns).then(|| Duration::from_secs(args.mdns_timeout)),
    }
}
