//! Entertainment configuration handlers.

use tabled::Tabled;

use huestream_api::clip::{Channel, EntertainmentConfigurationResponse};

use crate::cli::{ConfigsArgs, ConfigsCommand, GlobalOpts};
use crate::config::ResolvedProfile;
use crate::error::CliError;
use crate::output;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct ConfigRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Channels")]
    channels: usize,
}

impl From<&EntertainmentConfigurationResponse> for ConfigRow {
    fn from(c: &EntertainmentConfigurationResponse) -> Self {
        Self {
            id: c.id.clone(),
            name: c.display_name().to_owned(),
            kind: c.configuration_type.clone().unwrap_or_default(),
            status: c.status.clone().unwrap_or_default(),
            channels: c.channels.len(),
        }
    }
}

#[derive(Tabled)]
struct ChannelRow {
    #[tabled(rename = "Channel")]
    id: u16,
    #[tabled(rename = "Position (x, y, z)")]
    position: String,
    #[tabled(rename = "Members")]
    members: usize,
}

impl From<&Channel> for ChannelRow {
    fn from(c: &Channel) -> Self {
        Self {
            id: c.channel_id,
            position: c
                .position
                .map(|p| format!("{:.2}, {:.2}, {:.2}", p.x, p.y, p.z))
                .unwrap_or_default(),
            members: c.members.len(),
        }
    }
}

fn detail(c: &EntertainmentConfigurationResponse) -> String {
    let rows: Vec<ChannelRow> = c.channels.iter().map(ChannelRow::from).collect();
    let mut lines = vec![
        format!("ID:       {}", c.id),
        format!("Name:     {}", c.display_name()),
        format!("Type:     {}", c.configuration_type.as_deref().unwrap_or("-")),
        format!("Status:   {}", c.status.as_deref().unwrap_or("-")),
    ];
    if let Some(ref streamer) = c.active_streamer {
        lines.push(format!("Streamer: {}", streamer.rid));
    }
    lines.push(String::new());
    lines.push(
        tabled::Table::new(rows)
            .with(tabled::settings::Style::rounded())
            .to_string(),
    );
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: ConfigsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = ResolvedProfile::load(global)?;
    let client = resolved.clip_client(global)?;

    match args.command {
        ConfigsCommand::List => {
            let configs = client.list_entertainment_configurations().await?;
            let out = output::render_list(global.output, &configs, |c| ConfigRow::from(c), |c| {
                c.id.clone()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigsCommand::Get { id } => {
            let config = client
                .get_entertainment_configuration(&id)
                .await
                .map_err(|e| not_found_as_config(e, &id))?;
            let out = output::render_single(global.output, &config, detail, |c| c.id.clone());
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

/// A 404 on a configuration lookup names the configuration, not a generic resource.
pub(crate) fn not_found_as_config(err: huestream_api::Error, id: &str) -> CliError {
    match CliError::from(err) {
        CliError::NotFound { .. } => CliError::NotFound {
            resource_type: "entertainment configuration".into(),
            identifier: id.to_owned(),
            list_command: "configs list".into(),
        },
        other => other,
    }
}
