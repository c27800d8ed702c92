//! Streaming handler.
//!
//! Activates the configuration over REST, streams the requested colors for
//! the given duration (or until Ctrl-C or a fault), then deactivates.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use huestream_api::{ClipClient, DtlsTransport, SecureTransport, StreamingAction, UdpTransport};
use huestream_core::{
    Color, ColorSpace, EntertainmentConfiguration, KeepAlivePolicy, LightId, ProtocolVersion,
    StreamOptions, StreamState, Streamer,
};

use super::configs::not_found_as_config;
use crate::cli::{ColorSpaceArg, GlobalOpts, KeepAliveArg, ProtocolArg, StreamArgs};
use crate::config::{ResolvedProfile, profile_to_bridge_identity, profile_to_stream_options};
use crate::error::CliError;
use crate::output;

// ── Arg conversions ─────────────────────────────────────────────────

impl From<ProtocolArg> for ProtocolVersion {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::V1 => Self::V1,
            ProtocolArg::V2 => Self::V2,
        }
    }
}

impl From<ColorSpaceArg> for ColorSpace {
    fn from(arg: ColorSpaceArg) -> Self {
        match arg {
            ColorSpaceArg::Rgb => Self::Rgb,
            ColorSpaceArg::Xy => Self::Xy,
        }
    }
}

impl From<KeepAliveArg> for KeepAlivePolicy {
    fn from(arg: KeepAliveArg) -> Self {
        match arg {
            KeepAliveArg::Verbatim => Self::Verbatim,
            KeepAliveArg::Resequence => Self::Resequence,
        }
    }
}

// ── Color parsing ───────────────────────────────────────────────────

/// Parse `#RRGGBB`, `RRGGBB`, `xy:X,Y,BRI`, or a basic color name.
fn parse_color(spec: &str) -> Result<Color, CliError> {
    let invalid = |reason: &str| CliError::Validation {
        field: "color".into(),
        reason: format!("'{spec}': {reason}"),
    };
    let spec = spec.trim();

    if let Some(rest) = spec.strip_prefix("xy:") {
        let parts = rest
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid("expected xy:X,Y,BRIGHTNESS with decimal numbers"))?;
        return match parts.as_slice() {
            [x, y, bri] => Ok(Color::xy(*x, *y, *bri)),
            [x, y] => Ok(Color::xy(*x, *y, 1.0)),
            _ => Err(invalid("expected xy:X,Y,BRIGHTNESS")),
        };
    }

    match spec.to_ascii_lowercase().as_str() {
        "off" | "black" => return Ok(Color::BLACK),
        "white" => return Ok(Color::rgb(255, 255, 255)),
        "red" => return Ok(Color::rgb(255, 0, 0)),
        "green" => return Ok(Color::rgb(0, 255, 0)),
        "blue" => return Ok(Color::rgb(0, 0, 255)),
        _ => {}
    }

    let hex = spec.strip_prefix('#').unwrap_or(spec);
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(invalid("expected #RRGGBB"));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid("expected #RRGGBB"))
    };
    Ok(Color::rgb(channel(0)?, channel(2)?, channel(4)?))
}

/// Parse `LIGHT=COLOR`.
fn parse_assignment(spec: &str) -> Result<(LightId, Color), CliError> {
    let (light, color) = spec.split_once('=').ok_or_else(|| CliError::Validation {
        field: "set".into(),
        reason: format!("'{spec}': expected LIGHT=COLOR"),
    })?;
    let light = light.trim().parse::<u16>().map_err(|_| CliError::Validation {
        field: "set".into(),
        reason: format!("'{light}' is not a light or channel id"),
    })?;
    Ok((LightId(light), parse_color(color)?))
}

/// Colors to submit, with per-light assignments applied after `--all`.
fn color_plan(
    args: &StreamArgs,
    configuration: &EntertainmentConfiguration,
) -> Result<Vec<(LightId, Color)>, CliError> {
    let mut plan = Vec::new();
    if let Some(ref all) = args.all {
        let color = parse_color(all)?;
        plan.extend(configuration.lights.iter().map(|l| (l.id, color)));
    }
    for spec in &args.colors {
        plan.push(parse_assignment(spec)?);
    }
    Ok(plan)
}

// ── Summary ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct StreamSummary {
    configuration: String,
    name: String,
    lights: usize,
    protocol: String,
    color_space: String,
    transport: &'static str,
    duration_ms: u128,
    stopped_by: &'static str,
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: StreamArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if args.all.is_none() && args.colors.is_empty() {
        return Err(CliError::Validation {
            field: "colors".into(),
            reason: "nothing to stream, pass --all or --set".into(),
        });
    }

    let resolved = ResolvedProfile::load(global)?;
    let config_id = args
        .config
        .clone()
        .or_else(|| resolved.profile.entertainment_configuration.clone())
        .ok_or_else(|| CliError::Validation {
            field: "config".into(),
            reason: "pass --config <ID> or set entertainment_configuration on the profile".into(),
        })?;

    // Flag overrides on top of the profile
    let mut profile = resolved.profile.clone();
    if let Some(protocol) = args.protocol {
        profile.protocol = Some(protocol.into());
    }
    if let Some(color_space) = args.color_space {
        profile.color_space = Some(color_space.into());
    }
    if let Some(keep_alive) = args.keep_alive {
        profile.keep_alive = Some(keep_alive.into());
    }
    if let Some(tick_ms) = args.tick_ms {
        profile.tick_ms = Some(tick_ms);
    }
    if let Some(port) = args.port {
        profile.streaming_port = Some(port);
    }

    let options = profile_to_stream_options(&profile, &resolved.config.defaults)?;
    let application_key = resolved.application_key(global)?;
    let client_key = resolved.client_key(global)?;
    let identity = profile_to_bridge_identity(&profile, &application_key, &client_key)?;

    let client = resolved.clip_client(global)?;
    let response = client
        .get_entertainment_configuration(&config_id)
        .await
        .map_err(|e| not_found_as_config(e, &config_id))?;
    if response.is_active() && !args.no_activate {
        tracing::warn!(id = %config_id, "configuration is already streaming from another application");
    }
    let configuration = Arc::new(EntertainmentConfiguration::from(&response));

    let (transport_name, transport) = select_transport(args.plaintext, &options);

    // Submitted while idle; sent on the first tick after start.
    let streamer = Streamer::new(
        Arc::new(identity),
        Arc::clone(&configuration),
        transport,
        options,
    );
    for (light, color) in color_plan(&args, &configuration)? {
        streamer.submit(light, color)?;
    }

    let activated = !args.no_activate;
    if activated {
        client
            .set_streaming(&config_id, StreamingAction::Start)
            .await?;
    }

    if let Err(e) = streamer.start().await {
        streamer.stop().await;
        deactivate(&client, &config_id, activated).await;
        return Err(e.into());
    }

    output::status(
        global.quiet,
        &format!(
            "Streaming to '{}' ({} lights) for {} (Ctrl-C to stop)",
            configuration.name,
            configuration.len(),
            humantime::format_duration(args.duration)
        ),
    );

    let started = tokio::time::Instant::now();
    let mut state = streamer.subscribe_state();
    let stopped_by = tokio::select! {
        () = tokio::time::sleep(args.duration) => Ok("duration"),
        signal = tokio::signal::ctrl_c() => signal.map(|()| "interrupt").map_err(CliError::from),
        reason = wait_for_fault(&mut state) => Err(CliError::Stream { reason }),
    };
    let elapsed = started.elapsed();

    streamer.stop().await;
    deactivate(&client, &config_id, activated).await;
    let stopped_by = stopped_by?;

    let summary = StreamSummary {
        configuration: configuration.id.clone(),
        name: configuration.name.clone(),
        lights: configuration.len(),
        protocol: streamer.options().protocol.to_string(),
        color_space: streamer.color_space().to_string(),
        transport: transport_name,
        duration_ms: elapsed.as_millis(),
        stopped_by,
    };
    let out = output::render_single(
        global.output,
        &summary,
        |s| {
            format!(
                "Streamed {} lights to '{}' for {}ms ({}, {}, {}, stopped by {})",
                s.lights,
                s.name,
                s.duration_ms,
                s.protocol,
                s.color_space,
                s.transport,
                s.stopped_by
            )
        },
        |s| s.configuration.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

/// DTLS unless plain UDP was asked for; bridges drop unencrypted datagrams.
fn select_transport(
    plaintext: bool,
    options: &StreamOptions,
) -> (&'static str, Arc<dyn SecureTransport>) {
    if plaintext {
        tracing::warn!("streaming unencrypted; real bridges will ignore these frames");
        ("udp", Arc::new(UdpTransport::new()))
    } else {
        let dtls = DtlsTransport::new().with_handshake_timeout(options.connect_timeout);
        ("dtls", Arc::new(dtls))
    }
}

/// Resolves with the fault reason once the streamer faults.
async fn wait_for_fault(state: &mut watch::Receiver<StreamState>) -> String {
    loop {
        if let StreamState::Faulted { reason } = &*state.borrow_and_update() {
            return reason.clone();
        }
        if state.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

async fn deactivate(client: &ClipClient, id: &str, activated: bool) {
    if !activated {
        return;
    }
    if let Err(e) = client.set_streaming(id, StreamingAction::Stop).await {
        tracing::warn!(id, error = %e, "failed to release entertainment configuration");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::{Cli, Command};

    fn stream_args(args: &[&str]) -> StreamArgs {
        let mut argv = vec!["huestream", "stream"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Stream(args) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn hex_colors_parse_with_or_without_hash() {
        assert_eq!(parse_color("#ff8000").unwrap(), Color::rgb(255, 128, 0));
        assert_eq!(parse_color("00FF7f").unwrap(), Color::rgb(0, 255, 127));
    }

    #[test]
    fn xy_colors_default_brightness() {
        assert_eq!(
            parse_color("xy:0.3,0.32,0.5").unwrap(),
            Color::xy(0.3, 0.32, 0.5)
        );
        assert_eq!(parse_color("xy:0.3, 0.32").unwrap(), Color::xy(0.3, 0.32, 1.0));
    }

    #[test]
    fn named_colors() {
        assert_eq!(parse_color("off").unwrap(), Color::BLACK);
        assert_eq!(parse_color("Red").unwrap(), Color::rgb(255, 0, 0));
    }

    #[test]
    fn malformed_colors_are_rejected() {
        for bad in ["#ff00", "#gg0000", "xy:0.3", "xy:a,b,c", "purple", "#ff00€"] {
            assert!(
                matches!(parse_color(bad), Err(CliError::Validation { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn assignments_need_a_numeric_light() {
        assert_eq!(
            parse_assignment("2=#0000ff").unwrap(),
            (LightId(2), Color::rgb(0, 0, 255))
        );
        assert!(parse_assignment("#0000ff").is_err());
        assert!(parse_assignment("lamp=#0000ff").is_err());
    }

    #[test]
    fn per_light_colors_follow_all() {
        let configuration = EntertainmentConfiguration::with_channels(
            "1a8d99cc-967b-44f2-9202-43f976c0fa6b",
            "Desk",
            [0, 1],
        );
        let args = stream_args(&["--all", "white", "--set", "1=off"]);
        let plan = color_plan(&args, &configuration).unwrap();
        assert_eq!(
            plan,
            vec![
                (LightId(0), Color::rgb(255, 255, 255)),
                (LightId(1), Color::rgb(255, 255, 255)),
                (LightId(1), Color::BLACK),
            ]
        );
    }

    #[test]
    fn dtls_is_the_default_transport() {
        let args = stream_args(&["--all", "red"]);
        assert!(!args.plaintext);
        let (name, _) = select_transport(args.plaintext, &StreamOptions::default());
        assert_eq!(name, "dtls");
    }

    #[test]
    fn plaintext_flag_selects_udp() {
        let args = stream_args(&["--all", "red", "--plaintext"]);
        assert!(args.plaintext);
        let (name, _) = select_transport(args.plaintext, &StreamOptions::default());
        assert_eq!(name, "udp");
    }

    #[test]
    fn duration_accepts_humantime() {
        let args = stream_args(&["--all", "red", "--duration", "1m 30s"]);
        assert_eq!(args.duration, std::time::Duration::from_secs(90));
    }
}
