//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

const MASK: &str = "********";

// ── Helpers ─────────────────────────────────────────────────────────

/// Copy of the config with plaintext secrets replaced.
fn masked(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.application_key.is_some() {
            profile.application_key = Some(MASK.into());
        }
        if profile.client_key.is_some() {
            profile.client_key = Some(MASK.into());
        }
    }
    cfg
}

fn parse_value<T: std::str::FromStr>(field: &str, value: &str, expected: &str) -> Result<T, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: format!("expected {expected}, got '{value}'"),
    })
}

/// Apply `key = value` to a profile.
fn set_profile_key(profile: &mut Profile, key: &str, value: String) -> Result<(), CliError> {
    match key.replace('-', "_").as_str() {
        "bridge" => profile.bridge = value,
        "bridge_id" => profile.bridge_id = Some(value),
        "application_key" => profile.application_key = Some(value),
        "application_key_env" => profile.application_key_env = Some(value),
        "application_id" => profile.application_id = Some(value),
        "client_key" => profile.client_key = Some(value),
        "client_key_env" => profile.client_key_env = Some(value),
        "entertainment_configuration" | "config" => {
            profile.entertainment_configuration = Some(value);
        }
        "streaming_port" => {
            profile.streaming_port = Some(parse_value(key, &value, "a port number")?);
        }
        "ca_cert" => profile.ca_cert = Some(value.into()),
        "timeout" => profile.timeout = Some(parse_value(key, &value, "seconds")?),
        "protocol" => profile.protocol = Some(parse_value(key, &value, "'v1' or 'v2'")?),
        "keep_alive" => {
            profile.keep_alive = Some(parse_value(key, &value, "'verbatim' or 'resequence'")?);
        }
        "color_space" => profile.color_space = Some(parse_value(key, &value, "'rgb' or 'xy'")?),
        "tick_ms" => profile.tick_ms = Some(parse_value(key, &value, "milliseconds")?),
        other => {
            return Err(CliError::Validation {
                field: other.into(),
                reason: format!(
                    "unknown config key '{other}'. Valid keys: bridge, bridge_id, \
                     application_key, application_key_env, application_id, client_key, \
                     client_key_env, entertainment_configuration, streaming_port, ca_cert, \
                     timeout, protocol, keep_alive, color_space, tick_ms"
                ),
            });
        }
    }
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = masked(&config::load_config_or_default());
            let out = output::render_single(
                global.output,
                &cfg,
                |c| toml::to_string_pretty(c).unwrap_or_else(|e| format!("{c:#?}\n({e})")),
                |c| c.active_profile_name().to_owned(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load_config_or_default();
            let profile_name = config::active_profile_name(global, &cfg);

            let profile = cfg.profiles.entry(profile_name.clone()).or_default();
            set_profile_key(profile, &key, value)?;

            config::save_config(&cfg)?;
            output::status(global.quiet, &format!("✓ Set {key} on profile '{profile_name}'"));
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let default = cfg.active_profile_name();
            if cfg.profiles.is_empty() {
                output::status(global.quiet, "No profiles configured. Run: huestream pair --save");
            } else {
                let lines: Vec<String> = cfg
                    .profiles
                    .iter()
                    .map(|(name, p)| {
                        let marker = if name == default { " *" } else { "" };
                        format!("{name}{marker}\t{}", p.bridge)
                    })
                    .collect();
                output::print_output(&lines.join("\n"), global.quiet);
            }
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();

            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: config::available_profiles(&cfg),
                    name,
                });
            }

            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            output::status(global.quiet, &format!("✓ Default profile set to '{name}'"));
            Ok(())
        }
    }
}
