//! Pairing handler: registers an application and optionally saves it.

use secrecy::SecretString;
use serde::Serialize;

use crate::cli::{GlobalOpts, PairArgs};
use crate::config::{self, ResolvedProfile};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct PairResult {
    profile: String,
    bridge: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    bridge_id: Option<String>,
    /// Printed only when not saved, since there is nowhere else to find them.
    #[serde(skip_serializing_if = "Option::is_none")]
    application_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_key: Option<String>,
    saved: bool,
}

pub async fn handle(args: PairArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = ResolvedProfile::load(global)?;
    let client = resolved.anonymous_client()?;

    output::status(global.quiet, "Registering with bridge (link button must be pressed)...");
    let registration = client.register(&args.device_type).await?;

    // Best effort: the id only labels the profile.
    let bridge_id = match client.bridge_config().await {
        Ok(cfg) if !cfg.bridgeid.is_empty() => Some(cfg.bridgeid.to_lowercase()),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "could not read bridge config");
            None
        }
    };

    let mut result = PairResult {
        profile: resolved.name.clone(),
        bridge: resolved.profile.bridge.clone(),
        bridge_id: bridge_id.clone(),
        application_key: None,
        client_key: None,
        saved: args.save,
    };

    if args.save {
        let ResolvedProfile {
            name,
            profile: mut profile,
            config: mut cfg,
        } = resolved;

        profile.bridge_id = bridge_id.or(profile.bridge_id);
        if args.plaintext {
            profile.application_key = Some(registration.username.clone());
            profile.client_key = Some(registration.clientkey.clone());
        } else {
            config::store_credentials(
                &name,
                &SecretString::from(registration.username.clone()),
                &SecretString::from(registration.clientkey.clone()),
            )?;
        }

        cfg.profiles.insert(name.clone(), profile);
        if !cfg.profiles.contains_key(cfg.active_profile_name()) {
            cfg.default_profile = Some(name.clone());
        }
        let path = config::save_config(&cfg)?;
        tracing::info!(profile = %name, path = %path.display(), "pairing saved");
        output::status(
            global.quiet,
            &format!("✓ Paired and saved profile '{name}' to {}", path.display()),
        );
    } else {
        result.application_key = Some(registration.username);
        result.client_key = Some(registration.clientkey);
    }

    let out = output::render_single(
        global.output,
        &result,
        |r| {
            let mut lines = vec![
                format!("Profile:          {}", r.profile),
                format!("Bridge:           {}", r.bridge),
            ];
            if let Some(ref id) = r.bridge_id {
                lines.push(format!("Bridge ID:        {id}"));
            }
            if let Some(ref key) = r.application_key {
                lines.push(format!("Application key:  {key}"));
            }
            if let Some(ref key) = r.client_key {
                lines.push(format!("Client key:       {key}"));
            }
            lines.join("\n")
        },
        |r| r.application_key.clone().unwrap_or_else(|| r.profile.clone()),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
