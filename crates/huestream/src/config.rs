//! Config resolution for the CLI.
//!
//! Re-exports the shared types from `huestream-config` and layers CLI flag
//! overrides (`--bridge`, `--application-key`, `--client-key`, `--timeout`)
//! on top of the stored profile.

use std::time::Duration;

use secrecy::SecretString;

use huestream_api::{ClipClient, HttpConfig};

pub use huestream_config::{
    Config, Profile, config_path, load_config_or_default, profile_to_bridge_identity,
    profile_to_http_config, profile_to_stream_options, resolve_application_key,
    resolve_client_key, save_config, store_credentials,
};

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Profile resolution ───────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .unwrap_or_else(|| config.active_profile_name().to_owned())
}

/// The profile a bridge-bound command runs against, after flag overrides.
#[derive(Debug)]
pub struct ResolvedProfile {
    pub name: String,
    pub profile: Profile,
    pub config: Config,
}

impl ResolvedProfile {
    /// Load config and apply global flags.
    ///
    /// With no stored profile, `--bridge` alone is enough to build one.
    pub fn load(global: &GlobalOpts) -> Result<Self, CliError> {
        Self::from_config(load_config_or_default(), global)
    }

    pub fn from_config(config: Config, global: &GlobalOpts) -> Result<Self, CliError> {
        let name = active_profile_name(global, &config);

        let mut profile = match (config.profiles.get(&name), global.bridge.as_deref()) {
            (Some(stored), _) => stored.clone(),
            (None, Some(_)) => Profile::default(),
            (None, None) if global.profile.is_some() => {
                return Err(CliError::ProfileNotFound {
                    available: available_profiles(&config),
                    name,
                });
            }
            (None, None) => {
                return Err(CliError::NoConfig {
                    path: config_path().display().to_string(),
                });
            }
        };

        if let Some(bridge) = global.bridge.as_deref() {
            bridge.clone_into(&mut profile.bridge);
        }
        if let Some(timeout) = global.timeout {
            profile.timeout = Some(timeout);
        }
        if profile.bridge.trim().is_empty() {
            return Err(CliError::Validation {
                field: "bridge".into(),
                reason: format!("profile '{name}' has no bridge address"),
            });
        }

        Ok(Self {
            name,
            profile,
            config,
        })
    }

    pub fn http_config(&self) -> HttpConfig {
        profile_to_http_config(&self.profile, &self.config.defaults)
    }

    /// REST request timeout for this profile.
    pub fn timeout(&self) -> Duration {
        self.http_config().timeout
    }

    /// Application key: `--application-key` first, then the credential chain.
    pub fn application_key(&self, global: &GlobalOpts) -> Result<SecretString, CliError> {
        if let Some(key) = global.application_key.as_deref() {
            return Ok(SecretString::from(key.to_owned()));
        }
        Ok(resolve_application_key(&self.profile, &self.name)?)
    }

    /// Hex client key: `--client-key` first, then the credential chain.
    pub fn client_key(&self, global: &GlobalOpts) -> Result<SecretString, CliError> {
        if let Some(key) = global.client_key.as_deref() {
            return Ok(SecretString::from(key.to_owned()));
        }
        Ok(resolve_client_key(&self.profile, &self.name)?)
    }

    /// Unauthenticated REST client (pairing, public bridge config).
    pub fn anonymous_client(&self) -> Result<ClipClient, CliError> {
        Ok(ClipClient::new(self.profile.base_url()?, None, &self.http_config())?)
    }

    /// REST client carrying the application key.
    pub fn clip_client(&self, global: &GlobalOpts) -> Result<ClipClient, CliError> {
        let key = self.application_key(global)?;
        Ok(ClipClient::new(
            self.profile.base_url()?,
            Some(&key),
            &self.http_config(),
        )?)
    }
}

pub fn available_profiles(config: &Config) -> String {
    if config.profiles.is_empty() {
        "(none)".into()
    } else {
        config.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}
