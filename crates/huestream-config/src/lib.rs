//! Shared configuration for the huestream CLI.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext), and
//! translation into `huestream_core` runtime types. The CLI layers its
//! `GlobalOpts` overrides on top.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use huestream_api::{HttpConfig, TlsMode};
use huestream_core::{BridgeIdentity, ColorSpace, KeepAlivePolicy, ProtocolVersion, StreamOptions};

/// Keyring service name; entries are keyed `{profile}/{credential}`.
pub const KEYRING_SERVICE: &str = "huestream";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no {credential} configured for profile '{profile}'")]
    NoCredentials {
        profile: String,
        credential: &'static str,
    },

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<keyring::Error> for ConfigError {
    fn from(err: keyring::Error) -> Self {
        Self::Keyring(err.to_string())
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named bridge profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Profile name to use when none is given on the command line.
    pub fn active_profile_name(&self) -> &str {
        self.default_profile.as_deref().unwrap_or("default")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// REST request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Streaming tick period in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Idle time before the last frame is resent, in milliseconds.
    #[serde(default = "default_keep_alive_ms")]
    pub keep_alive_ms: u64,

    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default)]
    pub protocol: ProtocolVersion,

    #[serde(default)]
    pub keep_alive: KeepAlivePolicy,

    #[serde(default)]
    pub color_space: ColorSpace,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            tick_ms: default_tick_ms(),
            keep_alive_ms: default_keep_alive_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            protocol: ProtocolVersion::default(),
            keep_alive: KeepAlivePolicy::default(),
            color_space: ColorSpace::default(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    5
}
fn default_tick_ms() -> u64 {
    20
}
fn default_keep_alive_ms() -> u64 {
    9_500
}
fn default_send_timeout_ms() -> u64 {
    250
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}

/// A named bridge profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Bridge IP address on the local network.
    pub bridge: String,

    /// Bridge id reported by discovery.
    pub bridge_id: Option<String>,

    /// Application key from pairing (plaintext, prefer keyring or env var).
    /// Sent as `hue-application-key` and used as the PSK identity.
    pub application_key: Option<String>,

    /// Environment variable name containing the application key.
    pub application_key_env: Option<String>,

    /// PSK identity override, when it differs from the application key.
    pub application_id: Option<String>,

    /// Hex client key from pairing (plaintext, prefer keyring or env var).
    pub client_key: Option<String>,

    /// Environment variable name containing the client key.
    pub client_key_env: Option<String>,

    /// Entertainment configuration to stream to by default.
    pub entertainment_configuration: Option<String>,

    /// Streaming port override.
    pub streaming_port: Option<u16>,

    /// Path to a CA certificate for the bridge's REST endpoint.
    pub ca_cert: Option<PathBuf>,

    /// Override timeout.
    pub timeout: Option<u64>,

    pub protocol: Option<ProtocolVersion>,
    pub keep_alive: Option<KeepAlivePolicy>,
    pub color_space: Option<ColorSpace>,
    pub tick_ms: Option<u64>,
}

impl Profile {
    pub fn bridge_ip(&self) -> Result<IpAddr, ConfigError> {
        self.bridge.trim().parse().map_err(|_| ConfigError::Validation {
            field: "bridge".into(),
            reason: format!("expected an IP address, got '{}'", self.bridge),
        })
    }

    /// Base URL for the bridge's REST API.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let host = match self.bridge_ip()? {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{v6}]"),
        };
        Url::parse(&format!("https://{host}")).map_err(|e| ConfigError::Validation {
            field: "bridge".into(),
            reason: e.to_string(),
        })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "huestream", "huestream").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("huestream");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`, layering defaults, the TOML file, then
/// `HUESTREAM_`-prefixed env vars (`__` separates nesting levels).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HUESTREAM_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(&path, cfg)?;
    Ok(path)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution (without CLI flags) ───────────────────────

fn keyring_entry(profile_name: &str, credential: &str) -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(
        KEYRING_SERVICE,
        &format!("{profile_name}/{credential}"),
    )?)
}

fn resolve_secret(
    env_name: Option<&str>,
    profile_name: &str,
    credential: &'static str,
    plaintext: Option<&str>,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's env var name → env var lookup
    if let Some(val) = env_name.and_then(|name| std::env::var(name).ok()) {
        return Ok(SecretString::from(val));
    }

    // 2. System keyring
    if let Ok(secret) = keyring_entry(profile_name, credential).and_then(|entry| {
        entry.get_password().map_err(ConfigError::from)
    }) {
        return Ok(SecretString::from(secret));
    }

    // 3. Plaintext in config
    if let Some(val) = plaintext {
        return Ok(SecretString::from(val.to_owned()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
        credential,
    })
}

/// Resolve the application key from the credential chain.
pub fn resolve_application_key(
    profile: &Profile,
    profile_name: &str,
) -> Result<SecretString, ConfigError> {
    resolve_secret(
        profile.application_key_env.as_deref(),
        profile_name,
        "application-key",
        profile.application_key.as_deref(),
    )
}

/// Resolve the hex client key (the streaming PSK) from the credential chain.
pub fn resolve_client_key(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_secret(
        profile.client_key_env.as_deref(),
        profile_name,
        "client-key",
        profile.client_key.as_deref(),
    )
}

/// Store pairing credentials in the system keyring.
pub fn store_credentials(
    profile_name: &str,
    application_key: &SecretString,
    client_key: &SecretString,
) -> Result<(), ConfigError> {
    keyring_entry(profile_name, "application-key")?
        .set_password(application_key.expose_secret())?;
    keyring_entry(profile_name, "client-key")?.set_password(client_key.expose_secret())?;
    Ok(())
}

// ── Translation into runtime types ──────────────────────────────────

/// REST client settings for a profile.
pub fn profile_to_http_config(profile: &Profile, defaults: &Defaults) -> HttpConfig {
    let tls = match profile.ca_cert {
        Some(ref ca_path) => TlsMode::CustomCa(ca_path.clone()),
        // Bridges serve a self-signed certificate.
        None => TlsMode::DangerAcceptInvalid,
    };
    HttpConfig {
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
    }
}

/// Build a `BridgeIdentity` from a profile and its resolved credentials.
///
/// The PSK identity is the profile's `application_id` when set, otherwise
/// the application key itself.
pub fn profile_to_bridge_identity(
    profile: &Profile,
    application_key: &SecretString,
    client_key: &SecretString,
) -> Result<BridgeIdentity, ConfigError> {
    let ip = profile.bridge_ip()?;
    let application_id = profile
        .application_id
        .clone()
        .unwrap_or_else(|| application_key.expose_secret().to_owned());

    let identity = BridgeIdentity::from_hex_key(ip, application_id, client_key).map_err(|e| {
        ConfigError::Validation {
            field: "client_key".into(),
            reason: e.to_string(),
        }
    })?;
    Ok(match profile.streaming_port {
        Some(port) => identity.with_port(port),
        None => identity,
    })
}

/// Streaming options from the global defaults with profile overrides.
pub fn profile_to_stream_options(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<StreamOptions, ConfigError> {
    let options = StreamOptions {
        tick_interval: Duration::from_millis(profile.tick_ms.unwrap_or(defaults.tick_ms)),
        keep_alive_interval: Duration::from_millis(defaults.keep_alive_ms),
        keep_alive: profile.keep_alive.unwrap_or(defaults.keep_alive),
        send_timeout: Duration::from_millis(defaults.send_timeout_ms),
        connect_timeout: Duration::from_millis(defaults.connect_timeout_ms),
        protocol: profile.protocol.unwrap_or(defaults.protocol),
        color_space: profile.color_space.unwrap_or(defaults.color_space),
    };
    options.validate().map_err(|e| ConfigError::Validation {
        field: "defaults".into(),
        reason: e.to_string(),
    })?;
    Ok(options)
}
