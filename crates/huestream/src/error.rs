//! CLI error types with miette diagnostics.
//!
//! Maps core, API and config errors into user-facing errors with actionable
//! help text.

use miette::Diagnostic;
use thiserror::Error;

use huestream_config::ConfigError;
use huestream_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const STREAM: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach bridge at {address}: {reason}")]
    #[diagnostic(
        code(huestream::connection_failed),
        help(
            "Check that the bridge is powered and on the same network.\n\
             Address: {address}\n\
             Try: huestream discover"
        )
    )]
    ConnectionFailed { address: String, reason: String },

    // ── Pairing / authentication ─────────────────────────────────────
    #[error("Link button not pressed")]
    #[diagnostic(
        code(huestream::link_button),
        help("Press the round button on top of the bridge, then run pair again within 30 seconds.")
    )]
    LinkButtonNotPressed,

    #[error("Bridge rejected the application key")]
    #[diagnostic(
        code(huestream::auth_failed),
        help(
            "The key may have been revoked in the Hue app.\n\
             Pair again with: huestream pair --save --profile {profile}"
        )
    )]
    AuthFailed { profile: String },

    #[error("No {credential} configured for profile '{profile}'")]
    #[diagnostic(
        code(huestream::no_credentials),
        help(
            "Pair with the bridge: huestream pair --save\n\
             Or set HUESTREAM_APPLICATION_KEY and HUESTREAM_CLIENT_KEY."
        )
    )]
    NoCredentials { profile: String, credential: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(huestream::not_found),
        help("Run: huestream {list_command} to see what the bridge offers")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── API ──────────────────────────────────────────────────────────
    #[error("Bridge API error: {message}")]
    #[diagnostic(code(huestream::api_error))]
    ApiError { status: Option<u16>, message: String },

    // ── Streaming ────────────────────────────────────────────────────
    #[error("Streaming failed: {reason}")]
    #[diagnostic(
        code(huestream::stream),
        help(
            "Make sure no other application is streaming to this configuration.\n\
             Run with -v for frame-level diagnostics."
        )
    )]
    Stream { reason: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(huestream::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(huestream::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: huestream pair --save --profile {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No bridge configured")]
    #[diagnostic(
        code(huestream::no_config),
        help(
            "Pass --bridge <IP>, or pair and save a profile: huestream pair -b <IP> --save\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(huestream::config))]
    Config(Box<ConfigError>),

    #[error("Keyring error: {0}")]
    #[diagnostic(
        code(huestream::keyring),
        help("Retry with --plaintext to store credentials in the config file instead.")
    )]
    Keyring(String),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(huestream::timeout),
        help("Increase timeout with --timeout or check bridge responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::LinkButtonNotPressed | Self::AuthFailed { .. } | Self::NoCredentials { .. } => {
                exit_code::AUTH
            }
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Stream { .. } => exit_code::STREAM,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NoConfig { .. } | Self::ProfileNotFound { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { address, reason } => {
                CliError::ConnectionFailed { address, reason }
            }

            CoreError::InvalidTarget { light_id } => CliError::NotFound {
                resource_type: "light".into(),
                identifier: light_id.to_string(),
                list_command: "configs get <id>".into(),
            },

            CoreError::InvalidConfiguration { message } => CliError::Validation {
                field: "entertainment configuration".into(),
                reason: message,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "stream options".into(),
                reason: message,
            },

            CoreError::Transport { message } => CliError::Stream { reason: message },

            CoreError::InvalidState { operation, state } => CliError::Stream {
                reason: format!("cannot {operation} while {state}"),
            },

            CoreError::Api { message, status } => CliError::ApiError { status, message },
        }
    }
}

// ── API error mapping (REST calls made directly by commands) ─────────

impl From<huestream_api::Error> for CliError {
    fn from(err: huestream_api::Error) -> Self {
        use huestream_api::Error as ApiErr;

        if err.is_link_button_required() {
            return CliError::LinkButtonNotPressed;
        }
        match err {
            ApiErr::Http(ref e) if e.is_connect() => CliError::ConnectionFailed {
                address: e.url().map(ToString::to_string).unwrap_or_default(),
                reason: err.to_string(),
            },
            ApiErr::Timeout { timeout_ms } => CliError::Timeout {
                seconds: timeout_ms.div_ceil(1000),
            },
            ApiErr::Api { status, message } if status == 401 || status == 403 => {
                tracing::debug!(status, %message, "bridge refused application key");
                CliError::AuthFailed {
                    profile: "current".into(),
                }
            }
            ApiErr::Api { status, message } if status == 404 => CliError::NotFound {
                resource_type: "resource".into(),
                identifier: message,
                list_command: "configs list".into(),
            },
            ApiErr::Api { status, message } => CliError::ApiError {
                status: Some(status),
                message,
            },
            other => CliError::ApiError {
                status: None,
                message: other.to_string(),
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials {
                profile,
                credential,
            } => CliError::NoCredentials {
                profile,
                credential: credential.replace('-', " "),
            },
            ConfigError::Keyring(message) => CliError::Keyring(message),
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(Box::new(other)),
        }
    }
}
