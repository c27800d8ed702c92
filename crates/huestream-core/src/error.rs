// ── Core error types ──
//
// User-facing errors from huestream-core. Consumers never see socket
// errors or HTTP statuses directly; the `From<huestream_api::Error>` impl
// translates collaborator failures into streaming-level variants.

use thiserror::Error;

use crate::model::LightId;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Command errors (local, non-fatal) ────────────────────────────
    #[error("Light {light_id} is not part of the entertainment configuration")]
    InvalidTarget { light_id: LightId },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Invalid entertainment configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Session errors ───────────────────────────────────────────────
    #[error("Cannot establish streaming session with {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Streaming transport failed: {message}")]
    Transport { message: String },

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    // ── Collaborator errors (wrapped, not exposed raw) ───────────────
    #[error("Bridge API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },
}

impl CoreError {
    /// Returns `true` for conditions that never change the session state.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidTarget { .. } | Self::InvalidState { .. })
    }
}

// ── Conversion from collaborator errors ──────────────────────────────

impl From<huestream_api::Error> for CoreError {
    fn from(err: huestream_api::Error) -> Self {
        match err {
            huestream_api::Error::Http(ref e) => CoreError::Api {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            },
            huestream_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            huestream_api::Error::Api { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            huestream_api::Error::Bridge { description, .. } => CoreError::Api {
                message: description,
                status: None,
            },
            e @ huestream_api::Error::Mdns(_) => CoreError::Api {
                message: e.to_string(),
                status: None,
            },
            huestream_api::Error::Deserialization { message, body: _ } => CoreError::Api {
                message: format!("Unexpected bridge response: {message}"),
                status: None,
            },
            huestream_api::Error::HandshakeFailed(reason) => CoreError::ConnectionFailed {
                address: String::new(),
                reason,
            },
            e @ (huestream_api::Error::Io(_)
            | huestream_api::Error::Timeout { .. }
            | huestream_api::Error::SessionClosed) => CoreError::Transport {
                message: e.to_string(),
            },
        }
    }
}
