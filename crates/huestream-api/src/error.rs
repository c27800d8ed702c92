use thiserror::Error;

/// Top-level error type for the `huestream-api` crate.
///
/// Covers every failure mode across the bridge-facing surfaces:
/// the CLIP REST API, discovery, and the secure datagram transport.
/// `huestream-core` maps these into streaming-level conditions.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport (REST) ────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Non-success HTTP status without a structured bridge error.
    #[error("Bridge API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── CLIP envelope ───────────────────────────────────────────────
    /// Error reported inside the CLIP `errors` array or a v1 `error` object.
    #[error("Bridge rejected request: {description}")]
    Bridge {
        /// v1 error type code when available (e.g. 101 = link button not pressed).
        kind: Option<u16>,
        description: String,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Discovery ───────────────────────────────────────────────────
    /// The mDNS daemon could not be started or could not browse.
    #[error("mDNS discovery failed: {0}")]
    Mdns(String),

    // ── Datagram transport ──────────────────────────────────────────
    /// Socket-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation exceeded its deadline.
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Secure channel could not be formed.
    #[error("Secure session handshake failed: {0}")]
    HandshakeFailed(String),

    /// Send attempted on a session that has already been closed.
    #[error("Secure session is closed")]
    SessionClosed,
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if the bridge refused because the link button was not pressed.
    pub fn is_link_button_required(&self) -> bool {
        matches!(self, Self::Bridge { kind: Some(101), .. })
    }
}
