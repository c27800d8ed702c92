// CLIP v2 response types
//
// Models for the bridge's CLIP v2 JSON API plus the two v1 endpoints still
// needed (registration and the unauthenticated config). v2 responses are
// wrapped in `ClipResponse<T>`. Fields use `#[serde(default)]` liberally
// because firmware versions disagree about field presence.

use serde::{Deserialize, Serialize};

// ── Response Envelope ────────────────────────────────────────────────

/// Standard CLIP v2 envelope:
/// ```json
/// { "errors": [{ "description": "..." }], "data": [...] }
/// ```
#[derive(Debug, Deserialize)]
pub struct ClipResponse<T> {
    #[serde(default)]
    pub errors: Vec<ClipError>,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClipError {
    pub description: String,
}

/// Reference to another resource (`{ "rid": "...", "rtype": "light" }`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub rid: String,
    pub rtype: String,
}

// ── Entertainment configuration ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntertainmentConfigurationResponse {
    pub id: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    /// Deprecated top-level name, still sent by current firmware.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub configuration_type: Option<String>,
    /// `"active"` while some application is streaming.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub active_streamer: Option<ResourceRef>,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub light_services: Vec<ResourceRef>,
}

impl EntertainmentConfigurationResponse {
    /// Display name, preferring `metadata.name`.
    pub fn display_name(&self) -> &str {
        self.metadata
            .as_ref()
            .map(|m| m.name.as_str())
            .or(self.name.as_deref())
            .unwrap_or("")
    }

    pub fn is_active(&self) -> bool {
        self.status.as_deref() == Some("active")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
}

/// One addressable channel of an entertainment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: u16,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub members: Vec<SegmentRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRef {
    pub service: ResourceRef,
    #[serde(default)]
    pub index: u16,
}

/// Body of `PUT /clip/v2/resource/entertainment_configuration/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamingAction {
    Start,
    Stop,
}

#[derive(Debug, Serialize)]
pub(crate) struct ActionBody {
    pub action: StreamingAction,
}

// ── v1: registration & bridge config ─────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct RegisterBody<'a> {
    pub devicetype: &'a str,
    pub generateclientkey: bool,
}

/// v1 responses are arrays of `{ "success": ... }` or `{ "error": ... }`.
#[derive(Debug, Deserialize)]
pub(crate) struct V1Result<T> {
    pub success: Option<T>,
    pub error: Option<V1Error>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct V1Error {
    #[serde(rename = "type")]
    pub kind: u16,
    #[serde(default)]
    pub description: String,
}

/// Credentials issued by the bridge after the link button was pressed.
///
/// `username` is the application key for REST calls; `clientkey` is the
/// hex-encoded PSK for the streaming session.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub username: String,
    pub clientkey: String,
}

/// Unauthenticated bridge description from `GET /api/config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bridgeid: String,
    #[serde(default)]
    pub swversion: String,
    #[serde(default)]
    pub apiversion: String,
    #[serde(default)]
    pub modelid: String,
}
