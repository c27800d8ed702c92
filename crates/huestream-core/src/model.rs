// ── Domain model ──
//
// Lights, entertainment configurations, and the color commands callers
// submit. Configurations are immutable once built and shared by `Arc`.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::frame::ProtocolVersion;

/// Stable small-integer identifier of a light (channel) within a configuration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LightId(pub u16);

impl fmt::Display for LightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for LightId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<u8> for LightId {
    fn from(value: u8) -> Self {
        Self(u16::from(value))
    }
}

/// Device-type tag carried in v1 light blocks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceType {
    #[default]
    Light,
    Area,
}

impl DeviceType {
    pub const fn wire_tag(self) -> u8 {
        match self {
            Self::Light => 0x00,
            Self::Area => 0x01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LightDescriptor {
    pub id: LightId,
    pub device_type: DeviceType,
}

impl LightDescriptor {
    pub fn light(id: impl Into<LightId>) -> Self {
        Self {
            id: id.into(),
            device_type: DeviceType::Light,
        }
    }
}

// ── EntertainmentConfiguration ───────────────────────────────────

/// The set of lights enabled for a streaming session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntertainmentConfiguration {
    /// Bridge-assigned UUID; doubles as the session id in v2 frames.
    pub id: String,
    pub name: String,
    pub lights: Vec<LightDescriptor>,
}

impl EntertainmentConfiguration {
    pub fn new(id: impl Into<String>, name: impl Into<String>, lights: Vec<LightDescriptor>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lights,
        }
    }

    /// Convenience constructor for a configuration made only of plain lights.
    pub fn with_channels(
        id: impl Into<String>,
        name: impl Into<String>,
        channels: impl IntoIterator<Item = u16>,
    ) -> Self {
        Self::new(id, name, channels.into_iter().map(LightDescriptor::light).collect())
    }

    pub fn light(&self, id: LightId) -> Option<&LightDescriptor> {
        self.lights.iter().find(|l| l.id == id)
    }

    pub fn contains(&self, id: LightId) -> bool {
        self.light(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// Check the configuration can be streamed with `protocol`.
    ///
    /// Runs before any transport call, so a malformed configuration never
    /// opens a session.
    pub fn validate(&self, protocol: ProtocolVersion) -> Result<(), CoreError> {
        let invalid = |message: String| CoreError::InvalidConfiguration { message };

        if self.lights.is_empty() {
            return Err(invalid(format!("configuration '{}' has no lights", self.id)));
        }

        let max = protocol.max_lights();
        if self.lights.len() > max {
            return Err(invalid(format!(
                "{} lights exceed the {protocol} limit of {max}",
                self.lights.len()
            )));
        }

        let mut seen = BTreeSet::new();
        for light in &self.lights {
            if !seen.insert(light.id) {
                return Err(invalid(format!("light {} is listed twice", light.id)));
            }
            if light.id.0 > protocol.max_light_id() {
                return Err(invalid(format!(
                    "light {} does not fit a {protocol} channel id",
                    light.id
                )));
            }
        }

        if protocol == ProtocolVersion::V2 && uuid::Uuid::try_parse(&self.id).is_err() {
            return Err(invalid(format!(
                "'{}' is not a UUID; v2 frames carry the configuration id",
                self.id
            )));
        }

        Ok(())
    }
}

// ── Color commands ───────────────────────────────────────────────

/// Caller-facing color payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Color {
    /// 8-bit RGB triple.
    Rgb8 { r: u8, g: u8, b: u8 },
    /// CIE xy chromaticity plus brightness, each nominally in [0, 1].
    Xy { x: f64, y: f64, brightness: f64 },
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::Rgb8 { r, g, b }
    }

    pub const fn xy(x: f64, y: f64, brightness: f64) -> Self {
        Self::Xy { x, y, brightness }
    }

    pub const BLACK: Self = Self::rgb(0, 0, 0);
}

/// Latest pending color for one light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightCommand {
    pub light: LightDescriptor,
    pub color: Color,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CONFIG_ID: &str = "1a8d99cc-967b-44f2-9202-43f976c0fa6b";

    #[test]
    fn empty_configuration_is_rejected() {
        let config = EntertainmentConfiguration::new(CONFIG_ID, "empty", Vec::new());
        let err = config.validate(ProtocolVersion::V2).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfiguration { .. }));
    }

    #[test]
    fn v2_rejects_wide_channel_ids() {
        let config = EntertainmentConfiguration::with_channels(CONFIG_ID, "wide", [0, 300]);
        assert!(config.validate(ProtocolVersion::V2).is_err());
        assert!(config.validate(ProtocolVersion::V1).is_ok());
    }

    #[test]
    fn v2_requires_uuid_session_id() {
        let config = EntertainmentConfiguration::with_channels("living-room", "tv", [0, 1]);
        assert!(config.validate(ProtocolVersion::V2).is_err());
        assert!(config.validate(ProtocolVersion::V1).is_ok());
    }

    #[test]
    fn duplicate_lights_are_rejected() {
        let config = EntertainmentConfiguration::with_channels(CONFIG_ID, "dup", [3, 3]);
        assert!(config.validate(ProtocolVersion::V2).is_err());
    }

    #[test]
    fn too_many_lights_for_protocol() {
        let config = EntertainmentConfiguration::with_channels(CONFIG_ID, "big", 0..11);
        assert!(config.validate(ProtocolVersion::V1).is_err());
        assert!(config.validate(ProtocolVersion::V2).is_ok());
    }
}
