// ── Runtime streaming configuration ──
//
// These types describe *how* to reach a bridge and pace a session. They
// carry credential data and timing, but never touch disk. The CLI builds a
// `BridgeIdentity` and `StreamOptions` and hands them to the `Streamer`.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use huestream_api::STREAMING_PORT;
use secrecy::{ExposeSecret, SecretSlice, SecretString};
use serde::{Deserialize, Serialize};

use crate::color::ColorSpace;
use crate::error::CoreError;
use crate::frame::ProtocolVersion;

/// Address and pre-shared credentials of a paired bridge.
///
/// Immutable once built; the streamer holds it behind an `Arc`.
#[derive(Debug)]
pub struct BridgeIdentity {
    /// Streaming endpoint (UDP port 2100).
    pub address: SocketAddr,
    /// PSK identity: the application id the bridge issued at pairing.
    pub application_id: String,
    client_key: SecretSlice<u8>,
    /// Bridge firmware version, when known.
    pub software_version: Option<String>,
}

impl BridgeIdentity {
    pub fn new(ip: IpAddr, application_id: impl Into<String>, client_key: SecretSlice<u8>) -> Self {
        Self {
            address: SocketAddr::new(ip, STREAMING_PORT),
            application_id: application_id.into(),
            client_key,
            software_version: None,
        }
    }

    /// Build from the hex-encoded client key returned by pairing.
    pub fn from_hex_key(
        ip: IpAddr,
        application_id: impl Into<String>,
        client_key: &SecretString,
    ) -> Result<Self, CoreError> {
        let key = hex::decode(client_key.expose_secret().trim()).map_err(|e| CoreError::Config {
            message: format!("client key is not valid hex: {e}"),
        })?;
        if key.is_empty() {
            return Err(CoreError::Config {
                message: "client key is empty".into(),
            });
        }
        Ok(Self::new(ip, application_id, SecretSlice::from(key)))
    }

    /// Override the streaming port (test bridges, port forwarding).
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.address.set_port(port);
        self
    }

    #[must_use]
    pub fn with_software_version(mut self, version: impl Into<String>) -> Self {
        self.software_version = Some(version.into());
        self
    }

    pub fn client_key(&self) -> &SecretSlice<u8> {
        &self.client_key
    }
}

/// What a keep-alive resend carries.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum KeepAlivePolicy {
    /// Resend the last frame byte-for-byte.
    #[default]
    Verbatim,
    /// Resend the last frame with a freshly advanced sequence number.
    Resequence,
}

/// Timing and wire options for a streaming session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    /// Period of the streaming loop. Bridges drop input above ~60 Hz.
    pub tick_interval: Duration,
    /// Idle time after which the last frame is resent. The bridge closes
    /// an entertainment session after 10 s without traffic.
    pub keep_alive_interval: Duration,
    pub keep_alive: KeepAlivePolicy,
    /// Upper bound on a single datagram send.
    pub send_timeout: Duration,
    /// Upper bound on the secure handshake.
    pub connect_timeout: Duration,
    pub protocol: ProtocolVersion,
    /// Color space the session starts in.
    pub color_space: ColorSpace,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(20),
            keep_alive_interval: Duration::from_millis(9_500),
            keep_alive: KeepAlivePolicy::default(),
            send_timeout: Duration::from_millis(250),
            connect_timeout: Duration::from_secs(5),
            protocol: ProtocolVersion::default(),
            color_space: ColorSpace::default(),
        }
    }
}

impl StreamOptions {
    /// Reject timings the loop cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        let zero = |name: &str| CoreError::Config {
            message: format!("{name} must be greater than zero"),
        };
        if self.tick_interval.is_zero() {
            return Err(zero("tick interval"));
        }
        if self.keep_alive_interval.is_zero() {
            return Err(zero("keep-alive interval"));
        }
        if self.send_timeout.is_zero() {
            return Err(zero("send timeout"));
        }
        if self.connect_timeout.is_zero() {
            return Err(zero("connect timeout"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn hex_key_is_decoded() {
        let key = SecretString::from("00112233445566778899aabbccddeeff".to_owned());
        let identity =
            BridgeIdentity::from_hex_key(Ipv4Addr::new(192, 168, 1, 20).into(), "app", &key)
                .unwrap();

        assert_eq!(identity.address.port(), STREAMING_PORT);
        assert_eq!(identity.client_key().expose_secret().len(), 16);
        assert_eq!(identity.client_key().expose_secret()[15], 0xFF);
    }

    #[test]
    fn bad_hex_key_is_a_config_error() {
        let key = SecretString::from("not-hex".to_owned());
        let err = BridgeIdentity::from_hex_key(Ipv4Addr::LOCALHOST.into(), "app", &key).unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
    }

    #[test]
    fn debug_output_redacts_key() {
        let key = SecretString::from("deadbeef".to_owned());
        let identity = BridgeIdentity::from_hex_key(Ipv4Addr::LOCALHOST.into(), "app", &key).unwrap();
        let rendered = format!("{identity:?}");
        assert!(rendered.contains("REDACTED"), "{rendered}");
    }

    #[test]
    fn zero_tick_is_rejected() {
        let options = StreamOptions {
            tick_interval: Duration::ZERO,
            ..StreamOptions::default()
        };
        assert!(options.validate().is_err());
        assert!(StreamOptions::default().validate().is_ok());
    }
}
