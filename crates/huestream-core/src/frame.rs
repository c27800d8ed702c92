//! Entertainment frame encoder.
//!
//! A frame is one UDP datagram: a 16-byte header followed (in v2) by the
//! 36-character configuration id and then one block per light, in
//! ascending light-id order.
//!
//! ```text
//! "HueStream" | major | minor | seq | 00 00 | color space | 00
//! v2: config id (36 ASCII) | [channel u8 | c0 u16 | c1 u16 | c2 u16]*
//! v1:                        [type u8 | id u16 | c0 u16 | c1 u16 | c2 u16]*
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::color::{self, ColorSpace};
use crate::table::Snapshot;

pub const PROTOCOL_NAME: &[u8; 9] = b"HueStream";
pub const HEADER_LEN: usize = 16;
pub const SESSION_ID_LEN: usize = 36;
/// Byte offset of the sequence counter inside the header.
pub const SEQUENCE_OFFSET: usize = 11;
const COLOR_SPACE_OFFSET: usize = 14;

/// Wire protocol generation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProtocolVersion {
    /// Legacy bridge API: light ids on the wire, no session id.
    V1,
    /// CLIP v2: channel ids plus the configuration id in every frame.
    #[default]
    V2,
}

impl ProtocolVersion {
    pub const fn wire_version(self) -> (u8, u8) {
        match self {
            Self::V1 => (0x01, 0x00),
            Self::V2 => (0x02, 0x00),
        }
    }

    pub const fn block_len(self) -> usize {
        match self {
            Self::V1 => 9,
            Self::V2 => 7,
        }
    }

    pub const fn max_lights(self) -> usize {
        match self {
            Self::V1 => 10,
            Self::V2 => 20,
        }
    }

    pub const fn max_light_id(self) -> u16 {
        match self {
            Self::V1 => u16::MAX,
            Self::V2 => 0xFF,
        }
    }

    /// Total datagram length for `lights` blocks.
    pub const fn frame_len(self, lights: usize) -> usize {
        let prefix = match self {
            Self::V1 => HEADER_LEN,
            Self::V2 => HEADER_LEN + SESSION_ID_LEN,
        };
        prefix + lights * self.block_len()
    }
}

/// Encode one frame from a table snapshot.
///
/// The configuration was validated at session start, so ids fit their
/// wire width and the session id is exactly 36 ASCII bytes.
pub fn encode_frame(
    protocol: ProtocolVersion,
    session_id: &str,
    sequence: u8,
    color_space: ColorSpace,
    lights: &Snapshot,
) -> Bytes {
    let mut buf = BytesMut::with_capacity(protocol.frame_len(lights.len()));

    let (major, minor) = protocol.wire_version();
    buf.put_slice(PROTOCOL_NAME);
    buf.put_u8(major);
    buf.put_u8(minor);
    buf.put_u8(sequence);
    buf.put_bytes(0x00, 2);
    buf.put_u8(color_space.wire_tag());
    buf.put_u8(0x00);

    if protocol == ProtocolVersion::V2 {
        let id = session_id.as_bytes();
        let len = id.len().min(SESSION_ID_LEN);
        buf.put_slice(&id[..len]);
        buf.put_bytes(0x00, SESSION_ID_LEN - len);
    }

    // BTreeMap iteration is ascending by light id.
    for (id, command) in lights {
        match protocol {
            ProtocolVersion::V1 => {
                buf.put_u8(command.light.device_type.wire_tag());
                buf.put_u16(id.0);
            }
            ProtocolVersion::V2 => {
                let [_, channel] = id.0.to_be_bytes();
                buf.put_u8(channel);
            }
        }
        for value in color::encode(&command.color, color_space) {
            buf.put_u16(value);
        }
    }

    buf.freeze()
}

/// Copy of `frame` with only the sequence byte replaced.
pub fn with_sequence(frame: &Bytes, sequence: u8) -> Bytes {
    let mut buf = BytesMut::from(&frame[..]);
    if let Some(slot) = buf.get_mut(SEQUENCE_OFFSET) {
        *slot = sequence;
    }
    buf.freeze()
}

/// Header fields read back from an encoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub protocol: ProtocolVersion,
    pub sequence: u8,
    pub color_space: ColorSpace,
}

/// Parse the fixed header. Returns `None` for anything that is not a
/// well-formed frame header.
pub fn decode_header(frame: &[u8]) -> Option<FrameHeader> {
    let header = frame.get(..HEADER_LEN)?;
    if &header[..PROTOCOL_NAME.len()] != PROTOCOL_NAME {
        return None;
    }
    let protocol = match (header[9], header[10]) {
        (0x01, 0x00) => ProtocolVersion::V1,
        (0x02, 0x00) => ProtocolVersion::V2,
        _ => return None,
    };
    Some(FrameHeader {
        protocol,
        sequence: header[SEQUENCE_OFFSET],
        color_space: ColorSpace::from_wire_tag(header[COLOR_SPACE_OFFSET])?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{Color, DeviceType, LightCommand, LightDescriptor, LightId};

    const CONFIG_ID: &str = "1a8d99cc-967b-44f2-9202-43f976c0fa6b";

    fn snapshot(entries: &[(u16, DeviceType, Color)]) -> Snapshot {
        entries
            .iter()
            .map(|&(id, device_type, color)| {
                let light = LightDescriptor {
                    id: LightId(id),
                    device_type,
                };
                (light.id, LightCommand { light, color })
            })
            .collect()
    }

    #[test]
    fn v2_frame_layout() {
        let lights = snapshot(&[
            (1, DeviceType::Light, Color::rgb(0, 0xFF, 0)),
            (0, DeviceType::Light, Color::rgb(0xFF, 0, 0)),
        ]);
        let frame = encode_frame(ProtocolVersion::V2, CONFIG_ID, 1, ColorSpace::Rgb, &lights);

        assert_eq!(frame.len(), 16 + 36 + 2 * 7);
        assert_eq!(
            &frame[..16],
            &[
                b'H', b'u', b'e', b'S', b't', b'r', b'e', b'a', b'm', 0x02, 0x00, 0x01, 0x00,
                0x00, 0x00, 0x00
            ]
        );
        assert_eq!(&frame[16..52], CONFIG_ID.as_bytes());
        // Ascending channel order regardless of insertion order.
        assert_eq!(&frame[52..59], &[0x00, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(&frame[59..66], &[0x01, 0x00, 0x00, 0xFF, 0xFF, 0x00, 0x00]);
    }

    #[test]
    fn v1_frame_layout() {
        let lights = snapshot(&[(0x0102, DeviceType::Area, Color::xy(1.0, 0.0, 1.0))]);
        let frame = encode_frame(ProtocolVersion::V1, "", 9, ColorSpace::Xy, &lights);

        assert_eq!(frame.len(), 16 + 9);
        assert_eq!(frame[9], 0x01);
        assert_eq!(frame[11], 9);
        assert_eq!(frame[14], 0x01);
        assert_eq!(
            &frame[16..],
            &[0x01, 0x01, 0x02, 0xFF, 0xFF, 0x00, 0x00, 0xFF, 0xFF]
        );
    }

    #[test]
    fn encode_frame_is_deterministic() {
        let entries = [
            (0, DeviceType::Light, Color::rgb(10, 20, 30)),
            (4, DeviceType::Light, Color::xy(0.31, 0.33, 0.8)),
            (9, DeviceType::Area, Color::rgb(255, 0, 128)),
        ];
        let mut reversed = entries;
        reversed.reverse();

        for protocol in [ProtocolVersion::V1, ProtocolVersion::V2] {
            for color_space in [ColorSpace::Rgb, ColorSpace::Xy] {
                let forward = snapshot(&entries);
                let first = encode_frame(protocol, CONFIG_ID, 5, color_space, &forward);
                let second = encode_frame(protocol, CONFIG_ID, 5, color_space, &forward);
                assert_eq!(first, second);

                let backward = snapshot(&reversed);
                let reordered = encode_frame(protocol, CONFIG_ID, 5, color_space, &backward);
                assert_eq!(first, reordered);
            }
        }
    }

    #[test]
    fn empty_snapshot_is_header_only() {
        let frame = encode_frame(
            ProtocolVersion::V2,
            CONFIG_ID,
            0,
            ColorSpace::Rgb,
            &Snapshot::new(),
        );
        assert_eq!(frame.len(), ProtocolVersion::V2.frame_len(0));
    }

    #[test]
    fn resequence_touches_one_byte() {
        let lights = snapshot(&[(3, DeviceType::Light, Color::rgb(1, 2, 3))]);
        let frame = encode_frame(ProtocolVersion::V2, CONFIG_ID, 7, ColorSpace::Rgb, &lights);
        let patched = with_sequence(&frame, 8);

        let diff: Vec<usize> = (0..frame.len()).filter(|&i| frame[i] != patched[i]).collect();
        assert_eq!(diff, vec![SEQUENCE_OFFSET]);
        assert_eq!(decode_header(&patched).unwrap().sequence, 8);
    }

    #[test]
    fn decode_header_round_trips_fields() {
        let frame = encode_frame(ProtocolVersion::V2, CONFIG_ID, 42, ColorSpace::Xy, &Snapshot::new());
        assert_eq!(
            decode_header(&frame),
            Some(FrameHeader {
                protocol: ProtocolVersion::V2,
                sequence: 42,
                color_space: ColorSpace::Xy,
            })
        );
        assert_eq!(decode_header(b"HueStrea"), None);
        assert_eq!(decode_header(b"NotStream\x02\x00\x00\x00\x00\x00\x00"), None);
    }
}
