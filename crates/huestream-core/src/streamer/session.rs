// ── Per-session tick planning ──
//
// Everything the loop remembers between ticks: the sequence counter, the
// last frame sent, and the keep-alive deadline. Kept free of I/O so the
// decisions can be tested without a clock or a socket.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::color::ColorSpace;
use crate::config::{KeepAlivePolicy, StreamOptions};
use crate::frame::{self, ProtocolVersion};
use crate::model::{Color, EntertainmentConfiguration, LightCommand};
use crate::table::Snapshot;

/// What a tick should put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TickAction {
    /// New state: a freshly encoded frame.
    Send(Bytes),
    /// Nothing new for a full keep-alive interval.
    KeepAlive(Bytes),
    Idle,
}

#[derive(Debug)]
pub(crate) struct Session {
    protocol: ProtocolVersion,
    session_id: String,
    /// Every configured light at black, for keep-alives before any write.
    blackout: Snapshot,
    keep_alive: KeepAlivePolicy,
    keep_alive_interval: Duration,
    sequence: u8,
    last_frame: Option<Bytes>,
    keep_alive_deadline: Instant,
}

impl Session {
    pub(crate) fn new(
        configuration: &EntertainmentConfiguration,
        options: &StreamOptions,
        now: Instant,
    ) -> Self {
        let blackout = configuration
            .lights
            .iter()
            .map(|&light| {
                (
                    light.id,
                    LightCommand {
                        light,
                        color: Color::BLACK,
                    },
                )
            })
            .collect();
        Self {
            protocol: options.protocol,
            session_id: configuration.id.clone(),
            blackout,
            keep_alive: options.keep_alive,
            keep_alive_interval: options.keep_alive_interval,
            sequence: 0,
            last_frame: None,
            keep_alive_deadline: now + options.keep_alive_interval,
        }
    }

    pub(crate) fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Decide this tick's frame. `changed` is the table snapshot when
    /// anything was written since the previous tick.
    pub(crate) fn plan(
        &mut self,
        changed: Option<Snapshot>,
        color_space: ColorSpace,
        now: Instant,
    ) -> TickAction {
        if let Some(snapshot) = changed {
            self.sequence = self.sequence.wrapping_add(1);
            let frame = frame::encode_frame(
                self.protocol,
                &self.session_id,
                self.sequence,
                color_space,
                &snapshot,
            );
            return TickAction::Send(self.retain(frame, now));
        }

        if now < self.keep_alive_deadline {
            return TickAction::Idle;
        }

        let frame = match (self.last_frame.take(), self.keep_alive) {
            (Some(last), KeepAlivePolicy::Verbatim) => last,
            (Some(last), KeepAlivePolicy::Resequence) => {
                self.sequence = self.sequence.wrapping_add(1);
                frame::with_sequence(&last, self.sequence)
            }
            // Nothing sent yet: hold every configured light at black.
            (None, _) => frame::encode_frame(
                self.protocol,
                &self.session_id,
                self.sequence,
                color_space,
                &self.blackout,
            ),
        };
        TickAction::KeepAlive(self.retain(frame, now))
    }

    fn retain(&mut self, frame: Bytes, now: Instant) -> Bytes {
        self.last_frame = Some(frame.clone());
        self.keep_alive_deadline = now + self.keep_alive_interval;
        frame
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::frame::{SEQUENCE_OFFSET, decode_header};
    use crate::model::{LightDescriptor, LightId};

    const CONFIG_ID: &str = "1a8d99cc-967b-44f2-9202-43f976c0fa6b";

    fn configuration() -> EntertainmentConfiguration {
        EntertainmentConfiguration::with_channels(CONFIG_ID, "TV area", [0, 1])
    }

    fn one_light(color: Color) -> Snapshot {
        let light = LightDescriptor::light(0u16);
        Snapshot::from([(LightId(0), LightCommand { light, color })])
    }

    fn sent(action: TickAction) -> Bytes {
        match action {
            TickAction::Send(frame) | TickAction::KeepAlive(frame) => frame,
            TickAction::Idle => panic!("expected a frame"),
        }
    }

    #[test]
    fn first_frame_has_sequence_one() {
        let now = Instant::now();
        let mut session = Session::new(&configuration(), &StreamOptions::default(), now);
        let frame = sent(session.plan(Some(one_light(Color::BLACK)), ColorSpace::Rgb, now));
        assert_eq!(frame[SEQUENCE_OFFSET], 1);
    }

    #[test]
    fn unchanged_table_is_idle_until_deadline() {
        let now = Instant::now();
        let options = StreamOptions::default();
        let mut session = Session::new(&configuration(), &options, now);
        let first = sent(session.plan(Some(one_light(Color::BLACK)), ColorSpace::Rgb, now));

        let almost = now + options.keep_alive_interval - Duration::from_millis(1);
        assert_eq!(session.plan(None, ColorSpace::Rgb, almost), TickAction::Idle);

        let due = now + options.keep_alive_interval;
        assert_eq!(session.plan(None, ColorSpace::Rgb, due), TickAction::KeepAlive(first));
        // Deadline moved forward with the resend.
        assert_eq!(session.plan(None, ColorSpace::Rgb, due), TickAction::Idle);
    }

    #[test]
    fn resequence_policy_advances_by_one() {
        let now = Instant::now();
        let options = StreamOptions {
            keep_alive: KeepAlivePolicy::Resequence,
            ..StreamOptions::default()
        };
        let mut session = Session::new(&configuration(), &options, now);
        let first = sent(session.plan(Some(one_light(Color::BLACK)), ColorSpace::Rgb, now));
        let again = sent(session.plan(None, ColorSpace::Rgb, now + options.keep_alive_interval));

        assert_eq!(decode_header(&again).unwrap().sequence, 2);
        assert_eq!(&first[..SEQUENCE_OFFSET], &again[..SEQUENCE_OFFSET]);
        assert_eq!(&first[SEQUENCE_OFFSET + 1..], &again[SEQUENCE_OFFSET + 1..]);
        assert_eq!(session.sequence(), 2);
    }

    #[test]
    fn keep_alive_before_any_frame_sends_blackout() {
        let now = Instant::now();
        let options = StreamOptions::default();
        let mut session = Session::new(&configuration(), &options, now);

        let frame = sent(session.plan(None, ColorSpace::Rgb, now + options.keep_alive_interval));
        assert_eq!(frame.len(), ProtocolVersion::V2.frame_len(2));
        assert_eq!(decode_header(&frame).unwrap().color_space, ColorSpace::Rgb);
        assert_eq!(session.sequence(), 0);

        let blocks = &frame[ProtocolVersion::V2.frame_len(0)..];
        for (channel, block) in blocks.chunks(ProtocolVersion::V2.block_len()).enumerate() {
            assert_eq!(usize::from(block[0]), channel);
            assert!(block[1..].iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn blackout_follows_protocol_and_color_space() {
        let now = Instant::now();
        let options = StreamOptions {
            protocol: ProtocolVersion::V1,
            ..StreamOptions::default()
        };
        let mut session = Session::new(&configuration(), &options, now);

        let frame = sent(session.plan(None, ColorSpace::Xy, now + options.keep_alive_interval));
        assert_eq!(frame.len(), ProtocolVersion::V1.frame_len(2));
        assert_eq!(decode_header(&frame).unwrap().color_space, ColorSpace::Xy);
    }

    #[test]
    fn sequence_wraps() {
        let now = Instant::now();
        let mut session = Session::new(&configuration(), &StreamOptions::default(), now);
        for _ in 0..255 {
            session.plan(Some(one_light(Color::BLACK)), ColorSpace::Rgb, now);
        }
        assert_eq!(session.sequence(), 255);
        let frame = sent(session.plan(Some(one_light(Color::BLACK)), ColorSpace::Rgb, now));
        assert_eq!(frame[SEQUENCE_OFFSET], 0);
    }
}
