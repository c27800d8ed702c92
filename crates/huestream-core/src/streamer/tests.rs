#![allow(clippy::unwrap_used)]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use secrecy::{SecretSlice, SecretString};

use huestream_api::{Error as ApiError, SecureSession, SecureTransport};

use super::*;
use crate::config::KeepAlivePolicy;
use crate::frame::{ProtocolVersion, SEQUENCE_OFFSET, decode_header};

const CONFIG_ID: &str = "1a8d99cc-967b-44f2-9202-43f976c0fa6b";

// ── Recording transport ─────────────────────────────────────────────

#[derive(Debug, Default)]
struct Recorded {
    frames: Vec<Vec<u8>>,
    establish_calls: usize,
    closed: usize,
    fail_establish: bool,
    hang_establish: bool,
    fail_sends: bool,
    send_delay: Duration,
}

#[derive(Debug, Clone, Default)]
struct RecordingTransport {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingTransport {
    fn with(configure: impl FnOnce(&mut Recorded)) -> Self {
        let transport = Self::default();
        configure(&mut transport.recorded.lock().unwrap());
        transport
    }

    fn frames(&self) -> Vec<Vec<u8>> {
        self.recorded.lock().unwrap().frames.clone()
    }

    fn establish_calls(&self) -> usize {
        self.recorded.lock().unwrap().establish_calls
    }

    fn closed(&self) -> usize {
        self.recorded.lock().unwrap().closed
    }

    fn update(&self, configure: impl FnOnce(&mut Recorded)) {
        configure(&mut self.recorded.lock().unwrap());
    }
}

#[async_trait]
impl SecureTransport for RecordingTransport {
    async fn establish(
        &self,
        _identity: &str,
        _key: &SecretSlice<u8>,
        _address: SocketAddr,
    ) -> Result<Box<dyn SecureSession>, ApiError> {
        let hang = {
            let mut recorded = self.recorded.lock().unwrap();
            recorded.establish_calls += 1;
            if recorded.fail_establish {
                return Err(ApiError::HandshakeFailed("psk rejected".into()));
            }
            recorded.hang_establish
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(Box::new(RecordingSession {
            recorded: Arc::clone(&self.recorded),
        }))
    }
}

struct RecordingSession {
    recorded: Arc<Mutex<Recorded>>,
}

#[async_trait]
impl SecureSession for RecordingSession {
    async fn send(&mut self, datagram: &[u8]) -> Result<(), ApiError> {
        let (delay, fail) = {
            let recorded = self.recorded.lock().unwrap();
            (recorded.send_delay, recorded.fail_sends)
        };
        if fail {
            return Err(ApiError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "bridge went away",
            )));
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.recorded.lock().unwrap().frames.push(datagram.to_vec());
        Ok(())
    }

    async fn close(&mut self) {
        self.recorded.lock().unwrap().closed += 1;
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn identity() -> Arc<BridgeIdentity> {
    let key = SecretString::from("00112233445566778899aabbccddeeff".to_owned());
    Arc::new(BridgeIdentity::from_hex_key(Ipv4Addr::LOCALHOST.into(), "app-id", &key).unwrap())
}

fn streamer_with(
    transport: &RecordingTransport,
    channels: impl IntoIterator<Item = u16>,
    options: StreamOptions,
) -> Streamer {
    let configuration = Arc::new(EntertainmentConfiguration::with_channels(
        CONFIG_ID, "TV area", channels,
    ));
    Streamer::new(identity(), configuration, Arc::new(transport.clone()), options)
}

fn streamer(transport: &RecordingTransport) -> Streamer {
    streamer_with(transport, [0, 1], StreamOptions::default())
}

async fn wait_for_fault(streamer: &Streamer) {
    let mut rx = streamer.subscribe_state();
    rx.wait_for(|s| matches!(s, StreamState::Faulted { .. }))
        .await
        .unwrap();
}

// ── Frames on the wire ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn two_lights_one_tick_one_frame() {
    let transport = RecordingTransport::default();
    let streamer = streamer(&transport);

    streamer.start().await.unwrap();
    streamer.submit(0u16, Color::rgb(0xFF, 0, 0)).unwrap();
    streamer.submit(1u16, Color::rgb(0, 0xFF, 0)).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let frames = transport.frames();
    assert_eq!(frames.len(), 1);
    let frame = &frames[0];
    assert_eq!(frame.len(), 66);
    assert_eq!(&frame[..9], b"HueStream");
    assert_eq!(frame[SEQUENCE_OFFSET], 1);
    assert_eq!(&frame[16..52], CONFIG_ID.as_bytes());
    assert_eq!(&frame[52..59], &[0x00, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00]);
    assert_eq!(&frame[59..66], &[0x01, 0x00, 0x00, 0xFF, 0xFF, 0x00, 0x00]);

    streamer.stop().await;
}

#[tokio::test(start_paused = true)]
async fn submits_before_start_go_out_on_first_tick() {
    let transport = RecordingTransport::default();
    let streamer = streamer(&transport);

    streamer.submit(1u16, Color::rgb(1, 2, 3)).unwrap();
    assert_eq!(streamer.pending(), 1);

    streamer.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert_eq!(transport.frames().len(), 1);
    streamer.stop().await;
}

#[tokio::test(start_paused = true)]
async fn latest_submit_wins_within_a_tick() {
    let transport = RecordingTransport::default();
    let streamer = streamer(&transport);
    streamer.start().await.unwrap();

    for level in 0..=10u8 {
        streamer.submit(0u16, Color::rgb(level, 0, 0)).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(5)).await;

    let frames = transport.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(&frames[0][52..55], &[0x00, 0x0A, 0x0A]);
    streamer.stop().await;
}

#[tokio::test(start_paused = true)]
async fn no_changes_no_frames_until_keep_alive() {
    let transport = RecordingTransport::default();
    let streamer = streamer(&transport);
    streamer.start().await.unwrap();
    streamer.submit(0u16, Color::rgb(9, 9, 9)).unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.frames().len(), 1);

    // First frame went out at ~0 s; the resend is due at 9.5 s.
    tokio::time::sleep(Duration::from_millis(4_600)).await;
    let frames = transport.frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1], frames[0]);

    streamer.stop().await;
}

#[tokio::test(start_paused = true)]
async fn resequence_keep_alive_changes_only_sequence() {
    let transport = RecordingTransport::default();
    let options = StreamOptions {
        keep_alive: KeepAlivePolicy::Resequence,
        ..StreamOptions::default()
    };
    let streamer = streamer_with(&transport, [0, 1], options);
    streamer.start().await.unwrap();
    streamer.submit(0u16, Color::rgb(9, 9, 9)).unwrap();

    tokio::time::sleep(Duration::from_millis(9_600)).await;
    let frames = transport.frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1][SEQUENCE_OFFSET], 2);
    assert_eq!(&frames[0][..SEQUENCE_OFFSET], &frames[1][..SEQUENCE_OFFSET]);
    assert_eq!(&frames[0][SEQUENCE_OFFSET + 1..], &frames[1][SEQUENCE_OFFSET + 1..]);

    streamer.stop().await;
}

#[tokio::test(start_paused = true)]
async fn idle_session_still_gets_keep_alive() {
    let transport = RecordingTransport::default();
    let streamer = streamer(&transport);
    streamer.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(9_600)).await;
    let frames = transport.frames();
    assert_eq!(frames.len(), 1);
    // Both configured channels, held at black.
    assert_eq!(frames[0].len(), ProtocolVersion::V2.frame_len(2));
    assert!(frames[0][ProtocolVersion::V2.frame_len(0)..]
        .chunks(ProtocolVersion::V2.block_len())
        .all(|block| block[1..].iter().all(|&b| b == 0)));

    streamer.stop().await;
}

#[tokio::test(start_paused = true)]
async fn color_space_switch_reencodes_and_keeps_sequence() {
    let transport = RecordingTransport::default();
    let streamer = streamer(&transport);
    streamer.start().await.unwrap();
    streamer.submit(0u16, Color::rgb(0xFF, 0xFF, 0xFF)).unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    streamer.set_color_space(ColorSpace::Xy).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let frames = transport.frames();
    assert_eq!(frames.len(), 2);
    let header = decode_header(&frames[1]).unwrap();
    assert_eq!(header.color_space, ColorSpace::Xy);
    assert_eq!(header.sequence, 2);
    assert_eq!(streamer.color_space(), ColorSpace::Xy);

    streamer.stop().await;
}

#[tokio::test(start_paused = true)]
async fn v1_frames_carry_no_session_id() {
    let transport = RecordingTransport::default();
    let options = StreamOptions {
        protocol: ProtocolVersion::V1,
        ..StreamOptions::default()
    };
    let streamer = streamer_with(&transport, [0x0102], options);
    streamer.start().await.unwrap();
    streamer.submit(0x0102u16, Color::rgb(0, 0, 0xFF)).unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let frames = transport.frames();
    assert_eq!(frames[0].len(), 16 + 9);
    assert_eq!(&frames[0][16..19], &[0x00, 0x01, 0x02]);
    streamer.stop().await;
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn unknown_light_is_rejected_and_table_untouched() {
    let transport = RecordingTransport::default();
    let streamer = streamer(&transport);

    let err = streamer.submit(42u16, Color::BLACK).unwrap_err();
    assert!(matches!(err, CoreError::InvalidTarget { .. }));
    assert_eq!(streamer.pending(), 0);
    assert_eq!(streamer.state(), StreamState::Idle);
}

#[tokio::test(start_paused = true)]
async fn empty_configuration_fails_before_transport() {
    let transport = RecordingTransport::default();
    let streamer = streamer_with(&transport, Vec::new(), StreamOptions::default());

    let err = streamer.start().await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidConfiguration { .. }));
    assert_eq!(transport.establish_calls(), 0);
    assert_eq!(streamer.state(), StreamState::Idle);
}

#[tokio::test(start_paused = true)]
async fn start_twice_is_invalid() {
    let transport = RecordingTransport::default();
    let streamer = streamer(&transport);
    streamer.start().await.unwrap();

    let err = streamer.start().await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidState { operation: "start", .. }));
    assert_eq!(transport.establish_calls(), 1);
    streamer.stop().await;
}

#[tokio::test(start_paused = true)]
async fn handshake_failure_faults_until_stopped() {
    let transport = RecordingTransport::with(|r| r.fail_establish = true);
    let streamer = streamer(&transport);

    let err = streamer.start().await.unwrap_err();
    assert!(matches!(err, CoreError::ConnectionFailed { .. }));
    assert!(matches!(streamer.state(), StreamState::Faulted { .. }));

    let err = streamer.start().await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidState { .. }));

    streamer.stop().await;
    assert_eq!(streamer.state(), StreamState::Idle);

    transport.update(|r| r.fail_establish = false);
    streamer.start().await.unwrap();
    assert_eq!(streamer.state(), StreamState::Streaming);
    streamer.stop().await;
}

#[tokio::test(start_paused = true)]
async fn handshake_timeout_is_bounded() {
    let transport = RecordingTransport::with(|r| r.hang_establish = true);
    let streamer = streamer(&transport);

    let err = streamer.start().await.unwrap_err();
    match err {
        CoreError::ConnectionFailed { reason, .. } => assert!(reason.contains("timed out")),
        other => panic!("expected ConnectionFailed, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn send_failure_faults_and_closes_session() {
    let transport = RecordingTransport::with(|r| r.fail_sends = true);
    let streamer = streamer(&transport);
    streamer.start().await.unwrap();
    streamer.submit(0u16, Color::BLACK).unwrap();

    wait_for_fault(&streamer).await;
    assert_eq!(transport.closed(), 1);
    assert!(transport.frames().is_empty());

    let err = streamer.set_color_space(ColorSpace::Xy).unwrap_err();
    assert!(matches!(err, CoreError::InvalidState { .. }));

    streamer.stop().await;
    assert_eq!(streamer.state(), StreamState::Idle);
    assert_eq!(transport.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_waits_for_in_flight_send() {
    let transport = RecordingTransport::with(|r| r.send_delay = Duration::from_millis(50));
    let streamer = streamer(&transport);
    streamer.start().await.unwrap();
    streamer.submit(0u16, Color::rgb(1, 1, 1)).unwrap();
    streamer.submit(1u16, Color::rgb(2, 2, 2)).unwrap();

    // The first tick is now parked inside the delayed send.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(transport.frames().is_empty());

    streamer.stop().await;
    let frames = transport.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].len(), ProtocolVersion::V2.frame_len(2));
    assert_eq!(transport.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_clears_table_and_is_idempotent() {
    let transport = RecordingTransport::default();
    let streamer = streamer(&transport);
    streamer.start().await.unwrap();
    streamer.submit(0u16, Color::BLACK).unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    streamer.stop().await;
    assert_eq!(streamer.state(), StreamState::Idle);
    assert_eq!(streamer.pending(), 0);
    assert_eq!(transport.closed(), 1);

    streamer.stop().await;
    assert_eq!(transport.closed(), 1);

    // No frames after stop.
    let sent = transport.frames().len();
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(transport.frames().len(), sent);
}

#[tokio::test(start_paused = true)]
async fn restart_resets_sequence() {
    let transport = RecordingTransport::default();
    let streamer = streamer(&transport);

    for _ in 0..2 {
        streamer.start().await.unwrap();
        streamer.submit(0u16, Color::BLACK).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        streamer.stop().await;
    }

    let frames = transport.frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0][SEQUENCE_OFFSET], 1);
    assert_eq!(frames[1][SEQUENCE_OFFSET], 1);
}

#[tokio::test(start_paused = true)]
async fn state_transitions_are_observable() {
    let transport = RecordingTransport::default();
    let streamer = streamer(&transport);
    let mut rx = streamer.subscribe_state();
    assert_eq!(*rx.borrow_and_update(), StreamState::Idle);

    streamer.start().await.unwrap();
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), StreamState::Streaming);

    streamer.stop().await;
    assert_eq!(*rx.borrow_and_update(), StreamState::Idle);
}

#[tokio::test(start_paused = true)]
async fn concurrent_submitters_share_the_table() {
    let transport = RecordingTransport::default();
    let streamer = streamer_with(&transport, 0..4, StreamOptions::default());
    streamer.start().await.unwrap();

    let writers: Vec<_> = (0..4u16)
        .map(|id| {
            let streamer = streamer.clone();
            std::thread::spawn(move || {
                for level in 0..=200u8 {
                    streamer.submit(id, Color::rgb(level, level, level)).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    let frames = transport.frames();
    let last = frames.last().unwrap();
    assert_eq!(last.len(), ProtocolVersion::V2.frame_len(4));
    for block in last[52..].chunks(7) {
        assert_eq!(&block[1..3], &[200, 200]);
    }

    streamer.stop().await;
}
