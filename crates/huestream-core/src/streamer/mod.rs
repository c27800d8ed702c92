// ── Streamer ──
//
// Session lifecycle for one entertainment configuration. `start` opens the
// secure session and spawns the fixed-rate streaming loop; callers submit
// colors at any time from any thread; `stop` cancels the loop, waits for an
// in-flight send to finish, and closes the session.

mod session;

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, trace, warn};

use huestream_api::{SecureSession, SecureTransport};

use crate::color::ColorSpace;
use crate::config::{BridgeIdentity, StreamOptions};
use crate::error::CoreError;
use crate::model::{Color, EntertainmentConfiguration, LightId};
use crate::table::CommandTable;

use self::session::{Session, TickAction};

// ── StreamState ──────────────────────────────────────────────────

/// Session state observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Starting,
    Streaming,
    Stopping,
    /// The loop hit a transport failure and shut itself down. `stop()`
    /// returns to `Idle`.
    Faulted { reason: String },
}

impl StreamState {
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Starting => f.write_str("starting"),
            Self::Streaming => f.write_str("streaming"),
            Self::Stopping => f.write_str("stopping"),
            Self::Faulted { reason } => write!(f, "faulted ({reason})"),
        }
    }
}

// ── Streamer ─────────────────────────────────────────────────────

/// Entry point for streaming to one entertainment configuration.
///
/// Cheaply cloneable via `Arc<StreamerInner>`; every clone drives the same
/// session. The command table outlives sessions, so colors submitted while
/// idle are sent on the first tick after `start`.
#[derive(Clone)]
pub struct Streamer {
    inner: Arc<StreamerInner>,
    span: Span,
}

struct StreamerInner {
    identity: Arc<BridgeIdentity>,
    configuration: Arc<EntertainmentConfiguration>,
    options: StreamOptions,
    transport: Arc<dyn SecureTransport>,
    table: Arc<CommandTable>,
    state: Arc<watch::Sender<StreamState>>,
    color_space: watch::Sender<ColorSpace>,
    /// Serializes start/stop. Holds the running loop, if any.
    lifecycle: Mutex<Option<RunningLoop>>,
}

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Streamer {
    pub fn new(
        identity: Arc<BridgeIdentity>,
        configuration: Arc<EntertainmentConfiguration>,
        transport: Arc<dyn SecureTransport>,
        options: StreamOptions,
    ) -> Self {
        let span = info_span!("stream", config = %configuration.id);
        let table = Arc::new(CommandTable::new(&configuration));
        let (state, _) = watch::channel(StreamState::Idle);
        let (color_space, _) = watch::channel(options.color_space);

        Self {
            inner: Arc::new(StreamerInner {
                identity,
                configuration,
                options,
                transport,
                table,
                state: Arc::new(state),
                color_space,
                lifecycle: Mutex::new(None),
            }),
            span,
        }
    }

    /// Attach lifecycle and loop events to `span` instead of the default
    /// `stream` span. Applies to sessions started after the call.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    // ── Observation ──────────────────────────────────────────────

    pub fn state(&self) -> StreamState {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<StreamState> {
        self.inner.state.subscribe()
    }

    pub fn color_space(&self) -> ColorSpace {
        *self.inner.color_space.borrow()
    }

    pub fn configuration(&self) -> &EntertainmentConfiguration {
        &self.inner.configuration
    }

    pub fn identity(&self) -> &BridgeIdentity {
        &self.inner.identity
    }

    pub fn options(&self) -> &StreamOptions {
        &self.inner.options
    }

    /// Number of lights with a pending color.
    pub fn pending(&self) -> usize {
        self.inner.table.len()
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Record the latest color for a light. Never blocks on I/O.
    pub fn submit(&self, light_id: impl Into<LightId>, color: Color) -> Result<(), CoreError> {
        let light_id = light_id.into();
        self.inner.table.upsert(light_id, color).inspect_err(|_| {
            debug!(parent: &self.span, %light_id, "rejected color for unknown light");
        })
    }

    /// Switch the frame color space. Takes effect on the next tick without
    /// resetting the sequence.
    pub fn set_color_space(&self, color_space: ColorSpace) -> Result<(), CoreError> {
        let state = self.state();
        if !matches!(state, StreamState::Idle | StreamState::Streaming) {
            return Err(CoreError::InvalidState {
                operation: "change color space",
                state: state.to_string(),
            });
        }

        let switched = self.inner.color_space.send_if_modified(|current| {
            if *current == color_space {
                return false;
            }
            *current = color_space;
            true
        });
        if switched {
            self.inner.table.mark_changed();
            debug!(parent: &self.span, %color_space, "color space switched");
        }
        Ok(())
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Open the secure session and spawn the streaming loop.
    ///
    /// Only valid from `Idle`. Configuration and options are validated
    /// before the transport is touched.
    pub async fn start(&self) -> Result<(), CoreError> {
        let inner = &self.inner;
        let mut lifecycle = inner.lifecycle.lock().await;

        let state = self.state();
        if state != StreamState::Idle {
            return Err(CoreError::InvalidState {
                operation: "start",
                state: state.to_string(),
            });
        }

        inner.options.validate()?;
        inner.configuration.validate(inner.options.protocol)?;

        inner.state.send_replace(StreamState::Starting);
        let address = inner.identity.address;
        info!(
            parent: &self.span,
            %address,
            protocol = %inner.options.protocol,
            lights = inner.configuration.len(),
            "establishing streaming session"
        );

        let handshake = inner.transport.establish(
            &inner.identity.application_id,
            inner.identity.client_key(),
            address,
        );
        let link = match tokio::time::timeout(inner.options.connect_timeout, handshake).await {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => return Err(self.connect_failed(e.to_string())),
            Err(_) => {
                return Err(self.connect_failed(format!(
                    "handshake timed out after {}ms",
                    inner.options.connect_timeout.as_millis()
                )));
            }
        };

        let cancel = CancellationToken::new();
        let stream_loop = StreamLoop {
            session: Session::new(&inner.configuration, &inner.options, Instant::now()),
            link,
            table: Arc::clone(&inner.table),
            state: Arc::clone(&inner.state),
            color_space: inner.color_space.subscribe(),
            options: inner.options.clone(),
            frames_sent: 0,
        };

        // Publish before spawning so a fault in the loop is never
        // overwritten by this transition.
        inner.state.send_replace(StreamState::Streaming);
        let handle = tokio::spawn(stream_loop.run(cancel.clone()).instrument(self.span.clone()));
        *lifecycle = Some(RunningLoop { cancel, handle });

        info!(parent: &self.span, %address, "streaming started");
        Ok(())
    }

    /// Stop streaming and return to `Idle`.
    ///
    /// Waits for an in-flight send to complete, closes the session, and
    /// clears the command table. A no-op when already idle.
    pub async fn stop(&self) {
        let inner = &self.inner;
        let mut lifecycle = inner.lifecycle.lock().await;

        let Some(running) = lifecycle.take() else {
            // Idle already, or a failed start left a fault to acknowledge.
            if self.state() != StreamState::Idle {
                inner.table.clear();
                inner.state.send_replace(StreamState::Idle);
            }
            return;
        };

        inner.state.send_if_modified(|state| {
            if state.is_streaming() {
                *state = StreamState::Stopping;
                return true;
            }
            false
        });

        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            warn!(parent: &self.span, error = %e, "streaming loop ended abnormally");
        }

        inner.table.clear();
        inner.state.send_replace(StreamState::Idle);
        info!(parent: &self.span, "streaming stopped");
    }

    fn connect_failed(&self, reason: String) -> CoreError {
        let address = self.inner.identity.address;
        error!(parent: &self.span, %address, %reason, "streaming session failed to start");
        self.inner.state.send_replace(StreamState::Faulted {
            reason: reason.clone(),
        });
        CoreError::ConnectionFailed {
            address: address.to_string(),
            reason,
        }
    }
}

impl Drop for StreamerInner {
    fn drop(&mut self) {
        // The loop owns the session and closes it on cancellation.
        if let Some(running) = self.lifecycle.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

// ── Streaming loop ───────────────────────────────────────────────

struct StreamLoop {
    session: Session,
    link: Box<dyn SecureSession>,
    table: Arc<CommandTable>,
    state: Arc<watch::Sender<StreamState>>,
    color_space: watch::Receiver<ColorSpace>,
    options: StreamOptions,
    frames_sent: u64,
}

impl StreamLoop {
    async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.options.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Cancellation is only observed between ticks, so a send that has
        // started always completes.
        let outcome = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break Ok(()),
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        break Err(e);
                    }
                }
            }
        };

        self.link.close().await;

        match outcome {
            Ok(()) => debug!(frames = self.frames_sent, "streaming loop cancelled"),
            Err(e) => {
                let reason = e.to_string();
                error!(error = %reason, frames = self.frames_sent, "streaming loop faulted");
                self.state.send_if_modified(|state| {
                    if state.is_streaming() {
                        *state = StreamState::Faulted { reason };
                        return true;
                    }
                    false
                });
            }
        }
    }

    async fn tick(&mut self) -> Result<(), CoreError> {
        let changed = self.table.take_changed();
        let color_space = *self.color_space.borrow_and_update();

        match self.session.plan(changed, color_space, Instant::now()) {
            TickAction::Idle => {}
            TickAction::Send(frame) => {
                self.transmit(&frame).await?;
                trace!(sequence = self.session.sequence(), len = frame.len(), "frame sent");
            }
            TickAction::KeepAlive(frame) => {
                self.transmit(&frame).await?;
                debug!(sequence = self.session.sequence(), "keep-alive sent");
            }
        }
        Ok(())
    }

    async fn transmit(&mut self, frame: &[u8]) -> Result<(), CoreError> {
        let timeout = self.options.send_timeout;
        match tokio::time::timeout(timeout, self.link.send(frame)).await {
            Ok(Ok(())) => {
                self.frames_sent += 1;
                Ok(())
            }
            Ok(Err(e)) => Err(CoreError::from(e)),
            Err(_) => Err(CoreError::Transport {
                message: format!("send timed out after {}ms", timeout.as_millis()),
            }),
        }
    }
}
