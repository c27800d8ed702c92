//! Real-time entertainment streaming engine between `huestream-api` and the
//! CLI.
//!
//! - **[`Streamer`]**: session lifecycle for one entertainment
//!   configuration. [`start()`](Streamer::start) opens a secure session
//!   through a [`SecureTransport`](huestream_api::SecureTransport) and spawns
//!   a fixed-rate loop; [`submit()`](Streamer::submit) records colors from
//!   any thread; [`stop()`](Streamer::stop) drains and closes. State changes
//!   are published on a `watch` channel.
//!
//! - **[`CommandTable`]**: latest-wins store of pending colors, snapshotted
//!   once per tick.
//!
//! - **[`frame`]**: the `HueStream` datagram encoder (protocol v1 and v2).
//!
//! - **[`color`]**: RGB and CIE xy encoding to the 16-bit wire channels,
//!   including the cross-gamut conversion.

pub mod color;
pub mod config;
pub mod convert;
pub mod error;
pub mod frame;
pub mod model;
pub mod streamer;
pub mod table;

// ── Primary re-exports ──────────────────────────────────────────────
pub use color::ColorSpace;
pub use config::{BridgeIdentity, KeepAlivePolicy, StreamOptions};
pub use error::CoreError;
pub use frame::ProtocolVersion;
pub use model::{
    Color, DeviceType, EntertainmentConfiguration, LightCommand, LightDescriptor, LightId,
};
pub use streamer::{StreamState, Streamer};
pub use table::{CommandTable, Snapshot};
