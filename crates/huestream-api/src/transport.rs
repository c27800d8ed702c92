//! Secure datagram transport boundary.
//!
//! The streaming engine never touches sockets or ciphers directly. It asks a
//! [`SecureTransport`] to establish a session with the bridge using the
//! pre-shared identity and key, then pushes whole frames through the
//! returned [`SecureSession`]. Bridges only accept DTLS-PSK on UDP port
//! 2100, see [`crate::dtls::DtlsTransport`]; [`UdpTransport`] is an
//! unencrypted implementation for bridge emulators and packet captures.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use secrecy::SecretSlice;
use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::error::Error;

/// Default entertainment streaming port on the bridge.
pub const STREAMING_PORT: u16 = 2100;

/// Establishes secure datagram sessions with a bridge.
#[async_trait]
pub trait SecureTransport: Send + Sync {
    /// Perform the handshake and return an open session.
    ///
    /// `identity` is the PSK identity (the application id), `key` the raw
    /// pre-shared secret.
    async fn establish(
        &self,
        identity: &str,
        key: &SecretSlice<u8>,
        address: SocketAddr,
    ) -> Result<Box<dyn SecureSession>, Error>;
}

/// An established session. Each `send` transmits exactly one datagram.
#[async_trait]
pub trait SecureSession: Send {
    /// Transmit one complete datagram.
    async fn send(&mut self, datagram: &[u8]) -> Result<(), Error>;

    /// Tear the session down. Further sends fail with [`Error::SessionClosed`].
    async fn close(&mut self);
}

// ── UdpTransport ─────────────────────────────────────────────────────

/// Plain UDP transport. Performs no encryption; the PSK is ignored.
#[derive(Debug, Clone, Default)]
pub struct UdpTransport {
    /// Local address to bind. `None` picks an ephemeral port on the
    /// wildcard address matching the bridge's address family.
    pub bind: Option<SocketAddr>,
}

impl UdpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind(bind: SocketAddr) -> Self {
        Self { bind: Some(bind) }
    }
}

#[async_trait]
impl SecureTransport for UdpTransport {
    async fn establish(
        &self,
        identity: &str,
        _key: &SecretSlice<u8>,
        address: SocketAddr,
    ) -> Result<Box<dyn SecureSession>, Error> {
        let bind = self.bind.unwrap_or_else(|| match address {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        });

        let socket = UdpSocket::bind(bind).await?;
        socket
            .connect(address)
            .await
            .map_err(|e| Error::HandshakeFailed(format!("connect to {address} failed: {e}")))?;

        debug!(%address, identity, local = ?socket.local_addr().ok(), "udp session opened");
        Ok(Box::new(UdpSession {
            socket: Some(socket),
            peer: address,
        }))
    }
}

struct UdpSession {
    socket: Option<UdpSocket>,
    peer: SocketAddr,
}

#[async_trait]
impl SecureSession for UdpSession {
    async fn send(&mut self, datagram: &[u8]) -> Result<(), Error> {
        let socket = self.socket.as_ref().ok_or(Error::SessionClosed)?;
        let written = socket.send(datagram).await?;
        if written != datagram.len() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("short datagram write: {written} of {} bytes", datagram.len()),
            )));
        }
        trace!(peer = %self.peer, len = written, "datagram sent");
        Ok(())
    }

    async fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!(peer = %self.peer, "udp session closed");
        }
    }
}
