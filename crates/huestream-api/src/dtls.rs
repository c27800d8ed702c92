//! DTLS-PSK transport, the one real bridges accept on port 2100.
//!
//! OpenSSL drives the handshake over a connected, blocking UDP socket on
//! the blocking pool. Once established, each frame becomes exactly one
//! DTLS application-data record.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use openssl::error::ErrorStack;
use openssl::ssl::{
    HandshakeError, SslConnector, SslMethod, SslStream, SslVerifyMode, SslVersion,
};
use secrecy::{ExposeSecret, SecretSlice};
use tracing::{debug, trace};

use crate::error::Error;
use crate::transport::{SecureSession, SecureTransport};

/// The only suite bridges offer (`TLS_PSK_WITH_AES_128_GCM_SHA256`).
pub const CIPHER_LIST: &str = "PSK-AES128-GCM-SHA256";

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
/// Poll granularity while waiting for handshake flights.
const READ_SLICE: Duration = Duration::from_millis(250);

/// DTLS 1.2 with a pre-shared key.
#[derive(Debug, Clone)]
pub struct DtlsTransport {
    /// Upper bound on the whole handshake.
    pub handshake_timeout: Duration,
    pub bind: Option<SocketAddr>,
}

impl Default for DtlsTransport {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            bind: None,
        }
    }
}

impl DtlsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

#[async_trait]
impl SecureTransport for DtlsTransport {
    async fn establish(
        &self,
        identity: &str,
        key: &SecretSlice<u8>,
        address: SocketAddr,
    ) -> Result<Box<dyn SecureSession>, Error> {
        let connector = connector(identity, key).map_err(handshake_failed)?;
        let bind = self.bind.unwrap_or_else(|| match address {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        });
        let timeout = self.handshake_timeout;

        debug!(%address, identity, "dtls handshake starting");
        let stream = tokio::task::spawn_blocking(move || -> Result<_, Error> {
            let socket = UdpSocket::bind(bind)?;
            socket
                .connect(address)
                .map_err(|e| Error::HandshakeFailed(format!("connect to {address} failed: {e}")))?;
            socket.set_read_timeout(Some(READ_SLICE.min(timeout)))?;
            handshake(&connector, ConnectedUdp(socket), timeout)
        })
        .await
        .map_err(|e| Error::Io(e.into()))??;

        let cipher = stream.ssl().current_cipher().map(|c| c.name());
        debug!(%address, ?cipher, "dtls session established");
        Ok(Box::new(DtlsSession {
            stream: Some(stream),
            peer: address,
        }))
    }
}

fn connector(identity: &str, key: &SecretSlice<u8>) -> Result<SslConnector, ErrorStack> {
    let mut builder = SslConnector::builder(SslMethod::dtls())?;
    builder.set_min_proto_version(Some(SslVersion::DTLS1_2))?;
    builder.set_cipher_list(CIPHER_LIST)?;
    // PSK authenticates both ends; there is no certificate to check.
    builder.set_verify(SslVerifyMode::NONE);

    let identity = Arc::<[u8]>::from(identity.as_bytes());
    let key = SecretSlice::from(key.expose_secret().to_vec());
    builder.set_psk_client_callback(move |_ssl, _hint, identity_out, psk_out| {
        let psk = key.expose_secret();
        // Identity goes out NUL-terminated.
        if identity.len() >= identity_out.len() || psk.len() > psk_out.len() {
            return Err(ErrorStack::get());
        }
        identity_out[..identity.len()].copy_from_slice(&identity);
        identity_out[identity.len()] = 0;
        psk_out[..psk.len()].copy_from_slice(psk);
        Ok(psk.len())
    });
    Ok(builder.build())
}

fn handshake(
    connector: &SslConnector,
    socket: ConnectedUdp,
    timeout: Duration,
) -> Result<SslStream<ConnectedUdp>, Error> {
    let deadline = Instant::now() + timeout;
    let config = connector
        .configure()
        .map_err(handshake_failed)?
        .use_server_name_indication(false)
        .verify_hostname(false);

    let mut attempt = config.connect("", socket);
    loop {
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(HandshakeError::WouldBlock(mid)) => {
                if Instant::now() >= deadline {
                    return Err(Error::HandshakeFailed(format!(
                        "no reply from bridge within {}ms",
                        timeout.as_millis()
                    )));
                }
                attempt = mid.handshake();
            }
            Err(HandshakeError::Failure(mid)) => {
                return Err(Error::HandshakeFailed(mid.error().to_string()));
            }
            Err(HandshakeError::SetupFailure(e)) => return Err(handshake_failed(e)),
        }
    }
}

fn handshake_failed(e: ErrorStack) -> Error {
    Error::HandshakeFailed(e.to_string())
}

/// A connected UDP socket seen as a byte stream, one datagram per call.
#[derive(Debug)]
struct ConnectedUdp(UdpSocket);

impl Read for ConnectedUdp {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.recv(buf)
    }
}

impl Write for ConnectedUdp {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.send(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ── Session ──────────────────────────────────────────────────────────

struct DtlsSession {
    /// Moved onto the blocking pool for each write, `None` once closed.
    stream: Option<SslStream<ConnectedUdp>>,
    peer: SocketAddr,
}

#[async_trait]
impl SecureSession for DtlsSession {
    async fn send(&mut self, datagram: &[u8]) -> Result<(), Error> {
        let mut stream = self.stream.take().ok_or(Error::SessionClosed)?;
        let record = datagram.to_vec();
        let (stream, written) = tokio::task::spawn_blocking(move || {
            let written = stream.ssl_write(&record);
            (stream, written)
        })
        .await
        .map_err(|e| Error::Io(e.into()))?;
        self.stream = Some(stream);

        let written = written.map_err(|e| {
            e.into_io_error()
                .map_or_else(|e| Error::Io(io::Error::other(e.to_string())), Error::Io)
        })?;
        if written != datagram.len() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short record write: {written} of {} bytes", datagram.len()),
            )));
        }
        trace!(peer = %self.peer, len = written, "dtls record sent");
        Ok(())
    }

    async fn close(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        let peer = self.peer;
        let notified = tokio::task::spawn_blocking(move || stream.shutdown().is_ok()).await;
        debug!(%peer, close_notify = matches!(notified, Ok(true)), "dtls session closed");
    }
}
