// huestream-api: bridge-facing collaborators (DTLS transport, CLIP v2 REST, discovery)

pub mod clip;
pub mod discovery;
pub mod dtls;
pub mod error;
pub mod http;
pub mod transport;

pub use clip::{ClipClient, StreamingAction};
pub use discovery::{DiscoveredBridge, DiscoveryOptions, DiscoverySource};
pub use dtls::DtlsTransport;
pub use error::Error;
pub use http::{HttpConfig, TlsMode};
pub use transport::{STREAMING_PORT, SecureSession, SecureTransport, UdpTransport};
