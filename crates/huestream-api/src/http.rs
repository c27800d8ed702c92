// Shared HTTP configuration for building reqwest::Client instances.
//
// The CLIP client and discovery share TLS and timeout settings through
// this module. Bridges serve a self-signed certificate on the local
// network, so certificate checks are off unless a caller opts in.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::error::Error;

const USER_AGENT: &str = concat!("huestream/", env!("CARGO_PKG_VERSION"));

/// TLS verification mode.
#[derive(Debug, Clone)]
pub enum TlsMode {
    /// Use the system certificate store.
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (bridges present a self-signed one).
    DangerAcceptInvalid,
}

/// Shared configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::DangerAcceptInvalid,
            timeout: Duration::from_secs(5),
        }
    }
}

impl HttpConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        self.build_client_with_headers(HeaderMap::new())
    }

    /// Build a `reqwest::Client` with additional default headers.
    ///
    /// Used by the CLIP client to inject the `hue-application-key` header.
    pub fn build_client_with_headers(&self, headers: HeaderMap) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers);

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path).map_err(|e| Error::Api {
                    status: 0,
                    message: format!("failed to read CA cert {}: {e}", path.display()),
                })?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        Ok(builder.build()?)
    }
}

/// Header map carrying the application key, for authenticated CLIP calls.
pub(crate) fn application_key_headers(application_key: &str) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();
    let mut value = HeaderValue::from_str(application_key).map_err(|e| Error::Api {
        status: 0,
        message: format!("application key is not a valid header value: {e}"),
    })?;
    value.set_sensitive(true);
    headers.insert("hue-application-key", value);
    Ok(headers)
}
