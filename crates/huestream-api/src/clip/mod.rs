// CLIP v2 HTTP client
//
// Wraps `reqwest::Client` with bridge URL construction and envelope
// unwrapping. Only the handful of endpoints the streaming workflow needs
// are modelled: entertainment configurations, the start/stop action,
// application registration, and the public bridge config.

pub mod models;

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::http::{HttpConfig, application_key_headers};

pub use models::{
    BridgeConfig, Channel, EntertainmentConfigurationResponse, Position, Registration,
    ResourceRef, StreamingAction,
};
use models::{ActionBody, ClipResponse, RegisterBody, V1Result};

const ENTERTAINMENT_PATH: &str = "clip/v2/resource/entertainment_configuration";

/// HTTP client for a single bridge.
///
/// Built with an application key for CLIP v2 calls, or without one for
/// registration and the public config endpoint.
pub struct ClipClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ClipClient {
    /// Create a client for the bridge at `base_url` (e.g. `https://192.168.1.2`).
    pub fn new(
        base_url: Url,
        application_key: Option<&SecretString>,
        config: &HttpConfig,
    ) -> Result<Self, Error> {
        let http = match application_key {
            Some(key) => {
                config.build_client_with_headers(application_key_headers(key.expose_secret())?)?
            }
            None => config.build_client()?,
        };
        Ok(Self { http, base_url })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
        })
    }

    /// The bridge base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Entertainment configurations ─────────────────────────────────

    /// List every entertainment configuration on the bridge.
    pub async fn list_entertainment_configurations(
        &self,
    ) -> Result<Vec<EntertainmentConfigurationResponse>, Error> {
        let url = self.url(ENTERTAINMENT_PATH)?;
        self.get_clip(url).await
    }

    /// Fetch a single entertainment configuration by id.
    pub async fn get_entertainment_configuration(
        &self,
        id: &str,
    ) -> Result<EntertainmentConfigurationResponse, Error> {
        let url = self.url(&format!("{ENTERTAINMENT_PATH}/{id}"))?;
        self.get_clip(url)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Api {
                status: StatusCode::NOT_FOUND.as_u16(),
                message: format!("entertainment configuration {id} not found"),
            })
    }

    /// Ask the bridge to open (or close) the streaming endpoint for a configuration.
    ///
    /// Must be called with [`StreamingAction::Start`] before the secure session
    /// is established, and with [`StreamingAction::Stop`] after it is closed.
    pub async fn set_streaming(&self, id: &str, action: StreamingAction) -> Result<(), Error> {
        let url = self.url(&format!("{ENTERTAINMENT_PATH}/{id}"))?;
        debug!(id, ?action, "PUT {}", url);
        let resp = self.http.put(url).json(&ActionBody { action }).send().await?;
        let _: Vec<ResourceRef> = parse_clip(resp).await?;
        Ok(())
    }

    // ── v1 endpoints ─────────────────────────────────────────────────

    /// Register an application. The bridge link button must have been
    /// pressed within the last 30 seconds.
    pub async fn register(&self, device_type: &str) -> Result<Registration, Error> {
        let url = self.url("api")?;
        let body = RegisterBody {
            devicetype: device_type,
            generateclientkey: true,
        };
        self.post_v1(url, &body).await
    }

    /// Fetch the public bridge description (name, id, software version).
    pub async fn bridge_config(&self) -> Result<BridgeConfig, Error> {
        let url = self.url("api/config")?;
        debug!("GET {}", url);
        let resp = self.http.get(url).send().await?;
        let body = checked_body(resp).await?;
        decode(&body)
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    async fn get_clip<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, Error> {
        debug!("GET {}", url);
        let resp = self.http.get(url).send().await?;
        parse_clip(resp).await
    }

    async fn post_v1<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &(impl Serialize + Sync),
    ) -> Result<T, Error> {
        debug!("POST {}", url);
        let resp = self.http.post(url).json(body).send().await?;
        let body = checked_body(resp).await?;
        let results: Vec<V1Result<T>> = decode(&body)?;

        for result in results {
            if let Some(err) = result.error {
                return Err(Error::Bridge {
                    kind: Some(err.kind),
                    description: err.description,
                });
            }
            if let Some(success) = result.success {
                return Ok(success);
            }
        }
        Err(Error::Deserialization {
            message: "v1 response contained neither success nor error".into(),
            body,
        })
    }
}

/// Read the body of a response, turning non-success statuses into errors.
async fn checked_body(resp: reqwest::Response) -> Result<String, Error> {
    let status = resp.status();
    let body = resp.text().await?;
    if status.is_success() {
        return Ok(body);
    }

    // CLIP errors arrive in the envelope even on 4xx; surface the first one.
    if let Ok(envelope) = serde_json::from_str::<ClipResponse<serde_json::Value>>(&body) {
        if let Some(first) = envelope.errors.into_iter().next() {
            return Err(Error::Bridge {
                kind: None,
                description: first.description,
            });
        }
    }

    Err(Error::Api {
        status: status.as_u16(),
        message: body.chars().take(200).collect(),
    })
}

/// Parse the `{ errors, data }` envelope, returning `data` on success.
async fn parse_clip<T: DeserializeOwned>(resp: reqwest::Response) -> Result<Vec<T>, Error> {
    let body = checked_body(resp).await?;
    let envelope: ClipResponse<T> = decode(&body)?;
    if let Some(first) = envelope.errors.into_iter().next() {
        return Err(Error::Bridge {
            kind: None,
            description: first.description,
        });
    }
    Ok(envelope.data)
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, Error> {
    serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body: body.to_owned(),
        }
    })
}
