use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::config::PlannerConfig;
use crate::error::{ErrorEnvelope, ErrorKind};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed with {status}: {message}")]
    Api {
        status: u16,
        kind: Option<ErrorKind>,
        message: String,
    },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    Decode(String),
}

/// Read a JSON body, mapping error statuses to `ClientError::Api`
pub(crate) async fn decode_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let response = check_status(response).await?;
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let (kind, message) = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => (Some(envelope.kind), envelope.message),
        Err(_) => (None, body.trim().to_string()),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        kind,
        message,
    })
}

/// Front end view of the proxy server
#[derive(Debug, Clone)]
pub struct ProxyClient {
    http: reqwest::Client,
    // Streaming requests only bound the connect phase
    stream_http: reqwest::Client,
    base_url: String,
}

impl ProxyClient {
    pub fn new(config: &PlannerConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()?,
            stream_http: reqwest::Client::builder()
                .connect_timeout(config.request_timeout)
                .build()?,
            base_url: config.proxy_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Open the itinerary stream; the caller reads the body incrementally
    pub async fn stream_itinerary(&self, prompt: &str) -> Result<reqwest::Response, ClientError> {
        let response = self
            .stream_http
            .post(self.url(crate::api::STREAM_ITINERARY_PATH))
            .json(&serde_json::json!({ "user_prompt": prompt }))
            .send()
            .await?;
        check_status(response).await
    }

    /// Multi-stop route for an already formatted `lng,lat;lng,lat` path
    pub async fn directions_multi(&self, path: &str) -> Result<Value, ClientError> {
        debug!("Requesting multi-stop route for {}", path);
        let response = self
            .http
            .get(self.url(crate::api::DIRECTIONS_MULTI_PATH))
            .query(&[("path", path)])
            .send()
            .await?;
        decode_json(response).await
    }

    pub async fn place_details(&self, lat: f64, lng: f64) -> Result<Value, ClientError> {
        let response = self
            .http
            .get(self.url(crate::api::PLACE_DETAILS_PATH))
            .query(&[("lat", lat.to_string()), ("lng", lng.to_string())])
            .send()
            .await?;
        decode_json(response).await
    }
}
