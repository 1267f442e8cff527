use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::client::{ClientError, decode_json};

/// Coordinate as sent by the extraction backend: a number, a numeric string,
/// or junk such as `"null"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCoordinate {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodedPlace {
    #[serde(alias = "place")]
    pub name: String,
    #[serde(default, alias = "lat")]
    pub latitude: Option<RawCoordinate>,
    #[serde(default, alias = "lon", alias = "lng")]
    pub longitude: Option<RawCoordinate>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExtractionResponse {
    Places(Vec<GeocodedPlace>),
    Wrapped {
        #[serde(alias = "locations")]
        places: Vec<GeocodedPlace>,
    },
}

/// Sends finished itinerary text to the POI extraction backend
#[derive(Debug, Clone)]
pub struct PoiExtractor {
    http: reqwest::Client,
    url: String,
}

impl PoiExtractor {
    pub fn new(url: String, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            url,
        })
    }

    /// Places mentioned in the itinerary; blank text never reaches the backend
    pub async fn extract(&self, itinerary: &str) -> Result<Vec<GeocodedPlace>, ClientError> {
        if itinerary.trim().is_empty() {
            debug!("Skipping extraction for empty itinerary");
            return Ok(Vec::new());
        }

        let response = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({ "itinerary": itinerary }))
            .send()
            .await?;
        let places = match decode_json::<ExtractionResponse>(response).await? {
            ExtractionResponse::Places(places) => places,
            ExtractionResponse::Wrapped { places } => places,
        };
        info!("Extraction returned {} places", places.len());
        Ok(places)
    }
}
