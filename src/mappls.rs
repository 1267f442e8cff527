//! Client for the mapping provider: OAuth tokens, directions and reverse geocoding.
//!
//! One `MapplsClient` is built per process and shared through the router state.
//! Credentials stay inside the client; callers only ever see the access token.

use chrono::{DateTime, TimeDelta, Utc};
use geo::Point;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::MapplsConfig;
use crate::error::ProxyError;

/// Tokens are refreshed this long before the provider says they expire
const TOKEN_REFRESH_MARGIN_SECONDS: i64 = 60;

/// Travel mode understood by the directions API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Driving,
    Walking,
    Biking,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Driving => "driving",
            Profile::Walking => "walking",
            Profile::Biking => "biking",
        }
    }
}

impl FromStr for Profile {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "driving" => Ok(Profile::Driving),
            "walking" => Ok(Profile::Walking),
            "biking" => Ok(Profile::Biking),
            other => Err(ProxyError::Validation(format!(
                "Unsupported profile '{}', expected driving, walking or biking",
                other
            ))),
        }
    }
}

/// Directions resource: plain routing or routing with live ETA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resource {
    #[default]
    Route,
    RouteEta,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Route => "route_adv",
            Resource::RouteEta => "route_eta",
        }
    }
}

impl FromStr for Resource {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "route" | "route_adv" => Ok(Resource::Route),
            "route_eta" => Ok(Resource::RouteEta),
            other => Err(ProxyError::Validation(format!(
                "Unsupported resource '{}', expected route or route_eta",
                other
            ))),
        }
    }
}

/// Ordered stops of a route, stored as (lng, lat) points
#[derive(Debug, Clone, PartialEq)]
pub struct StopPath(Vec<Point<f64>>);

impl StopPath {
    /// Origin and destination given as `lat,lng` strings
    pub fn from_origin_destination(origin: &str, destination: &str) -> Result<Self, ProxyError> {
        let origin = parse_lat_lng(origin, "origin")?;
        let destination = parse_lat_lng(destination, "destination")?;
        Ok(Self(vec![origin, destination]))
    }

    /// Semicolon separated `lng,lat` pairs, at least two of them
    pub fn parse_path(path: &str) -> Result<Self, ProxyError> {
        let points = path
            .split(';')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .enumerate()
            .map(|(i, pair)| {
                let (lng, lat) = split_pair(pair)
                    .ok_or_else(|| {
                        ProxyError::Validation(format!("Invalid coordinate pair #{}: '{}'", i + 1, pair))
                    })?;
                checked_point(lng, lat)
                    .ok_or_else(|| ProxyError::Validation(format!("Coordinate pair #{} is out of range", i + 1)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if points.len() < 2 {
            return Err(ProxyError::Validation(
                "path must contain at least 2 points".into(),
            ));
        }
        Ok(Self(points))
    }

    pub fn points(&self) -> &[Point<f64>] {
        &self.0
    }
}

impl fmt::Display for StopPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{},{}", p.x(), p.y())?;
        }
        Ok(())
    }
}

fn split_pair(pair: &str) -> Option<(f64, f64)> {
    let (a, b) = pair.split_once(',')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

fn checked_point(lng: f64, lat: f64) -> Option<Point<f64>> {
    if lng.is_finite() && lat.is_finite() && lat.abs() <= 90.0 && lng.abs() <= 180.0 {
        Some(Point::new(lng, lat))
    } else {
        None
    }
}

fn parse_lat_lng(value: &str, field: &str) -> Result<Point<f64>, ProxyError> {
    let (lat, lng) = split_pair(value).ok_or_else(|| {
        ProxyError::Validation(format!("{} must be formatted as lat,lng", field))
    })?;
    checked_point(lng, lat)
        .ok_or_else(|| ProxyError::Validation(format!("{} is out of range", field)))
}

/// Access token as handed to the browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: AccessToken,
    expires_at: DateTime<Utc>,
}

pub struct MapplsClient {
    http: reqwest::Client,
    config: MapplsConfig,
    token: RwLock<Option<CachedToken>>,
}

impl MapplsClient {
    pub fn new(config: MapplsConfig, timeout: Duration) -> Result<Self, ProxyError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProxyError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            config,
            token: RwLock::new(None),
        })
    }

    fn api_key(&self) -> Result<&str, ProxyError> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| ProxyError::Configuration("MAPPLS_API_KEY is not configured".into()))
    }

    /// Client-credentials exchange; reuses a cached token until shortly before expiry
    pub async fn access_token(&self) -> Result<AccessToken, ProxyError> {
        let now = Utc::now();
        if let Some(cached) = self.token.read().await.as_ref() {
            let remaining = cached.expires_at - now;
            if remaining > TimeDelta::seconds(TOKEN_REFRESH_MARGIN_SECONDS) {
                debug!("Reusing cached access token");
                let mut token = cached.token.clone();
                token.expires_in = Some(remaining.num_seconds());
                return Ok(token);
            }
        }

        let (Some(client_id), Some(client_secret)) = (
            self.config.client_id.as_deref(),
            self.config.client_secret.as_deref(),
        ) else {
            return Err(ProxyError::Configuration(
                "MAPPLS_CLIENT_ID and MAPPLS_CLIENT_SECRET must be configured".into(),
            ));
        };

        info!("Requesting a new access token");
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()
            .await?;
        let token: AccessToken = serde_json::from_value(read_json(response).await?)
            .map_err(|e| ProxyError::Internal(format!("Malformed token response: {}", e)))?;

        if let Some(expires_in) = token.expires_in {
            *self.token.write().await = Some(CachedToken {
                token: token.clone(),
                expires_at: now + TimeDelta::seconds(expires_in),
            });
        }
        Ok(token)
    }

    /// Route through the given stops in order, returning the provider's JSON
    pub async fn directions(
        &self,
        stops: &StopPath,
        profile: Profile,
        resource: Resource,
    ) -> Result<Value, ProxyError> {
        let api_key = self.api_key()?;
        let url = format!(
            "{}/{}/{}/{}/{}",
            self.config.advanced_maps_url.trim_end_matches('/'),
            api_key,
            resource.as_str(),
            profile.as_str(),
            stops
        );
        debug!(
            "Requesting {} {} route through {} stops",
            profile.as_str(),
            resource.as_str(),
            stops.points().len()
        );

        let response = self
            .http
            .get(&url)
            .query(&[
                ("steps", "true"),
                ("geometries", "geojson"),
                ("overview", "full"),
                ("alternatives", "false"),
            ])
            .send()
            .await?;
        read_json(response).await
    }

    /// First reverse-geocode result for a coordinate
    pub async fn reverse_geocode(&self, lat: f64, lng: f64) -> Result<Value, ProxyError> {
        let api_key = self.api_key()?;
        let url = format!(
            "{}/{}/rev_geocode",
            self.config.advanced_maps_url.trim_end_matches('/'),
            api_key
        );
        let response = self
            .http
            .get(&url)
            .query(&[("lat", lat.to_string()), ("lng", lng.to_string())])
            .send()
            .await?;
        let body = read_json(response).await?;

        body.get("results")
            .and_then(Value::as_array)
            .and_then(|results| results.first())
            .cloned()
            .ok_or_else(|| ProxyError::NotFound(format!("No place found at {},{}", lat, lng)))
    }
}

/// Decode a JSON body, turning non-success statuses into upstream errors
async fn read_json(response: reqwest::Response) -> Result<Value, ProxyError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!("Upstream returned {}: {}", status, body);
        return Err(ProxyError::Upstream {
            status: status.as_u16(),
            message: upstream_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("upstream error").into()),
        });
    }
    Ok(response.json::<Value>().await?)
}

/// Pull a human readable message out of an upstream error body
fn upstream_message(body: &str) -> Option<String> {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        for field in ["message", "error_description", "error"] {
            if let Some(msg) = json.get(field).and_then(Value::as_str) {
                return Some(msg.to_string());
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.chars().take(200).collect())
    }
}
