//! HTTP surface of the proxy: token, directions, place details, itinerary relay
//! and the admin endpoints.

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{debug, info, warn};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::admin::{
    AdminProfile, AdminService, GuideRecord, GuideStatusResponse, LoginRequest, LoginResponse,
    RegisterRequest, VerifyGuideRequest,
};
use crate::auth::AuthenticatedAdmin;
use crate::config::Config;
use crate::error::ProxyError;
use crate::mappls::{AccessToken, MapplsClient, Profile, Resource, StopPath};
use crate::place_cache::PlaceCache;

pub const HEALTH_PATH: &str = "/health";
pub const TOKEN_PATH: &str = "/api/get-mappls-token";
pub const DIRECTIONS_PATH: &str = "/api/get-directions";
pub const DIRECTIONS_MULTI_PATH: &str = "/api/get-directions-multi";
pub const PLACE_DETAILS_PATH: &str = "/api/get-place-details";
pub const STREAM_ITINERARY_PATH: &str = "/stream-itinerary";

/// Shared handles for every request handler
#[derive(Clone)]
pub struct AppState {
    pub mappls: Arc<MapplsClient>,
    pub place_cache: Arc<Mutex<PlaceCache>>,
    pub admin: Arc<AdminService>,
    pub relay: Arc<ItineraryRelay>,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self, ProxyError> {
        Ok(Self {
            mappls: Arc::new(MapplsClient::new(
                config.mappls.clone(),
                config.request_timeout,
            )?),
            place_cache: Arc::new(Mutex::new(PlaceCache::new(config.place_cache))),
            admin: Arc::new(AdminService::new()),
            relay: Arc::new(ItineraryRelay::new(
                config.itinerary_url.clone(),
                config.request_timeout,
            )?),
        })
    }
}

/// Forwards itinerary prompts to the generation backend and relays its stream
pub struct ItineraryRelay {
    http: reqwest::Client,
    url: String,
}

impl ItineraryRelay {
    pub fn new(url: String, connect_timeout: Duration) -> Result<Self, ProxyError> {
        // No overall timeout: a long generation must not be cut off mid-stream
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ProxyError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, url })
    }

    async fn open(&self, user_prompt: &str) -> Result<reqwest::Response, ProxyError> {
        let response = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({ "user_prompt": user_prompt }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Itinerary backend returned {}: {}", status, body);
            return Err(ProxyError::Upstream {
                status: status.as_u16(),
                message: if body.trim().is_empty() {
                    "Itinerary generation failed".to_string()
                } else {
                    body.trim().chars().take(200).collect()
                },
            });
        }
        Ok(response)
    }
}

/// Routes without CORS or tracing layers
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(TOKEN_PATH, get(get_token))
        .route(DIRECTIONS_PATH, get(get_directions))
        .route(DIRECTIONS_MULTI_PATH, get(get_directions_multi))
        .route(PLACE_DETAILS_PATH, get(get_place_details))
        .route(STREAM_ITINERARY_PATH, post(stream_itinerary))
        .route("/api/admin/register", post(register_admin))
        .route("/api/admin/login", post(login_admin))
        .route("/api/admin/guide/verify", post(verify_guide))
        .route("/api/admin/guide/{id}/status", get(guide_status))
        .route("/api/admin/guides", get(list_guides))
}

/// Full application router
pub fn router(state: AppState, cors_origin: Option<&str>) -> Result<Router, ProxyError> {
    Ok(routes()
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origin)?)
        .with_state(state))
}

pub fn cors_layer(origin: Option<&str>) -> Result<CorsLayer, ProxyError> {
    let allow_origin = match origin {
        Some(origin) => AllowOrigin::exact(HeaderValue::from_str(origin).map_err(|_| {
            ProxyError::Configuration(format!("Invalid CORS origin: {}", origin))
        })?),
        None => AllowOrigin::any(),
    };
    Ok(CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(allow_origin)
        .allow_headers(Any))
}

/// Unwrap a JSON body, reporting malformed input in the common error envelope
fn json_body<T: DeserializeOwned>(body: Result<Json<T>, JsonRejection>) -> Result<T, ProxyError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ProxyError::Validation(rejection.body_text()))
}

fn parse_or_default<T>(value: Option<&str>) -> Result<T, ProxyError>
where
    T: std::str::FromStr<Err = ProxyError> + Default,
{
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v.parse(),
        None => Ok(T::default()),
    }
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

async fn get_token(State(st): State<AppState>) -> Result<Json<AccessToken>, ProxyError> {
    Ok(Json(st.mappls.access_token().await?))
}

#[derive(Debug, Deserialize)]
struct DirectionsParams {
    origin: Option<String>,
    destination: Option<String>,
    profile: Option<String>,
    resource: Option<String>,
}

async fn get_directions(
    State(st): State<AppState>,
    Query(params): Query<DirectionsParams>,
) -> Result<Json<Value>, ProxyError> {
    let (Some(origin), Some(destination)) = (
        params.origin.as_deref().filter(|v| !v.trim().is_empty()),
        params.destination.as_deref().filter(|v| !v.trim().is_empty()),
    ) else {
        return Err(ProxyError::Validation(
            "origin and destination are required".into(),
        ));
    };
    let stops = StopPath::from_origin_destination(origin, destination)?;
    let profile: Profile = parse_or_default(params.profile.as_deref())?;
    let resource: Resource = parse_or_default(params.resource.as_deref())?;

    Ok(Json(st.mappls.directions(&stops, profile, resource).await?))
}

#[derive(Debug, Deserialize)]
struct MultiDirectionsParams {
    path: Option<String>,
    profile: Option<String>,
    resource: Option<String>,
}

async fn get_directions_multi(
    State(st): State<AppState>,
    Query(params): Query<MultiDirectionsParams>,
) -> Result<Json<Value>, ProxyError> {
    let stops = StopPath::parse_path(params.path.as_deref().unwrap_or_default())?;
    let profile: Profile = parse_or_default(params.profile.as_deref())?;
    let resource: Resource = parse_or_default(params.resource.as_deref())?;

    Ok(Json(st.mappls.directions(&stops, profile, resource).await?))
}

#[derive(Debug, Deserialize)]
struct PlaceDetailsParams {
    lat: Option<String>,
    lng: Option<String>,
}

async fn get_place_details(
    State(st): State<AppState>,
    Query(params): Query<PlaceDetailsParams>,
) -> Result<Json<Value>, ProxyError> {
    let parse = |value: Option<&str>, field: &str| -> Result<f64, ProxyError> {
        let value = value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ProxyError::Validation("lat and lng are required".into()))?;
        value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ProxyError::Validation(format!("{} must be a number", field)))
    };
    let lat = parse(params.lat.as_deref(), "lat")?;
    let lng = parse(params.lng.as_deref(), "lng")?;

    let key = PlaceCache::key_for(lat, lng);
    if let Some(details) = st.place_cache.lock().await.get(&key) {
        debug!("Place cache hit for {}", key);
        return Ok(Json(details));
    }

    // Lock is released while upstream is queried
    let details = st.mappls.reverse_geocode(lat, lng).await?;
    st.place_cache.lock().await.insert(key, details.clone());
    Ok(Json(details))
}

#[derive(Debug, Deserialize)]
struct StreamItineraryRequest {
    user_prompt: Option<String>,
}

async fn stream_itinerary(
    State(st): State<AppState>,
    body: Result<Json<StreamItineraryRequest>, JsonRejection>,
) -> Result<Response, ProxyError> {
    let req = json_body(body)?;
    let prompt = req
        .user_prompt
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ProxyError::Validation("user_prompt is required".into()))?;

    info!("Relaying itinerary request ({} chars)", prompt.len());
    let upstream = st.relay.open(&prompt).await?;

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("text/plain; charset=utf-8"));

    let mut response = Body::from_stream(upstream.bytes_stream()).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, content_type);
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    Ok(response)
}

async fn register_admin(
    State(st): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AdminProfile>), ProxyError> {
    let profile = st.admin.register(json_body(body)?).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn login_admin(
    State(st): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ProxyError> {
    Ok(Json(st.admin.login(json_body(body)?).await?))
}

async fn verify_guide(
    State(st): State<AppState>,
    admin: AuthenticatedAdmin,
    body: Result<Json<VerifyGuideRequest>, JsonRejection>,
) -> Result<Json<GuideRecord>, ProxyError> {
    let req = json_body(body)?;
    Ok(Json(st.admin.verify_guide(admin.admin_id, req).await?))
}

async fn guide_status(
    State(st): State<AppState>,
    Path(id): Path<String>,
) -> Json<GuideStatusResponse> {
    Json(st.admin.guide_status(&id).await)
}

async fn list_guides(
    State(st): State<AppState>,
    _admin: AuthenticatedAdmin,
) -> Json<Vec<GuideRecord>> {
    Json(st.admin.list_guides().await)
}
