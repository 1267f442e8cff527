use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Result, anyhow};
use log::warn;

/// Default mapping provider endpoints
const DEFAULT_TOKEN_URL: &str = "https://outpost.mappls.com/api/security/oauth/token";
const DEFAULT_ADVANCED_MAPS_URL: &str = "https://apis.mappls.com/advancedmaps/v1";

/// Proxy server configuration, read from the process environment
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Single origin allowed by CORS; `None` allows any origin
    pub cors_origin: Option<String>,
    pub mappls: MapplsConfig,
    /// Generation backend that streams itinerary text
    pub itinerary_url: String,
    pub place_cache: PlaceCacheConfig,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct MapplsConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// REST key used for directions and reverse geocoding
    pub api_key: Option<String>,
    pub token_url: String,
    pub advanced_maps_url: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PlaceCacheConfig {
    pub max_entries: usize,
    pub ttl: Duration,
}

impl Default for PlaceCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1024,
            ttl: Duration::from_secs(6 * 60 * 60), // 6 hours
        }
    }
}

impl Config {
    /// Load configuration from the environment, honouring a `.env` file if present
    pub fn from_env() -> Result<Self> {
        load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Treat blank values as unset
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = get("ITINERA_BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:5000".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| anyhow!("Invalid ITINERA_BIND_ADDR: {}", e))?;

        let place_cache = PlaceCacheConfig {
            max_entries: match get("PLACE_CACHE_MAX_ENTRIES") {
                Some(v) => v
                    .parse()
                    .map_err(|_| anyhow!("Invalid PLACE_CACHE_MAX_ENTRIES: {}", v))?,
                None => PlaceCacheConfig::default().max_entries,
            },
            ttl: match get("PLACE_CACHE_TTL_SECS") {
                Some(v) => Duration::from_secs(
                    v.parse()
                        .map_err(|_| anyhow!("Invalid PLACE_CACHE_TTL_SECS: {}", v))?,
                ),
                None => PlaceCacheConfig::default().ttl,
            },
        };

        let request_timeout = match get("UPSTREAM_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(
                v.parse()
                    .map_err(|_| anyhow!("Invalid UPSTREAM_TIMEOUT_SECS: {}", v))?,
            ),
            None => Duration::from_secs(30),
        };

        Ok(Self {
            bind_addr,
            cors_origin: get("CORS_ORIGIN"),
            mappls: MapplsConfig {
                client_id: get("MAPPLS_CLIENT_ID"),
                client_secret: get("MAPPLS_CLIENT_SECRET"),
                api_key: get("MAPPLS_API_KEY"),
                token_url: get("MAPPLS_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.into()),
                advanced_maps_url: get("MAPPLS_ADVANCED_MAPS_URL")
                    .unwrap_or_else(|| DEFAULT_ADVANCED_MAPS_URL.into()),
            },
            itinerary_url: get("ITINERARY_BACKEND_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8000/stream-itinerary".to_string()),
            place_cache,
            request_timeout,
        })
    }
}

/// A missing `.env` is normal; anything else is worth a warning
fn load_dotenv() {
    if let Some(message) = dotenv_warning(dotenvy::dotenv().map(|_| ())) {
        warn!("{}", message);
    }
}

fn dotenv_warning(result: std::result::Result<(), dotenvy::Error>) -> Option<String> {
    match result {
        Err(e) if !e.not_found() => Some(format!("Ignoring unreadable .env file: {}", e)),
        _ => None,
    }
}

/// Front end settings for the trip planner
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Base URL of the proxy server
    pub proxy_url: String,
    /// POI extraction backend endpoint
    pub extraction_url: String,
    pub request_timeout: Duration,
}

impl PlannerConfig {
    pub fn from_env() -> Result<Self> {
        load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let request_timeout = match get("UPSTREAM_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(
                v.parse()
                    .map_err(|_| anyhow!("Invalid UPSTREAM_TIMEOUT_SECS: {}", v))?,
            ),
            None => Duration::from_secs(30),
        };
        Ok(Self {
            proxy_url: get("ITINERA_PROXY_URL")
                .unwrap_or_else(|| "http://127.0.0.1:5000".to_string()),
            extraction_url: get("EXTRACTION_BACKEND_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8000/extract-locations".to_string()),
            request_timeout,
        })
    }
}
