use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::client::{ClientError, ProxyClient};
use crate::directions::{RouteResult, build_path};
use crate::normalize::NormalizedLocation;

/// Source of multi-stop directions JSON
#[async_trait]
pub trait DirectionsSource: Send + Sync {
    async fn multi_stop_route(&self, path: &str) -> Result<Value, ClientError>;
}

#[async_trait]
impl DirectionsSource for ProxyClient {
    async fn multi_stop_route(&self, path: &str) -> Result<Value, ClientError> {
        self.directions_multi(path).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Nothing to show
    NoValidLocations,
    /// A single stop: center the map on it, no route
    Recenter(NormalizedLocation),
    Routed(RouteResult),
    /// Route request failed; markers stay on the map
    Failed(String),
    /// A newer location list was resolved while this one was in flight
    Superseded,
}

/// Resolves a fixed-order multi-stop route for the current location list.
///
/// Stops are visited in extraction order; no tour optimization is attempted.
pub struct RouteResolver {
    source: Arc<dyn DirectionsSource>,
    generation: AtomicU64,
}

impl RouteResolver {
    pub fn new(source: Arc<dyn DirectionsSource>) -> Self {
        Self {
            source,
            generation: AtomicU64::new(0),
        }
    }

    pub async fn resolve(&self, locations: &[NormalizedLocation]) -> RouteOutcome {
        // Every new list invalidates whatever is still in flight
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        match locations {
            [] => {
                info!("No valid locations to route");
                RouteOutcome::NoValidLocations
            }
            [single] => {
                debug!("Single location {}, recentering", single.place);
                RouteOutcome::Recenter(single.clone())
            }
            stops => {
                let path = build_path(stops);
                info!("Requesting route through {} stops", stops.len());
                let result = self.source.multi_stop_route(&path).await;

                if self.generation.load(Ordering::SeqCst) != generation {
                    debug!("Discarding route for superseded location list");
                    return RouteOutcome::Superseded;
                }

                match result {
                    Ok(body) => match RouteResult::from_directions(&body) {
                        Ok(route) => RouteOutcome::Routed(route),
                        Err(e) => {
                            warn!("Unusable directions response: {}", e);
                            RouteOutcome::Failed(e.to_string())
                        }
                    },
                    Err(e) => {
                        warn!("Route fetch failed: {}", e);
                        RouteOutcome::Failed(e.to_string())
                    }
                }
            }
        }
    }
}
