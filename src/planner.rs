use log::{info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::client::{ClientError, ProxyClient};
use crate::config::PlannerConfig;
use crate::directions::RouteResult;
use crate::extraction::PoiExtractor;
use crate::itinerary::{ItineraryStreamConsumer, StreamStatus, Transcript};
use crate::normalize::{NormalizedLocation, normalize_locations};
use crate::presentation::MapScene;
use crate::resolver::{DirectionsSource, RouteOutcome, RouteResolver};

/// Where a planning run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Streaming,
    Extracting,
    Routing,
    Rendered,
}

/// Message shown in place of the parts of the trip that could not be built
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    ItineraryFailed,
    NoTripYet,
    NoValidLocations,
    RouteUnavailable(String),
}

impl Notice {
    pub fn text(&self) -> String {
        match self {
            Notice::ItineraryFailed => "The itinerary could not be generated.".to_string(),
            Notice::NoTripYet => "No trip yet. Ask for an itinerary to see it on the map.".to_string(),
            Notice::NoValidLocations => "No valid locations were found in this itinerary.".to_string(),
            Notice::RouteUnavailable(reason) => format!("Could not fetch the route: {}", reason),
        }
    }
}

/// Everything the front end shows after a run
#[derive(Debug, Clone, PartialEq)]
pub struct TripView {
    pub stage: PipelineStage,
    pub itinerary: String,
    pub locations: Vec<NormalizedLocation>,
    pub route: Option<RouteResult>,
    pub notice: Option<Notice>,
}

impl TripView {
    fn idle() -> Self {
        Self {
            stage: PipelineStage::Idle,
            itinerary: String::new(),
            locations: Vec::new(),
            route: None,
            notice: None,
        }
    }
}

/// Runs prompt → itinerary stream → extraction → normalization → route → map
pub struct TripPlanner {
    stream: ItineraryStreamConsumer,
    extractor: PoiExtractor,
    resolver: RouteResolver,
    scene: MapScene,
    view: TripView,
}

impl TripPlanner {
    pub fn new(config: &PlannerConfig) -> Result<Self, ClientError> {
        let client = ProxyClient::new(config)?;
        let extractor = PoiExtractor::new(config.extraction_url.clone(), config.request_timeout)?;
        Ok(Self::with_parts(
            client.clone(),
            extractor,
            Arc::new(client),
        ))
    }

    pub fn with_parts(
        client: ProxyClient,
        extractor: PoiExtractor,
        directions: Arc<dyn DirectionsSource>,
    ) -> Self {
        Self {
            stream: ItineraryStreamConsumer::new(client, Arc::new(Mutex::new(Transcript::new()))),
            extractor,
            resolver: RouteResolver::new(directions),
            scene: MapScene::new(),
            view: TripView::idle(),
        }
    }

    pub fn transcript(&self) -> Arc<Mutex<Transcript>> {
        self.stream.transcript()
    }

    pub fn scene(&self) -> &MapScene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut MapScene {
        &mut self.scene
    }

    pub fn view(&self) -> &TripView {
        &self.view
    }

    pub async fn plan(&mut self, prompt: &str) -> &TripView {
        self.plan_with_updates(prompt, |_| {}).await
    }

    /// Run the whole pipeline; `on_update` sees the transcript after every change.
    /// Any failing stage ends the run with what earlier stages produced.
    pub async fn plan_with_updates<F>(&mut self, prompt: &str, on_update: F) -> &TripView
    where
        F: FnMut(&Transcript) + Send,
    {
        self.view = TripView::idle();
        self.scene.clear();

        self.view.stage = PipelineStage::Streaming;
        let outcome = self.stream.stream_prompt(prompt, on_update).await;
        match outcome.status {
            StreamStatus::Completed => {}
            StreamStatus::Failed(reason) => {
                warn!("Itinerary stream failed: {}", reason);
                self.view.itinerary = outcome.text;
                return self.finish(Some(Notice::ItineraryFailed));
            }
            StreamStatus::Cancelled => {
                info!("Itinerary stream was superseded");
                self.view.itinerary = outcome.text;
                return self.finish(None);
            }
        }
        self.view.itinerary = outcome.text;

        if self.view.itinerary.trim().is_empty() {
            return self.finish(Some(Notice::NoTripYet));
        }

        self.view.stage = PipelineStage::Extracting;
        let places = match self.extractor.extract(&self.view.itinerary).await {
            Ok(places) => places,
            Err(e) => {
                warn!("Location extraction failed: {}", e);
                return self.finish(Some(Notice::NoTripYet));
            }
        };

        self.view.locations = normalize_locations(&places);
        info!(
            "{} of {} extracted places have coordinates",
            self.view.locations.len(),
            places.len()
        );
        self.scene.show_locations(&self.view.locations);

        self.view.stage = PipelineStage::Routing;
        let outcome = self.resolver.resolve(&self.view.locations).await;
        self.scene.apply_route(&outcome);
        let notice = match outcome {
            RouteOutcome::Routed(route) => {
                self.view.route = Some(route);
                None
            }
            RouteOutcome::NoValidLocations => Some(Notice::NoValidLocations),
            RouteOutcome::Failed(reason) => Some(Notice::RouteUnavailable(reason)),
            RouteOutcome::Recenter(_) | RouteOutcome::Superseded => None,
        };
        self.finish(notice)
    }

    fn finish(&mut self, notice: Option<Notice>) -> &TripView {
        self.view.stage = PipelineStage::Rendered;
        self.view.notice = notice;
        &self.view
    }
}
