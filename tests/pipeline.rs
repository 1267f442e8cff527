mod common;

use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use itinera::client::ProxyClient;
use itinera::config::PlannerConfig;
use itinera::itinerary::{APOLOGY_MESSAGE, ItineraryStreamConsumer, Role, StreamStatus, Transcript};
use itinera::planner::{Notice, PipelineStage, TripPlanner};
use itinera::presentation::{MapView, ScreenPoint, Size, render_turn_list};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use common::{chunked_body, spawn, two_leg_directions};

#[derive(Default)]
struct Backends {
    multi_paths: Mutex<Vec<String>>,
    extraction_inputs: Mutex<Vec<String>>,
}

async fn fake_stream(Json(body): Json<Value>) -> Response {
    let prompt = body["user_prompt"].as_str().unwrap_or_default().to_string();
    let chunks: Vec<&'static str> = if prompt.contains("Ranchi") {
        vec!["Day 1: Ranchi Hill. ", "Day 2: Patratu Valley."]
    } else if prompt.contains("Jaipur") {
        vec!["Day 1: India Gate, Delhi. ", "Day 2: Hawa Mahal, Jaipur."]
    } else if prompt.contains("Agra") {
        vec!["Day 1: Agra Fort. ", "Day 2: Taj Mahal."]
    } else if prompt.contains("slow") {
        vec!["Day 1: first stop", " and never more"]
    } else if prompt.contains("broken") {
        return (
            StatusCode::BAD_GATEWAY,
            Json(json!({"kind": "upstream", "upstreamStatus": 500, "message": "generator down"})),
        )
            .into_response();
    } else {
        vec!["Day 1: rest at home."]
    };

    // The slow prompt stalls after its first chunk
    let delay = if prompt.contains("slow") {
        Duration::from_secs(30)
    } else {
        Duration::from_millis(5)
    };
    let body = if prompt.contains("slow") {
        let first = chunks[0];
        let rest = chunks[1];
        axum::body::Body::from_stream(futures::stream::unfold(0u8, move |state| async move {
            match state {
                0 => Some((Ok::<_, std::convert::Infallible>(bytes::Bytes::from_static(first.as_bytes())), 1)),
                1 => {
                    tokio::time::sleep(delay).await;
                    Some((Ok(bytes::Bytes::from_static(rest.as_bytes())), 2))
                }
                _ => None,
            }
        }))
    } else {
        chunked_body(chunks, delay)
    };
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

async fn fake_multi(
    State(backends): State<Arc<Backends>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let path = query.get("path").cloned().unwrap_or_default();
    backends.multi_paths.lock().await.push(path.clone());
    if path.contains("78.04") {
        return (
            StatusCode::BAD_GATEWAY,
            Json(json!({"kind": "upstream", "upstreamStatus": 502, "message": "routing engine unavailable"})),
        )
            .into_response();
    }
    Json(two_leg_directions()).into_response()
}

async fn fake_place_details(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    Json(json!({
        "formatted_address": format!(
            "Near {}, {}",
            query.get("lat").cloned().unwrap_or_default(),
            query.get("lng").cloned().unwrap_or_default()
        )
    }))
}

async fn fake_extract(State(backends): State<Arc<Backends>>, Json(body): Json<Value>) -> Response {
    let itinerary = body["itinerary"].as_str().unwrap_or_default().to_string();
    backends.extraction_inputs.lock().await.push(itinerary.clone());

    let places = if itinerary.contains("Ranchi") {
        json!([
            {"name": "Ranchi Hill", "lat": "23.3441", "lon": "85.3096"},
            {"name": "Patratu Valley", "lat": null, "lon": "null"}
        ])
    } else if itinerary.contains("Jaipur") {
        json!({"places": [
            {"place": "India Gate", "lat": 28.61, "lng": 77.23},
            {"place": "Hawa Mahal", "lat": "26.91", "lng": "75.78"}
        ]})
    } else if itinerary.contains("Agra") {
        json!([
            {"name": "Agra Fort", "lat": 27.18, "lon": 78.02},
            {"name": "Taj Mahal", "lat": 27.17, "lon": 78.04}
        ])
    } else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "extraction crashed").into_response();
    };
    Json(places).into_response()
}

struct Fixture {
    config: PlannerConfig,
    backends: Arc<Backends>,
}

async fn fixture() -> Fixture {
    let backends = Arc::new(Backends::default());
    let proxy = Router::new()
        .route("/stream-itinerary", post(fake_stream))
        .route("/api/get-directions-multi", get(fake_multi))
        .route("/api/get-place-details", get(fake_place_details))
        .with_state(backends.clone());
    let extraction = Router::new()
        .route("/extract-locations", post(fake_extract))
        .with_state(backends.clone());

    let proxy_url = spawn(proxy).await;
    let extraction_url = format!("{}/extract-locations", spawn(extraction).await);
    Fixture {
        config: PlannerConfig {
            proxy_url,
            extraction_url,
            request_timeout: Duration::from_secs(5),
        },
        backends,
    }
}

#[tokio::test]
async fn single_location_recenters_without_a_route_request() {
    let fx = fixture().await;
    let mut planner = TripPlanner::new(&fx.config).unwrap();

    let view = planner.plan("3 day trip to Ranchi").await.clone();
    assert_eq!(view.stage, PipelineStage::Rendered);
    assert_eq!(view.itinerary, "Day 1: Ranchi Hill. Day 2: Patratu Valley.");
    assert_eq!(view.locations.len(), 1);
    assert_eq!(view.locations[0].place, "Ranchi Hill");
    assert!(view.route.is_none());
    assert!(view.notice.is_none());

    assert!(fx.backends.multi_paths.lock().await.is_empty());
    assert_eq!(planner.scene().markers().len(), 1);
    assert!(planner.scene().route().is_none());
    match planner.scene().view() {
        MapView::Center { position, .. } => {
            assert!((position.x() - 85.3096).abs() < 1e-9);
            assert!((position.y() - 23.3441).abs() < 1e-9);
        }
        other => panic!("expected a centered map, got {:?}", other),
    }
}

#[tokio::test]
async fn two_locations_are_routed_in_order_with_all_leg_steps() {
    let fx = fixture().await;
    let mut planner = TripPlanner::new(&fx.config).unwrap();

    let view = planner.plan("2 days from Delhi to Jaipur").await.clone();
    assert!(view.notice.is_none());
    assert_eq!(
        *fx.backends.multi_paths.lock().await,
        vec!["77.23,28.61;75.78,26.91".to_string()]
    );

    let route = view.route.expect("route");
    let names: Vec<&str> = route.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Rajpath", "NH48", "NH48", "Hawa Mahal Rd", ""]);
    assert_eq!(route.total_distance_meters, 281400.0);

    let lines = render_turn_list(&route);
    assert_eq!(lines.len(), route.steps.len() + 1);
    assert!(lines[0].starts_with("1. "));

    assert_eq!(planner.scene().markers().len(), 2);
    assert!(planner.scene().route().is_some());
    assert!(matches!(planner.scene().view(), MapView::FitBounds(_)));
}

#[tokio::test]
async fn next_prompt_starts_from_an_idle_map() {
    let fx = fixture().await;
    let mut planner = TripPlanner::new(&fx.config).unwrap();

    planner.plan("2 days from Delhi to Jaipur").await;
    assert!(matches!(planner.scene().view(), MapView::FitBounds(_)));

    let view = planner.plan("stay home").await.clone();
    assert_eq!(view.notice, Some(Notice::NoTripYet));
    assert!(view.route.is_none());
    assert!(planner.scene().markers().is_empty());
    assert!(planner.scene().route().is_none());
    assert_eq!(*planner.scene().view(), MapView::Default);
}

#[tokio::test]
async fn route_failure_keeps_markers() {
    let fx = fixture().await;
    let mut planner = TripPlanner::new(&fx.config).unwrap();

    let view = planner.plan("Agra weekend").await.clone();
    assert_eq!(view.locations.len(), 2);
    assert!(view.route.is_none());
    match &view.notice {
        Some(Notice::RouteUnavailable(reason)) => {
            assert!(reason.contains("routing engine unavailable"))
        }
        other => panic!("expected a route notice, got {:?}", other),
    }
    assert_eq!(planner.scene().markers().len(), 2);
    assert!(planner.scene().route().is_none());
}

#[tokio::test]
async fn extraction_failure_shows_no_trip() {
    let fx = fixture().await;
    let mut planner = TripPlanner::new(&fx.config).unwrap();

    let view = planner.plan("stay home").await.clone();
    assert_eq!(view.itinerary, "Day 1: rest at home.");
    assert_eq!(view.notice, Some(Notice::NoTripYet));
    assert!(view.locations.is_empty());
    assert!(planner.scene().markers().is_empty());
    assert_eq!(fx.backends.extraction_inputs.lock().await.len(), 1);
}

#[tokio::test]
async fn failed_generation_apologizes_and_skips_extraction() {
    let fx = fixture().await;
    let mut planner = TripPlanner::new(&fx.config).unwrap();

    let view = planner.plan("broken prompt").await.clone();
    assert_eq!(view.notice, Some(Notice::ItineraryFailed));

    let transcript = planner.transcript();
    let transcript = transcript.lock().await;
    let last = transcript.last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.text, APOLOGY_MESSAGE);
    assert!(fx.backends.extraction_inputs.lock().await.is_empty());
}

#[tokio::test]
async fn streamed_text_grows_in_a_single_entry() {
    let fx = fixture().await;
    let mut planner = TripPlanner::new(&fx.config).unwrap();

    let mut snapshots = Vec::new();
    planner
        .plan_with_updates("2 days from Delhi to Jaipur", |t: &Transcript| {
            if let Some(entry) = t.in_progress() {
                snapshots.push(entry.text.clone());
            }
        })
        .await;

    assert_eq!(snapshots.first().map(String::as_str), Some(""));
    assert!(snapshots.windows(2).all(|w| w[1].starts_with(w[0].as_str())));
    let transcript = planner.transcript();
    let transcript = transcript.lock().await;
    assert_eq!(transcript.len(), 2);
    assert_eq!(
        transcript.messages()[1].text,
        "Day 1: India Gate, Delhi. Day 2: Hawa Mahal, Jaipur."
    );
    assert!(transcript.in_progress().is_none());
}

#[tokio::test]
async fn new_prompt_cancels_the_previous_stream() {
    let fx = fixture().await;
    let client = ProxyClient::new(&fx.config).unwrap();
    let consumer = Arc::new(ItineraryStreamConsumer::new(
        client,
        Arc::new(Mutex::new(Transcript::new())),
    ));

    let first = tokio::spawn({
        let consumer = consumer.clone();
        async move { consumer.stream_prompt("slow trip", |_| {}).await }
    });

    // Wait until the first chunk of the slow stream has landed
    let transcript = consumer.transcript();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let started = transcript
                .lock()
                .await
                .in_progress()
                .is_some_and(|m| m.text == "Day 1: first stop");
            if started {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let second = consumer.stream_prompt("Ranchi please", |_| {}).await;
    assert_eq!(second.status, StreamStatus::Completed);

    let first = tokio::time::timeout(Duration::from_secs(5), first)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.status, StreamStatus::Cancelled);
    assert_eq!(first.text, "Day 1: first stop");

    let transcript = transcript.lock().await;
    let texts: Vec<&str> = transcript.messages().iter().map(|m| m.text.as_str()).collect();
    assert_eq!(
        texts,
        vec![
            "slow trip",
            "Day 1: first stop",
            "Ranchi please",
            "Day 1: Ranchi Hill. Day 2: Patratu Valley."
        ]
    );
}

#[tokio::test]
async fn clicked_marker_opens_a_card_with_place_details() {
    let fx = fixture().await;
    let mut planner = TripPlanner::new(&fx.config).unwrap();
    planner.plan("2 days from Delhi to Jaipur").await;

    let client = ProxyClient::new(&fx.config).unwrap();
    let marker = planner.scene().markers()[1].clone();
    let details = client
        .place_details(marker.position.y(), marker.position.x())
        .await
        .ok();

    let card = planner
        .scene_mut()
        .open_card(
            1,
            ScreenPoint { x: 790.0, y: 590.0 },
            Size { width: 200.0, height: 120.0 },
            Size { width: 800.0, height: 600.0 },
            details,
        )
        .cloned()
        .unwrap();
    assert_eq!(card.place, "Hawa Mahal");
    assert_eq!(card.address(), Some("Near 26.91, 75.78"));
    // Flipped to stay inside the viewport
    assert!(card.position.x + 200.0 <= 800.0);
    assert!(card.position.y + 120.0 <= 600.0);
}
