#![allow(dead_code)]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::Response;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::time::Duration;

/// Serve `app` on an ephemeral local port and return its base URL
pub async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Streaming body that yields each chunk after `delay`
pub fn chunked_body(chunks: Vec<&'static str>, delay: Duration) -> Body {
    let stream = futures::stream::iter(chunks).then(move |chunk| async move {
        tokio::time::sleep(delay).await;
        Ok::<Bytes, Infallible>(Bytes::from_static(chunk.as_bytes()))
    });
    Body::from_stream(stream)
}

/// Directions response with two legs of two and three steps
pub fn two_leg_directions() -> Value {
    json!({
        "code": "Ok",
        "routes": [{
            "geometry": {"type": "LineString", "coordinates": [[77.23, 28.61], [76.9, 27.9], [75.78, 26.91]]},
            "distance": 281400.0,
            "duration": 18300.0,
            "legs": [
                {"steps": [
                    {"distance": 350.0, "duration": 40.0, "name": "Rajpath",
                     "maneuver": {"type": "depart", "modifier": "south"}},
                    {"distance": 140000.0, "duration": 9000.0, "name": "NH48",
                     "maneuver": {"type": "turn", "modifier": "right"}}
                ]},
                {"steps": [
                    {"distance": 140000.0, "duration": 9100.0, "name": "NH48",
                     "maneuver": {"type": "continue", "modifier": "straight"}},
                    {"distance": 1050.0, "duration": 160.0, "name": "Hawa Mahal Rd",
                     "maneuver": {"type": "turn", "modifier": "left"}},
                    {"distance": 0.0, "duration": 0.0, "name": "",
                     "maneuver": {"type": "arrive"}}
                ]}
            ]
        }]
    })
}
