//! Route data returned by the directions API, reduced to what the front end draws.

use geo::{BoundingRect, Coord, LineString, Rect};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::normalize::NormalizedLocation;

#[derive(Debug, Error, PartialEq)]
pub enum RouteParseError {
    #[error("directions response is not valid: {0}")]
    Malformed(String),

    #[error("provider found no route ({0})")]
    NoRoute(String),
}

/// GeoJSON LineString
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<[f64; 2]>,
}

impl RouteGeometry {
    pub fn line_string(&self) -> LineString<f64> {
        self.coordinates
            .iter()
            .map(|[x, y]| Coord { x: *x, y: *y })
            .collect()
    }

    /// Bounding rectangle used to fit the map view to the route
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.line_string().bounding_rect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub instruction: String,
    pub maneuver_type: String,
    pub maneuver_modifier: Option<String>,
    pub distance_meters: f64,
    pub duration_seconds: f64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResult {
    pub geometry: RouteGeometry,
    pub total_distance_meters: f64,
    pub total_duration_seconds: f64,
    /// Steps of every leg, in leg order
    pub steps: Vec<Step>,
}

#[derive(Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    routes: Vec<UpstreamRoute>,
}

#[derive(Deserialize)]
struct UpstreamRoute {
    geometry: RouteGeometry,
    distance: f64,
    duration: f64,
    #[serde(default)]
    legs: Vec<UpstreamLeg>,
}

#[derive(Deserialize)]
struct UpstreamLeg {
    #[serde(default)]
    steps: Vec<UpstreamStep>,
}

#[derive(Deserialize)]
struct UpstreamStep {
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    name: String,
    maneuver: UpstreamManeuver,
}

#[derive(Deserialize)]
struct UpstreamManeuver {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    modifier: Option<String>,
    #[serde(default)]
    instruction: Option<String>,
}

/// `lng,lat` pairs joined by `;`, in the given order
pub fn build_path(locations: &[NormalizedLocation]) -> String {
    locations
        .iter()
        .map(|l| format!("{},{}", l.lng, l.lat))
        .collect::<Vec<String>>()
        .join(";")
}

impl RouteResult {
    /// Take the first route of a directions response and flatten its legs
    pub fn from_directions(body: &Value) -> Result<Self, RouteParseError> {
        let response: DirectionsResponse = serde_json::from_value(body.clone())
            .map_err(|e| RouteParseError::Malformed(e.to_string()))?;

        if let Some(code) = response.code.as_deref() {
            if !code.eq_ignore_ascii_case("ok") {
                return Err(RouteParseError::NoRoute(code.to_string()));
            }
        }
        let route = response
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| RouteParseError::NoRoute("empty route list".into()))?;

        let steps = route
            .legs
            .into_iter()
            .flat_map(|leg| leg.steps)
            .map(|step| Step {
                instruction: step
                    .maneuver
                    .instruction
                    .clone()
                    .filter(|i| !i.trim().is_empty())
                    .unwrap_or_else(|| {
                        compose_instruction(
                            &step.maneuver.kind,
                            step.maneuver.modifier.as_deref(),
                            &step.name,
                        )
                    }),
                maneuver_type: step.maneuver.kind,
                maneuver_modifier: step.maneuver.modifier,
                distance_meters: step.distance,
                duration_seconds: step.duration,
                name: step.name,
            })
            .collect();

        Ok(RouteResult {
            geometry: route.geometry,
            total_distance_meters: route.distance,
            total_duration_seconds: route.duration,
            steps,
        })
    }
}

/// Readable instruction for a maneuver that came without one
fn compose_instruction(kind: &str, modifier: Option<&str>, road: &str) -> String {
    let onto = if road.is_empty() {
        String::new()
    } else {
        format!(" onto {}", road)
    };
    match (kind, modifier) {
        ("depart", Some(m)) => format!("Head {}{}", m, onto),
        ("depart", None) => format!("Start{}", onto),
        ("arrive", Some(m)) => format!("Arrive at your stop on the {}", m),
        ("arrive", None) => "Arrive at your stop".to_string(),
        ("turn", Some(m)) | ("end of road", Some(m)) => format!("Turn {}{}", m, onto),
        ("roundabout" | "rotary", _) => format!("Take the roundabout{}", onto),
        ("merge", _) => format!("Merge{}", onto),
        ("fork", Some(m)) => format!("Keep {} at the fork{}", m, onto),
        ("continue" | "new name", _) => format!("Continue{}", onto),
        (other, Some(m)) => format!("{} {}{}", capitalize(other), m, onto),
        (other, None) => format!("{}{}", capitalize(other), onto),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_leg_response() -> Value {
        json!({
            "code": "Ok",
            "routes": [{
                "geometry": {"type": "LineString", "coordinates": [[77.23, 28.61], [76.5, 27.8], [75.78, 26.91]]},
                "distance": 281000.0,
                "duration": 18000.0,
                "legs": [
                    {"steps": [
                        {"distance": 120.0, "duration": 30.0, "name": "Rajpath",
                         "maneuver": {"type": "depart", "modifier": "north"}},
                        {"distance": 150000.0, "duration": 9000.0, "name": "NH48",
                         "maneuver": {"type": "turn", "modifier": "left", "instruction": "Turn left onto NH48"}}
                    ]},
                    {"steps": [
                        {"distance": 130000.0, "duration": 8900.0, "name": "NH48",
                         "maneuver": {"type": "continue", "modifier": "straight"}},
                        {"distance": 880.0, "duration": 70.0, "name": "",
                         "maneuver": {"type": "arrive"}},
                        {"distance": 0.0, "duration": 0.0, "name": "",
                         "maneuver": {"type": "arrive", "modifier": "right"}}
                    ]}
                ]
            }]
        })
    }

    #[test]
    fn flattens_legs_in_order() {
        let route = RouteResult::from_directions(&two_leg_response()).unwrap();
        assert_eq!(route.steps.len(), 5);
        assert_eq!(route.total_distance_meters, 281000.0);
        assert_eq!(route.total_duration_seconds, 18000.0);

        let instructions: Vec<&str> = route.steps.iter().map(|s| s.instruction.as_str()).collect();
        assert_eq!(
            instructions,
            vec![
                "Head north onto Rajpath",
                "Turn left onto NH48",
                "Continue onto NH48",
                "Arrive at your stop",
                "Arrive at your stop on the right",
            ]
        );
        assert_eq!(route.steps[1].maneuver_modifier.as_deref(), Some("left"));
        assert_eq!(route.geometry.kind, "LineString");
    }

    #[test]
    fn no_route_codes_are_errors() {
        let err = RouteResult::from_directions(&json!({"code": "NoRoute", "routes": []})).unwrap_err();
        assert_eq!(err, RouteParseError::NoRoute("NoRoute".into()));

        let err = RouteResult::from_directions(&json!({"routes": []})).unwrap_err();
        assert!(matches!(err, RouteParseError::NoRoute(_)));

        let err = RouteResult::from_directions(&json!({"routes": "nope"})).unwrap_err();
        assert!(matches!(err, RouteParseError::Malformed(_)));
    }

    #[test]
    fn path_is_lng_lat_in_input_order() {
        let locations = vec![
            NormalizedLocation::new("Delhi", 28.61, 77.23),
            NormalizedLocation::new("Jaipur", 26.91, 75.78),
        ];
        assert_eq!(build_path(&locations), "77.23,28.61;75.78,26.91");
    }

    #[test]
    fn bounds_cover_the_geometry() {
        let route = RouteResult::from_directions(&two_leg_response()).unwrap();
        let bounds = route.geometry.bounds().unwrap();
        assert_eq!(bounds.min(), Coord { x: 75.78, y: 26.91 });
        assert_eq!(bounds.max(), Coord { x: 77.23, y: 28.61 });
    }
}
