use geo::{Point, Rect};
use serde_json::Value;

use crate::directions::{RouteGeometry, RouteResult};
use crate::normalize::NormalizedLocation;
use crate::resolver::RouteOutcome;

/// Distance between the marker and the card's nearest corner, in pixels
const CARD_OFFSET: f64 = 15.0;
/// Minimum gap between the card and the viewport edge, in pixels
const VIEWPORT_MARGIN: f64 = 10.0;
/// Zoom level used when the map is centered on a single stop
pub const SINGLE_STOP_ZOOM: u8 = 12;

pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{} m", meters.round() as i64)
    } else {
        format!("{:.1} km", meters / 1000.0)
    }
}

pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    match (hours, minutes) {
        (0, 0) => "Less than a minute".to_string(),
        (0, m) => format!("{} min", m),
        (h, m) => format!("{} hr {} min", h, m),
    }
}

/// Numbered turn-by-turn lines followed by a totals line
pub fn render_turn_list(route: &RouteResult) -> Vec<String> {
    let mut lines: Vec<String> = route
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            format!(
                "{}. {} ({})",
                i + 1,
                step.instruction,
                format_distance(step.distance_meters)
            )
        })
        .collect();
    lines.push(format!(
        "Total: {}, {}",
        format_distance(route.total_distance_meters),
        format_duration(route.total_duration_seconds)
    ));
    lines
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Top-left corner of a location card shown next to a marker.
///
/// The card opens below-right of the marker, flips left or up when that would
/// overflow the viewport, and is finally clamped inside the viewport margin.
pub fn card_position(marker: ScreenPoint, card: Size, viewport: Size) -> ScreenPoint {
    let mut left = marker.x + CARD_OFFSET;
    if left + card.width + VIEWPORT_MARGIN > viewport.width {
        left = marker.x - card.width - CARD_OFFSET;
    }

    let mut top = marker.y + CARD_OFFSET;
    if top + card.height + VIEWPORT_MARGIN > viewport.height {
        top = marker.y - card.height - CARD_OFFSET;
    }

    ScreenPoint {
        x: clamp_axis(left, card.width, viewport.width),
        y: clamp_axis(top, card.height, viewport.height),
    }
}

fn clamp_axis(value: f64, extent: f64, limit: f64) -> f64 {
    let max = (limit - extent - VIEWPORT_MARGIN).max(VIEWPORT_MARGIN);
    value.clamp(VIEWPORT_MARGIN, max)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub label: String,
    pub position: Point<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MapView {
    /// Provider default view, nothing placed yet
    Default,
    Center { position: Point<f64>, zoom: u8 },
    FitBounds(Rect<f64>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationCard {
    pub marker_index: usize,
    pub place: String,
    pub lat: f64,
    pub lng: f64,
    /// Reverse-geocoded details, when they could be fetched
    pub details: Option<Value>,
    pub position: ScreenPoint,
}

impl LocationCard {
    pub fn address(&self) -> Option<&str> {
        self.details
            .as_ref()?
            .get("formatted_address")
            .and_then(Value::as_str)
    }
}

/// Renderer-independent state of the trip map
#[derive(Debug, Clone, PartialEq)]
pub struct MapScene {
    markers: Vec<Marker>,
    route: Option<RouteGeometry>,
    view: MapView,
    card: Option<LocationCard>,
}

impl Default for MapScene {
    fn default() -> Self {
        Self::new()
    }
}

impl MapScene {
    pub fn new() -> Self {
        Self {
            markers: Vec::new(),
            route: None,
            view: MapView::Default,
            card: None,
        }
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn route(&self) -> Option<&RouteGeometry> {
        self.route.as_ref()
    }

    pub fn view(&self) -> &MapView {
        &self.view
    }

    pub fn card(&self) -> Option<&LocationCard> {
        self.card.as_ref()
    }

    /// Back to the idle map: no markers, route line or card, default view
    pub fn clear(&mut self) {
        self.markers.clear();
        self.route = None;
        self.card = None;
        self.view = MapView::Default;
    }

    /// Replace all markers with one per location
    pub fn show_locations(&mut self, locations: &[NormalizedLocation]) {
        self.clear();
        self.markers = locations
            .iter()
            .map(|l| Marker {
                label: l.place.clone(),
                position: l.point(),
            })
            .collect();
    }

    pub fn recenter(&mut self, position: Point<f64>, zoom: u8) {
        self.view = MapView::Center { position, zoom };
    }

    pub fn draw_route(&mut self, geometry: &RouteGeometry) {
        self.route = Some(geometry.clone());
        if let Some(bounds) = geometry.bounds() {
            self.view = MapView::FitBounds(bounds);
        }
    }

    /// Reflect a resolver outcome; markers already placed are left alone
    pub fn apply_route(&mut self, outcome: &RouteOutcome) {
        match outcome {
            RouteOutcome::Recenter(location) => {
                self.route = None;
                self.recenter(location.point(), SINGLE_STOP_ZOOM);
            }
            RouteOutcome::Routed(route) => self.draw_route(&route.geometry),
            RouteOutcome::NoValidLocations | RouteOutcome::Failed(_) => self.route = None,
            RouteOutcome::Superseded => {}
        }
    }

    /// Show the card for a clicked marker, replacing any open card
    pub fn open_card(
        &mut self,
        marker_index: usize,
        marker_screen: ScreenPoint,
        card_size: Size,
        viewport: Size,
        details: Option<Value>,
    ) -> Option<&LocationCard> {
        let marker = self.markers.get(marker_index)?;
        self.card = Some(LocationCard {
            marker_index,
            place: marker.label.clone(),
            lat: marker.position.y(),
            lng: marker.position.x(),
            details,
            position: card_position(marker_screen, card_size, viewport),
        });
        self.card.as_ref()
    }

    pub fn close_card(&mut self) {
        self.card = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directions::Step;
    use serde_json::json;

    const VIEWPORT: Size = Size {
        width: 1280.0,
        height: 800.0,
    };
    const CARD: Size = Size {
        width: 300.0,
        height: 200.0,
    };

    #[test]
    fn distances() {
        assert_eq!(format_distance(999.0), "999 m");
        assert_eq!(format_distance(1000.0), "1.0 km");
        assert_eq!(format_distance(0.4), "0 m");
        assert_eq!(format_distance(12345.0), "12.3 km");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(25200.0), "7 hr 0 min");
        assert_eq!(format_duration(90.0), "1 min");
        assert_eq!(format_duration(30.0), "Less than a minute");
        assert_eq!(format_duration(3725.0), "1 hr 2 min");
        assert_eq!(format_duration(-5.0), "Less than a minute");
    }

    #[test]
    fn card_opens_below_right_when_it_fits() {
        let pos = card_position(ScreenPoint { x: 100.0, y: 100.0 }, CARD, VIEWPORT);
        assert_eq!(pos, ScreenPoint { x: 115.0, y: 115.0 });
    }

    #[test]
    fn card_flips_near_right_and_bottom_edges() {
        let pos = card_position(ScreenPoint { x: 1200.0, y: 700.0 }, CARD, VIEWPORT);
        assert_eq!(pos, ScreenPoint { x: 885.0, y: 485.0 });
    }

    #[test]
    fn card_is_clamped_inside_margin() {
        // Flipping left would push it off the left edge
        let tiny = Size {
            width: 320.0,
            height: 240.0,
        };
        let pos = card_position(ScreenPoint { x: 160.0, y: 120.0 }, CARD, tiny);
        assert_eq!(pos, ScreenPoint { x: 10.0, y: 10.0 });
    }

    fn route() -> RouteResult {
        RouteResult {
            geometry: RouteGeometry {
                kind: "LineString".into(),
                coordinates: vec![[77.23, 28.61], [75.78, 26.91]],
            },
            total_distance_meters: 281000.0,
            total_duration_seconds: 18060.0,
            steps: vec![Step {
                instruction: "Turn left onto NH48".into(),
                maneuver_type: "turn".into(),
                maneuver_modifier: Some("left".into()),
                distance_meters: 850.0,
                duration_seconds: 60.0,
                name: "NH48".into(),
            }],
        }
    }

    #[test]
    fn turn_list_has_numbered_steps_and_totals() {
        assert_eq!(
            render_turn_list(&route()),
            vec![
                "1. Turn left onto NH48 (850 m)".to_string(),
                "Total: 281.0 km, 5 hr 1 min".to_string(),
            ]
        );
    }

    #[test]
    fn new_locations_replace_old_overlay() {
        let mut scene = MapScene::new();
        scene.show_locations(&[
            NormalizedLocation::new("India Gate", 28.61, 77.23),
            NormalizedLocation::new("Hawa Mahal", 26.91, 75.78),
        ]);
        scene.apply_route(&RouteOutcome::Routed(route()));
        assert!(scene.route().is_some());
        assert!(matches!(scene.view(), MapView::FitBounds(_)));

        scene.show_locations(&[NormalizedLocation::new("Ranchi Hill", 23.34, 85.31)]);
        assert_eq!(scene.markers().len(), 1);
        assert!(scene.route().is_none());
    }

    #[test]
    fn clearing_drops_the_fitted_view() {
        let mut scene = MapScene::new();
        scene.show_locations(&[
            NormalizedLocation::new("India Gate", 28.61, 77.23),
            NormalizedLocation::new("Hawa Mahal", 26.91, 75.78),
        ]);
        scene.apply_route(&RouteOutcome::Routed(route()));
        assert!(matches!(scene.view(), MapView::FitBounds(_)));

        scene.clear();
        assert_eq!(scene, MapScene::new());
    }

    #[test]
    fn failed_route_keeps_markers() {
        let mut scene = MapScene::new();
        scene.show_locations(&[
            NormalizedLocation::new("India Gate", 28.61, 77.23),
            NormalizedLocation::new("Hawa Mahal", 26.91, 75.78),
        ]);
        scene.apply_route(&RouteOutcome::Failed("timeout".into()));
        assert_eq!(scene.markers().len(), 2);
        assert!(scene.route().is_none());
    }

    #[test]
    fn only_one_card_at_a_time() {
        let mut scene = MapScene::new();
        scene.show_locations(&[
            NormalizedLocation::new("India Gate", 28.61, 77.23),
            NormalizedLocation::new("Hawa Mahal", 26.91, 75.78),
        ]);

        scene.open_card(0, ScreenPoint { x: 50.0, y: 50.0 }, CARD, VIEWPORT, None);
        let card = scene
            .open_card(
                1,
                ScreenPoint { x: 60.0, y: 60.0 },
                CARD,
                VIEWPORT,
                Some(json!({"formatted_address": "Hawa Mahal Rd, Jaipur"})),
            )
            .unwrap();
        assert_eq!(card.place, "Hawa Mahal");
        assert_eq!(card.address(), Some("Hawa Mahal Rd, Jaipur"));
        assert_eq!(scene.card().unwrap().marker_index, 1);

        assert!(scene.open_card(7, ScreenPoint { x: 0.0, y: 0.0 }, CARD, VIEWPORT, None).is_none());
    }
}
