use geo::Point;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::extraction::{GeocodedPlace, RawCoordinate};

/// A place with usable coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedLocation {
    pub place: String,
    pub lat: f64,
    pub lng: f64,
}

impl NormalizedLocation {
    pub fn new(place: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            place: place.into(),
            lat,
            lng,
        }
    }

    /// Map point, x = longitude
    pub fn point(&self) -> Point<f64> {
        Point::new(self.lng, self.lat)
    }
}

impl RawCoordinate {
    /// Finite numeric value, if there is one
    pub fn value(&self) -> Option<f64> {
        let v = match self {
            RawCoordinate::Number(v) => *v,
            RawCoordinate::Text(s) => {
                let s = s.trim();
                if s == "null" {
                    return None;
                }
                s.parse::<f64>().ok()?
            }
        };
        v.is_finite().then_some(v)
    }
}

/// Keep places whose latitude and longitude both parse to finite numbers.
///
/// Order is preserved and nothing is deduplicated: a place visited on two
/// different days appears twice.
pub fn normalize_locations(places: &[GeocodedPlace]) -> Vec<NormalizedLocation> {
    places
        .iter()
        .filter_map(|place| {
            let lat = place.latitude.as_ref().and_then(RawCoordinate::value);
            let lng = place.longitude.as_ref().and_then(RawCoordinate::value);
            match (lat, lng) {
                (Some(lat), Some(lng)) => Some(NormalizedLocation::new(place.name.clone(), lat, lng)),
                _ => {
                    debug!("Dropping '{}' without usable coordinates", place.name);
                    None
                }
            }
        })
        .collect()
}
