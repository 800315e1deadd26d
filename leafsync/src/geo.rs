//! Geographic and screen value types exchanged with the remote side.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Geographic point in degrees.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
}

impl LatLng {
    /// Creates a new point.
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl From<(f64, f64)> for LatLng {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self::new(lat, lng)
    }
}

/// Point in screen (pixel) coordinates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Point {
    /// Creates a new point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rectangular geographic area.
///
/// Serialized with the `_southWest`/`_northEast` keys Leaflet uses for its `LatLngBounds`, so
/// values returned by `getBounds` can be read directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    /// South-west corner.
    #[serde(rename = "_southWest")]
    pub south_west: LatLng,
    /// North-east corner.
    #[serde(rename = "_northEast")]
    pub north_east: LatLng,
}

impl LatLngBounds {
    /// Creates bounds from two corners.
    pub const fn new(south_west: LatLng, north_east: LatLng) -> Self {
        Self {
            south_west,
            north_east,
        }
    }
}

impl Display for LatLngBounds {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "NE: {} N, {} E; SW: {} N, {} E",
            self.north_east.lat, self.north_east.lng, self.south_west.lat, self.south_west.lng
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn bounds_use_leaflet_field_names() {
        let value = json!({
            "_southWest": {"lat": 1.0, "lng": 2.0},
            "_northEast": {"lat": 3.0, "lng": 4.0},
        });
        let bounds: LatLngBounds = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(bounds.south_west, LatLng::new(1.0, 2.0));
        assert_eq!(bounds.north_east, LatLng::new(3.0, 4.0));
        assert_eq!(serde_json::to_value(bounds).unwrap(), value);
        assert_eq!(bounds.to_string(), "NE: 3 N, 4 E; SW: 1 N, 2 E");
    }
}
