//! Markers and vector shapes.

use serde::Serialize;

use crate::geo::{LatLng, LatLngBounds, Point};

/// Stroke and fill options of vector shapes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Path {
    /// Whether to draw the outline.
    pub stroke: bool,
    /// Outline color (CSS color).
    pub stroke_color: String,
    /// Outline width in pixels.
    pub stroke_width: f64,
    /// Outline opacity.
    pub stroke_opacity: f64,
    /// Shape used at the end of the outline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_cap: Option<String>,
    /// Shape used at the corners of the outline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_join: Option<String>,
    /// Dash pattern of the outline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dash_array: Option<String>,
    /// Distance into the dash pattern to start the dash.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dash_offset: Option<String>,
    /// Whether to fill the shape.
    pub fill: bool,
    /// Fill color (CSS color).
    pub fill_color: String,
    /// Fill opacity.
    pub fill_opacity: f64,
    /// Rule determining the inside of the shape.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_rule: Option<String>,
    /// Custom CSS class of the element.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// Whether the shape raises mouse events.
    pub interactive: bool,
}

impl Default for Path {
    fn default() -> Self {
        Self {
            stroke: true,
            stroke_color: "#3388ff".into(),
            stroke_width: 3.0,
            stroke_opacity: 1.0,
            line_cap: None,
            line_join: None,
            dash_array: None,
            dash_offset: None,
            fill: true,
            fill_color: "#3388ff".into(),
            fill_opacity: 0.2,
            fill_rule: None,
            class_name: None,
            interactive: true,
        }
    }
}

/// Marker icon image.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Icon {
    /// Url of the icon image.
    pub url: String,
    /// Size of the image in pixels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<Point>,
    /// Point of the image placed at the marker position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<Point>,
    /// Url of the shadow image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow_url: Option<String>,
    /// CSS class of the icon element.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

impl Icon {
    /// Creates an icon with the image at the url.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            size: None,
            anchor: None,
            shadow_url: None,
            class_name: None,
        }
    }
}

/// Icon placed at a geographic position.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    /// Position of the marker.
    pub position: LatLng,
    /// Custom icon; the engine's default icon is used if not set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<Icon>,
    /// Browser tooltip shown on hover.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Alternative text of the icon image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    /// Whether the marker can be dragged.
    pub draggable: bool,
    /// Whether the marker is reachable with the keyboard.
    pub keyboard: bool,
    /// Opacity of the marker.
    pub opacity: f64,
    /// Offset added to the marker's z-index.
    pub z_index_offset: i32,
    /// Whether the marker is brought on top when hovered.
    pub rise_on_hover: bool,
}

impl Marker {
    /// Creates a marker with default options.
    pub fn new(position: impl Into<LatLng>) -> Self {
        Self {
            position: position.into(),
            icon: None,
            title: None,
            alt: None,
            draggable: false,
            keyboard: true,
            opacity: 1.0,
            z_index_offset: 0,
            rise_on_hover: false,
        }
    }

    /// Sets the hover title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets a custom icon.
    pub fn with_icon(mut self, icon: Icon) -> Self {
        self.icon = Some(icon);
        self
    }
}

/// Axis aligned rectangle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rectangle {
    /// Area covered by the rectangle.
    pub shape: LatLngBounds,
    /// Style.
    #[serde(flatten)]
    pub path: Path,
}

impl Rectangle {
    /// Creates a rectangle with the default style.
    pub fn new(shape: LatLngBounds) -> Self {
        Self {
            shape,
            path: Path::default(),
        }
    }
}

/// Circle with radius in meters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Circle {
    /// Center of the circle.
    pub position: LatLng,
    /// Radius in meters.
    pub radius: f64,
    /// Style.
    #[serde(flatten)]
    pub path: Path,
}

impl Circle {
    /// Creates a circle with the default style.
    pub fn new(position: impl Into<LatLng>, radius: f64) -> Self {
        Self {
            position: position.into(),
            radius,
            path: Path::default(),
        }
    }
}

/// Line through a sequence of points. Multiple rings make a multi-polyline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Polyline {
    /// Rings of points.
    pub shape: Vec<Vec<LatLng>>,
    /// Amount of simplification on each zoom level.
    pub smooth_factor: f64,
    /// Disables clipping of the line to the view.
    pub no_clip: bool,
    /// Style.
    #[serde(flatten)]
    pub path: Path,
}

impl Polyline {
    /// Creates a single line with the default style. Lines are not filled by default.
    pub fn new(points: Vec<LatLng>) -> Self {
        Self {
            shape: vec![points],
            smooth_factor: 1.0,
            no_clip: false,
            path: Path {
                fill: false,
                ..Path::default()
            },
        }
    }
}

/// Closed area. The first ring is the outline, the following rings are holes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Polygon {
    /// Rings of points.
    pub shape: Vec<Vec<LatLng>>,
    /// Amount of simplification on each zoom level.
    pub smooth_factor: f64,
    /// Disables clipping of the polygon to the view.
    pub no_clip: bool,
    /// Style.
    #[serde(flatten)]
    pub path: Path,
}

impl Polygon {
    /// Creates a polygon from rings with the default style.
    pub fn new(rings: Vec<Vec<LatLng>>) -> Self {
        Self {
            shape: rings,
            smooth_factor: 1.0,
            no_clip: false,
            path: Path::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn circle_flattens_style() {
        let circle = Circle::new((1.0, 2.0), 50.0);
        let value = serde_json::to_value(&circle).unwrap();
        assert_eq!(value["position"], json!({"lat": 1.0, "lng": 2.0}));
        assert_eq!(value["radius"], json!(50.0));
        assert_eq!(value["strokeColor"], json!("#3388ff"));
        assert!(value.get("path").is_none());
        assert!(value.get("lineCap").is_none());
    }

    #[test]
    fn polyline_is_not_filled() {
        let line = Polyline::new(vec![LatLng::new(0.0, 0.0), LatLng::new(1.0, 1.0)]);
        assert!(!line.path.fill);
        assert_eq!(line.shape.len(), 1);
    }
}
