//! Raster and file based layers.

use serde::Serialize;

use super::shape::Path;
use crate::geo::LatLng;

/// Tiles loaded from a url template, e.g. `https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TileLayer {
    /// Url template of the tiles.
    pub url_template: String,
    /// Attribution text shown in the attribution control.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
    /// Minimum zoom level the layer is displayed at.
    pub min_zoom: f64,
    /// Maximum zoom level the layer is displayed at.
    pub max_zoom: f64,
    /// Tile size in pixels.
    pub tile_size: u32,
    /// Values substituted for `{s}` in the template.
    pub subdomains: Vec<String>,
    /// Url of the image shown in place of tiles that failed to load.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_tile_url: Option<String>,
    /// Offset added to the zoom number used in tile urls.
    pub zoom_offset: i32,
    /// Inverses the Y axis numbering of tiles.
    pub tms: bool,
    /// Requests higher zoom tiles on high resolution displays.
    pub detect_retina: bool,
    /// Opacity of the tiles.
    pub opacity: f64,
}

impl TileLayer {
    /// Creates a tile layer with default options.
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            attribution: None,
            min_zoom: 0.0,
            max_zoom: 18.0,
            tile_size: 256,
            subdomains: vec!["a".into(), "b".into(), "c".into()],
            error_tile_url: None,
            zoom_offset: 0,
            tms: false,
            detect_retina: false,
            opacity: 1.0,
        }
    }

    /// OpenStreetMap standard tiles.
    pub fn osm() -> Self {
        Self::new("https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png").with_attribution(
            "&copy; <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a> contributors",
        )
    }

    /// Sets the attribution text.
    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        self.attribution = Some(attribution.into());
        self
    }
}

/// Raster tile set served from a single MBTiles file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MbTilesLayer {
    /// Url of the MBTiles file.
    pub url: String,
    /// Attribution text shown in the attribution control.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
    /// Minimum zoom level the layer is displayed at.
    pub min_zoom: f64,
    /// Maximum zoom level the layer is displayed at.
    pub max_zoom: f64,
}

impl MbTilesLayer {
    /// Creates a layer reading the file at the url.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            attribution: None,
            min_zoom: 0.0,
            max_zoom: 18.0,
        }
    }
}

/// Vector features loaded from a zipped shapefile.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapefileLayer {
    /// Url of the zipped shapefile.
    pub url: String,
    /// Style of the loaded features.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<Path>,
}

impl ShapefileLayer {
    /// Creates a layer reading the file at the url.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            style: None,
        }
    }
}

/// Single image stretched over a geographic area.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageLayer {
    /// Url of the image.
    pub url: String,
    /// First corner of the covered area.
    pub corner1: LatLng,
    /// Opposite corner of the covered area.
    pub corner2: LatLng,
    /// Opacity of the image.
    pub opacity: f64,
    /// Alternative text of the image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    /// Whether the image raises mouse events.
    pub interactive: bool,
    /// Url of the image shown if the image fails to load.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_overlay_url: Option<String>,
    /// Z-index of the overlay.
    pub z_index: i32,
    /// Custom CSS class of the element.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

impl ImageLayer {
    /// Creates an overlay between the two corners.
    pub fn new(url: impl Into<String>, corner1: LatLng, corner2: LatLng) -> Self {
        Self {
            url: url.into(),
            corner1,
            corner2,
            opacity: 1.0,
            alt: None,
            interactive: false,
            error_overlay_url: None,
            z_index: 1,
            class_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn tile_layer_payload_is_camel_case() {
        let value = serde_json::to_value(TileLayer::osm()).unwrap();
        assert_eq!(
            value["urlTemplate"],
            json!("https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png")
        );
        assert_eq!(value["tileSize"], json!(256));
        assert!(value.get("errorTileUrl").is_none());
    }
}
