//! GeoJSON data layer and rendering of feature data for popups.

use geojson::Feature;
use maybe_sync::{MaybeSend, MaybeSync};
use serde::Serialize;
use serde_json::Value;

use super::shape::Path;
use crate::error::SyncError;

/// GeoJSON features together with the options to display them.
///
/// The `*_func_name` fields name functions that exist on the remote side. They are called by the
/// engine while features are added, so keep them cheap.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoJsonDataLayer {
    /// GeoJSON feature or feature collection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo_json_data: Option<String>,
    /// `function(geoJsonPoint, latlng, layerReference)` creating the layer for a point feature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point_to_layer_func_name: Option<String>,
    /// `function(feature, layer, layerReference)` called once for each created feature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_each_feature_func_name: Option<String>,
    /// Style of lines and polygons.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<Path>,
    /// `function(geoJsonFeature, layerReference)` deciding whether a feature is shown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_func_name: Option<String>,
    /// `function(coords)` converting GeoJSON coordinates into a `LatLng`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coords_to_lat_lng_func_name: Option<String>,
    /// Whether default markers of point features inherit group options.
    pub markers_inherit_options: bool,
}

impl Default for GeoJsonDataLayer {
    fn default() -> Self {
        Self {
            geo_json_data: None,
            point_to_layer_func_name: None,
            on_each_feature_func_name: None,
            style: None,
            filter_func_name: None,
            coords_to_lat_lng_func_name: None,
            markers_inherit_options: true,
        }
    }
}

impl GeoJsonDataLayer {
    /// Creates a layer with the given GeoJSON document.
    pub fn new(geo_json_data: impl Into<String>) -> Self {
        Self {
            geo_json_data: Some(geo_json_data.into()),
            ..Default::default()
        }
    }
}

/// Renders the properties of a feature for display on the remote side.
pub trait FeatureRenderer: MaybeSend + MaybeSync {
    /// Returns the markup describing the feature.
    fn render(&self, feature: &Feature) -> String;
}

/// Renders every property as a `<br>key: value` line.
#[derive(Debug, Default, Clone, Copy)]
pub struct PropertyListRenderer;

impl FeatureRenderer for PropertyListRenderer {
    fn render(&self, feature: &Feature) -> String {
        let Some(properties) = &feature.properties else {
            return String::new();
        };

        let mut rendered = String::new();
        for (key, value) in properties {
            rendered.push_str("<br>");
            rendered.push_str(key);
            rendered.push_str(": ");
            match value {
                Value::String(s) => rendered.push_str(s),
                other => rendered.push_str(&other.to_string()),
            }
        }

        rendered
    }
}

/// Parses the serialized feature and renders it.
pub(crate) fn render_feature_data(
    renderer: &dyn FeatureRenderer,
    feature_data: &str,
) -> Result<String, SyncError> {
    let feature: Feature = serde_json::from_str(feature_data)?;
    Ok(renderer.render(&feature))
}

/// Checks that the data is a GeoJSON document.
pub(crate) fn validate_geojson(data: &str) -> Result<(), SyncError> {
    serde_json::from_str::<geojson::GeoJson>(data)?;
    Ok(())
}
