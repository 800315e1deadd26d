//! Layers are the renderable elements of a map: markers, shapes, tile sources and data overlays.
//!
//! A [`Layer`] is a shared handle. Cloning it gives another handle to the same layer, so the
//! handle kept by the application, the one stored in the map's collection and the one the
//! reference table resolves callbacks to all see the same state and subscribers.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use crate::error::SyncError;
use crate::event::{EventHandler, EventKind, EventSource, MapEvent, SubscriptionId};
use crate::geo::Point;
use crate::id::LayerId;

mod geojson_data;
mod shape;
mod tile;

pub use geojson_data::{FeatureRenderer, GeoJsonDataLayer, PropertyListRenderer};
pub(crate) use geojson_data::validate_geojson;
pub use shape::{Circle, Icon, Marker, Path, Polygon, Polyline, Rectangle};
pub use tile::{ImageLayer, MbTilesLayer, ShapefileLayer, TileLayer};

/// Callback the remote side uses to ask a GeoJSON layer for the description of a feature.
pub const FEATURE_DATA_CALLBACK: &str = "GetFeatureData";

/// Popup attached to a layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Popup {
    /// HTML content.
    pub content: String,
    /// Maximum width in pixels.
    pub max_width: f64,
    /// Minimum width in pixels.
    pub min_width: f64,
    /// Maximum height in pixels; the content scrolls if it is higher.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_height: Option<f64>,
    /// Pans the map to fit the opened popup.
    pub auto_pan: bool,
    /// Shows the close button.
    pub close_button: bool,
    /// Closes the popup when another one is opened.
    pub auto_close: bool,
    /// Custom CSS class of the popup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

impl Popup {
    /// Creates a popup with default options.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            max_width: 300.0,
            min_width: 50.0,
            max_height: None,
            auto_pan: true,
            close_button: true,
            auto_close: true,
            class_name: None,
        }
    }
}

/// Tooltip attached to a layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tooltip {
    /// HTML content.
    pub content: String,
    /// Offset of the tooltip from the anchor, in pixels.
    pub offset: Point,
    /// Direction to open the tooltip in: `right`, `left`, `top`, `bottom`, `center` or `auto`.
    pub direction: String,
    /// Keeps the tooltip open permanently.
    pub permanent: bool,
    /// Makes the tooltip follow the pointer.
    pub sticky: bool,
    /// Opacity of the tooltip.
    pub opacity: f64,
    /// Custom CSS class of the tooltip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

impl Tooltip {
    /// Creates a tooltip with default options.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            offset: Point::new(0.0, 0.0),
            direction: "auto".into(),
            permanent: false,
            sticky: false,
            opacity: 0.9,
            class_name: None,
        }
    }
}

/// Variant data of a layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LayerKind {
    /// Url template tiles.
    Tile(TileLayer),
    /// Raster tiles from an MBTiles file.
    MbTiles(MbTilesLayer),
    /// Zipped shapefile.
    Shapefile(ShapefileLayer),
    /// Marker.
    Marker(Marker),
    /// Rectangle.
    Rectangle(Rectangle),
    /// Circle.
    Circle(Circle),
    /// Polygon.
    Polygon(Polygon),
    /// Polyline.
    Polyline(Polyline),
    /// Image overlay.
    Image(ImageLayer),
    /// GeoJSON data.
    GeoJson(GeoJsonDataLayer),
}

impl LayerKind {
    /// Name of the variant, used in error messages and logs.
    pub fn name(&self) -> &'static str {
        match self {
            LayerKind::Tile(_) => "tile",
            LayerKind::MbTiles(_) => "mbtiles",
            LayerKind::Shapefile(_) => "shapefile",
            LayerKind::Marker(_) => "marker",
            LayerKind::Rectangle(_) => "rectangle",
            LayerKind::Circle(_) => "circle",
            LayerKind::Polygon(_) => "polygon",
            LayerKind::Polyline(_) => "polyline",
            LayerKind::Image(_) => "image",
            LayerKind::GeoJson(_) => "geojson",
        }
    }
}

macro_rules! layer_kind_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for LayerKind {
                fn from(value: $ty) -> Self {
                    LayerKind::$variant(value)
                }
            }
        )*
    };
}

layer_kind_from!(
    Tile(TileLayer),
    MbTiles(MbTilesLayer),
    Shapefile(ShapefileLayer),
    Marker(Marker),
    Rectangle(Rectangle),
    Circle(Circle),
    Polygon(Polygon),
    Polyline(Polyline),
    Image(ImageLayer),
    GeoJson(GeoJsonDataLayer),
);

/// Mutable state of a layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerState {
    /// Attached popup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popup: Option<Popup>,
    /// Attached tooltip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<Tooltip>,
    /// Variant data.
    #[serde(flatten)]
    pub kind: LayerKind,
}

#[derive(Serialize)]
struct LayerPayload<'a> {
    id: &'a LayerId,
    #[serde(flatten)]
    state: &'a LayerState,
}

struct LayerInner {
    id: LayerId,
    state: RwLock<LayerState>,
    events: EventSource,
    feature_renderer: RwLock<Arc<dyn FeatureRenderer>>,
}

/// Shared handle to a layer.
#[derive(Clone)]
pub struct Layer {
    inner: Arc<LayerInner>,
}

impl Debug for Layer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.inner.id)
            .field("kind", &self.kind_name())
            .finish()
    }
}

impl Layer {
    /// Creates a layer with a new random id.
    pub fn new(kind: impl Into<LayerKind>) -> Self {
        Self::with_id(LayerId::generate(), kind)
    }

    /// Creates a layer with the given id.
    pub fn with_id(id: impl Into<LayerId>, kind: impl Into<LayerKind>) -> Self {
        Self {
            inner: Arc::new(LayerInner {
                id: id.into(),
                state: RwLock::new(LayerState {
                    popup: None,
                    tooltip: None,
                    kind: kind.into(),
                }),
                events: EventSource::new(),
                feature_renderer: RwLock::new(Arc::new(PropertyListRenderer)),
            }),
        }
    }

    /// Attaches the popup.
    pub fn with_popup(self, popup: Popup) -> Self {
        self.set_popup(Some(popup));
        self
    }

    /// Attaches the tooltip.
    pub fn with_tooltip(self, tooltip: Tooltip) -> Self {
        self.set_tooltip(Some(tooltip));
        self
    }

    /// Id of the layer.
    pub fn id(&self) -> &LayerId {
        &self.inner.id
    }

    /// Variant name of the layer.
    pub fn kind_name(&self) -> &'static str {
        self.inner.state.read().kind.name()
    }

    /// Snapshot of the layer state.
    pub fn state(&self) -> LayerState {
        self.inner.state.read().clone()
    }

    /// Copy of the variant data.
    pub fn kind(&self) -> LayerKind {
        self.inner.state.read().kind.clone()
    }

    /// Changes the variant data in place.
    ///
    /// The remote layer is not updated: call [`Map::update_shape`](crate::Map::update_shape) for
    /// shapes afterwards.
    pub fn modify<R>(&self, f: impl FnOnce(&mut LayerKind) -> R) -> R {
        f(&mut self.inner.state.write().kind)
    }

    /// Attached popup.
    pub fn popup(&self) -> Option<Popup> {
        self.inner.state.read().popup.clone()
    }

    /// Replaces the popup.
    pub fn set_popup(&self, popup: Option<Popup>) {
        self.inner.state.write().popup = popup;
    }

    /// Sets the popup content, attaching a default popup if the layer has none.
    pub fn set_popup_content(&self, content: impl Into<String>) {
        let content = content.into();
        let mut state = self.inner.state.write();
        match &mut state.popup {
            Some(popup) => popup.content = content,
            None => state.popup = Some(Popup::new(content)),
        }
    }

    /// Attached tooltip.
    pub fn tooltip(&self) -> Option<Tooltip> {
        self.inner.state.read().tooltip.clone()
    }

    /// Replaces the tooltip.
    pub fn set_tooltip(&self, tooltip: Option<Tooltip>) {
        self.inner.state.write().tooltip = tooltip;
    }

    /// Sets the tooltip content, attaching a default tooltip if the layer has none.
    pub fn set_tooltip_content(&self, content: impl Into<String>) {
        let content = content.into();
        let mut state = self.inner.state.write();
        match &mut state.tooltip {
            Some(tooltip) => tooltip.content = content,
            None => state.tooltip = Some(Tooltip::new(content)),
        }
    }

    /// Replaces the renderer answering feature data requests of GeoJSON layers.
    pub fn set_feature_renderer(&self, renderer: impl FeatureRenderer + 'static) {
        *self.inner.feature_renderer.write() = Arc::new(renderer);
    }

    /// Event subscriptions of the layer.
    pub fn events(&self) -> &EventSource {
        &self.inner.events
    }

    /// Subscribes to an event of the layer.
    pub fn on(&self, kind: EventKind, handler: impl EventHandler + 'static) -> SubscriptionId {
        self.inner.events.subscribe(kind, handler)
    }

    /// Removes a subscription.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Returns true if both handles point to the same layer.
    pub fn ptr_eq(&self, other: &Layer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// JSON representation sent with add and update operations.
    pub fn payload(&self) -> Result<Value, SyncError> {
        let state = self.inner.state.read();
        Ok(serde_json::to_value(LayerPayload {
            id: &self.inner.id,
            state: &state,
        })?)
    }

    /// Handles a call from the remote side.
    pub(crate) fn handle_callback(&self, method: &str, args: Vec<Value>) -> Result<Value, SyncError> {
        if method == FEATURE_DATA_CALLBACK {
            return self.feature_data(args);
        }

        let kind = EventKind::from_callback_name(method)
            .filter(EventKind::is_layer_event)
            .ok_or_else(|| SyncError::UnknownCallback(method.to_owned()))?;
        let event = MapEvent::decode(kind, args)?;
        log::trace!("Layer {} received {}", self.inner.id, kind.type_name());
        self.inner.events.emit(kind, &event);

        Ok(Value::Null)
    }

    fn feature_data(&self, args: Vec<Value>) -> Result<Value, SyncError> {
        if !matches!(self.inner.state.read().kind, LayerKind::GeoJson(_)) {
            return Err(SyncError::UnknownCallback(FEATURE_DATA_CALLBACK.to_owned()));
        }

        let feature = match args.into_iter().next() {
            Some(Value::String(feature)) => feature,
            Some(value @ Value::Object(_)) => value.to_string(),
            _ => {
                return Err(SyncError::InvalidPayload(
                    "feature data request without a feature".into(),
                ))
            }
        };

        let renderer = self.inner.feature_renderer.read().clone();
        let rendered = geojson_data::render_feature_data(renderer.as_ref(), &feature)?;
        Ok(Value::String(rendered))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::geo::LatLng;

    #[test]
    fn payload_flattens_id_and_variant() {
        let layer = Layer::with_id("a1", Marker::new((1.0, 2.0)).with_title("A"))
            .with_popup(Popup::new("hello"));
        let payload = layer.payload().unwrap();

        assert_eq!(payload["id"], json!("a1"));
        assert_eq!(payload["position"], json!({"lat": 1.0, "lng": 2.0}));
        assert_eq!(payload["title"], json!("A"));
        assert_eq!(payload["popup"]["content"], json!("hello"));
        assert!(payload.get("tooltip").is_none());
        assert!(payload.get("kind").is_none());
    }

    #[test]
    fn clones_share_state() {
        let layer = Layer::new(Circle::new((0.0, 0.0), 10.0));
        let other = layer.clone();
        other.modify(|kind| {
            if let LayerKind::Circle(circle) = kind {
                circle.radius = 20.0;
            }
        });
        other.set_tooltip_content("tip");

        assert!(layer.ptr_eq(&other));
        match layer.kind() {
            LayerKind::Circle(circle) => assert_eq!(circle.radius, 20.0),
            other => panic!("unexpected kind {other:?}"),
        }
        assert_eq!(layer.tooltip().unwrap().content, "tip");
    }

    #[test]
    fn layer_events_reach_subscribers() {
        let layer = Layer::new(Marker::new(LatLng::new(0.0, 0.0)));
        let clicks = Arc::new(AtomicUsize::new(0));
        let counter = clicks.clone();
        layer.on(EventKind::Click, move |event| {
            assert_eq!(event.event_type(), "click");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        layer
            .handle_callback("NotifyClick", vec![json!({"type": "click"})])
            .unwrap();
        layer.handle_callback("NotifyPopupOpen", vec![]).unwrap();
        assert_eq!(clicks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn map_only_events_are_rejected() {
        let layer = Layer::new(Marker::new((0.0, 0.0)));
        assert!(matches!(
            layer.handle_callback("NotifyZoomEnd", vec![]),
            Err(SyncError::UnknownCallback(_))
        ));
    }

    #[test]
    fn geojson_layer_renders_feature_data() {
        let layer = Layer::new(GeoJsonDataLayer::default());
        let feature = json!({
            "type": "Feature",
            "geometry": null,
            "properties": {"name": "Park"}
        });

        let rendered = layer
            .handle_callback(FEATURE_DATA_CALLBACK, vec![json!(feature.to_string())])
            .unwrap();
        assert_eq!(rendered, json!("<br>name: Park"));

        struct Fixed;
        impl FeatureRenderer for Fixed {
            fn render(&self, _: &::geojson::Feature) -> String {
                "fixed".into()
            }
        }
        layer.set_feature_renderer(Fixed);
        let rendered = layer
            .handle_callback(FEATURE_DATA_CALLBACK, vec![feature])
            .unwrap();
        assert_eq!(rendered, json!("fixed"));
    }

    #[test]
    fn feature_data_is_only_answered_by_geojson_layers() {
        let layer = Layer::new(Marker::new((0.0, 0.0)));
        assert!(matches!(
            layer.handle_callback(FEATURE_DATA_CALLBACK, vec![json!("{}")]),
            Err(SyncError::UnknownCallback(_))
        ));
    }
}
