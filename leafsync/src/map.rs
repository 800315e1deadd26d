//! Local map model mirrored by the remote engine.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use maybe_sync::{MaybeSend, MaybeSync};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

use crate::async_runtime;
use crate::channel::{invoke_and_bind, invoke_as, to_arg, CallbackBinding, RemoteChannel, RemoteOp};
use crate::collection::LayerCollection;
use crate::error::{ErrorHandler, ErrorSignal, SyncError};
use crate::event::{EventHandler, EventKind, EventSource, MapEvent, SubscriptionId};
use crate::geo::{LatLng, LatLngBounds, Point};
use crate::id::{LayerId, MapId};
use crate::layer::{validate_geojson, Layer, LayerKind};
use crate::sync::{update_shape_operation, SyncEngine, SyncMessage};
use crate::table::{ReferenceTable, RouteTarget};

/// View options of a map, sent to the remote side when the map is created.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapOptions {
    /// Center of the view.
    pub center: LatLng,
    /// Zoom level.
    pub zoom: f64,
    /// Minimum zoom level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<f64>,
    /// Maximum zoom level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<f64>,
    /// Area the view is restricted to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bounds: Option<LatLngBounds>,
    /// Whether the zoom control is shown.
    pub zoom_control: bool,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            center: LatLng::default(),
            zoom: 0.0,
            min_zoom: None,
            max_zoom: None,
            max_bounds: None,
            zoom_control: true,
        }
    }
}

/// Animation options of [`Map::pan_to`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanOptions {
    /// Animate the pan even if the target is close.
    pub animate: bool,
    /// Duration of the animation in seconds.
    pub duration: f64,
    /// Curvature factor of the animation easing.
    pub ease_linearity: f64,
    /// Do not fire `movestart` when the pan starts.
    pub no_move_start: bool,
}

impl Default for PanOptions {
    fn default() -> Self {
        Self {
            animate: false,
            duration: 0.25,
            ease_linearity: 0.25,
            no_move_start: false,
        }
    }
}

impl PanOptions {
    /// Jump to the target without animation. Used when the center is set as a property.
    pub fn immediate() -> Self {
        Self {
            animate: false,
            duration: 0.0,
            ease_linearity: 0.0,
            no_move_start: false,
        }
    }
}

/// Handler called once the map is initialized.
pub trait InitializedHandler: Fn() + MaybeSend + MaybeSync {}
impl<T: Fn() + MaybeSend + MaybeSync> InitializedHandler for T {}

/// Builder for [`Map`].
#[derive(Default)]
pub struct MapBuilder {
    id: Option<MapId>,
    options: MapOptions,
    table: Option<Arc<ReferenceTable>>,
}

impl MapBuilder {
    /// Creates a builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the given id instead of a random one.
    pub fn with_id(mut self, id: impl Into<MapId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Replaces all options.
    pub fn with_options(mut self, options: MapOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the initial center.
    pub fn with_center(mut self, center: impl Into<LatLng>) -> Self {
        self.options.center = center.into();
        self
    }

    /// Sets the initial zoom level.
    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.options.zoom = zoom;
        self
    }

    /// Sets the minimum zoom level.
    pub fn with_min_zoom(mut self, min_zoom: f64) -> Self {
        self.options.min_zoom = Some(min_zoom);
        self
    }

    /// Sets the maximum zoom level.
    pub fn with_max_zoom(mut self, max_zoom: f64) -> Self {
        self.options.max_zoom = Some(max_zoom);
        self
    }

    /// Restricts the view to the bounds.
    pub fn with_max_bounds(mut self, max_bounds: LatLngBounds) -> Self {
        self.options.max_bounds = Some(max_bounds);
        self
    }

    /// Shows or hides the zoom control.
    pub fn with_zoom_control(mut self, zoom_control: bool) -> Self {
        self.options.zoom_control = zoom_control;
        self
    }

    /// Registers the map in the given table instead of [`ReferenceTable::global`].
    pub fn with_table(mut self, table: Arc<ReferenceTable>) -> Self {
        self.table = Some(table);
        self
    }

    /// Creates the map and registers it in the reference table.
    pub fn build(self, channel: Arc<dyn RemoteChannel>) -> Result<Map, SyncError> {
        let table = self.table.unwrap_or_else(ReferenceTable::global);
        let id = self.id.unwrap_or_else(MapId::generate);
        let (sender, receiver) = mpsc::unbounded_channel();
        let errors = ErrorSignal::new();
        let engine = SyncEngine::new(id.clone(), table.clone(), channel.clone(), errors.clone());

        let map = Map {
            inner: Arc::new(MapInner {
                id,
                table: table.clone(),
                channel: channel.clone(),
                view: RwLock::new(ViewState {
                    options: self.options,
                    initialized: false,
                    center_dirty: false,
                    zoom_dirty: false,
                }),
                layers: Mutex::new(LayerCollection::new(sender.clone())),
                pending_engine: Mutex::new(Some((engine, receiver))),
                messages: sender,
                events: EventSource::new(),
                errors,
                initialized_handlers: Mutex::new(Vec::new()),
                binding: Mutex::new(None),
                registered: AtomicBool::new(false),
            }),
        };

        table.register_map(&map, channel)?;
        map.inner.registered.store(true, Ordering::Release);
        log::debug!("Created map {}", map.id());

        Ok(map)
    }
}

struct ViewState {
    options: MapOptions,
    initialized: bool,
    center_dirty: bool,
    zoom_dirty: bool,
}

struct MapInner {
    id: MapId,
    table: Arc<ReferenceTable>,
    channel: Arc<dyn RemoteChannel>,
    view: RwLock<ViewState>,
    layers: Mutex<LayerCollection>,
    pending_engine: Mutex<Option<(SyncEngine, UnboundedReceiver<SyncMessage>)>>,
    messages: UnboundedSender<SyncMessage>,
    events: EventSource,
    errors: ErrorSignal,
    initialized_handlers: Mutex<Vec<Box<dyn InitializedHandler>>>,
    binding: Mutex<Option<Box<dyn CallbackBinding>>>,
    registered: AtomicBool,
}

impl Drop for MapInner {
    fn drop(&mut self) {
        if let Some(binding) = self.binding.get_mut().take() {
            binding.dispose();
        }
        if self.registered.load(Ordering::Acquire) {
            self.table.unregister_map(&self.id);
        }
    }
}

#[derive(Serialize)]
struct CreatePayload<'a> {
    id: &'a MapId,
    #[serde(flatten)]
    options: &'a MapOptions,
}

/// Map whose layers and view are mirrored by a remote engine.
///
/// `Map` is a cheap handle: clones share the same map. The map stays registered in its reference
/// table until the last handle is dropped.
///
/// A map goes through two states. It starts uninitialized: view setters only change local state,
/// and layer operations fail with [`SyncError::UninitializedMap`]. The host calls
/// [`Map::create`] to create the remote counterpart and [`Map::initialize`] once it is ready. From
/// then on every layer collection change is applied remotely by the map's synchronization task.
#[derive(Clone)]
pub struct Map {
    inner: Arc<MapInner>,
}

/// Weak handle to a [`Map`], e.g. for event handlers that need the map without keeping it alive.
#[derive(Clone)]
pub struct WeakMap {
    inner: Weak<MapInner>,
}

impl WeakMap {
    /// Returns the map if it is still alive.
    pub fn upgrade(&self) -> Option<Map> {
        self.inner.upgrade().map(|inner| Map { inner })
    }
}

impl Map {
    /// Creates a map with default options, registered in the global reference table.
    pub fn new(channel: Arc<dyn RemoteChannel>) -> Result<Self, SyncError> {
        MapBuilder::new().build(channel)
    }

    /// Id of the map.
    pub fn id(&self) -> &MapId {
        &self.inner.id
    }

    /// Weak handle to the map.
    pub fn downgrade(&self) -> WeakMap {
        WeakMap {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Reference table the map is registered in.
    pub fn table(&self) -> &Arc<ReferenceTable> {
        &self.inner.table
    }

    /// Whether [`Map::initialize`] was called.
    pub fn is_initialized(&self) -> bool {
        self.inner.view.read().initialized
    }

    /// Current view options.
    pub fn options(&self) -> MapOptions {
        self.inner.view.read().options.clone()
    }

    /// Center of the view as last known locally.
    pub fn center(&self) -> LatLng {
        self.inner.view.read().options.center
    }

    /// Sets the center of the view.
    ///
    /// Before initialization only the local value changes; it is sent when the map is
    /// initialized. Afterwards the remote view is panned in the background and failures are
    /// reported to the background error subscribers.
    pub fn set_center(&self, center: impl Into<LatLng>) {
        let center = center.into();
        let initialized = {
            let mut view = self.inner.view.write();
            view.options.center = center;
            if !view.initialized {
                view.center_dirty = true;
            }
            view.initialized
        };

        if initialized {
            self.pan_in_background(center);
        }
    }

    /// Zoom level as last known locally.
    pub fn zoom(&self) -> f64 {
        self.inner.view.read().options.zoom
    }

    /// Sets the zoom level. Behaves like [`Map::set_center`].
    pub fn set_zoom(&self, zoom: f64) {
        let initialized = {
            let mut view = self.inner.view.write();
            view.options.zoom = zoom;
            if !view.initialized {
                view.zoom_dirty = true;
            }
            view.initialized
        };

        if initialized {
            self.set_zoom_in_background(zoom);
        }
    }

    /// Creates the remote map from the current options and binds it for callbacks.
    ///
    /// The options are sent with the call, so changes made before it need no replay.
    pub async fn create(&self) -> Result<(), SyncError> {
        let payload = {
            let mut view = self.inner.view.write();
            view.center_dirty = false;
            view.zoom_dirty = false;
            to_arg(CreatePayload {
                id: &self.inner.id,
                options: &view.options,
            })?
        };

        log::debug!("Creating remote map {}", self.inner.id);
        let binding = invoke_and_bind(
            self.inner.channel.as_ref(),
            RemoteOp::CreateMap,
            self.inner.table.route(RouteTarget::Map(self.inner.id.clone())),
            vec![payload],
        )
        .await?;

        if let Some(previous) = self.inner.binding.lock().replace(binding) {
            previous.dispose();
        }

        Ok(())
    }

    /// Marks the map as ready for remote calls.
    ///
    /// Starts the synchronization task, sends center and zoom changes made since
    /// [`Map::create`] and notifies the initialization subscribers. On native targets it fails
    /// with [`SyncError::RuntimeUnavailable`] outside of a tokio runtime and the map stays
    /// uninitialized.
    pub fn initialize(&self) -> Result<(), SyncError> {
        async_runtime::ensure_available("layer synchronization")?;

        let (replay_center, replay_zoom) = {
            let mut view = self.inner.view.write();
            if view.initialized {
                return Err(SyncError::AlreadyInitialized(self.inner.id.clone()));
            }

            view.initialized = true;
            let center = std::mem::take(&mut view.center_dirty).then_some(view.options.center);
            let zoom = std::mem::take(&mut view.zoom_dirty).then_some(view.options.zoom);
            (center, zoom)
        };

        if let Some((engine, receiver)) = self.inner.pending_engine.lock().take() {
            if let Err(err) = engine.spawn(receiver) {
                self.inner.errors.publish(&err);
            }
        }

        if let Some(center) = replay_center {
            self.pan_in_background(center);
        }
        if let Some(zoom) = replay_zoom {
            self.set_zoom_in_background(zoom);
        }

        log::info!("Map {} initialized", self.inner.id);

        let handlers = std::mem::take(&mut *self.inner.initialized_handlers.lock());
        for handler in handlers {
            handler();
        }

        Ok(())
    }

    /// Calls the handler once the map is initialized, or right away if it already is.
    pub fn on_initialized(&self, handler: impl InitializedHandler + 'static) {
        // Checked under the handler lock so the handler cannot miss a concurrent initialization.
        let mut handlers = self.inner.initialized_handlers.lock();
        if self.is_initialized() {
            drop(handlers);
            handler();
        } else {
            handlers.push(Box::new(handler));
        }
    }

    /// Appends the layer. The remote layer is added in the background.
    pub fn add_layer(&self, layer: Layer) -> Result<(), SyncError> {
        self.ensure_initialized()?;
        self.ensure_not_owned_elsewhere(std::slice::from_ref(&layer))?;
        self.inner.layers.lock().add(layer)
    }

    /// Inserts the layer at the index.
    pub fn insert_layer(&self, index: usize, layer: Layer) -> Result<(), SyncError> {
        self.ensure_initialized()?;
        self.ensure_not_owned_elsewhere(std::slice::from_ref(&layer))?;
        self.inner.layers.lock().insert(index, layer)
    }

    /// Removes the layer with the id. The remote layer is removed in the background.
    pub fn remove_layer(&self, id: &LayerId) -> Result<Layer, SyncError> {
        self.ensure_initialized()?;
        self.inner.layers.lock().remove(id)
    }

    /// Replaces the layers in the range as one change: all replaced layers are removed remotely
    /// before any new layer is added.
    pub fn replace_layers(
        &self,
        range: Range<usize>,
        layers: Vec<Layer>,
    ) -> Result<Vec<Layer>, SyncError> {
        self.ensure_initialized()?;
        self.ensure_not_owned_elsewhere(&layers)?;
        self.inner.layers.lock().replace_range(range, layers)
    }

    /// Moves the layer at `from` to `to`. The remote layer is re-added.
    pub fn move_layer(&self, from: usize, to: usize) -> Result<(), SyncError> {
        self.ensure_initialized()?;
        self.inner.layers.lock().move_item(from, to)
    }

    /// Removes all layers.
    pub fn clear_layers(&self) -> Result<(), SyncError> {
        self.ensure_initialized()?;
        self.inner.layers.lock().clear();
        Ok(())
    }

    /// Snapshot of the layers in order.
    pub fn layers(&self) -> Vec<Layer> {
        self.inner.layers.lock().iter().cloned().collect()
    }

    /// Waits until every layer change made so far is applied remotely.
    pub async fn flush(&self) {
        if !self.is_initialized() {
            return;
        }

        let (done, wait) = oneshot::channel();
        if self.inner.messages.send(SyncMessage::Flush(done)).is_ok() {
            // An error means the engine is gone, so there is nothing left to wait for.
            let _ = wait.await;
        }
    }

    /// Sends the current popup content of the layer. Does nothing before initialization.
    pub async fn update_popup_content(&self, layer: &Layer) -> Result<(), SyncError> {
        if !self.is_initialized() {
            return Ok(());
        }

        let content = layer.popup().map(|popup| popup.content);
        self.invoke(
            RemoteOp::UpdatePopupContent,
            vec![self.id_arg(), layer_arg(layer), to_arg(content)?],
        )
        .await
    }

    /// Sends the current tooltip content of the layer. Does nothing before initialization.
    pub async fn update_tooltip_content(&self, layer: &Layer) -> Result<(), SyncError> {
        if !self.is_initialized() {
            return Ok(());
        }

        let content = layer.tooltip().map(|tooltip| tooltip.content);
        self.invoke(
            RemoteOp::UpdateTooltipContent,
            vec![self.id_arg(), layer_arg(layer), to_arg(content)?],
        )
        .await
    }

    /// Sends the current geometry and style of a shape layer. Does nothing before initialization.
    ///
    /// Fails with [`SyncError::UnsupportedLayerVariant`] for layers that are not rectangles,
    /// circles, polygons or polylines.
    pub async fn update_shape(&self, layer: &Layer) -> Result<(), SyncError> {
        let operation = update_shape_operation(&layer.kind())?;
        if !self.is_initialized() {
            return Ok(());
        }

        self.invoke(operation, vec![self.id_arg(), layer.payload()?])
            .await
    }

    /// Appends GeoJSON features to a GeoJSON layer.
    ///
    /// The call goes to the map the layer is currently registered with.
    pub async fn add_geojson_data(&self, layer: &Layer, data: &str) -> Result<(), SyncError> {
        if !matches!(layer.kind(), LayerKind::GeoJson(_)) {
            return Err(SyncError::UnsupportedLayerVariant {
                kind: layer.kind_name(),
                operation: "addDataToGeoJsonLayer",
            });
        }
        validate_geojson(data)?;

        let (map_id, channel) = self.inner.table.resolve_owning_map_and_channel(layer.id())?;
        channel
            .invoke(
                RemoteOp::AddDataToGeoJsonLayer,
                vec![
                    Value::from(map_id.as_str()),
                    layer_arg(layer),
                    Value::from(data),
                ],
            )
            .await?;

        Ok(())
    }

    /// Fits the view to the area between the corners.
    pub async fn fit_bounds(
        &self,
        corner1: LatLng,
        corner2: LatLng,
        padding: Option<Point>,
        max_zoom: Option<f64>,
    ) -> Result<(), SyncError> {
        self.ensure_initialized()?;
        self.invoke(
            RemoteOp::FitBounds,
            vec![
                self.id_arg(),
                to_arg(corner1)?,
                to_arg(corner2)?,
                to_arg(padding)?,
                to_arg(max_zoom)?,
            ],
        )
        .await
    }

    /// Pans the view to the position.
    pub async fn pan_to(
        &self,
        position: impl Into<LatLng>,
        options: PanOptions,
    ) -> Result<(), SyncError> {
        self.ensure_initialized()?;
        self.invoke(RemoteOp::PanTo, pan_args(&self.inner.id, position.into(), options)?)
            .await
    }

    /// Queries the center of the remote view.
    pub async fn get_center(&self) -> Result<LatLng, SyncError> {
        self.ensure_initialized()?;
        invoke_as(self.inner.channel.as_ref(), RemoteOp::GetCenter, vec![self.id_arg()]).await
    }

    /// Queries the zoom level of the remote view.
    pub async fn get_zoom(&self) -> Result<f64, SyncError> {
        self.ensure_initialized()?;
        invoke_as(self.inner.channel.as_ref(), RemoteOp::GetZoom, vec![self.id_arg()]).await
    }

    /// Queries the bounds of the remote view.
    pub async fn get_bounds(&self) -> Result<LatLngBounds, SyncError> {
        self.ensure_initialized()?;
        invoke_as(self.inner.channel.as_ref(), RemoteOp::GetBounds, vec![self.id_arg()]).await
    }

    /// Sets the zoom level and waits for the remote side to apply it.
    pub async fn set_zoom_remote(&self, zoom: f64) -> Result<(), SyncError> {
        self.ensure_initialized()?;
        self.inner.view.write().options.zoom = zoom;
        self.invoke(RemoteOp::SetZoom, vec![self.id_arg(), Value::from(zoom)])
            .await
    }

    /// Zooms in by one level, or by three if `shift` is held.
    pub async fn zoom_in(&self, shift: bool) -> Result<(), SyncError> {
        self.ensure_initialized()?;
        self.invoke(RemoteOp::ZoomIn, vec![self.id_arg(), json!({ "shiftKey": shift })])
            .await
    }

    /// Zooms out by one level, or by three if `shift` is held.
    pub async fn zoom_out(&self, shift: bool) -> Result<(), SyncError> {
        self.ensure_initialized()?;
        self.invoke(RemoteOp::ZoomOut, vec![self.id_arg(), json!({ "shiftKey": shift })])
            .await
    }

    /// Event subscriptions of the map.
    pub fn events(&self) -> &EventSource {
        &self.inner.events
    }

    /// Subscribes to a map event.
    pub fn on(&self, kind: EventKind, handler: impl EventHandler + 'static) -> SubscriptionId {
        self.inner.events.subscribe(kind, handler)
    }

    /// Removes a subscription.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Subscribes to errors of background work: layer synchronization and view updates.
    pub fn on_background_error(&self, handler: impl ErrorHandler + 'static) -> SubscriptionId {
        self.inner.errors.subscribe(handler)
    }

    /// Removes a background error subscription.
    pub fn off_background_error(&self, id: SubscriptionId) -> bool {
        self.inner.errors.unsubscribe(id)
    }

    /// Handles a call from the remote side.
    ///
    /// `zoomend` and `moveend` first refresh the local zoom or center from the remote view, so
    /// subscribers read the new value.
    pub(crate) async fn handle_callback(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, SyncError> {
        let kind = EventKind::from_callback_name(method)
            .filter(EventKind::is_map_event)
            .ok_or_else(|| SyncError::UnknownCallback(method.to_owned()))?;
        let event = MapEvent::decode(kind, args)?;

        let refreshed = match kind {
            EventKind::ZoomEnd => self.refresh_zoom().await,
            EventKind::MoveEnd => self.refresh_center().await,
            _ => Ok(()),
        };
        if let Err(err) = refreshed {
            self.inner.errors.publish(&err);
        }

        log::trace!("Map {} received {}", self.inner.id, kind.type_name());
        self.inner.events.emit(kind, &event);

        Ok(Value::Null)
    }

    async fn refresh_zoom(&self) -> Result<(), SyncError> {
        let zoom: f64 =
            invoke_as(self.inner.channel.as_ref(), RemoteOp::GetZoom, vec![self.id_arg()]).await?;
        self.inner.view.write().options.zoom = zoom;
        Ok(())
    }

    async fn refresh_center(&self) -> Result<(), SyncError> {
        let center: LatLng =
            invoke_as(self.inner.channel.as_ref(), RemoteOp::GetCenter, vec![self.id_arg()])
                .await?;
        self.inner.view.write().options.center = center;
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<(), SyncError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(SyncError::UninitializedMap(self.inner.id.clone()))
        }
    }

    fn ensure_not_owned_elsewhere(&self, layers: &[Layer]) -> Result<(), SyncError> {
        for layer in layers {
            match self.inner.table.owner_of(layer.id()) {
                Some(owner) if owner != self.inner.id => {
                    return Err(SyncError::LayerOwnedByOtherMap {
                        layer: layer.id().clone(),
                        owner,
                    });
                }
                _ => {}
            }
        }

        Ok(())
    }

    async fn invoke(&self, operation: RemoteOp, args: Vec<Value>) -> Result<(), SyncError> {
        log::debug!("Map {} invoking {operation}", self.inner.id);
        self.inner.channel.invoke(operation, args).await?;
        Ok(())
    }

    fn pan_in_background(&self, center: LatLng) {
        match pan_args(&self.inner.id, center, PanOptions::immediate()) {
            Ok(args) => self.invoke_in_background(RemoteOp::PanTo, args),
            Err(err) => self.inner.errors.publish(&err),
        }
    }

    fn set_zoom_in_background(&self, zoom: f64) {
        self.invoke_in_background(RemoteOp::SetZoom, vec![self.id_arg(), Value::from(zoom)]);
    }

    fn invoke_in_background(&self, operation: RemoteOp, args: Vec<Value>) {
        let channel = self.inner.channel.clone();
        let errors = self.inner.errors.clone();
        let spawned = async_runtime::spawn("view update", async move {
            if let Err(err) = channel.invoke(operation, args).await {
                errors.publish(&err);
            }
        });
        if let Err(err) = spawned {
            self.inner.errors.publish(&err);
        }
    }

    fn id_arg(&self) -> Value {
        Value::from(self.inner.id.as_str())
    }
}

fn layer_arg(layer: &Layer) -> Value {
    Value::from(layer.id().as_str())
}

fn pan_args(map_id: &MapId, position: LatLng, options: PanOptions) -> Result<Vec<Value>, SyncError> {
    Ok(vec![
        Value::from(map_id.as_str()),
        to_arg(position)?,
        Value::from(options.animate),
        Value::from(options.duration),
        Value::from(options.ease_linearity),
        Value::from(options.no_move_start),
    ])
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use approx::assert_relative_eq;

    use super::*;
    use crate::channel::memory::MemoryChannel;
    use crate::layer::{Circle, GeoJsonDataLayer, Marker, Popup};

    fn test_map(channel: &MemoryChannel) -> Map {
        MapBuilder::new()
            .with_table(ReferenceTable::new())
            .with_center((10.0, 20.0))
            .with_zoom(3.0)
            .build(Arc::new(channel.clone()))
            .unwrap()
    }

    async fn wait_for(channel: &MemoryChannel, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), channel.wait_for_calls(count))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_sends_options_and_binding() {
        let channel = MemoryChannel::new();
        let map = test_map(&channel);
        map.create().await.unwrap();

        let calls = channel.calls_of(RemoteOp::CreateMap);
        assert_eq!(calls.len(), 1);
        let payload = &calls[0].args[0];
        assert_eq!(payload["id"], json!(map.id().as_str()));
        assert_eq!(payload["center"], json!({"lat": 10.0, "lng": 20.0}));
        assert_eq!(payload["zoomControl"], json!(true));
        assert!(payload.get("minZoom").is_none());
        assert!(calls[0].args[1].get("bindingId").is_some());
        assert_eq!(channel.live_bindings(), 1);
    }

    #[tokio::test]
    async fn failed_create_leaves_no_binding() {
        let channel = MemoryChannel::new();
        channel.fail(
            RemoteOp::CreateMap,
            SyncError::RemoteRejected {
                operation: "create".into(),
                message: "no container".into(),
            },
        );
        let map = test_map(&channel);

        assert!(map.create().await.is_err());
        assert_eq!(channel.live_bindings(), 0);
    }

    #[tokio::test]
    async fn second_initialize_is_rejected() {
        let channel = MemoryChannel::new();
        let map = test_map(&channel);
        map.initialize().unwrap();

        assert!(matches!(
            map.initialize(),
            Err(SyncError::AlreadyInitialized(_))
        ));
        assert!(map.is_initialized());
    }

    #[tokio::test]
    async fn layer_operations_need_initialization() {
        let channel = MemoryChannel::new();
        let map = test_map(&channel);

        let layer = Layer::new(Marker::new((0.0, 0.0)));
        assert!(matches!(
            map.add_layer(layer.clone()),
            Err(SyncError::UninitializedMap(_))
        ));
        assert!(matches!(
            map.get_zoom().await,
            Err(SyncError::UninitializedMap(_))
        ));
        map.update_popup_content(&layer).await.unwrap();
        assert!(channel.calls().is_empty());
    }

    #[tokio::test]
    async fn writes_before_initialization_are_replayed() {
        let channel = MemoryChannel::new();
        let map = test_map(&channel);

        map.set_center((1.0, 1.0));
        map.create().await.unwrap();
        map.set_zoom(7.0);
        assert_relative_eq!(map.zoom(), 7.0);
        assert_eq!(channel.operations(), vec![RemoteOp::CreateMap]);

        map.initialize().unwrap();
        wait_for(&channel, 2).await;

        // Center went out with the create payload, only the zoom is replayed.
        assert!(channel.calls_of(RemoteOp::PanTo).is_empty());
        let zoom = channel.calls_of(RemoteOp::SetZoom);
        assert_eq!(zoom.len(), 1);
        assert_eq!(zoom[0].args, vec![json!(map.id().as_str()), json!(7.0)]);
    }

    #[tokio::test]
    async fn setters_after_initialization_update_remote_view() {
        let channel = MemoryChannel::new();
        let map = test_map(&channel);
        map.initialize().unwrap();

        map.set_center((5.0, 6.0));
        wait_for(&channel, 1).await;

        let pan = channel.calls_of(RemoteOp::PanTo);
        assert_eq!(pan[0].args[1], json!({"lat": 5.0, "lng": 6.0}));
        // No animation: zero duration and easing.
        assert_eq!(pan[0].args[2..], [json!(false), json!(0.0), json!(0.0), json!(false)]);
    }

    #[test]
    fn initialize_needs_a_runtime() {
        let channel = MemoryChannel::new();
        let map = test_map(&channel);

        assert!(matches!(
            map.initialize(),
            Err(SyncError::RuntimeUnavailable(_))
        ));
        assert!(!map.is_initialized());
    }

    #[tokio::test]
    async fn setters_outside_a_runtime_report_errors() {
        let channel = MemoryChannel::new();
        let map = test_map(&channel);
        map.initialize().unwrap();

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let subscription = map.on_background_error(move |err| sink.lock().push(err.clone()));

        let handle = map.clone();
        std::thread::spawn(move || handle.set_zoom(9.0))
            .join()
            .unwrap();
        assert!(matches!(
            errors.lock().as_slice(),
            [SyncError::RuntimeUnavailable(_)]
        ));
        assert_relative_eq!(map.zoom(), 9.0);

        assert!(map.off_background_error(subscription));
        assert!(!map.off_background_error(subscription));
        let handle = map.clone();
        std::thread::spawn(move || handle.set_zoom(10.0))
            .join()
            .unwrap();
        assert_eq!(errors.lock().len(), 1);
    }

    #[tokio::test]
    async fn layers_of_another_map_are_rejected() {
        let table = ReferenceTable::new();
        let channel = MemoryChannel::new();
        let build = |id: &str| {
            MapBuilder::new()
                .with_id(id)
                .with_table(table.clone())
                .build(Arc::new(channel.clone()))
                .unwrap()
        };
        let first = build("first");
        let second = build("second");
        first.initialize().unwrap();
        second.initialize().unwrap();

        let layer = Layer::with_id("shared", Marker::new((0.0, 0.0)));
        first.add_layer(layer.clone()).unwrap();
        first.flush().await;

        for result in [
            second.add_layer(layer.clone()),
            second.insert_layer(0, layer.clone()),
            second.replace_layers(0..0, vec![layer.clone()]).map(|_| ()),
        ] {
            assert!(matches!(
                result,
                Err(SyncError::LayerOwnedByOtherMap { ref owner, .. }) if owner == first.id()
            ));
        }
        assert!(second.layers().is_empty());

        // Re-adding to the owning map is a plain duplicate.
        assert!(matches!(
            first.add_layer(layer.clone()),
            Err(SyncError::DuplicateLayer(_))
        ));
    }

    #[tokio::test]
    async fn background_failures_are_published() {
        let channel = MemoryChannel::new();
        channel.fail(
            RemoteOp::SetZoom,
            SyncError::ChannelFailure {
                operation: "setZoom".into(),
                reason: "closed".into(),
            },
        );
        let map = test_map(&channel);
        map.initialize().unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        map.on_background_error(move |err| {
            let _ = tx.send(err.to_string());
        });
        map.set_zoom(4.0);

        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(message.contains("setZoom"));
        assert_relative_eq!(map.zoom(), 4.0);
    }

    #[tokio::test]
    async fn initialized_handlers_fire_once() {
        let channel = MemoryChannel::new();
        let map = test_map(&channel);
        let count = Arc::new(AtomicUsize::new(0));

        let before = count.clone();
        map.on_initialized(move || {
            before.fetch_add(1, Ordering::SeqCst);
        });
        map.initialize().unwrap();
        let _ = map.initialize();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let after = count.clone();
        map.on_initialized(move || {
            after.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn content_updates_send_layer_state() {
        let channel = MemoryChannel::new();
        let map = test_map(&channel);
        map.initialize().unwrap();

        let layer = Layer::with_id("c1", Circle::new((0.0, 0.0), 5.0)).with_popup(Popup::new("old"));
        layer.set_popup_content("new");
        map.update_popup_content(&layer).await.unwrap();
        map.update_tooltip_content(&layer).await.unwrap();
        map.update_shape(&layer).await.unwrap();

        let popup = channel.calls_of(RemoteOp::UpdatePopupContent);
        assert_eq!(popup[0].args, vec![json!(map.id().as_str()), json!("c1"), json!("new")]);
        let tooltip = channel.calls_of(RemoteOp::UpdateTooltipContent);
        assert_eq!(tooltip[0].args[2], Value::Null);
        let shape = channel.calls_of(RemoteOp::UpdateCircle);
        assert_eq!(shape[0].args[1]["radius"], json!(5.0));

        let marker = Layer::new(Marker::new((0.0, 0.0)));
        assert!(matches!(
            map.update_shape(&marker).await,
            Err(SyncError::UnsupportedLayerVariant { kind: "marker", operation: "updateShape" })
        ));
    }

    #[tokio::test]
    async fn geojson_data_goes_to_the_owning_map() {
        let channel = MemoryChannel::new();
        let map = test_map(&channel);
        map.initialize().unwrap();

        let layer = Layer::with_id("g1", GeoJsonDataLayer::default());
        let data = r#"{"type": "FeatureCollection", "features": []}"#;
        assert!(matches!(
            map.add_geojson_data(&layer, data).await,
            Err(SyncError::UnknownLayer(_))
        ));

        map.add_layer(layer.clone()).unwrap();
        map.flush().await;
        map.add_geojson_data(&layer, data).await.unwrap();
        let calls = channel.calls_of(RemoteOp::AddDataToGeoJsonLayer);
        assert_eq!(calls[0].args, vec![json!(map.id().as_str()), json!("g1"), json!(data)]);

        assert!(matches!(
            map.add_geojson_data(&layer, "not json").await,
            Err(SyncError::InvalidPayload(_))
        ));
        let marker = Layer::new(Marker::new((0.0, 0.0)));
        assert!(matches!(
            map.add_geojson_data(&marker, data).await,
            Err(SyncError::UnsupportedLayerVariant { .. })
        ));
    }

    #[tokio::test]
    async fn view_queries_decode_results() {
        let channel = MemoryChannel::new();
        channel.respond(RemoteOp::GetZoom, json!(12.5));
        channel.respond(
            RemoteOp::GetBounds,
            json!({
                "_southWest": {"lat": 1.0, "lng": 2.0},
                "_northEast": {"lat": 3.0, "lng": 4.0}
            }),
        );
        let map = test_map(&channel);
        map.initialize().unwrap();

        assert_relative_eq!(map.get_zoom().await.unwrap(), 12.5);
        let bounds = map.get_bounds().await.unwrap();
        assert_eq!(bounds.north_east, LatLng::new(3.0, 4.0));

        channel.respond(RemoteOp::GetCenter, json!("nowhere"));
        assert!(matches!(
            map.get_center().await,
            Err(SyncError::InvalidPayload(_))
        ));
    }

    #[tokio::test]
    async fn host_operations_send_arguments() {
        let channel = MemoryChannel::new();
        let map = test_map(&channel);
        map.initialize().unwrap();

        map.fit_bounds(LatLng::new(0.0, 0.0), LatLng::new(1.0, 1.0), None, Some(9.0))
            .await
            .unwrap();
        map.zoom_in(true).await.unwrap();
        map.set_zoom_remote(2.0).await.unwrap();

        let fit = channel.calls_of(RemoteOp::FitBounds);
        assert_eq!(fit[0].args[3], Value::Null);
        assert_eq!(fit[0].args[4], json!(9.0));
        assert_eq!(channel.calls_of(RemoteOp::ZoomIn)[0].args[1], json!({"shiftKey": true}));
        assert_relative_eq!(map.zoom(), 2.0);
    }

    #[tokio::test]
    async fn zoom_end_refreshes_before_notifying() {
        let channel = MemoryChannel::new();
        channel.respond(RemoteOp::GetZoom, json!(8.0));
        let map = test_map(&channel);
        map.create().await.unwrap();
        map.initialize().unwrap();

        let seen = Arc::new(Mutex::new(None));
        let weak = map.downgrade();
        let slot = seen.clone();
        map.on(EventKind::ZoomEnd, move |_| {
            if let Some(map) = weak.upgrade() {
                *slot.lock() = Some(map.zoom());
            }
        });

        let reference = channel.calls_of(RemoteOp::CreateMap)[0].args[1].clone();
        channel
            .callback(&reference, "NotifyZoomEnd", vec![json!({"type": "zoomend"})])
            .await
            .unwrap();

        assert_eq!(*seen.lock(), Some(8.0));
    }

    #[tokio::test]
    async fn failed_refresh_still_notifies() {
        let channel = MemoryChannel::new();
        channel.fail(
            RemoteOp::GetCenter,
            SyncError::RemoteRejected {
                operation: "getCenter".into(),
                message: "gone".into(),
            },
        );
        let map = test_map(&channel);
        map.initialize().unwrap();

        let notified = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        let n = notified.clone();
        map.on(EventKind::MoveEnd, move |_| {
            n.fetch_add(1, Ordering::SeqCst);
        });
        let e = errors.clone();
        map.on_background_error(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        });

        map.handle_callback("NotifyMoveEnd", vec![]).await.unwrap();
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(map.center(), LatLng::new(10.0, 20.0));
    }

    #[tokio::test]
    async fn unknown_callbacks_are_rejected() {
        let channel = MemoryChannel::new();
        let map = test_map(&channel);
        assert!(matches!(
            map.handle_callback("NotifyPopupOpen", vec![]).await,
            Err(SyncError::UnknownCallback(_))
        ));
        assert!(matches!(
            map.handle_callback("Explode", vec![]).await,
            Err(SyncError::UnknownCallback(_))
        ));
    }

    #[tokio::test]
    async fn dropping_the_map_unregisters_it() {
        let channel = MemoryChannel::new();
        let table = ReferenceTable::new();
        let map = MapBuilder::new()
            .with_table(table.clone())
            .build(Arc::new(channel.clone()))
            .unwrap();
        map.create().await.unwrap();
        map.initialize().unwrap();
        map.add_layer(Layer::new(Marker::new((0.0, 0.0)))).unwrap();
        map.flush().await;
        assert_eq!(table.layer_count(), 1);
        assert_eq!(channel.live_bindings(), 2);

        let id = map.id().clone();
        drop(map);
        assert!(table.lookup_channel_for_map(&id).is_err());
        assert_eq!(table.layer_count(), 0);
        assert_eq!(channel.live_bindings(), 0);
    }

    #[tokio::test]
    async fn duplicate_map_id_keeps_the_first_map() {
        let channel = MemoryChannel::new();
        let table = ReferenceTable::new();
        let first = MapBuilder::new()
            .with_id("same")
            .with_table(table.clone())
            .build(Arc::new(channel.clone()))
            .unwrap();

        let second = MapBuilder::new()
            .with_id("same")
            .with_table(table.clone())
            .build(Arc::new(channel.clone()));
        assert!(matches!(second, Err(SyncError::DuplicateRegistration(_))));
        assert!(table.lookup_map(first.id()).unwrap().id() == first.id());
    }
}
