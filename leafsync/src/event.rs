//! Notifications raised by the remote engine and their local subscribers.

use std::collections::HashMap;
use std::sync::Arc;

use maybe_sync::{MaybeSend, MaybeSync};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncError;
use crate::geo::{LatLng, Point};

/// Kind of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Number of zoom levels changed.
    ZoomLevelsChange,
    /// Map container was resized.
    Resize,
    /// Map was destroyed.
    Unload,
    /// Map view needs to be redrawn entirely.
    ViewReset,
    /// Map was initialized.
    Load,
    /// Zoom is about to change.
    ZoomStart,
    /// View is about to change.
    MoveStart,
    /// Zoom is changing.
    Zoom,
    /// View is changing.
    Move,
    /// Zoom change finished.
    ZoomEnd,
    /// View change finished.
    MoveEnd,
    /// Pointer moved over the map.
    MouseMove,
    /// Key pressed while the map is focused.
    KeyPress,
    /// Key went down while the map is focused.
    KeyDown,
    /// Key went up while the map is focused.
    KeyUp,
    /// Raised before the click is handled.
    PreClick,
    /// Click.
    Click,
    /// Double click.
    DblClick,
    /// Mouse button pressed.
    MouseDown,
    /// Mouse button released.
    MouseUp,
    /// Pointer entered.
    MouseOver,
    /// Pointer left.
    MouseOut,
    /// Right click.
    ContextMenu,
    /// Layer was added to the remote map.
    Add,
    /// Layer was removed from the remote map.
    Remove,
    /// Popup of the layer was opened.
    PopupOpen,
    /// Popup of the layer was closed.
    PopupClose,
    /// Tooltip of the layer was opened.
    TooltipOpen,
    /// Tooltip of the layer was closed.
    TooltipClose,
}

/// Shape of the payload an event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// [`Event`].
    Basic,
    /// [`MouseEvent`].
    Mouse,
    /// [`ResizeEvent`].
    Resize,
}

const ALL_KINDS: [EventKind; 29] = [
    EventKind::ZoomLevelsChange,
    EventKind::Resize,
    EventKind::Unload,
    EventKind::ViewReset,
    EventKind::Load,
    EventKind::ZoomStart,
    EventKind::MoveStart,
    EventKind::Zoom,
    EventKind::Move,
    EventKind::ZoomEnd,
    EventKind::MoveEnd,
    EventKind::MouseMove,
    EventKind::KeyPress,
    EventKind::KeyDown,
    EventKind::KeyUp,
    EventKind::PreClick,
    EventKind::Click,
    EventKind::DblClick,
    EventKind::MouseDown,
    EventKind::MouseUp,
    EventKind::MouseOver,
    EventKind::MouseOut,
    EventKind::ContextMenu,
    EventKind::Add,
    EventKind::Remove,
    EventKind::PopupOpen,
    EventKind::PopupClose,
    EventKind::TooltipOpen,
    EventKind::TooltipClose,
];

impl EventKind {
    /// Every event kind.
    pub fn all() -> &'static [EventKind] {
        &ALL_KINDS
    }

    /// Method name the remote side calls to raise the event.
    pub fn callback_name(&self) -> &'static str {
        match self {
            EventKind::ZoomLevelsChange => "NotifyZoomLevelsChange",
            EventKind::Resize => "NotifyResize",
            EventKind::Unload => "NotifyUnload",
            EventKind::ViewReset => "NotifyViewReset",
            EventKind::Load => "NotifyLoad",
            EventKind::ZoomStart => "NotifyZoomStart",
            EventKind::MoveStart => "NotifyMoveStart",
            EventKind::Zoom => "NotifyZoom",
            EventKind::Move => "NotifyMove",
            EventKind::ZoomEnd => "NotifyZoomEnd",
            EventKind::MoveEnd => "NotifyMoveEnd",
            EventKind::MouseMove => "NotifyMouseMove",
            EventKind::KeyPress => "NotifyKeyPress",
            EventKind::KeyDown => "NotifyKeyDown",
            EventKind::KeyUp => "NotifyKeyUp",
            EventKind::PreClick => "NotifyPreClick",
            EventKind::Click => "NotifyClick",
            EventKind::DblClick => "NotifyDblClick",
            EventKind::MouseDown => "NotifyMouseDown",
            EventKind::MouseUp => "NotifyMouseUp",
            EventKind::MouseOver => "NotifyMouseOver",
            EventKind::MouseOut => "NotifyMouseOut",
            EventKind::ContextMenu => "NotifyContextMenu",
            EventKind::Add => "NotifyAdd",
            EventKind::Remove => "NotifyRemove",
            EventKind::PopupOpen => "NotifyPopupOpen",
            EventKind::PopupClose => "NotifyPopupClose",
            EventKind::TooltipOpen => "NotifyTooltipOpen",
            EventKind::TooltipClose => "NotifyTooltipClose",
        }
    }

    /// Finds the event kind by its callback method name.
    pub fn from_callback_name(name: &str) -> Option<Self> {
        ALL_KINDS
            .iter()
            .copied()
            .find(|kind| kind.callback_name() == name)
    }

    /// Leaflet event type string.
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::ZoomLevelsChange => "zoomlevelschange",
            EventKind::Resize => "resize",
            EventKind::Unload => "unload",
            EventKind::ViewReset => "viewreset",
            EventKind::Load => "load",
            EventKind::ZoomStart => "zoomstart",
            EventKind::MoveStart => "movestart",
            EventKind::Zoom => "zoom",
            EventKind::Move => "move",
            EventKind::ZoomEnd => "zoomend",
            EventKind::MoveEnd => "moveend",
            EventKind::MouseMove => "mousemove",
            EventKind::KeyPress => "keypress",
            EventKind::KeyDown => "keydown",
            EventKind::KeyUp => "keyup",
            EventKind::PreClick => "preclick",
            EventKind::Click => "click",
            EventKind::DblClick => "dblclick",
            EventKind::MouseDown => "mousedown",
            EventKind::MouseUp => "mouseup",
            EventKind::MouseOver => "mouseover",
            EventKind::MouseOut => "mouseout",
            EventKind::ContextMenu => "contextmenu",
            EventKind::Add => "add",
            EventKind::Remove => "remove",
            EventKind::PopupOpen => "popupopen",
            EventKind::PopupClose => "popupclose",
            EventKind::TooltipOpen => "tooltipopen",
            EventKind::TooltipClose => "tooltipclose",
        }
    }

    /// Events shared by the map and interactive layers.
    pub fn is_interactive(&self) -> bool {
        matches!(
            self,
            EventKind::Click
                | EventKind::DblClick
                | EventKind::MouseDown
                | EventKind::MouseUp
                | EventKind::MouseOver
                | EventKind::MouseOut
                | EventKind::ContextMenu
        )
    }

    /// Whether a map can raise the event.
    pub fn is_map_event(&self) -> bool {
        self.is_interactive()
            || !matches!(
                self,
                EventKind::Add
                    | EventKind::Remove
                    | EventKind::PopupOpen
                    | EventKind::PopupClose
                    | EventKind::TooltipOpen
                    | EventKind::TooltipClose
            )
    }

    /// Whether a layer can raise the event.
    pub fn is_layer_event(&self) -> bool {
        self.is_interactive() || !self.is_map_event()
    }

    /// Payload the event carries.
    pub fn payload_shape(&self) -> PayloadShape {
        match self {
            EventKind::Resize => PayloadShape::Resize,
            EventKind::MouseMove | EventKind::PreClick => PayloadShape::Mouse,
            kind if kind.is_interactive() => PayloadShape::Mouse,
            _ => PayloadShape::Basic,
        }
    }
}

/// Payload of a plain notification.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Event {
    /// Leaflet event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Raw DOM event, if the remote side forwarded it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_event: Option<Value>,
}

/// Payload of a pointer notification.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MouseEvent {
    /// Leaflet event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Geographic location of the pointer.
    #[serde(rename = "latlng")]
    pub lat_lng: LatLng,
    /// Pointer position relative to the map layer.
    pub layer_point: Point,
    /// Pointer position relative to the map container.
    pub container_point: Point,
    /// Raw DOM event, if the remote side forwarded it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_event: Option<Value>,
}

/// Payload of a resize notification.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResizeEvent {
    /// Leaflet event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Container size before the resize.
    pub old_size: Point,
    /// Container size after the resize.
    pub new_size: Point,
}

/// Notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    /// Plain notification.
    Basic(Event),
    /// Pointer notification.
    Mouse(MouseEvent),
    /// Resize notification.
    Resize(ResizeEvent),
}

impl MapEvent {
    /// Decodes the payload of an inbound notification. A missing payload yields a default event of
    /// the kind's type.
    pub fn decode(kind: EventKind, args: Vec<Value>) -> Result<Self, SyncError> {
        let payload = args.into_iter().next().filter(|value| !value.is_null());

        fn decode_or_default<T: serde::de::DeserializeOwned + Default>(
            payload: Option<Value>,
        ) -> Result<T, SyncError> {
            match payload {
                Some(value) => Ok(serde_json::from_value(value)?),
                None => Ok(T::default()),
            }
        }

        let mut event = match kind.payload_shape() {
            PayloadShape::Basic => MapEvent::Basic(decode_or_default(payload)?),
            PayloadShape::Mouse => MapEvent::Mouse(decode_or_default(payload)?),
            PayloadShape::Resize => MapEvent::Resize(decode_or_default(payload)?),
        };

        let event_type = match &mut event {
            MapEvent::Basic(e) => &mut e.event_type,
            MapEvent::Mouse(e) => &mut e.event_type,
            MapEvent::Resize(e) => &mut e.event_type,
        };
        if event_type.is_empty() {
            *event_type = kind.type_name().to_owned();
        }

        Ok(event)
    }

    /// Leaflet event type.
    pub fn event_type(&self) -> &str {
        match self {
            MapEvent::Basic(e) => &e.event_type,
            MapEvent::Mouse(e) => &e.event_type,
            MapEvent::Resize(e) => &e.event_type,
        }
    }

    /// Pointer payload, if this is a pointer notification.
    pub fn as_mouse(&self) -> Option<&MouseEvent> {
        match self {
            MapEvent::Mouse(e) => Some(e),
            _ => None,
        }
    }
}

/// Subscriber of notifications.
pub trait EventHandler: Fn(&MapEvent) + MaybeSend + MaybeSync {}
impl<T: Fn(&MapEvent) + MaybeSend + MaybeSync> EventHandler for T {}

/// Token identifying a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

#[derive(Default)]
struct HandlerTable {
    handlers: HashMap<EventKind, Vec<(SubscriptionId, Arc<dyn EventHandler>)>>,
    next_id: u64,
}

/// Keyed dispatch table from event kind to subscribers.
///
/// Embedded by both [`Map`](crate::Map) and [`Layer`](crate::layer::Layer), so both expose the
/// same subscription API.
#[derive(Clone, Default)]
pub struct EventSource {
    table: Arc<RwLock<HandlerTable>>,
}

impl EventSource {
    /// Creates an event source without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes the handler to the event kind.
    pub fn subscribe(&self, kind: EventKind, handler: impl EventHandler + 'static) -> SubscriptionId {
        let mut table = self.table.write();
        let id = SubscriptionId(table.next_id);
        table.next_id += 1;
        table
            .handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Removes the subscription. Returns false if there was no such subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut table = self.table.write();
        for handlers in table.handlers.values_mut() {
            if let Some(position) = handlers.iter().position(|(sub_id, _)| *sub_id == id) {
                handlers.remove(position);
                return true;
            }
        }

        false
    }

    /// Number of subscribers of the event kind.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.table
            .read()
            .handlers
            .get(&kind)
            .map_or(0, |handlers| handlers.len())
    }

    /// Calls every subscriber of the kind in subscription order.
    pub fn emit(&self, kind: EventKind, event: &MapEvent) {
        let handlers: Vec<_> = match self.table.read().handlers.get(&kind) {
            Some(handlers) => handlers.iter().map(|(_, h)| h.clone()).collect(),
            None => return,
        };

        log::trace!("Emitting {} to {} subscribers", kind.type_name(), handlers.len());
        for handler in handlers {
            handler(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    #[test]
    fn callback_names_round_trip() {
        for kind in EventKind::all() {
            assert_eq!(EventKind::from_callback_name(kind.callback_name()), Some(*kind));
        }
        assert_eq!(EventKind::from_callback_name("NotifyNothing"), None);
    }

    #[test]
    fn map_and_layer_event_sets() {
        assert!(EventKind::MoveEnd.is_map_event());
        assert!(!EventKind::MoveEnd.is_layer_event());
        assert!(EventKind::Click.is_map_event());
        assert!(EventKind::Click.is_layer_event());
        assert!(EventKind::PopupOpen.is_layer_event());
        assert!(!EventKind::PopupOpen.is_map_event());
    }

    #[test]
    fn decodes_mouse_payload() {
        let event = MapEvent::decode(
            EventKind::Click,
            vec![json!({
                "type": "click",
                "latlng": {"lat": 10.0, "lng": 20.0},
                "layerPoint": {"x": 1.0, "y": 2.0},
                "containerPoint": {"x": 3.0, "y": 4.0},
            })],
        )
        .unwrap();

        let mouse = event.as_mouse().unwrap();
        assert_eq!(mouse.lat_lng, LatLng::new(10.0, 20.0));
        assert_eq!(mouse.container_point, Point::new(3.0, 4.0));
    }

    #[test]
    fn missing_payload_gets_kind_type() {
        let event = MapEvent::decode(EventKind::Resize, vec![]).unwrap();
        assert!(matches!(event, MapEvent::Resize(_)));
        assert_eq!(event.event_type(), "resize");

        assert!(MapEvent::decode(EventKind::Load, vec![json!(42)]).is_err());
    }

    #[test]
    fn subscribers_are_called_per_kind() {
        let source = EventSource::new();
        let clicks = Arc::new(AtomicUsize::new(0));

        let counter = clicks.clone();
        let id = source.subscribe(EventKind::Click, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let click = MapEvent::decode(EventKind::Click, vec![]).unwrap();
        source.emit(EventKind::Click, &click);
        source.emit(EventKind::DblClick, &click);
        assert_eq!(clicks.load(Ordering::SeqCst), 1);
        assert_eq!(source.subscriber_count(EventKind::Click), 1);

        assert!(source.unsubscribe(id));
        source.emit(EventKind::Click, &click);
        assert_eq!(clicks.load(Ordering::SeqCst), 1);
        assert!(!source.unsubscribe(id));
    }
}
