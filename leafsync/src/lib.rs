//! Leafsync keeps a local model of an interactive map (view state and an ordered set of layers)
//! in sync with a Leaflet map that is rendered somewhere else: in a browser page, a webview or
//! another process.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use leafsync::channel::memory::MemoryChannel;
//! use leafsync::event::EventKind;
//! use leafsync::layer::{Layer, Marker, TileLayer};
//! use leafsync::MapBuilder;
//!
//! # async fn run() -> Result<(), leafsync::SyncError> {
//! let map = MapBuilder::new()
//!     .with_center((52.52, 13.40))
//!     .with_zoom(12.0)
//!     .build(Arc::new(MemoryChannel::new()))?;
//!
//! map.create().await?;
//! map.initialize()?;
//!
//! map.add_layer(Layer::new(TileLayer::osm()))?;
//! map.add_layer(Layer::new(Marker::new((52.52, 13.40)).with_title("Berlin")))?;
//! map.on(EventKind::MoveEnd, |event| log::info!("view moved: {}", event.event_type()));
//! # Ok(())
//! # }
//! ```
//!
//! # Main components
//!
//! * [`Map`] holds the view state, the layer collection and event subscriptions. Changes of the
//!   collection are applied remotely, in order, by a background task of the map.
//! * [`layers`](layer) are shared handles to markers, shapes, tile sources and GeoJSON data.
//! * The [`ReferenceTable`] ties map and layer ids to the local objects and their callback
//!   bindings, so calls from the remote side find their way back.
//! * A [`RemoteChannel`](channel::RemoteChannel) carries operations to the remote engine. The
//!   crate ships a [`MemoryChannel`](channel::memory::MemoryChannel); the `leafsync-web` crate
//!   talks to Leaflet in the browser.
//!
//! Work that has no caller to report to (layer synchronization, background view updates) reports
//! failures to [`Map::on_background_error`] subscribers.

pub(crate) mod async_runtime;
pub mod channel;
mod collection;
pub mod error;
pub mod event;
pub mod geo;
pub mod id;
pub mod layer;
mod map;
mod sync;
mod table;

pub use collection::{ChangeAction, CollectionChange, LayerCollection};
pub use error::{ErrorSignal, SyncError};
pub use geo::{LatLng, LatLngBounds, Point};
pub use id::{LayerId, MapId};
pub use map::{InitializedHandler, Map, MapBuilder, MapOptions, PanOptions, WeakMap};
pub use sync::{add_operation, update_shape_operation};
pub use table::{ReferenceTable, RouteTarget};
