//! Registry tying local maps and layers to their remote counterparts.
//!
//! Both mappings live in a single arena behind one lock, so a layer entry and the map entry it
//! points to can never be observed out of sync. Callback bindings created here route inbound calls
//! back through the table by id: a callback that arrives after its layer was removed fails with
//! [`SyncError::UnknownLayer`] instead of reaching a stale object.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;

use crate::channel::{CallbackBinding, CallbackTarget, RemoteChannel};
use crate::error::SyncError;
use crate::id::{LayerId, MapId};
use crate::layer::Layer;
use crate::map::{Map, WeakMap};

struct MapEntry {
    map: WeakMap,
    channel: Arc<dyn RemoteChannel>,
}

struct LayerEntry {
    binding: Box<dyn CallbackBinding>,
    map_id: MapId,
    layer: Layer,
}

#[derive(Default)]
struct Entries {
    maps: HashMap<MapId, MapEntry>,
    layers: HashMap<LayerId, LayerEntry>,
}

/// Local object an inbound call is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteTarget {
    /// A registered map.
    Map(MapId),
    /// A registered layer.
    Layer(LayerId),
}

impl RouteTarget {
    fn unknown(&self) -> SyncError {
        match self {
            RouteTarget::Map(id) => SyncError::UnknownMap(id.clone()),
            RouteTarget::Layer(id) => SyncError::UnknownLayer(id.clone()),
        }
    }
}

/// Reference table of maps and layers.
pub struct ReferenceTable {
    entries: Mutex<Entries>,
    this: Weak<ReferenceTable>,
}

impl ReferenceTable {
    /// Creates an empty table.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            entries: Mutex::new(Entries::default()),
            this: this.clone(),
        })
    }

    /// Process-wide table used by maps that are not given one explicitly.
    pub fn global() -> Arc<Self> {
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "wasm32")] {
                thread_local! {
                    static GLOBAL: Arc<ReferenceTable> = ReferenceTable::new();
                }
                GLOBAL.with(Arc::clone)
            } else {
                static GLOBAL: std::sync::OnceLock<Arc<ReferenceTable>> = std::sync::OnceLock::new();
                GLOBAL.get_or_init(ReferenceTable::new).clone()
            }
        }
    }

    /// Registers the map together with the channel to its remote counterpart.
    pub fn register_map(&self, map: &Map, channel: Arc<dyn RemoteChannel>) -> Result<(), SyncError> {
        let mut entries = self.entries.lock();
        if entries.maps.contains_key(map.id()) {
            return Err(SyncError::DuplicateRegistration(map.id().to_string()));
        }

        entries.maps.insert(
            map.id().clone(),
            MapEntry {
                map: map.downgrade(),
                channel,
            },
        );
        log::debug!("Registered map {}", map.id());

        Ok(())
    }

    /// Removes the map and every layer entry it owns. Returns false if the map was not registered.
    pub fn unregister_map(&self, map_id: &MapId) -> bool {
        let (found, bindings) = {
            let mut entries = self.entries.lock();
            let found = entries.maps.remove(map_id).is_some();
            let owned: Vec<LayerId> = entries
                .layers
                .iter()
                .filter(|(_, entry)| entry.map_id == *map_id)
                .map(|(id, _)| id.clone())
                .collect();
            let bindings: Vec<_> = owned
                .iter()
                .filter_map(|id| entries.layers.remove(id))
                .map(|entry| entry.binding)
                .collect();
            (found, bindings)
        };

        for binding in &bindings {
            binding.dispose();
        }
        if found {
            log::debug!(
                "Unregistered map {map_id} with {} layer entries",
                bindings.len()
            );
        }

        found
    }

    /// Returns the map with the id if it is registered and still alive.
    pub fn lookup_map(&self, map_id: &MapId) -> Result<Map, SyncError> {
        self.entries
            .lock()
            .maps
            .get(map_id)
            .and_then(|entry| entry.map.upgrade())
            .ok_or_else(|| SyncError::UnknownMap(map_id.clone()))
    }

    /// Returns the channel of the map.
    pub fn lookup_channel_for_map(&self, map_id: &MapId) -> Result<Arc<dyn RemoteChannel>, SyncError> {
        self.entries
            .lock()
            .maps
            .get(map_id)
            .map(|entry| entry.channel.clone())
            .ok_or_else(|| SyncError::UnknownMap(map_id.clone()))
    }

    /// Creates a callback binding for the layer through the channel of its map and stores the
    /// entry. Returns the binding reference to pass along with the remote add operation.
    pub fn register_layer(&self, map_id: &MapId, layer: &Layer) -> Result<Value, SyncError> {
        let mut entries = self.entries.lock();
        if entries.layers.contains_key(layer.id()) {
            return Err(SyncError::DuplicateRegistration(layer.id().to_string()));
        }

        let channel = entries
            .maps
            .get(map_id)
            .map(|entry| entry.channel.clone())
            .ok_or_else(|| SyncError::UnknownMap(map_id.clone()))?;
        let binding = channel.bind(self.route(RouteTarget::Layer(layer.id().clone())))?;
        let reference = binding.reference();

        entries.layers.insert(
            layer.id().clone(),
            LayerEntry {
                binding,
                map_id: map_id.clone(),
                layer: layer.clone(),
            },
        );
        log::debug!("Registered {} layer {} on map {map_id}", layer.kind_name(), layer.id());

        Ok(reference)
    }

    /// Removes the layer entry and disposes its binding. Returns false if there was no entry, so
    /// calling it again is a no-op.
    pub fn unregister_layer(&self, layer_id: &LayerId) -> bool {
        let removed = self.entries.lock().layers.remove(layer_id);
        Self::dispose_entry(layer_id, removed)
    }

    /// Like [`ReferenceTable::unregister_layer`], but keeps the entry if the layer is registered
    /// with a different map.
    pub fn unregister_layer_of(&self, map_id: &MapId, layer_id: &LayerId) -> bool {
        let removed = {
            let mut entries = self.entries.lock();
            match entries.layers.get(layer_id).map(|entry| entry.map_id == *map_id) {
                Some(true) => entries.layers.remove(layer_id),
                Some(false) => {
                    log::warn!("Layer {layer_id} is registered with another map than {map_id}");
                    None
                }
                None => None,
            }
        };
        Self::dispose_entry(layer_id, removed)
    }

    fn dispose_entry(layer_id: &LayerId, removed: Option<LayerEntry>) -> bool {
        match removed {
            Some(entry) => {
                entry.binding.dispose();
                log::debug!("Unregistered layer {layer_id}");
                true
            }
            None => false,
        }
    }

    /// Returns the id and channel of the map owning the layer.
    pub fn resolve_owning_map_and_channel(
        &self,
        layer_id: &LayerId,
    ) -> Result<(MapId, Arc<dyn RemoteChannel>), SyncError> {
        let entries = self.entries.lock();
        let map_id = entries
            .layers
            .get(layer_id)
            .map(|entry| entry.map_id.clone())
            .ok_or_else(|| SyncError::UnknownLayer(layer_id.clone()))?;
        let channel = entries
            .maps
            .get(&map_id)
            .map(|entry| entry.channel.clone())
            .ok_or_else(|| SyncError::UnknownMap(map_id.clone()))?;

        Ok((map_id, channel))
    }

    /// Id of the map the layer is registered with.
    pub fn owner_of(&self, layer_id: &LayerId) -> Option<MapId> {
        self.entries
            .lock()
            .layers
            .get(layer_id)
            .map(|entry| entry.map_id.clone())
    }

    /// Returns the registered layer.
    pub fn lookup_layer(&self, layer_id: &LayerId) -> Result<Layer, SyncError> {
        self.entries
            .lock()
            .layers
            .get(layer_id)
            .map(|entry| entry.layer.clone())
            .ok_or_else(|| SyncError::UnknownLayer(layer_id.clone()))
    }

    /// Whether the layer is registered.
    pub fn contains_layer(&self, layer_id: &LayerId) -> bool {
        self.entries.lock().layers.contains_key(layer_id)
    }

    /// Number of registered layers of all maps.
    pub fn layer_count(&self) -> usize {
        self.entries.lock().layers.len()
    }

    /// Ids of the layers registered for the map.
    pub fn layers_of(&self, map_id: &MapId) -> Vec<LayerId> {
        let mut ids: Vec<_> = self
            .entries
            .lock()
            .layers
            .iter()
            .filter(|(_, entry)| entry.map_id == *map_id)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Callback target that resolves the object through this table on every call.
    pub fn route(&self, target: RouteTarget) -> Arc<dyn CallbackTarget> {
        Arc::new(TableRoute {
            table: self.this.clone(),
            target,
        })
    }

    /// Delivers an inbound call to the addressed map or layer.
    pub async fn dispatch(
        &self,
        target: &RouteTarget,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, SyncError> {
        match target {
            RouteTarget::Map(map_id) => {
                let map = self.lookup_map(map_id)?;
                map.handle_callback(method, args).await
            }
            RouteTarget::Layer(layer_id) => {
                let layer = self.lookup_layer(layer_id)?;
                layer.handle_callback(method, args)
            }
        }
    }
}

struct TableRoute {
    table: Weak<ReferenceTable>,
    target: RouteTarget,
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl CallbackTarget for TableRoute {
    async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, SyncError> {
        let Some(table) = self.table.upgrade() else {
            return Err(self.target.unknown());
        };

        let result = table.dispatch(&self.target, method, args).await;
        if let Err(SyncError::UnknownLayer(id)) = &result {
            log::warn!("Dropping {method} callback for layer {id} that is no longer registered");
        }

        result
    }
}
