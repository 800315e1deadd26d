//! Synchronization engine: turns layer collection changes into remote calls.
//!
//! Every map owns one engine task. The task consumes the map's change queue strictly in order and
//! awaits each remote call before starting the next one, so the remote side observes the changes
//! in the order they were made locally.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;

use crate::async_runtime;
use crate::channel::{RemoteChannel, RemoteOp};
use crate::collection::{ChangeAction, CollectionChange};
use crate::error::{ErrorSignal, SyncError};
use crate::id::MapId;
use crate::layer::{Layer, LayerKind};
use crate::table::ReferenceTable;

/// Message consumed by the engine task.
pub(crate) enum SyncMessage {
    /// Collection change to apply remotely.
    Change(CollectionChange),
    /// Completes the sender once all previous messages are processed.
    Flush(oneshot::Sender<()>),
}

/// Remote operation adding a layer of the variant.
pub fn add_operation(kind: &LayerKind) -> RemoteOp {
    match kind {
        LayerKind::Tile(_) => RemoteOp::AddTileLayer,
        LayerKind::MbTiles(_) => RemoteOp::AddMbTilesLayer,
        LayerKind::Shapefile(_) => RemoteOp::AddShapefileLayer,
        LayerKind::Marker(_) => RemoteOp::AddMarker,
        LayerKind::Rectangle(_) => RemoteOp::AddRectangle,
        LayerKind::Circle(_) => RemoteOp::AddCircle,
        LayerKind::Polygon(_) => RemoteOp::AddPolygon,
        LayerKind::Polyline(_) => RemoteOp::AddPolyline,
        LayerKind::Image(_) => RemoteOp::AddImageLayer,
        LayerKind::GeoJson(_) => RemoteOp::AddGeoJsonLayer,
    }
}

/// Remote operation replacing the geometry and style of a shape.
pub fn update_shape_operation(kind: &LayerKind) -> Result<RemoteOp, SyncError> {
    match kind {
        LayerKind::Rectangle(_) => Ok(RemoteOp::UpdateRectangle),
        LayerKind::Circle(_) => Ok(RemoteOp::UpdateCircle),
        LayerKind::Polygon(_) => Ok(RemoteOp::UpdatePolygon),
        LayerKind::Polyline(_) => Ok(RemoteOp::UpdatePolyline),
        LayerKind::Tile(_)
        | LayerKind::MbTiles(_)
        | LayerKind::Shapefile(_)
        | LayerKind::Marker(_)
        | LayerKind::Image(_)
        | LayerKind::GeoJson(_) => Err(SyncError::UnsupportedLayerVariant {
            kind: kind.name(),
            operation: "updateShape",
        }),
    }
}

/// Applies collection changes of one map to the remote side.
pub(crate) struct SyncEngine {
    map_id: MapId,
    table: Arc<ReferenceTable>,
    channel: Arc<dyn RemoteChannel>,
    errors: ErrorSignal,
}

impl SyncEngine {
    pub(crate) fn new(
        map_id: MapId,
        table: Arc<ReferenceTable>,
        channel: Arc<dyn RemoteChannel>,
        errors: ErrorSignal,
    ) -> Self {
        Self {
            map_id,
            table,
            channel,
            errors,
        }
    }

    /// Starts the engine task. The task ends once every sender of the queue is dropped and the
    /// remaining messages are processed.
    pub(crate) fn spawn(self, messages: UnboundedReceiver<SyncMessage>) -> Result<(), SyncError> {
        async_runtime::spawn("layer synchronization", self.run(messages))
    }

    async fn run(self, mut messages: UnboundedReceiver<SyncMessage>) {
        log::debug!("Synchronization engine of map {} started", self.map_id);

        while let Some(message) = messages.recv().await {
            match message {
                SyncMessage::Change(change) => self.process(change).await,
                SyncMessage::Flush(done) => {
                    // The waiting side may have given up already.
                    let _ = done.send(());
                }
            }
        }

        log::debug!("Synchronization engine of map {} stopped", self.map_id);
    }

    pub(crate) async fn process(&self, change: CollectionChange) {
        log::trace!(
            "Map {} processing {:?} change: {} removed, {} added",
            self.map_id,
            change.action,
            change.old_items.len(),
            change.new_items.len()
        );

        match change.action {
            ChangeAction::Add => {
                for layer in &change.new_items {
                    self.add_layer(layer).await;
                }
            }
            ChangeAction::Remove => {
                for layer in &change.old_items {
                    self.remove_layer(layer).await;
                }
            }
            ChangeAction::Replace | ChangeAction::Move => {
                for layer in &change.old_items {
                    self.remove_layer(layer).await;
                }
                for layer in &change.new_items {
                    self.add_layer(layer).await;
                }
            }
        }
    }

    async fn add_layer(&self, layer: &Layer) {
        if let Err(err) = self.try_add_layer(layer).await {
            self.errors.publish(&err);
        }
    }

    async fn try_add_layer(&self, layer: &Layer) -> Result<(), SyncError> {
        let reference = self.table.register_layer(&self.map_id, layer)?;

        let result = match layer.payload() {
            Ok(payload) => {
                let operation = add_operation(&layer.kind());
                log::debug!("Adding layer {} to map {} with {operation}", layer.id(), self.map_id);
                self.channel
                    .invoke(operation, vec![self.map_arg(), payload, reference])
                    .await
            }
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            // The remote object does not exist, so neither may the entry.
            self.table.unregister_layer_of(&self.map_id, layer.id());
            return Err(err);
        }

        Ok(())
    }

    async fn remove_layer(&self, layer: &Layer) {
        log::debug!("Removing layer {} from map {}", layer.id(), self.map_id);
        let result = self
            .channel
            .invoke(
                RemoteOp::RemoveLayer,
                vec![self.map_arg(), Value::from(layer.id().as_str())],
            )
            .await;

        self.table.unregister_layer_of(&self.map_id, layer.id());
        if let Err(err) = result {
            self.errors.publish(&err);
        }
    }

    fn map_arg(&self) -> Value {
        Value::from(self.map_id.as_str())
    }
}
