//! Ordered layer collection of a map that reports each change to the synchronization engine.

use std::ops::Range;

use tokio::sync::mpsc::UnboundedSender;

use crate::error::SyncError;
use crate::id::LayerId;
use crate::layer::Layer;
use crate::sync::SyncMessage;

/// Kind of a collection change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    /// Layers were added.
    Add,
    /// Layers were removed.
    Remove,
    /// A range of layers was replaced by other layers.
    Replace,
    /// A layer changed its position.
    Move,
}

/// One logical change of a [`LayerCollection`].
#[derive(Debug, Clone)]
pub struct CollectionChange {
    /// Kind of the change.
    pub action: ChangeAction,
    /// Layers that left the collection (or the moved layer).
    pub old_items: Vec<Layer>,
    /// Layers that entered the collection (or the moved layer).
    pub new_items: Vec<Layer>,
}

impl CollectionChange {
    fn new(action: ChangeAction, old_items: Vec<Layer>, new_items: Vec<Layer>) -> Self {
        Self {
            action,
            old_items,
            new_items,
        }
    }
}

/// Ordered sequence of layers without duplicate ids.
///
/// Every operation validates its arguments before touching the sequence, so a failed operation
/// neither changes the collection nor emits a change.
pub struct LayerCollection {
    items: Vec<Layer>,
    changes: UnboundedSender<SyncMessage>,
}

impl LayerCollection {
    pub(crate) fn new(changes: UnboundedSender<SyncMessage>) -> Self {
        Self {
            items: Vec::new(),
            changes,
        }
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection has no layers.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Layers in order.
    pub fn iter(&self) -> impl Iterator<Item = &Layer> + '_ {
        self.items.iter()
    }

    /// Position of the layer with the id.
    pub fn position(&self, id: &LayerId) -> Option<usize> {
        self.items.iter().position(|layer| layer.id() == id)
    }

    /// Appends the layer.
    pub fn add(&mut self, layer: Layer) -> Result<(), SyncError> {
        self.insert(self.items.len(), layer)
    }

    /// Inserts the layer at the index.
    pub fn insert(&mut self, index: usize, layer: Layer) -> Result<(), SyncError> {
        if index > self.items.len() {
            return Err(SyncError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        if self.position(layer.id()).is_some() {
            return Err(SyncError::DuplicateLayer(layer.id().clone()));
        }

        self.items.insert(index, layer.clone());
        self.emit(CollectionChange::new(ChangeAction::Add, vec![], vec![layer]));
        Ok(())
    }

    /// Removes the layer with the id and returns it.
    pub fn remove(&mut self, id: &LayerId) -> Result<Layer, SyncError> {
        let index = self
            .position(id)
            .ok_or_else(|| SyncError::LayerNotFound(id.clone()))?;

        let layer = self.items.remove(index);
        self.emit(CollectionChange::new(
            ChangeAction::Remove,
            vec![layer.clone()],
            vec![],
        ));
        Ok(layer)
    }

    /// Replaces the layers in the range with the new layers as one change. Returns the replaced
    /// layers.
    pub fn replace_range(
        &mut self,
        range: Range<usize>,
        new_items: Vec<Layer>,
    ) -> Result<Vec<Layer>, SyncError> {
        if range.start > range.end || range.end > self.items.len() {
            return Err(SyncError::IndexOutOfRange {
                index: range.end.max(range.start),
                len: self.items.len(),
            });
        }

        for (i, layer) in new_items.iter().enumerate() {
            let kept_duplicate = self
                .position(layer.id())
                .is_some_and(|position| !range.contains(&position));
            let repeated = new_items[..i].iter().any(|other| other.id() == layer.id());
            if kept_duplicate || repeated {
                return Err(SyncError::DuplicateLayer(layer.id().clone()));
            }
        }

        let old_items: Vec<Layer> = self
            .items
            .splice(range, new_items.iter().cloned())
            .collect();
        self.emit(CollectionChange::new(
            ChangeAction::Replace,
            old_items.clone(),
            new_items,
        ));
        Ok(old_items)
    }

    /// Moves the layer at `from` to the index `to`.
    pub fn move_item(&mut self, from: usize, to: usize) -> Result<(), SyncError> {
        let len = self.items.len();
        for index in [from, to] {
            if index >= len {
                return Err(SyncError::IndexOutOfRange { index, len });
            }
        }

        let layer = self.items.remove(from);
        self.items.insert(to, layer.clone());
        self.emit(CollectionChange::new(
            ChangeAction::Move,
            vec![layer.clone()],
            vec![layer],
        ));
        Ok(())
    }

    /// Removes all layers as one change.
    pub fn clear(&mut self) {
        if self.items.is_empty() {
            return;
        }

        let old_items = std::mem::take(&mut self.items);
        self.emit(CollectionChange::new(ChangeAction::Remove, old_items, vec![]));
    }

    fn emit(&self, change: CollectionChange) {
        if self.changes.send(SyncMessage::Change(change)).is_err() {
            log::warn!("Layer collection changed after the synchronization engine stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    use super::*;
    use crate::layer::Marker;

    fn collection() -> (LayerCollection, UnboundedReceiver<SyncMessage>) {
        let (tx, rx) = unbounded_channel();
        (LayerCollection::new(tx), rx)
    }

    fn marker(id: &str) -> Layer {
        Layer::with_id(id, Marker::new((0.0, 0.0)))
    }

    fn next_change(rx: &mut UnboundedReceiver<SyncMessage>) -> CollectionChange {
        match rx.try_recv() {
            Ok(SyncMessage::Change(change)) => change,
            _ => panic!("expected a collection change"),
        }
    }

    fn ids(layers: &[Layer]) -> Vec<&str> {
        layers.iter().map(|layer| layer.id().as_str()).collect()
    }

    #[test]
    fn add_and_remove_emit_changes() {
        let (mut layers, mut rx) = collection();
        layers.add(marker("a")).unwrap();
        layers.add(marker("b")).unwrap();
        layers.remove(&LayerId::from("a")).unwrap();

        let first = next_change(&mut rx);
        assert_eq!(first.action, ChangeAction::Add);
        assert_eq!(ids(&first.new_items), vec!["a"]);
        next_change(&mut rx);
        let removed = next_change(&mut rx);
        assert_eq!(removed.action, ChangeAction::Remove);
        assert_eq!(ids(&removed.old_items), vec!["a"]);
        assert!(rx.try_recv().is_err());
        assert_eq!(layers.len(), 1);
    }

    #[test]
    fn invalid_operations_emit_nothing() {
        let (mut layers, mut rx) = collection();
        layers.add(marker("a")).unwrap();
        next_change(&mut rx);

        assert!(matches!(
            layers.add(marker("a")),
            Err(SyncError::DuplicateLayer(_))
        ));
        assert!(matches!(
            layers.remove(&LayerId::from("x")),
            Err(SyncError::LayerNotFound(_))
        ));
        assert!(matches!(
            layers.insert(5, marker("b")),
            Err(SyncError::IndexOutOfRange { index: 5, len: 1 })
        ));
        assert!(matches!(
            layers.replace_range(0..2, vec![]),
            Err(SyncError::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            layers.replace_range(1..1, vec![marker("c"), marker("c")]),
            Err(SyncError::DuplicateLayer(_))
        ));
        assert!(matches!(
            layers.move_item(0, 1),
            Err(SyncError::IndexOutOfRange { index: 1, len: 1 })
        ));

        assert!(rx.try_recv().is_err());
        assert_eq!(layers.len(), 1);
    }

    #[test]
    fn replace_range_is_one_change() {
        let (mut layers, mut rx) = collection();
        layers.add(marker("a")).unwrap();
        layers.add(marker("z")).unwrap();
        next_change(&mut rx);
        next_change(&mut rx);

        // The replaced layer may come back within the same replacement.
        let old = layers
            .replace_range(0..1, vec![marker("b"), marker("a")])
            .unwrap();
        assert_eq!(ids(&old), vec!["a"]);

        let change = next_change(&mut rx);
        assert_eq!(change.action, ChangeAction::Replace);
        assert_eq!(ids(&change.old_items), vec!["a"]);
        assert_eq!(ids(&change.new_items), vec!["b", "a"]);
        let current: Vec<Layer> = layers.iter().cloned().collect();
        assert_eq!(ids(&current), vec!["b", "a", "z"]);
    }

    #[test]
    fn move_and_clear() {
        let (mut layers, mut rx) = collection();
        for id in ["a", "b", "c"] {
            layers.add(marker(id)).unwrap();
            next_change(&mut rx);
        }

        layers.move_item(0, 2).unwrap();
        let moved = next_change(&mut rx);
        assert_eq!(moved.action, ChangeAction::Move);
        assert_eq!(ids(&moved.old_items), vec!["a"]);
        assert_eq!(layers.position(&LayerId::from("a")), Some(2));

        layers.clear();
        let cleared = next_change(&mut rx);
        assert_eq!(cleared.action, ChangeAction::Remove);
        assert_eq!(ids(&cleared.old_items), vec!["b", "c", "a"]);
        assert!(layers.is_empty());

        layers.clear();
        assert!(rx.try_recv().is_err());
    }
}
