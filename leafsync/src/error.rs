//! Error types used by the library.

use std::sync::Arc;

use maybe_sync::{MaybeSend, MaybeSync};
use parking_lot::RwLock;
use thiserror::Error;

use crate::event::SubscriptionId;
use crate::id::{LayerId, MapId};

/// Error from any synchronization operation.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// No map with the given id is registered in the reference table.
    #[error("unable to find map {0}")]
    UnknownMap(MapId),

    /// No layer with the given id is registered in the reference table.
    ///
    /// This is an expected outcome when a remote callback arrives after the layer was removed.
    #[error("unable to find layer {0}")]
    UnknownLayer(LayerId),

    /// The id is already registered. Ids are random, so this indicates a broken invariant.
    #[error("id {0} is already registered")]
    DuplicateRegistration(String),

    /// The transport to the remote side failed.
    #[error("channel failure during {operation}: {reason}")]
    ChannelFailure {
        /// Wire name of the operation.
        operation: String,
        /// Transport error description.
        reason: String,
    },

    /// The remote engine reported an error.
    #[error("remote side rejected {operation}: {message}")]
    RemoteRejected {
        /// Wire name of the operation.
        operation: String,
        /// Error message reported by the remote engine.
        message: String,
    },

    /// The operation is not defined for the layer variant.
    #[error("operation {operation} is not supported for {kind} layers")]
    UnsupportedLayerVariant {
        /// Variant name of the layer.
        kind: &'static str,
        /// Operation that was requested.
        operation: &'static str,
    },

    /// The map has not been initialized by the host environment yet.
    #[error("map {0} is not initialized")]
    UninitializedMap(MapId),

    /// The map was already initialized.
    #[error("map {0} is already initialized")]
    AlreadyInitialized(MapId),

    /// A layer with the same id is already in the collection.
    #[error("layer {0} is already in the collection")]
    DuplicateLayer(LayerId),

    /// The layer is registered with another map. A layer belongs to at most one map at a time.
    #[error("layer {layer} belongs to map {owner}")]
    LayerOwnedByOtherMap {
        /// Layer that was added.
        layer: LayerId,
        /// Map the layer is registered with.
        owner: MapId,
    },

    /// The layer is not in the collection.
    #[error("layer {0} is not in the collection")]
    LayerNotFound(LayerId),

    /// Index or range is outside of the collection bounds.
    #[error("index {index} is out of range for collection of length {len}")]
    IndexOutOfRange {
        /// Offending index (end of range for range operations).
        index: usize,
        /// Collection length at the time of the call.
        len: usize,
    },

    /// The remote side invoked a callback method the target does not handle.
    #[error("callback {0} is not handled")]
    UnknownCallback(String),

    /// Background work was requested outside of an async runtime.
    #[error("no async runtime available to run {0}")]
    RuntimeUnavailable(&'static str),

    /// A payload could not be converted to or from its JSON representation.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl SyncError {
    /// Returns true if the error came from the remote channel (transport or remote logic).
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            SyncError::ChannelFailure { .. } | SyncError::RemoteRejected { .. }
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(value: serde_json::Error) -> Self {
        SyncError::InvalidPayload(value.to_string())
    }
}

/// Handler of background errors.
pub trait ErrorHandler: Fn(&SyncError) + MaybeSend + MaybeSync {}
impl<T: Fn(&SyncError) + MaybeSend + MaybeSync> ErrorHandler for T {}

/// Signal that receives errors from work that has no caller to return them to.
///
/// Collection change processing and fire-and-forget property updates publish their failures here
/// instead of interrupting event processing.
#[derive(Clone, Default)]
pub struct ErrorSignal {
    handlers: Arc<RwLock<Vec<(SubscriptionId, Arc<dyn ErrorHandler>)>>>,
    next_id: Arc<std::sync::atomic::AtomicU64>,
}

impl ErrorSignal {
    /// Creates a signal without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler, returning a token to remove it with.
    pub fn subscribe(&self, handler: impl ErrorHandler + 'static) -> SubscriptionId {
        let id = SubscriptionId::new(
            self.next_id
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed),
        );
        self.handlers.write().push((id, Arc::new(handler)));
        id
    }

    /// Removes a handler. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, token: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let len = handlers.len();
        handlers.retain(|(id, _)| *id != token);
        handlers.len() != len
    }

    /// Logs the error and hands it to every subscriber.
    pub fn publish(&self, error: &SyncError) {
        log::error!("Background synchronization error: {error}");

        // Handlers may subscribe or unsubscribe, so call them outside of the lock.
        let handlers: Vec<_> = self
            .handlers
            .read()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn publish_reaches_all_subscribers_until_unsubscribed() {
        let signal = ErrorSignal::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = count.clone();
        let first = signal.subscribe(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = count.clone();
        signal.subscribe(move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        });

        let error = SyncError::UnknownLayer(LayerId::from("l1"));
        signal.publish(&error);
        assert_eq!(count.load(Ordering::SeqCst), 11);

        assert!(signal.unsubscribe(first));
        assert!(!signal.unsubscribe(first));
        signal.publish(&error);
        assert_eq!(count.load(Ordering::SeqCst), 21);
    }

    #[test]
    fn remote_errors_are_classified() {
        let failure = SyncError::ChannelFailure {
            operation: "addMarker".into(),
            reason: "closed".into(),
        };
        assert!(failure.is_remote());
        assert!(failure.to_string().contains("addMarker"));
        assert!(!SyncError::UnknownMap(MapId::from("m")).is_remote());
    }
}
