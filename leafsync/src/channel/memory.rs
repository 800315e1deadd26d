//! In-process channel that records calls instead of sending them anywhere.
//!
//! Useful for running a [`Map`](crate::Map) without a renderer (server side state, tests) and for
//! simulating the remote side: scripted query results, failing operations and inbound callbacks.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;

use super::{CallbackBinding, CallbackTarget, RemoteChannel, RemoteOp};
use crate::error::SyncError;

const BINDING_KEY: &str = "bindingId";

/// Call recorded by [`MemoryChannel`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Invoked operation.
    pub operation: RemoteOp,
    /// Arguments of the call.
    pub args: Vec<Value>,
}

#[derive(Default)]
struct MemoryState {
    calls: Vec<RecordedCall>,
    responses: HashMap<RemoteOp, Value>,
    failures: HashMap<RemoteOp, SyncError>,
    bindings: HashMap<u64, Arc<dyn CallbackTarget>>,
    next_binding: u64,
}

/// Channel keeping everything in memory.
#[derive(Clone, Default)]
pub struct MemoryChannel {
    state: Arc<Mutex<MemoryState>>,
    call_recorded: Arc<Notify>,
}

impl MemoryChannel {
    /// Creates a channel that answers every call with `null`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value returned by all following calls of the operation.
    pub fn respond(&self, operation: RemoteOp, value: Value) {
        self.state.lock().responses.insert(operation, value);
    }

    /// Makes all following calls of the operation fail with the given error.
    pub fn fail(&self, operation: RemoteOp, error: SyncError) {
        self.state.lock().failures.insert(operation, error);
    }

    /// Stops failing the operation.
    pub fn clear_failure(&self, operation: RemoteOp) {
        self.state.lock().failures.remove(&operation);
    }

    /// All calls recorded so far, in invocation order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Recorded calls of one operation.
    pub fn calls_of(&self, operation: RemoteOp) -> Vec<RecordedCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .cloned()
            .collect()
    }

    /// Sequence of invoked operations.
    pub fn operations(&self) -> Vec<RemoteOp> {
        self.state
            .lock()
            .calls
            .iter()
            .map(|call| call.operation)
            .collect()
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Waits until at least `count` calls are recorded.
    pub async fn wait_for_calls(&self, count: usize) {
        loop {
            let notified = self.call_recorded.notified();
            if self.state.lock().calls.len() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Number of bindings that were created and not disposed yet.
    pub fn live_bindings(&self) -> usize {
        self.state.lock().bindings.len()
    }

    /// Calls a method of the target behind the binding reference, as the remote side would.
    pub async fn callback(
        &self,
        reference: &Value,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, SyncError> {
        let id = reference
            .get(BINDING_KEY)
            .and_then(Value::as_u64)
            .ok_or_else(|| SyncError::InvalidPayload(format!("not a binding reference: {reference}")))?;
        let target = self.state.lock().bindings.get(&id).cloned().ok_or_else(|| {
            SyncError::RemoteRejected {
                operation: method.to_owned(),
                message: format!("binding {id} is disposed"),
            }
        })?;

        target.invoke(method, args).await
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl RemoteChannel for MemoryChannel {
    async fn invoke(&self, operation: RemoteOp, args: Vec<Value>) -> Result<Value, SyncError> {
        log::trace!("Memory channel call {operation} with {} arguments", args.len());

        let result = {
            let mut state = self.state.lock();
            state.calls.push(RecordedCall { operation, args });
            match state.failures.get(&operation) {
                Some(error) => Err(error.clone()),
                None => Ok(state
                    .responses
                    .get(&operation)
                    .cloned()
                    .unwrap_or(Value::Null)),
            }
        };

        self.call_recorded.notify_waiters();
        result
    }

    fn bind(&self, target: Arc<dyn CallbackTarget>) -> Result<Box<dyn CallbackBinding>, SyncError> {
        let mut state = self.state.lock();
        let id = state.next_binding;
        state.next_binding += 1;
        state.bindings.insert(id, target);

        Ok(Box::new(MemoryBinding {
            id,
            state: Arc::downgrade(&self.state),
        }))
    }
}

struct MemoryBinding {
    id: u64,
    state: Weak<Mutex<MemoryState>>,
}

impl CallbackBinding for MemoryBinding {
    fn reference(&self) -> Value {
        json!({ BINDING_KEY: self.id })
    }

    fn dispose(&self) {
        if let Some(state) = self.state.upgrade() {
            state.lock().bindings.remove(&self.id);
        }
    }
}
