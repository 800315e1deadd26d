//! Browser transport for [`leafsync`] maps.
//!
//! [`WebChannel`] calls the Leaflet interop functions that the page installs under a global
//! namespace object (`window.leafletBlazor` by default). Every remote operation is a function of
//! that object with the operation's wire name, for example `addMarker(mapId, marker, binding)`.
//! Binding arguments are passed as objects with an `invokeMethodAsync(method, ...args)` function
//! returning a promise, which is how the scripts call back into the map and its layers.
//!
//! Everything but the configuration and error types is only available on `wasm32` targets.

mod error;

#[cfg(target_arch = "wasm32")]
mod channel;

pub use error::WebChannelError;

#[cfg(target_arch = "wasm32")]
pub use channel::{init_logger, WebChannel};

/// Default name of the global object that holds the interop functions.
pub const DEFAULT_NAMESPACE: &str = "leafletBlazor";

/// Settings of a [`WebChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebChannelConfig {
    /// Property of `window` that holds the interop functions.
    pub namespace: String,
}

impl WebChannelConfig {
    /// Configuration for interop functions installed under the given global name.
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

impl Default for WebChannelConfig {
    fn default() -> Self {
        Self::with_namespace(DEFAULT_NAMESPACE)
    }
}

/// Key of the binding references produced by the browser channel.
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
pub(crate) const BINDING_KEY: &str = "bindingId";

/// Builds the JSON reference for the binding with the id.
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
pub(crate) fn binding_reference(id: u64) -> serde_json::Value {
    serde_json::json!({ BINDING_KEY: id })
}

/// Extracts the binding id if the argument is a binding reference.
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
pub(crate) fn binding_id(arg: &serde_json::Value) -> Option<u64> {
    let object = arg.as_object()?;
    if object.len() != 1 {
        return None;
    }
    object.get(BINDING_KEY)?.as_u64()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn default_namespace() {
        assert_eq!(WebChannelConfig::default().namespace, "leafletBlazor");
        assert_eq!(WebChannelConfig::with_namespace("maps").namespace, "maps");
    }

    #[test]
    fn only_exact_references_are_bindings() {
        assert_eq!(binding_id(&binding_reference(7)), Some(7));
        assert_eq!(binding_id(&json!({"bindingId": 7, "id": "m1"})), None);
        assert_eq!(binding_id(&json!({"bindingId": "7"})), None);
        assert_eq!(binding_id(&json!("bindingId")), None);
    }
}
