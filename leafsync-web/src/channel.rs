use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use js_sys::{Array, Function, Promise, Reflect};
use leafsync::channel::{CallbackBinding, CallbackTarget, RemoteChannel, RemoteOp};
use leafsync::SyncError;
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};

use crate::{binding_id, binding_reference, WebChannelConfig, WebChannelError};

#[wasm_bindgen(inline_js = "
export function leafsync_binding_object(dispatch) {
    return {
        invokeMethodAsync(method, ...args) {
            return dispatch(method, args);
        },
    };
}
")]
extern "C" {
    fn leafsync_binding_object(dispatch: &Function) -> JsValue;
}

type Dispatch = Closure<dyn FnMut(String, Array) -> Promise>;

/// Installs the panic hook and routes `log` records to the browser console.
///
/// Calling it more than once is harmless.
pub fn init_logger(level: log::Level) {
    console_error_panic_hook::set_once();
    if console_log::init_with_level(level).is_err() {
        log::debug!("Console logger is already installed");
    }
}

#[derive(Default)]
struct BindingRegistry {
    next_id: Cell<u64>,
    objects: RefCell<HashMap<u64, JsValue>>,
}

/// [`RemoteChannel`] calling Leaflet interop functions of the page.
#[derive(Default)]
pub struct WebChannel {
    config: WebChannelConfig,
    bindings: Rc<BindingRegistry>,
}

impl WebChannel {
    /// Creates a channel with the configuration.
    pub fn new(config: WebChannelConfig) -> Self {
        Self {
            config,
            bindings: Rc::default(),
        }
    }

    /// Configuration of the channel.
    pub fn config(&self) -> &WebChannelConfig {
        &self.config
    }

    /// Number of bindings that were not disposed yet.
    pub fn live_bindings(&self) -> usize {
        self.bindings.objects.borrow().len()
    }

    fn namespace(&self) -> Result<JsValue, WebChannelError> {
        let window = web_sys::window().ok_or(WebChannelError::NoWindow)?;
        let namespace =
            Reflect::get(&window, &JsValue::from_str(&self.config.namespace)).map_err(rejected)?;
        if namespace.is_undefined() || namespace.is_null() {
            return Err(WebChannelError::MissingNamespace(self.config.namespace.clone()));
        }

        Ok(namespace)
    }

    fn js_args(&self, args: &[Value]) -> Result<Array, WebChannelError> {
        let objects = self.bindings.objects.borrow();
        let array = Array::new();
        for arg in args {
            let value = match binding_id(arg) {
                Some(id) => objects
                    .get(&id)
                    .cloned()
                    .ok_or(WebChannelError::DisposedBinding(id))?,
                None => to_js(arg)?,
            };
            array.push(&value);
        }

        Ok(array)
    }

    async fn call(&self, operation: RemoteOp, args: &[Value]) -> Result<Value, WebChannelError> {
        let namespace = self.namespace()?;
        let function = Reflect::get(&namespace, &JsValue::from_str(operation.name()))
            .map_err(rejected)?
            .dyn_into::<Function>()
            .map_err(|_| WebChannelError::MissingFunction(operation.name().to_string()))?;

        let args = self.js_args(args)?;
        let returned = function.apply(&namespace, &args).map_err(rejected)?;
        let result = match returned.dyn_into::<Promise>() {
            Ok(promise) => JsFuture::from(promise).await.map_err(rejected)?,
            Err(value) => value,
        };

        from_js(result)
    }
}

#[async_trait::async_trait(?Send)]
impl RemoteChannel for WebChannel {
    async fn invoke(&self, operation: RemoteOp, args: Vec<Value>) -> Result<Value, SyncError> {
        log::trace!("Calling {operation} with {} arguments", args.len());
        self.call(operation, &args)
            .await
            .map_err(|err| err.into_sync_error(operation.name()))
    }

    fn bind(&self, target: Arc<dyn CallbackTarget>) -> Result<Box<dyn CallbackBinding>, SyncError> {
        let id = self.bindings.next_id.get();
        self.bindings.next_id.set(id + 1);

        let dispatch: Dispatch = Closure::new(move |method: String, args: Array| {
            let target = target.clone();
            future_to_promise(async move {
                let args = args
                    .iter()
                    .map(from_js)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(to_js_error)?;
                let result = target.invoke(&method, args).await.map_err(to_js_error)?;
                to_js(&result).map_err(to_js_error)
            })
        });

        let object = leafsync_binding_object(dispatch.as_ref().unchecked_ref());
        self.bindings.objects.borrow_mut().insert(id, object);

        Ok(Box::new(WebBinding {
            id,
            registry: Rc::downgrade(&self.bindings),
            dispatch: RefCell::new(Some(dispatch)),
        }))
    }
}

struct WebBinding {
    id: u64,
    registry: Weak<BindingRegistry>,
    dispatch: RefCell<Option<Dispatch>>,
}

impl CallbackBinding for WebBinding {
    fn reference(&self) -> Value {
        binding_reference(self.id)
    }

    fn dispose(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.objects.borrow_mut().remove(&self.id);
        }

        // Calls through a retained object throw once the closure is dropped.
        self.dispatch.borrow_mut().take();
    }
}

impl Drop for WebBinding {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn to_js(value: &Value) -> Result<JsValue, WebChannelError> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|err| WebChannelError::Conversion(err.to_string()))
}

fn from_js(value: JsValue) -> Result<Value, WebChannelError> {
    if value.is_undefined() || value.is_null() {
        return Ok(Value::Null);
    }

    serde_wasm_bindgen::from_value(value).map_err(|err| WebChannelError::Conversion(err.to_string()))
}

fn rejected(value: JsValue) -> WebChannelError {
    let message = if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        String::from(error.message())
    } else if let Some(text) = value.as_string() {
        text
    } else {
        format!("{value:?}")
    };

    WebChannelError::Rejected(message)
}

fn to_js_error(err: impl std::fmt::Display) -> JsValue {
    js_sys::Error::new(&err.to_string()).into()
}
