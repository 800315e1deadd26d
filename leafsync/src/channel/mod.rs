//! Asynchronous channel to the remote rendering engine.
//!
//! The library never talks to the renderer directly. Every remote effect goes through a
//! [`RemoteChannel`]: outbound calls are named [`RemoteOp`]s with JSON arguments, and inbound
//! calls arrive through [`CallbackBinding`]s that the channel creates for local
//! [`CallbackTarget`]s.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use maybe_sync::{MaybeSend, MaybeSync};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::SyncError;

pub mod memory;

/// Operation understood by the remote engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    /// Create the remote map.
    CreateMap,
    /// Add a tile layer.
    AddTileLayer,
    /// Add a raster tile set layer.
    AddMbTilesLayer,
    /// Add a vector shapefile layer.
    AddShapefileLayer,
    /// Add a marker.
    AddMarker,
    /// Add a rectangle.
    AddRectangle,
    /// Add a circle.
    AddCircle,
    /// Add a polygon.
    AddPolygon,
    /// Add a polyline.
    AddPolyline,
    /// Add an image overlay.
    AddImageLayer,
    /// Add a GeoJSON data layer.
    AddGeoJsonLayer,
    /// Remove any layer.
    RemoveLayer,
    /// Replace popup content of a layer.
    UpdatePopupContent,
    /// Replace tooltip content of a layer.
    UpdateTooltipContent,
    /// Replace rectangle geometry and style.
    UpdateRectangle,
    /// Replace circle geometry and style.
    UpdateCircle,
    /// Replace polygon geometry and style.
    UpdatePolygon,
    /// Replace polyline geometry and style.
    UpdatePolyline,
    /// Append GeoJSON features to a GeoJSON layer.
    AddDataToGeoJsonLayer,
    /// Fit the view to bounds.
    FitBounds,
    /// Pan the view.
    PanTo,
    /// Query view center.
    GetCenter,
    /// Query zoom level.
    GetZoom,
    /// Query view bounds.
    GetBounds,
    /// Set zoom level.
    SetZoom,
    /// Zoom in one step.
    ZoomIn,
    /// Zoom out one step.
    ZoomOut,
}

impl RemoteOp {
    /// Name of the function on the remote side.
    pub fn name(&self) -> &'static str {
        match self {
            RemoteOp::CreateMap => "create",
            RemoteOp::AddTileLayer => "addTileLayer",
            RemoteOp::AddMbTilesLayer => "addMbTilesLayer",
            RemoteOp::AddShapefileLayer => "addShapefileLayer",
            RemoteOp::AddMarker => "addMarker",
            RemoteOp::AddRectangle => "addRectangle",
            RemoteOp::AddCircle => "addCircle",
            RemoteOp::AddPolygon => "addPolygon",
            RemoteOp::AddPolyline => "addPolyline",
            RemoteOp::AddImageLayer => "addImageLayer",
            RemoteOp::AddGeoJsonLayer => "addGeoJsonLayer",
            RemoteOp::RemoveLayer => "removeLayer",
            RemoteOp::UpdatePopupContent => "updatePopupContent",
            RemoteOp::UpdateTooltipContent => "updateTooltipContent",
            RemoteOp::UpdateRectangle => "updateRectangle",
            RemoteOp::UpdateCircle => "updateCircle",
            RemoteOp::UpdatePolygon => "updatePolygon",
            RemoteOp::UpdatePolyline => "updatePolyline",
            RemoteOp::AddDataToGeoJsonLayer => "addDataToGeoJsonLayer",
            RemoteOp::FitBounds => "fitBounds",
            RemoteOp::PanTo => "panTo",
            RemoteOp::GetCenter => "getCenter",
            RemoteOp::GetZoom => "getZoom",
            RemoteOp::GetBounds => "getBounds",
            RemoteOp::SetZoom => "setZoom",
            RemoteOp::ZoomIn => "zoomIn",
            RemoteOp::ZoomOut => "zoomOut",
        }
    }
}

impl Display for RemoteOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Local object the remote side can call into by method name.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait CallbackTarget: MaybeSend + MaybeSync {
    /// Handles an inbound call.
    async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, SyncError>;
}

/// Handle keeping a [`CallbackTarget`] reachable from the remote side.
pub trait CallbackBinding: MaybeSend + MaybeSync {
    /// Serializable reference to pass to the remote side along with the operation that needs it.
    fn reference(&self) -> Value;

    /// Releases the binding. Later calls through the reference fail on the remote side.
    fn dispose(&self);
}

/// Capability to invoke operations on the remote engine.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait RemoteChannel: MaybeSend + MaybeSync {
    /// Invokes the operation and waits for its result. Operations without result return
    /// [`Value::Null`].
    async fn invoke(&self, operation: RemoteOp, args: Vec<Value>) -> Result<Value, SyncError>;

    /// Creates an inbound binding to the target.
    fn bind(&self, target: Arc<dyn CallbackTarget>) -> Result<Box<dyn CallbackBinding>, SyncError>;
}

/// Invokes an operation and decodes its result.
pub async fn invoke_as<T: DeserializeOwned>(
    channel: &dyn RemoteChannel,
    operation: RemoteOp,
    args: Vec<Value>,
) -> Result<T, SyncError> {
    let value = channel.invoke(operation, args).await?;
    serde_json::from_value(value).map_err(|err| SyncError::InvalidPayload(format!("{operation}: {err}")))
}

/// Creates a binding for the target and invokes the operation, appending the binding reference as
/// the last argument.
///
/// If the call fails, the binding is disposed before the error is returned.
pub async fn invoke_and_bind(
    channel: &dyn RemoteChannel,
    operation: RemoteOp,
    target: Arc<dyn CallbackTarget>,
    mut args: Vec<Value>,
) -> Result<Box<dyn CallbackBinding>, SyncError> {
    let binding = channel.bind(target)?;
    args.push(binding.reference());
    match channel.invoke(operation, args).await {
        Ok(_) => Ok(binding),
        Err(err) => {
            binding.dispose();
            Err(err)
        }
    }
}

/// Converts the value into a JSON argument.
pub(crate) fn to_arg(value: impl serde::Serialize) -> Result<Value, SyncError> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_names_match_remote_functions() {
        assert_eq!(RemoteOp::CreateMap.name(), "create");
        assert_eq!(RemoteOp::AddMbTilesLayer.to_string(), "addMbTilesLayer");
        assert_eq!(RemoteOp::AddDataToGeoJsonLayer.name(), "addDataToGeoJsonLayer");
        assert_eq!(RemoteOp::ZoomOut.name(), "zoomOut");
    }
}
