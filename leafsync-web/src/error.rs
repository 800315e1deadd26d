use leafsync::SyncError;
use thiserror::Error;

/// Failure of the browser transport.
#[derive(Debug, Error)]
pub enum WebChannelError {
    /// The code does not run in a browser window.
    #[error("global window object is not available")]
    NoWindow,

    /// The interop namespace object is not installed.
    #[error("interop namespace {0} is not defined")]
    MissingNamespace(String),

    /// The namespace has no function with the name.
    #[error("interop function {0} is not defined")]
    MissingFunction(String),

    /// The argument was a binding reference that is no longer alive.
    #[error("binding {0} is disposed")]
    DisposedBinding(u64),

    /// A value could not be converted between JSON and JavaScript.
    #[error("conversion failed: {0}")]
    Conversion(String),

    /// The interop function threw or its promise was rejected.
    #[error("{0}")]
    Rejected(String),
}

impl WebChannelError {
    /// Converts the error into the library error for the operation.
    ///
    /// Rejections by the script become [`SyncError::RemoteRejected`], everything else is a
    /// transport failure.
    pub fn into_sync_error(self, operation: &str) -> SyncError {
        match self {
            WebChannelError::Rejected(message) => SyncError::RemoteRejected {
                operation: operation.to_string(),
                message,
            },
            other => SyncError::ChannelFailure {
                operation: operation.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_remote_errors() {
        let error = WebChannelError::Rejected("map is gone".into()).into_sync_error("panTo");
        assert!(matches!(
            error,
            SyncError::RemoteRejected { ref operation, ref message }
                if operation == "panTo" && message == "map is gone"
        ));

        let error = WebChannelError::MissingNamespace("leafletBlazor".into())
            .into_sync_error("create");
        assert!(matches!(error, SyncError::ChannelFailure { .. }));
        assert!(error.is_remote());
    }
}
