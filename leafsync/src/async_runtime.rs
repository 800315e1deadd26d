use std::future::Future;

use maybe_sync::MaybeSend;

use crate::error::SyncError;

/// Checks that [`spawn`] can run a task from the current context.
pub(crate) fn ensure_available(task: &'static str) -> Result<(), SyncError> {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            let _ = task;
            Ok(())
        } else {
            tokio::runtime::Handle::try_current()
                .map(|_| ())
                .map_err(|_| SyncError::RuntimeUnavailable(task))
        }
    }
}

/// Runs the future to completion in the background without waiting for its result.
///
/// On native targets this fails with [`SyncError::RuntimeUnavailable`] outside of a tokio
/// runtime.
pub(crate) fn spawn<F>(task: &'static str, future: F) -> Result<(), SyncError>
where
    F: Future<Output = ()> + MaybeSend + 'static,
{
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            let _ = task;
            wasm_bindgen_futures::spawn_local(future);
        } else {
            let handle = tokio::runtime::Handle::try_current()
                .map_err(|_| SyncError::RuntimeUnavailable(task))?;
            handle.spawn(future);
        }
    }

    Ok(())
}
