//! Task boundaries that keep a misbehaving source from taking a tick down

use crate::error::{SamplerError, SourceError, SourceResult};
use std::future::Future;
use tokio::sync::watch;
use tokio::task::AbortHandle;

/// Resolves once a stop has been requested or the handle is gone
pub(super) async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

/// Run one fetch stage on its own task so a panic in the source is contained
///
/// `Ok(None)` means the stop signal won the race and the stage was aborted.
pub(super) async fn isolated<T, F>(
    stage: &'static str,
    stop: &mut watch::Receiver<bool>,
    fetch: F,
) -> Result<Option<T>, SamplerError>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    let mut handle = tokio::spawn(fetch);

    tokio::select! {
        biased;
        _ = stop_requested(stop) => {
            handle.abort();
            Ok(None)
        }
        joined = &mut handle => joined
            .map(Some)
            .map_err(|e| SamplerError::aborted(stage, e)),
    }
}

/// Read a single metric on its own task
///
/// A panic becomes that metric's error, so the caller falls back to its
/// cached or zero value. Dropping the returned future aborts the read.
pub(super) async fn guarded<T, F>(metric: &'static str, fetch: F) -> SourceResult<T>
where
    T: Send + 'static,
    F: Future<Output = SourceResult<T>> + Send + 'static,
{
    let handle = tokio::spawn(fetch);
    let _abort = AbortOnDrop(handle.abort_handle());

    match handle.await {
        Ok(result) => result,
        Err(e) => Err(SourceError::panicked(metric, e)),
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
