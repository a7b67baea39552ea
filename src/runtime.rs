//! Async runtime selection
//!
//! Sessions run on the caller's multi-threaded tokio runtime when there is
//! one. Otherwise (plain threads, C hosts, current-thread runtimes that only
//! make progress while the host awaits) they share a lazily started
//! process-wide runtime.

use std::sync::{Mutex, PoisonError};
use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};

use crate::error::Error;

const WORKER_THREADS: usize = 4;

static SHARED: Mutex<Option<Runtime>> = Mutex::new(None);

/// Handle to the runtime new sessions should use.
pub fn handle() -> Result<Handle, Error> {
    if let Ok(handle) = Handle::try_current() {
        if handle.runtime_flavor() == RuntimeFlavor::MultiThread {
            return Ok(handle);
        }
    }
    shared()
}

fn shared() -> Result<Handle, Error> {
    let mut guard = SHARED.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(runtime) = guard.as_ref() {
        return Ok(runtime.handle().clone());
    }

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .worker_threads(WORKER_THREADS)
        .thread_name("embed-agent")
        .build()
        .map_err(|e| Error::Runtime(e.to_string()))?;
    tracing::debug!(workers = WORKER_THREADS, "Started shared runtime");

    let handle = runtime.handle().clone();
    *guard = Some(runtime);
    Ok(handle)
}
