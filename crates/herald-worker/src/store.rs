//! Runs synchronous store calls on tokio's blocking pool.

use std::io;

use herald_store::StoreError;

/// Run `call` off the async worker threads.
///
/// A lock wait inside SQLite can last up to the busy timeout; on the blocking
/// pool it only holds up the task that issued it.
pub(crate) async fn blocking<T, F>(call: F) -> herald_store::Result<T>
where
    F: FnOnce() -> herald_store::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| StoreError::Io(io::Error::other(format!("store task failed: {e}"))))?
}
