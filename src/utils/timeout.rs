//! Async timeout helpers and the default deadlines used by the server.

use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Inactivity deadline for each TCP read and write
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default wait used by the client helpers for a reply
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Run `future` with a deadline, mapping expiry to [`ProtocolError::Timeout`].
pub async fn with_timeout_error<F, T>(future: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

/// Like [`with_timeout_error`] for futures yielding `std::io::Result`.
pub async fn io_with_timeout<F, T>(future: F, duration: Duration) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    with_timeout_error(async { future.await.map_err(ProtocolError::Io) }, duration).await
}
