//! Timeout helpers shared across the crate.

use crate::error::{Result, WireError};
use std::future::Future;
use std::time::Duration;

/// Limit for connection establishment and TLS handshakes.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Limit for graceful shutdown of servers and clients.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run `fut` with a deadline, mapping expiry to [`WireError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(WireError::Timeout),
    }
}
