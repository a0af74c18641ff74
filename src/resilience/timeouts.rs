//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound the whole upstream exchange (all redirect hops) by one deadline
//! - Turn an elapsed deadline into `TransportError::Timeout`
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - The deadline is shorter than the inbound request timeout, so the outcome
//!   is recorded instead of the request being cut off by the server layer
//! - Timed-out requests return 504 Gateway Timeout

use std::future::Future;
use std::time::Duration;

use crate::http::transport::TransportError;

/// Run `fut` under `deadline`.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(deadline)),
    }
}
