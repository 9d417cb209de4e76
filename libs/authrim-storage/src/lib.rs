//! Storage adapter contract for the Authrim core.
//!
//! Every core component talks to persistence through [`StorageAdapter`]: an
//! ordered relational `query`/`execute` pair plus a single-key KV surface.
//! No component ever names a concrete backend; higher-level atomicity is
//! built from single-statement idempotent updates and the single-owner
//! stores layered on top.

pub mod adapter;
pub mod clock;
pub mod error;
pub mod memory;

pub use adapter::{ExecResult, Row, SqlParam, SqlValue, StorageAdapter, reject_literal_input};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::StorageError;
pub use memory::MemoryAdapter;

use std::future::Future;
use std::time::Duration;

/// Default deadline applied to every adapter call.
pub const DEFAULT_STORAGE_DEADLINE: Duration = Duration::from_secs(5);

/// Run a storage future under a deadline, mapping expiry to
/// [`StorageError::Timeout`].
///
/// # Errors
///
/// Returns [`StorageError::Timeout`] when the deadline elapses, otherwise
/// whatever the inner future returned.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(res) => res,
        Err(_) => Err(StorageError::Timeout { deadline }),
    }
}
