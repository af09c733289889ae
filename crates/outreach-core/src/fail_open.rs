//! Fail-open helper for advisory side effects
//!
//! Diagnostic snapshots and the human-readable activity log must never stop
//! a run. Wrap them in [`fail_open`] so an error becomes a warning.
//!
//! DO NOT use fail-open for the outcome ledger: a send that cannot be
//! recorded must stop the run.

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Run an advisory operation, logging and discarding its error
///
/// ```no_run
/// use outreach_core::fail_open::fail_open;
/// use outreach_core::Result;
///
/// async fn write_snapshot() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let written = fail_open("diagnostics::capture", || write_snapshot()).await;
///     // written is None if the snapshot could not be stored
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}
