// Non-fatal side calls: progress push, log write, session save, cleanup.
//
// Every such call goes through `best_effort` so the contract is uniform:
// try once, log a warning on failure, never propagate.

use std::fmt::Display;
use std::future::Future;
use tracing::warn;

/// Await `fut`; on error log a warning naming `operation` and return None
pub async fn best_effort<F, T, E>(operation: &str, fut: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(operation = operation, error = %e, "Best-effort operation failed, continuing");
            None
        }
    }
}
