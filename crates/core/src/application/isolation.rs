// Panic isolation for spawned work
//
// A panicking execution or batch worker must not take the daemon (or the
// rest of the batch) down with it.

use std::any::Any;
use std::future::Future;
use tracing::error;

/// Why an isolated task did not produce a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aborted {
    Panicked(String),
    Cancelled,
}

impl std::fmt::Display for Aborted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Aborted::Panicked(msg) => write!(f, "panicked: {}", msg),
            Aborted::Cancelled => f.write_str("task cancelled"),
        }
    }
}

/// Run `fut` on its own tokio task and await it; panics become `Aborted`
pub async fn run_isolated<F, T>(fut: F) -> Result<T, Aborted>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(value) => Ok(value),
        Err(join_err) if join_err.is_panic() => {
            let msg = panic_message(join_err.into_panic().as_ref());
            error!(panic_msg = %msg, "Isolated task panicked");
            Err(Aborted::Panicked(msg))
        }
        Err(_) => Err(Aborted::Cancelled),
    }
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_panic_is_contained() {
        let result: Result<(), _> = run_isolated(async { panic!("boom {}", 42) }).await;
        assert_eq!(result, Err(Aborted::Panicked("boom 42".to_string())));
    }

    #[tokio::test]
    async fn test_value_passes_through() {
        assert_eq!(run_isolated(async { 5 }).await, Ok(5));
    }
}
