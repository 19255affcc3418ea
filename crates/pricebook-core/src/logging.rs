//! Call logging composed around service operations.

use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

/// Await `future`, logging the operation name, elapsed time and outcome.
///
/// Errors are logged at `warn` with their display form; callers keep the
/// error and decide what to expose.
pub async fn instrumented<T, E, F>(operation: &'static str, future: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    let started = Instant::now();
    tracing::debug!(operation, "call started");

    let result = future.await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => tracing::info!(operation, elapsed_ms, "call succeeded"),
        Err(error) => tracing::warn!(operation, elapsed_ms, error = %error, "call failed"),
    }
    result
}
