//! Request-scoped telemetry helpers.

use std::future::Future;
use std::time::Instant;

/// Fresh correlation id for tracing a request across components.
///
/// The id is threaded by value through every operation invocation and
/// appears in every log event it produces. Nothing is stored implicitly.
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Await an operation and report how long it took, in milliseconds.
///
/// Callers wrap the calls they want measured and feed the elapsed time into
/// whatever counter or bounded list they maintain. The wrapper itself never
/// records anything.
pub async fn timed<F, T>(fut: F) -> (T, u64)
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let out = fut.await;
    (out, start.elapsed().as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timed_measures_elapsed() {
        let ((), ms) = timed(async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        })
        .await;
        assert!(ms >= 15);
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        assert_ne!(new_correlation_id(), new_correlation_id());
    }
}
