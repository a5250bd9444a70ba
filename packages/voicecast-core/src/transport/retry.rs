//! Retry logic for transient transport errors.

use std::future::Future;
use std::time::Duration;

use super::{TransportError, TransportResult};
use crate::protocol_constants::BRIDGE_RETRY_DELAYS_MS;

/// Executes a transport call, retrying transient failures with backoff
/// (200ms, 500ms, 1000ms).
pub(crate) async fn with_retry<T, F, Fut>(action: &str, mut operation: F) -> TransportResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TransportResult<T>>,
{
    let mut last_error = TransportError::Timeout;
    for (attempt, &delay_ms) in std::iter::once(&0)
        .chain(BRIDGE_RETRY_DELAYS_MS.iter())
        .enumerate()
    {
        if attempt > 0 {
            log::info!(
                "[Bridge] Retrying {} (attempt {}/{}) after {}ms",
                action,
                attempt + 1,
                BRIDGE_RETRY_DELAYS_MS.len() + 1,
                delay_ms
            );
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        match operation().await {
            Ok(r) => return Ok(r),
            Err(e) if e.is_transient() => {
                log::warn!("[Bridge] {} transient error: {}", action, e);
                last_error = e;
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicUsize::new(0);
        let result = with_retry("stream", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TransportError::Timeout)
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_all_delays() {
        let calls = AtomicUsize::new(0);
        let result: TransportResult<()> = with_retry("pause", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TransportError::Status(502, "bad gateway".into())) }
        })
        .await;
        assert_eq!(result, Err(TransportError::Status(502, "bad gateway".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: TransportResult<()> = with_retry("volume", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(TransportError::Rejected {
                    code: "not_joined".into(),
                    message: "not in room".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
