//! Deadlines for external capability calls.

use continuum_core::error::ContextError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run `fut` under `limit`.
///
/// On expiry the future is dropped and `ExternalCapabilityTimeout` is
/// returned; callers decide how to degrade.
pub async fn within<F, T>(
    capability: &str,
    target: &str,
    limit: Duration,
    fut: F,
) -> Result<T, ContextError>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(value) => Ok(value),
        Err(_) => {
            let timeout_ms = limit.as_millis() as u64;
            warn!(capability, target, timeout_ms, "External capability timed out");
            Err(ContextError::ExternalCapabilityTimeout {
                capability: capability.to_string(),
                target: target.to_string(),
                timeout_ms,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fast_future_passes_through() {
        let value = within("estimate", "/a.rs", Duration::from_secs(1), async { 42 })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_future_times_out() {
        let err = within("summarize", "/big.rs", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await
        .unwrap_err();

        assert_eq!(
            err,
            ContextError::ExternalCapabilityTimeout {
                capability: "summarize".into(),
                target: "/big.rs".into(),
                timeout_ms: 50,
            }
        );
    }
}
