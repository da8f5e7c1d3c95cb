//! Retry with exponential backoff for transient connection failures.
//!
//! A failed attempt evicts the cached adapter before backing off, so the
//! next attempt reconnects from scratch instead of reusing a pool whose
//! sockets may be dead.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::db::{ConnectionRegistry, DriverAdapter};
use crate::error::DbResult;
use crate::models::ConnectionConfig;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(2000),
            multiplier: 2,
        }
    }
}

/// Run `op` against the adapter for `config`, retrying on retryable errors
/// up to the policy's attempt budget. Non-retryable errors and final-attempt
/// failures propagate unchanged.
pub async fn run_with_retry<T, F, Fut>(
    registry: &ConnectionRegistry,
    config: &ConnectionConfig,
    policy: &RetryPolicy,
    op: F,
) -> DbResult<T>
where
    F: Fn(Arc<DriverAdapter>) -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 1u32;
    loop {
        let adapter = registry.get(config).await;
        match op(adapter).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                warn!(
                    endpoint = %config.endpoint(),
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                registry.evict(config).await;
                tokio::time::sleep(delay).await;
                delay = (delay * policy.multiplier).min(policy.max_delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::models::BackendType;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> ConnectionConfig {
        ConnectionConfig::new(BackendType::MySql, "db.internal")
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_error_exhausts_attempt_budget() {
        let registry = ConnectionRegistry::new();
        let attempts = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result: DbResult<()> = run_with_retry(
            &registry,
            &config(),
            &RetryPolicy::default(),
            |_adapter| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(DbError::connection("connection reset by peer")) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // 100ms after the first failure, 200ms after the second.
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_fails_immediately() {
        let registry = ConnectionRegistry::new();
        let attempts = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result: DbResult<()> = run_with_retry(
            &registry,
            &config(),
            &RetryPolicy::default(),
            |_adapter| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(DbError::driver("syntax error near 'FORM'", Some("42000".into()))) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failure() {
        let registry = ConnectionRegistry::new();
        let attempts = AtomicU32::new(0);

        let result = run_with_retry(
            &registry,
            &config(),
            &RetryPolicy::default(),
            |_adapter| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(DbError::connection("broken pipe"))
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempt_evicts_cached_adapter() {
        let registry = ConnectionRegistry::new();
        let seen = tokio::sync::Mutex::new(Vec::new());

        let _: DbResult<()> = run_with_retry(
            &registry,
            &config(),
            &RetryPolicy::default(),
            |adapter| async {
                seen.lock().await.push(adapter);
                Err(DbError::connection("server closed the connection"))
            },
        )
        .await;

        let seen = seen.into_inner();
        assert_eq!(seen.len(), 3);
        // Each retry reconnects through a fresh adapter.
        assert!(!Arc::ptr_eq(&seen[0], &seen[1]));
        assert!(!Arc::ptr_eq(&seen[1], &seen[2]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_capped_at_max() {
        let registry = ConnectionRegistry::new();
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_delay: Duration::from_millis(800),
            max_delay: Duration::from_millis(2000),
            multiplier: 2,
        };
        let started = tokio::time::Instant::now();

        let _: DbResult<()> = run_with_retry(&registry, &config(), &policy, |_adapter| async {
            Err(DbError::connection("connection refused"))
        })
        .await;

        // 800 + 1600 + 2000 + 2000 + 2000
        assert_eq!(started.elapsed(), Duration::from_millis(8400));
    }
}
