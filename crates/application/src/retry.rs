use std::future::Future;
use std::time::Duration;

use config::RetryConfig;
use domain::{DomainError, RepositoryError};
use tokio::time::sleep;

use crate::error::ApplicationError;

#[derive(Clone, Debug)]
pub enum Backoff {
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Backoff::Exponential { base, max }
    }

    fn delay_at(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Exponential { base, max } => {
                let exp = std::cmp::min(attempt.saturating_sub(1), 20);
                let factor = 1u32 << exp;
                std::cmp::min(base.saturating_mul(factor), *max)
            }
        }
    }
}

/// 冲突 / 存储不可用时的有界重试策略
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::exponential(base, max),
        }
    }

    /// 不等待的策略，测试中使用
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(10), Duration::from_millis(500))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay(), config.max_delay())
    }
}

/// 单次尝试的失败：`Retry` 会在预算内重试，`Fail` 立即返回
#[derive(Debug)]
pub enum AttemptError {
    Retry(RepositoryError),
    Fail(ApplicationError),
}

impl From<RepositoryError> for AttemptError {
    fn from(value: RepositoryError) -> Self {
        if value.is_transient() {
            AttemptError::Retry(value)
        } else {
            AttemptError::Fail(value.into())
        }
    }
}

impl From<DomainError> for AttemptError {
    fn from(value: DomainError) -> Self {
        AttemptError::Fail(value.into())
    }
}

impl From<ApplicationError> for AttemptError {
    fn from(value: ApplicationError) -> Self {
        AttemptError::Fail(value)
    }
}

/// 执行 `op`，遇到可重试错误时按指数退避重试。
///
/// 预算耗尽后返回 `ApplicationError::TransientFailure`。
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T, ApplicationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fail(err)) => return Err(err),
            Err(AttemptError::Retry(reason)) => {
                if attempt >= policy.max_attempts {
                    tracing::warn!(
                        operation,
                        attempts = attempt,
                        error = %reason,
                        "重试预算耗尽"
                    );
                    return Err(ApplicationError::TransientFailure {
                        operation,
                        attempts: attempt,
                        reason,
                    });
                }
                let delay = policy.backoff.delay_at(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %reason,
                    "可重试错误，稍后重试"
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_grows_and_is_capped() {
        let backoff = Backoff::exponential(Duration::from_millis(10), Duration::from_millis(50));
        assert_eq!(backoff.delay_at(1), Duration::from_millis(10));
        assert_eq!(backoff.delay_at(2), Duration::from_millis(20));
        assert_eq!(backoff.delay_at(3), Duration::from_millis(40));
        assert_eq!(backoff.delay_at(4), Duration::from_millis(50));
        assert_eq!(backoff.delay_at(30), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn conflicts_are_retried_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retry_transient(&RetryPolicy::immediate(5), "test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AttemptError::from(RepositoryError::conflict("record")))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_surfaces_transient_failure() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = retry_transient(&RetryPolicy::immediate(3), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AttemptError::from(RepositoryError::unavailable("down")))
        })
        .await;

        match result {
            Err(ApplicationError::TransientFailure { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn validation_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = retry_transient(&RetryPolicy::immediate(5), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AttemptError::from(DomainError::EmptyMessageBody))
        })
        .await;

        assert!(matches!(result, Err(ApplicationError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
