use domain::{DomainError, RepositoryError};
use thiserror::Error;

/// 应用层错误。
///
/// 校验与权限错误会立即返回，重复调用仍会失败；
/// `TransientFailure` 表示本地重试预算已耗尽，调用方稍后可以原样重试。
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("validation failed: {0}")]
    Validation(DomainError),
    #[error("permission denied: {0}")]
    Permission(DomainError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("`{operation}` failed after {attempts} attempts: {reason}")]
    TransientFailure {
        operation: &'static str,
        attempts: u32,
        reason: RepositoryError,
    },
    #[error("storage error: {0}")]
    Storage(RepositoryError),
    #[error("authentication failed")]
    Authentication,
}

impl ApplicationError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// 原样重试同一调用是否可能成功
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientFailure { .. })
    }
}

impl From<DomainError> for ApplicationError {
    fn from(value: DomainError) -> Self {
        if value.is_permission() {
            ApplicationError::Permission(value)
        } else if value.is_not_found() {
            ApplicationError::NotFound(value.to_string())
        } else {
            ApplicationError::Validation(value)
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => ApplicationError::NotFound("entity not found".into()),
            transient @ (RepositoryError::Conflict { .. } | RepositoryError::Unavailable { .. }) => {
                ApplicationError::TransientFailure {
                    operation: "store",
                    attempts: 1,
                    reason: transient,
                }
            }
            other => ApplicationError::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::UserId;
    use uuid::Uuid;

    #[test]
    fn domain_errors_are_classified() {
        let user = UserId::from(Uuid::new_v4());
        assert!(matches!(
            ApplicationError::from(DomainError::NotParticipant { user_id: user }),
            ApplicationError::Permission(_)
        ));
        assert!(matches!(
            ApplicationError::from(DomainError::InvalidPair { user_id: user }),
            ApplicationError::Validation(_)
        ));
        assert!(matches!(
            ApplicationError::from(DomainError::EmptyMessageBody),
            ApplicationError::Validation(_)
        ));
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        let transient = ApplicationError::from(RepositoryError::unavailable("down"));
        assert!(transient.is_retryable());
        assert!(!ApplicationError::from(RepositoryError::storage("boom")).is_retryable());
        assert!(!ApplicationError::from(DomainError::EmptyMessageBody).is_retryable());
    }
}
