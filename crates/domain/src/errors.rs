//! 领域模型错误定义
//!
//! `DomainError` 描述实体层面的校验、权限与存在性错误；
//! `RepositoryError` 描述存储适配器返回的错误。

use thiserror::Error;

use crate::value_objects::{ConversationId, NotificationId, UserId};

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 参数校验失败
    #[error("参数无效: {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 用户与自己配对
    #[error("无效的用户对: {user_id} 不能与自己配对")]
    InvalidPair { user_id: UserId },

    /// 消息内容为空
    #[error("消息内容不能为空")]
    EmptyMessageBody,

    /// 消息内容过长
    #[error("消息内容过长: {length} > {max}")]
    MessageBodyTooLong { length: usize, max: usize },

    /// 操作者不在该用户对 / 会话中
    #[error("用户 {user_id} 不是会话参与者")]
    NotParticipant { user_id: UserId },

    /// 会话不存在
    #[error("会话不存在: {0}")]
    ConversationNotFound(ConversationId),

    /// 通知不存在
    #[error("通知不存在: {0}")]
    NotificationNotFound(NotificationId),
}

impl DomainError {
    /// 创建参数校验错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// 是否属于权限错误
    pub fn is_permission(&self) -> bool {
        matches!(self, Self::NotParticipant { .. })
    }

    /// 是否属于资源不存在错误
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ConversationNotFound(_) | Self::NotificationNotFound(_)
        )
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 存储层错误
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("entity not found")]
    NotFound,
    /// 条件更新失败：记录已被并发写入修改
    #[error("write conflict on {entity}")]
    Conflict { entity: String },
    /// 存储暂时不可用，可重试
    #[error("store unavailable: {message}")]
    Unavailable { message: String },
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn conflict(entity: impl Into<String>) -> Self {
        Self::Conflict {
            entity: entity.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// 冲突与不可用都可以在本地重试
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Unavailable { .. })
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
