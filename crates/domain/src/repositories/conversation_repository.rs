//! 会话Repository接口定义

use async_trait::async_trait;

use crate::entities::Conversation;
use crate::errors::RepositoryResult;
use crate::value_objects::{ConversationId, UserId};

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// 以确定性 id 原子地“不存在则创建”。
    ///
    /// 返回存储中的会话，以及本次调用是否真正创建了它。
    async fn create_if_absent(
        &self,
        conversation: Conversation,
    ) -> RepositoryResult<(Conversation, bool)>;

    async fn find(&self, id: ConversationId) -> RepositoryResult<Option<Conversation>>;

    /// 用户参与的会话，按 `updated_at` 倒序
    async fn list_for_user(&self, user: UserId, limit: u32) -> RepositoryResult<Vec<Conversation>>;
}
