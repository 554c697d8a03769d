//! 消息Repository接口定义

use async_trait::async_trait;

use crate::entities::Message;
use crate::errors::RepositoryResult;
use crate::value_objects::{ConversationId, UserId};

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 追加消息。
    ///
    /// 存储分配会话内递增的 `seq`，并在同一原子单元内更新会话的
    /// `last_message` 与 `updated_at`。会话不存在时返回 `NotFound`。
    async fn append(&self, message: Message) -> RepositoryResult<Message>;

    /// 按 `seq` 升序返回 `before_seq` 之前最近的 `limit` 条消息
    async fn list(
        &self,
        conversation_id: ConversationId,
        before_seq: Option<i64>,
        limit: u32,
    ) -> RepositoryResult<Vec<Message>>;

    /// 原子地把会话中发给 `reader` 的未读消息置为已读，返回翻转数量。
    ///
    /// 若最后一条消息被翻转，会话摘要的已读标记同步更新。
    async fn mark_read(
        &self,
        conversation_id: ConversationId,
        reader: UserId,
    ) -> RepositoryResult<u64>;

    /// 扫描消息日志统计未读数，可选限定会话
    async fn count_unread(
        &self,
        receiver: UserId,
        conversation_id: Option<ConversationId>,
    ) -> RepositoryResult<u64>;
}
