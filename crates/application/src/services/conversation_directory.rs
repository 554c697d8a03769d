use std::sync::Arc;

use domain::{Conversation, ConversationId, ConversationRepository, PairKey, UserId};

use crate::{
    clock::Clock,
    error::ApplicationError,
    retry::{retry_transient, AttemptError, RetryPolicy},
};

/// 会话目录：把无序用户对映射到唯一的会话。
///
/// 会话 id 由排序后的用户对确定性派生，创建本身就是幂等的
/// create-if-absent，不存在“先查后建”的竞争窗口。
pub struct ConversationDirectory {
    conversations: Arc<dyn ConversationRepository>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl ConversationDirectory {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            conversations,
            clock,
            retry,
        }
    }

    pub async fn get_or_create_conversation(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<ConversationId, ApplicationError> {
        Ok(self.get_or_create(user_a, user_b).await?.id)
    }

    /// 返回用户对的会话，不存在时创建
    pub async fn get_or_create(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Conversation, ApplicationError> {
        let pair = PairKey::new(user_a, user_b)?;

        let (conversation, created) =
            retry_transient(&self.retry, "get_or_create_conversation", move || async move {
                let candidate = Conversation::open(pair, self.clock.now());
                Ok::<_, AttemptError>(self.conversations.create_if_absent(candidate).await?)
            })
            .await?;

        if created {
            tracing::info!(
                conversation_id = %conversation.id,
                pair = %pair,
                "创建会话"
            );
        }
        Ok(conversation)
    }

    pub async fn find(&self, id: ConversationId) -> Result<Conversation, ApplicationError> {
        self.conversations
            .find(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found(format!("conversation {id}")))
    }

    /// 读取会话并确认 `viewer` 是参与者
    pub async fn conversation_for(
        &self,
        id: ConversationId,
        viewer: UserId,
    ) -> Result<Conversation, ApplicationError> {
        let conversation = self.find(id).await?;
        conversation.ensure_participant(viewer)?;
        Ok(conversation)
    }

    /// 用户参与的会话，按最近更新倒序
    pub async fn list_for_user(
        &self,
        user: UserId,
        limit: u32,
    ) -> Result<Vec<Conversation>, ApplicationError> {
        Ok(self.conversations.list_for_user(user, limit).await?)
    }
}
