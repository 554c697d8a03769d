use std::sync::Arc;

use domain::{
    ChangeFeed, ConversationId, ConversationRepository, Message, MessageRepository, StoreEvent,
    UserId,
};

use crate::{
    clock::Clock,
    dto::MessageInput,
    error::ApplicationError,
    retry::{retry_transient, AttemptError, RetryPolicy},
    subscription::{next_event, ListenerRegistry, Subscription},
};

/// 消息流的限制参数
#[derive(Debug, Clone, Copy)]
pub struct MessageLimits {
    pub max_body_len: usize,
    pub history_page_limit: u32,
}

impl Default for MessageLimits {
    fn default() -> Self {
        Self {
            max_body_len: 4000,
            history_page_limit: 100,
        }
    }
}

impl From<&config::MessagingConfig> for MessageLimits {
    fn from(config: &config::MessagingConfig) -> Self {
        Self {
            max_body_len: config.max_body_len,
            history_page_limit: config.history_page_limit,
        }
    }
}

/// 会话内只追加的有序消息日志
pub struct MessageStream {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    feed: Arc<dyn ChangeFeed>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    limits: MessageLimits,
    listeners: Arc<ListenerRegistry>,
}

impl MessageStream {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
        feed: Arc<dyn ChangeFeed>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        limits: MessageLimits,
    ) -> Self {
        Self {
            conversations,
            messages,
            feed,
            clock,
            retry,
            limits,
            listeners: Arc::new(ListenerRegistry::default()),
        }
    }

    async fn conversation_for(
        &self,
        conversation_id: ConversationId,
        user: UserId,
    ) -> Result<domain::Conversation, ApplicationError> {
        let conversation = self
            .conversations
            .find(conversation_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found(format!("conversation {conversation_id}")))?;
        conversation.ensure_participant(user)?;
        Ok(conversation)
    }

    /// 追加一条消息。
    ///
    /// 消息 id 在重试之前生成，存储对同一 id 的重复追加是幂等的，
    /// 因此超时后重试不会产生重复消息。
    pub async fn append_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        input: MessageInput,
    ) -> Result<Message, ApplicationError> {
        let body = input.into_body(self.limits.max_body_len)?;
        let conversation = self.conversation_for(conversation_id, sender_id).await?;
        let message = Message::compose(&conversation, sender_id, body, self.clock.now())?;

        let stored = retry_transient(&self.retry, "append_message", move || {
            let message = message.clone();
            async move { Ok::<_, AttemptError>(self.messages.append(message).await?) }
        })
        .await?;

        tracing::debug!(
            conversation_id = %conversation_id,
            message_id = %stored.id,
            seq = stored.seq,
            "追加消息"
        );
        Ok(stored)
    }

    /// 把会话中发给 `reader_id` 的消息置为已读，返回翻转数量
    pub async fn mark_read(
        &self,
        conversation_id: ConversationId,
        reader_id: UserId,
    ) -> Result<u64, ApplicationError> {
        self.conversation_for(conversation_id, reader_id).await?;

        let flipped = retry_transient(&self.retry, "mark_read", move || async move {
            Ok::<_, AttemptError>(self.messages.mark_read(conversation_id, reader_id).await?)
        })
        .await?;

        if flipped > 0 {
            tracing::debug!(
                conversation_id = %conversation_id,
                reader_id = %reader_id,
                flipped,
                "消息已读"
            );
        }
        Ok(flipped)
    }

    /// 按 `seq` 升序的历史消息，`before_seq` 用于向前翻页
    pub async fn history(
        &self,
        conversation_id: ConversationId,
        viewer: UserId,
        before_seq: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, ApplicationError> {
        self.conversation_for(conversation_id, viewer).await?;
        let limit = limit
            .unwrap_or(self.limits.history_page_limit)
            .clamp(1, self.limits.history_page_limit);
        Ok(self.messages.list(conversation_id, before_seq, limit).await?)
    }

    /// 订阅会话的新消息，仅参与者可以订阅
    pub async fn subscribe<F>(
        &self,
        conversation_id: ConversationId,
        viewer: UserId,
        mut callback: F,
    ) -> Result<Subscription, ApplicationError>
    where
        F: FnMut(Message) + Send + 'static,
    {
        self.conversation_for(conversation_id, viewer).await?;
        let mut receiver = self.feed.subscribe();

        Ok(Subscription::spawn(
            "message_stream",
            self.listeners.clone(),
            async move {
                while let Some(event) = next_event(&mut receiver, "message_stream").await {
                    if let StoreEvent::MessageAppended { message } = event {
                        if message.conversation_id == conversation_id {
                            callback(message);
                        }
                    }
                }
            },
        ))
    }

    pub fn active_listeners(&self) -> usize {
        self.listeners.active()
    }
}
