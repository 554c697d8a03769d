use std::sync::Arc;

use domain::{Conversation, ConversationId, Message, NotificationType, UserId};

use crate::{
    dto::{ConversationOverview, MessageInput},
    error::ApplicationError,
    services::{
        ConversationDirectory, MessageStream, NotificationDispatcher, NotifyRequest,
        PresenceTracker, ReadStateAggregator,
    },
};

pub struct ChatServiceDependencies {
    pub directory: Arc<ConversationDirectory>,
    pub stream: Arc<MessageStream>,
    pub read_state: Arc<ReadStateAggregator>,
    pub presence: Arc<PresenceTracker>,
    pub dispatcher: Arc<NotificationDispatcher>,
    /// 发送消息时是否给接收者发通知
    pub notify_on_message: bool,
}

/// 会话与消息用例的编排
pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn open_conversation(
        &self,
        user: UserId,
        peer: UserId,
    ) -> Result<Conversation, ApplicationError> {
        self.deps.directory.get_or_create(user, peer).await
    }

    /// 发送消息：追加到日志、失效接收者的未读缓存，并按配置通知接收者
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        input: MessageInput,
    ) -> Result<Message, ApplicationError> {
        let message = self
            .deps
            .stream
            .append_message(conversation_id, sender_id, input)
            .await?;

        self.deps.read_state.invalidate(message.receiver_id).await;

        if self.deps.notify_on_message {
            let request =
                NotifyRequest::new(NotificationType::Message, sender_id, message.receiver_id)
                    .with_content_ref(conversation_id.to_string())
                    .with_message(message.body.preview());
            // 消息已经写入，通知失败不回滚
            if let Err(err) = self.deps.dispatcher.notify(request).await {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    message_id = %message.id,
                    error = %err,
                    "消息通知发送失败"
                );
            }
        }
        Ok(message)
    }

    pub async fn mark_read(
        &self,
        conversation_id: ConversationId,
        reader_id: UserId,
    ) -> Result<u64, ApplicationError> {
        let flipped = self.deps.stream.mark_read(conversation_id, reader_id).await?;
        self.deps.read_state.invalidate(reader_id).await;
        Ok(flipped)
    }

    pub async fn history(
        &self,
        conversation_id: ConversationId,
        viewer: UserId,
        before_seq: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, ApplicationError> {
        self.deps
            .stream
            .history(conversation_id, viewer, before_seq, limit)
            .await
    }

    /// 未读数；限定会话时调用者必须是参与者
    pub async fn unread_count(
        &self,
        user: UserId,
        conversation_id: Option<ConversationId>,
    ) -> Result<u64, ApplicationError> {
        if let Some(id) = conversation_id {
            self.deps.directory.conversation_for(id, user).await?;
        }
        self.deps.read_state.unread_count(user, conversation_id).await
    }

    /// 用户的会话列表，附带对方在线状态与各会话未读数
    pub async fn list_conversations(
        &self,
        user: UserId,
        limit: u32,
    ) -> Result<Vec<ConversationOverview>, ApplicationError> {
        let conversations = self.deps.directory.list_for_user(user, limit).await?;

        let mut overviews = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let peer_id = conversation.peer_of(user)?;
            let peer_presence = self.deps.presence.presence(peer_id).await?;
            let unread = self
                .deps
                .read_state
                .unread_count(user, Some(conversation.id))
                .await?;
            overviews.push(ConversationOverview {
                conversation,
                peer_id,
                peer_presence,
                unread,
            });
        }
        Ok(overviews)
    }
}
