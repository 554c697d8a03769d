//! 消息实体
//!
//! 消息创建后不可变，唯一可变字段是 `read`，且只能从 false 变为 true。

use serde::{Deserialize, Serialize};

use crate::entities::conversation::Conversation;
use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{ConversationId, MessageId, Timestamp, UserId};

/// 会话摘要中预览文本的最大字符数
pub const PREVIEW_MAX_CHARS: usize = 80;

/// 消息内容：文本或外部媒体存储返回的不透明引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    Text {
        text: String,
    },
    Media {
        media_ref: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
}

impl MessageBody {
    pub fn text(raw: impl Into<String>, max_len: usize) -> DomainResult<Self> {
        let text = raw.into().trim().to_owned();
        if text.is_empty() {
            return Err(DomainError::EmptyMessageBody);
        }
        let length = text.chars().count();
        if length > max_len {
            return Err(DomainError::MessageBodyTooLong {
                length,
                max: max_len,
            });
        }
        Ok(Self::Text { text })
    }

    pub fn media(
        media_ref: impl Into<String>,
        caption: Option<String>,
        max_len: usize,
    ) -> DomainResult<Self> {
        let media_ref = media_ref.into().trim().to_owned();
        if media_ref.is_empty() {
            return Err(DomainError::invalid_argument("media_ref", "cannot be empty"));
        }
        let caption = caption
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty());
        if let Some(caption) = &caption {
            let length = caption.chars().count();
            if length > max_len {
                return Err(DomainError::MessageBodyTooLong {
                    length,
                    max: max_len,
                });
            }
        }
        Ok(Self::Media { media_ref, caption })
    }

    /// 会话列表里展示的摘要文本
    pub fn preview(&self) -> String {
        match self {
            Self::Text { text } => text.chars().take(PREVIEW_MAX_CHARS).collect(),
            Self::Media {
                caption: Some(caption),
                ..
            } => caption.chars().take(PREVIEW_MAX_CHARS).collect(),
            Self::Media { caption: None, .. } => "[media]".to_owned(),
        }
    }
}

/// 消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    /// 会话内单调递增的序号，由存储在追加时分配
    pub seq: i64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub body: MessageBody,
    pub created_at: Timestamp,
    pub read: bool,
}

impl Message {
    /// 构造一条待追加的消息，发送者必须是会话参与者。
    pub fn compose(
        conversation: &Conversation,
        sender_id: UserId,
        body: MessageBody,
        now: Timestamp,
    ) -> DomainResult<Self> {
        let receiver_id = conversation.peer_of(sender_id)?;
        Ok(Self {
            id: MessageId::generate(),
            conversation_id: conversation.id,
            seq: 0,
            sender_id,
            receiver_id,
            body,
            created_at: now,
            read: false,
        })
    }

    /// 接收者读取消息；自己发送的消息不会被翻转。返回是否发生了翻转。
    pub fn mark_read_by(&mut self, reader: UserId) -> bool {
        if self.receiver_id != reader || self.read {
            return false;
        }
        self.read = true;
        true
    }
}
