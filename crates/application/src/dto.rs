use domain::{Conversation, DomainResult, MessageBody, PresenceState, UserId};
use serde::{Deserialize, Serialize};

/// 发送消息的输入，校验后转为 `MessageBody`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageInput {
    Text {
        text: String,
    },
    Media {
        media_ref: String,
        #[serde(default)]
        caption: Option<String>,
    },
}

impl MessageInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn into_body(self, max_len: usize) -> DomainResult<MessageBody> {
        match self {
            Self::Text { text } => MessageBody::text(text, max_len),
            Self::Media { media_ref, caption } => MessageBody::media(media_ref, caption, max_len),
        }
    }
}

/// 会话列表项：会话本身、对方在线状态与调用者在该会话的未读数
#[derive(Debug, Clone, Serialize)]
pub struct ConversationOverview {
    pub conversation: Conversation,
    pub peer_id: UserId,
    pub peer_presence: PresenceState,
    pub unread: u64,
}
