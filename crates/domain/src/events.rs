//! 存储变更事件
//!
//! 存储适配器在每次成功写入后发布到变更流，订阅者据此推送实时更新。

use serde::{Deserialize, Serialize};

use crate::entities::{Message, NotificationEvent, NotificationKey, PresenceState};
use crate::value_objects::{ConversationId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    MessageAppended {
        message: Message,
    },
    MessagesRead {
        conversation_id: ConversationId,
        reader_id: UserId,
        flipped: u64,
    },
    PresenceChanged {
        state: PresenceState,
    },
    NotificationUpserted {
        event: NotificationEvent,
    },
    NotificationRetracted {
        key: NotificationKey,
        removed: u64,
    },
    NotificationsRead {
        target_id: UserId,
        count: u64,
    },
}

impl StoreEvent {
    /// 未读消息数因该事件改变的用户
    pub fn unread_owner(&self) -> Option<UserId> {
        match self {
            Self::MessageAppended { message } => Some(message.receiver_id),
            Self::MessagesRead { reader_id, .. } => Some(*reader_id),
            _ => None,
        }
    }

    /// 该事件是否会改变 `user` 的未读消息数
    pub fn affects_unread_of(&self, user: UserId) -> bool {
        self.unread_owner() == Some(user)
    }

    /// 该事件是否属于 `user` 的通知流
    pub fn notification_target(&self) -> Option<UserId> {
        match self {
            Self::NotificationUpserted { event } => Some(event.target_id),
            Self::NotificationRetracted { key, .. } => Some(key.target_id),
            Self::NotificationsRead { target_id, .. } => Some(*target_id),
            _ => None,
        }
    }
}
