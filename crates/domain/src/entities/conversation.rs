//! 会话实体

use serde::{Deserialize, Serialize};

use crate::entities::message::Message;
use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{ConversationId, MessageId, PairKey, Timestamp, UserId};

/// 最后一条消息的反范式化副本，是消息流的缓存投影
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub message_id: MessageId,
    pub seq: i64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub preview: String,
    pub created_at: Timestamp,
    pub read: bool,
}

impl From<&Message> for MessageSummary {
    fn from(message: &Message) -> Self {
        Self {
            message_id: message.id,
            seq: message.seq,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            preview: message.body.preview(),
            created_at: message.created_at,
            read: message.read,
        }
    }
}

/// 两个用户之间唯一的会话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub pair: PairKey,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub last_message: Option<MessageSummary>,
    /// 已分配的最大消息序号
    pub last_seq: i64,
}

impl Conversation {
    /// 为用户对打开会话，id 由用户对确定性派生
    pub fn open(pair: PairKey, now: Timestamp) -> Self {
        Self {
            id: ConversationId::for_pair(&pair),
            pair,
            created_at: now,
            updated_at: now,
            last_message: None,
            last_seq: 0,
        }
    }

    pub fn participants(&self) -> [UserId; 2] {
        self.pair.members()
    }

    pub fn is_participant(&self, user: UserId) -> bool {
        self.pair.contains(user)
    }

    pub fn peer_of(&self, user: UserId) -> DomainResult<UserId> {
        self.pair
            .other(user)
            .ok_or(DomainError::NotParticipant { user_id: user })
    }

    pub fn ensure_participant(&self, user: UserId) -> DomainResult<()> {
        if self.is_participant(user) {
            Ok(())
        } else {
            Err(DomainError::NotParticipant { user_id: user })
        }
    }

    /// 为新消息分配序号
    pub fn next_seq(&mut self) -> i64 {
        self.last_seq += 1;
        self.last_seq
    }

    /// 追加消息后刷新摘要，与追加处于同一原子单元。
    ///
    /// 消息时间在进入存储前生成，并发发送时可能晚到的消息时间更早，
    /// `updated_at` 只前进不后退。
    pub fn record_message(&mut self, message: &Message) {
        self.last_message = Some(MessageSummary::from(message));
        self.updated_at = self.updated_at.max(message.created_at);
    }

    /// 读者已读时同步摘要的已读标记
    pub fn mark_summary_read(&mut self, reader: UserId) -> bool {
        match self.last_message.as_mut() {
            Some(summary) if summary.receiver_id == reader && !summary.read => {
                summary.read = true;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::message::MessageBody;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn summary_tracks_last_message_and_read_flag() {
        let a = UserId::from(Uuid::new_v4());
        let b = UserId::from(Uuid::new_v4());
        let mut conversation = Conversation::open(PairKey::new(a, b).unwrap(), Utc::now());

        let mut message = Message::compose(
            &conversation,
            a,
            MessageBody::text("hi", 100).unwrap(),
            Utc::now(),
        )
        .unwrap();
        message.seq = conversation.next_seq();
        conversation.record_message(&message);

        let summary = conversation.last_message.as_ref().unwrap();
        assert_eq!(summary.seq, 1);
        assert_eq!(summary.preview, "hi");

        assert!(!conversation.mark_summary_read(a));
        assert!(conversation.mark_summary_read(b));
        assert!(conversation.last_message.as_ref().unwrap().read);
    }

    #[test]
    fn updated_at_never_moves_backwards() {
        let a = UserId::from(Uuid::new_v4());
        let b = UserId::from(Uuid::new_v4());
        let now = Utc::now();
        let mut conversation = Conversation::open(PairKey::new(a, b).unwrap(), now);

        let compose = |conversation: &Conversation, at| {
            Message::compose(conversation, a, MessageBody::text("x", 100).unwrap(), at).unwrap()
        };

        let mut later = compose(&conversation, now + chrono::Duration::seconds(5));
        later.seq = conversation.next_seq();
        conversation.record_message(&later);

        let mut earlier = compose(&conversation, now + chrono::Duration::seconds(2));
        earlier.seq = conversation.next_seq();
        conversation.record_message(&earlier);

        assert_eq!(conversation.updated_at, now + chrono::Duration::seconds(5));
        assert_eq!(conversation.last_message.as_ref().unwrap().seq, 2);
    }
}
