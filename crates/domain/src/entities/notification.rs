//! 通知实体定义
//!
//! 状态机：`Created(未读) → Refreshed(未读, 时间戳刷新) → Read`，
//! 已读的通知再次被刷新时回到未读；撤回即删除，不再有后续状态。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{NotificationId, Timestamp, UserId};

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Match,
    Like,
    Message,
    Follow,
    Comment,
    Mention,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Match => "match",
            Self::Like => "like",
            Self::Message => "message",
            Self::Follow => "follow",
            Self::Comment => "comment",
            Self::Mention => "mention",
        }
    }

    pub fn parse(value: &str) -> DomainResult<Self> {
        match value {
            "match" => Ok(Self::Match),
            "like" => Ok(Self::Like),
            "message" => Ok(Self::Message),
            "follow" => Ok(Self::Follow),
            "comment" => Ok(Self::Comment),
            "mention" => Ok(Self::Mention),
            other => Err(DomainError::invalid_argument(
                "notification_type",
                format!("unknown type `{other}`"),
            )),
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 通知的去重键 `(type, actor, target, content_ref)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationKey {
    pub kind: NotificationType,
    pub actor_id: UserId,
    pub target_id: UserId,
    pub content_ref: Option<String>,
}

impl NotificationKey {
    pub fn new(
        kind: NotificationType,
        actor_id: UserId,
        target_id: UserId,
        content_ref: Option<String>,
    ) -> Self {
        Self {
            kind,
            actor_id,
            target_id,
            content_ref,
        }
    }

    pub fn is_self_directed(&self) -> bool {
        self.actor_id == self.target_id
    }
}

/// 通知状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationState {
    Created,
    Refreshed,
    Read,
}

impl NotificationState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Refreshed => "refreshed",
            Self::Read => "read",
        }
    }

    pub fn parse(value: &str) -> DomainResult<Self> {
        match value {
            "created" => Ok(Self::Created),
            "refreshed" => Ok(Self::Refreshed),
            "read" => Ok(Self::Read),
            other => Err(DomainError::invalid_argument(
                "notification_state",
                format!("unknown state `{other}`"),
            )),
        }
    }
}

/// 活动通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: NotificationId,
    pub kind: NotificationType,
    pub actor_id: UserId,
    pub target_id: UserId,
    pub content_ref: Option<String>,
    pub message: Option<String>,
    pub state: NotificationState,
    pub created_at: Timestamp,
    /// 被折叠进来的重复触发次数
    pub refresh_count: i32,
}

impl NotificationEvent {
    pub fn new(key: NotificationKey, message: Option<String>, now: Timestamp) -> Self {
        Self {
            id: NotificationId::generate(),
            kind: key.kind,
            actor_id: key.actor_id,
            target_id: key.target_id,
            content_ref: key.content_ref,
            message,
            state: NotificationState::Created,
            created_at: now,
            refresh_count: 0,
        }
    }

    pub fn key(&self) -> NotificationKey {
        NotificationKey {
            kind: self.kind,
            actor_id: self.actor_id,
            target_id: self.target_id,
            content_ref: self.content_ref.clone(),
        }
    }

    pub fn matches(&self, key: &NotificationKey) -> bool {
        self.kind == key.kind
            && self.actor_id == key.actor_id
            && self.target_id == key.target_id
            && self.content_ref == key.content_ref
    }

    pub fn is_read(&self) -> bool {
        self.state == NotificationState::Read
    }

    /// 是否仍处于折叠窗口内
    pub fn within_window(&self, window_start: Timestamp) -> bool {
        self.created_at >= window_start
    }

    /// 重复触发：刷新时间戳、替换文案并回到未读
    pub fn refresh(&mut self, message: Option<String>, now: Timestamp) {
        self.state = NotificationState::Refreshed;
        self.created_at = now;
        self.message = message;
        self.refresh_count += 1;
    }

    /// 标记已读，已读时返回 false
    pub fn mark_read(&mut self) -> bool {
        if self.is_read() {
            return false;
        }
        self.state = NotificationState::Read;
        true
    }
}

/// 折叠写入的结果
#[derive(Debug, Clone, PartialEq)]
pub enum CollapseOutcome {
    Created(NotificationEvent),
    Refreshed(NotificationEvent),
}

impl CollapseOutcome {
    pub fn event(&self) -> &NotificationEvent {
        match self {
            Self::Created(event) | Self::Refreshed(event) => event,
        }
    }

    pub fn into_event(self) -> NotificationEvent {
        match self {
            Self::Created(event) | Self::Refreshed(event) => event,
        }
    }

    pub fn is_refresh(&self) -> bool {
        matches!(self, Self::Refreshed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn key() -> NotificationKey {
        NotificationKey::new(
            NotificationType::Like,
            UserId::from(Uuid::new_v4()),
            UserId::from(Uuid::new_v4()),
            Some("post1".into()),
        )
    }

    #[test]
    fn refresh_returns_read_event_to_unread() {
        let now = Utc::now();
        let mut event = NotificationEvent::new(key(), Some("liked".into()), now);
        assert_eq!(event.state, NotificationState::Created);

        assert!(event.mark_read());
        assert!(!event.mark_read());

        let later = now + Duration::minutes(5);
        event.refresh(Some("liked again".into()), later);
        assert_eq!(event.state, NotificationState::Refreshed);
        assert!(!event.is_read());
        assert_eq!(event.created_at, later);
        assert_eq!(event.message.as_deref(), Some("liked again"));
        assert_eq!(event.refresh_count, 1);
    }

    #[test]
    fn key_matching_includes_content_ref() {
        let key = key();
        let event = NotificationEvent::new(key.clone(), None, Utc::now());
        assert!(event.matches(&key));

        let mut other = key.clone();
        other.content_ref = Some("post2".into());
        assert!(!event.matches(&other));

        other.content_ref = None;
        assert!(!event.matches(&other));
    }

    #[test]
    fn window_check() {
        let now = Utc::now();
        let event = NotificationEvent::new(key(), None, now);
        assert!(event.within_window(now - Duration::hours(1)));
        assert!(!event.within_window(now + Duration::seconds(1)));
    }

    #[test]
    fn type_round_trips_through_str() {
        for kind in [
            NotificationType::Match,
            NotificationType::Like,
            NotificationType::Message,
            NotificationType::Follow,
            NotificationType::Comment,
            NotificationType::Mention,
        ] {
            assert_eq!(NotificationType::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(NotificationType::parse("poke").is_err());
    }
}
