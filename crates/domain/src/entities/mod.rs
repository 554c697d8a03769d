//! 领域实体定义
//!
//! 包含系统的核心实体：兴趣记录、会话、消息、在线状态与通知。

pub mod conversation;
pub mod interest;
pub mod message;
pub mod notification;
pub mod presence;

// 重新导出核心实体
pub use conversation::{Conversation, MessageSummary};
pub use interest::{InterestRecord, SwipeDecision, SwipeOutcome, SwipeTransition};
pub use message::{Message, MessageBody, PREVIEW_MAX_CHARS};
pub use notification::{
    CollapseOutcome, NotificationEvent, NotificationKey, NotificationState, NotificationType,
};
pub use presence::PresenceState;
