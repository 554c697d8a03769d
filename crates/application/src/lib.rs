//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务：兴趣记录、会话目录、消息流、
//! 未读数聚合、在线状态与通知分发，处理输入校验、重试边界，
//! 以及对存储适配器的抽象。

pub mod clock;
pub mod container;
pub mod dto;
pub mod error;
pub mod retry;
pub mod services;
pub mod subscription;

pub use clock::{Clock, ManualClock, SystemClock};
pub use container::{ServiceContainer, StoreSet};
pub use dto::{ConversationOverview, MessageInput};
pub use error::ApplicationError;
pub use retry::{retry_transient, AttemptError, Backoff, RetryPolicy};
pub use services::{
    ChatService, ChatServiceDependencies, ConversationDirectory, Dispatch, InterestLedger,
    MatchService, MessageLimits, MessageStream, NotificationDispatcher, NotificationSettings,
    NotifyRequest, PresenceSession, PresenceTracker, ReadStateAggregator,
};
pub use subscription::{ListenerRegistry, Subscription};
