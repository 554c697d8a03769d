//! Repository接口定义
//!
//! 定义数据访问层的抽象接口，内层定义接口，外层实现接口。
//! 存储需要提供：按键点查、按字段查询（带排序与限制）、
//! 单记录原子条件更新，以及变更流订阅。

pub mod change_feed;
pub mod conversation_repository;
pub mod interest_repository;
pub mod message_repository;
pub mod notification_repository;
pub mod presence_repository;

// 重新导出所有Repository特征
pub use change_feed::ChangeFeed;
pub use conversation_repository::ConversationRepository;
pub use interest_repository::InterestRepository;
pub use message_repository::MessageRepository;
pub use notification_repository::NotificationRepository;
pub use presence_repository::PresenceRepository;

#[cfg(feature = "testing")]
pub use change_feed::MockChangeFeed;
#[cfg(feature = "testing")]
pub use conversation_repository::MockConversationRepository;
#[cfg(feature = "testing")]
pub use interest_repository::MockInterestRepository;
#[cfg(feature = "testing")]
pub use message_repository::MockMessageRepository;
#[cfg(feature = "testing")]
pub use notification_repository::MockNotificationRepository;
#[cfg(feature = "testing")]
pub use presence_repository::MockPresenceRepository;
