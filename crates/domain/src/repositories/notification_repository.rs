//! 通知Repository接口定义

use async_trait::async_trait;

use crate::entities::{CollapseOutcome, NotificationEvent, NotificationKey};
use crate::errors::RepositoryResult;
use crate::value_objects::{NotificationId, Timestamp, UserId};

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// 原子地折叠或插入。
    ///
    /// 若存在同键且 `created_at >= window_start` 的活跃通知，则用
    /// `candidate` 的文案与时间刷新它；否则插入 `candidate`。
    async fn collapse_or_insert(
        &self,
        candidate: NotificationEvent,
        window_start: Timestamp,
    ) -> RepositoryResult<CollapseOutcome>;

    /// 删除所有匹配该键的活跃通知，返回删除数量
    async fn retract(&self, key: NotificationKey) -> RepositoryResult<u64>;

    /// 标记单条通知已读；通知不存在或不属于 `target` 时返回 `NotFound`
    async fn mark_read(&self, target: UserId, id: NotificationId) -> RepositoryResult<bool>;

    async fn mark_all_read(&self, target: UserId) -> RepositoryResult<u64>;

    /// 按 `created_at` 倒序
    async fn list_for_target(
        &self,
        target: UserId,
        limit: u32,
    ) -> RepositoryResult<Vec<NotificationEvent>>;

    async fn count_unread(&self, target: UserId) -> RepositoryResult<u64>;
}
