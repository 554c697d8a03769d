//! 通知分发
//!
//! 同一 `(type, actor, target, content_ref)` 在折叠窗口内的重复触发
//! 只刷新已有通知，不会产生新行。折叠由存储的单个原子操作完成。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use domain::{
    ChangeFeed, CollapseOutcome, NotificationEvent, NotificationId, NotificationKey,
    NotificationRepository, NotificationType, StoreEvent, UserId,
};

use crate::{
    clock::Clock,
    error::ApplicationError,
    retry::{retry_transient, AttemptError, RetryPolicy},
    subscription::{next_event, ListenerRegistry, Subscription},
};

/// 一次通知触发
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyRequest {
    pub kind: NotificationType,
    pub actor_id: UserId,
    pub target_id: UserId,
    pub content_ref: Option<String>,
    pub message: Option<String>,
}

impl NotifyRequest {
    pub fn new(kind: NotificationType, actor_id: UserId, target_id: UserId) -> Self {
        Self {
            kind,
            actor_id,
            target_id,
            content_ref: None,
            message: None,
        }
    }

    pub fn with_content_ref(mut self, content_ref: impl Into<String>) -> Self {
        self.content_ref = Some(content_ref.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn key(&self) -> NotificationKey {
        NotificationKey::new(
            self.kind,
            self.actor_id,
            self.target_id,
            self.content_ref.clone(),
        )
    }
}

/// `notify` 的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// 自己触发给自己，不产生通知
    Suppressed,
    Created(NotificationEvent),
    Refreshed(NotificationEvent),
}

impl Dispatch {
    pub fn event(&self) -> Option<&NotificationEvent> {
        match self {
            Self::Suppressed => None,
            Self::Created(event) | Self::Refreshed(event) => Some(event),
        }
    }
}

impl From<CollapseOutcome> for Dispatch {
    fn from(outcome: CollapseOutcome) -> Self {
        match outcome {
            CollapseOutcome::Created(event) => Self::Created(event),
            CollapseOutcome::Refreshed(event) => Self::Refreshed(event),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NotificationSettings {
    pub collapse_window: Duration,
    pub feed_page_limit: u32,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            collapse_window: Duration::hours(1),
            feed_page_limit: 50,
        }
    }
}

impl From<&config::NotificationConfig> for NotificationSettings {
    fn from(config: &config::NotificationConfig) -> Self {
        Self {
            collapse_window: i64::try_from(config.collapse_window_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
            feed_page_limit: config.feed_page_limit,
        }
    }
}

pub struct NotificationDispatcher {
    repository: Arc<dyn NotificationRepository>,
    feed: Arc<dyn ChangeFeed>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    settings: NotificationSettings,
    listeners: Arc<ListenerRegistry>,
}

impl NotificationDispatcher {
    pub fn new(
        repository: Arc<dyn NotificationRepository>,
        feed: Arc<dyn ChangeFeed>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        settings: NotificationSettings,
    ) -> Self {
        Self {
            repository,
            feed,
            clock,
            retry,
            settings,
            listeners: Arc::new(ListenerRegistry::default()),
        }
    }

    /// 触发通知，窗口内的重复触发会折叠到已有通知上
    pub async fn notify(&self, request: NotifyRequest) -> Result<Dispatch, ApplicationError> {
        let key = request.key();
        if key.is_self_directed() {
            tracing::debug!(actor = %request.actor_id, kind = %request.kind, "忽略发给自己的通知");
            return Ok(Dispatch::Suppressed);
        }

        let now = self.clock.now();
        // 窗口超出可表示的时间范围时，视为覆盖全部历史
        let window_start = now
            .checked_sub_signed(self.settings.collapse_window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let candidate = NotificationEvent::new(key, request.message, now);

        let outcome = retry_transient(&self.retry, "notify", || {
            let candidate = candidate.clone();
            async move {
                Ok::<_, AttemptError>(
                    self.repository
                        .collapse_or_insert(candidate, window_start)
                        .await?,
                )
            }
        })
        .await?;

        let event = outcome.event();
        tracing::info!(
            notification_id = %event.id,
            kind = %event.kind,
            actor = %event.actor_id,
            target = %event.target_id,
            refreshed = outcome.is_refresh(),
            "分发通知"
        );
        Ok(outcome.into())
    }

    /// 撤回匹配该键的所有活跃通知，返回删除数量；没有匹配时为 0
    pub async fn retract(
        &self,
        kind: NotificationType,
        actor_id: UserId,
        target_id: UserId,
        content_ref: Option<String>,
    ) -> Result<u64, ApplicationError> {
        let key = NotificationKey::new(kind, actor_id, target_id, content_ref);

        let removed = retry_transient(&self.retry, "retract_notification", || {
            let key = key.clone();
            async move { Ok::<_, AttemptError>(self.repository.retract(key).await?) }
        })
        .await?;

        if removed > 0 {
            tracing::info!(kind = %kind, actor = %actor_id, target = %target_id, removed, "撤回通知");
        }
        Ok(removed)
    }

    pub async fn mark_read(
        &self,
        target: UserId,
        id: NotificationId,
    ) -> Result<bool, ApplicationError> {
        retry_transient(&self.retry, "mark_notification_read", move || async move {
            Ok::<_, AttemptError>(self.repository.mark_read(target, id).await?)
        })
        .await
    }

    pub async fn mark_all_read(&self, target: UserId) -> Result<u64, ApplicationError> {
        let count = retry_transient(&self.retry, "mark_all_notifications_read", move || async move {
            Ok::<_, AttemptError>(self.repository.mark_all_read(target).await?)
        })
        .await?;
        tracing::debug!(target = %target, count, "通知全部已读");
        Ok(count)
    }

    /// 用户的通知流，按时间倒序
    pub async fn feed(
        &self,
        target: UserId,
        limit: Option<u32>,
    ) -> Result<Vec<NotificationEvent>, ApplicationError> {
        let limit = limit
            .unwrap_or(self.settings.feed_page_limit)
            .clamp(1, self.settings.feed_page_limit);
        Ok(self.repository.list_for_target(target, limit).await?)
    }

    pub async fn unread_count(&self, target: UserId) -> Result<u64, ApplicationError> {
        Ok(self.repository.count_unread(target).await?)
    }

    /// 订阅用户通知流的变化
    pub fn subscribe<F>(&self, target: UserId, mut callback: F) -> Subscription
    where
        F: FnMut(StoreEvent) + Send + 'static,
    {
        let mut receiver = self.feed.subscribe();
        Subscription::spawn("notifications", self.listeners.clone(), async move {
            while let Some(event) = next_event(&mut receiver, "notifications").await {
                if event.notification_target() == Some(target) {
                    callback(event);
                }
            }
        })
    }

    pub fn active_listeners(&self) -> usize {
        self.listeners.active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use domain::{MockChangeFeed, MockNotificationRepository, RepositoryError};
    use uuid::Uuid;

    fn dispatcher(repository: MockNotificationRepository) -> NotificationDispatcher {
        NotificationDispatcher::new(
            Arc::new(repository),
            Arc::new(MockChangeFeed::new()),
            Arc::new(ManualClock::default()),
            RetryPolicy::immediate(3),
            NotificationSettings::default(),
        )
    }

    #[tokio::test]
    async fn self_directed_notifications_are_suppressed() {
        let mut repository = MockNotificationRepository::new();
        repository.expect_collapse_or_insert().never();

        let user = UserId::from(Uuid::new_v4());
        let dispatch = dispatcher(repository)
            .notify(NotifyRequest::new(NotificationType::Like, user, user))
            .await
            .unwrap();
        assert_eq!(dispatch, Dispatch::Suppressed);
    }

    #[tokio::test]
    async fn retried_notify_reuses_the_same_candidate() {
        let actor = UserId::from(Uuid::new_v4());
        let target = UserId::from(Uuid::new_v4());

        let mut repository = MockNotificationRepository::new();
        let mut seq = mockall::Sequence::new();
        let first_id = std::sync::Arc::new(std::sync::Mutex::new(None));
        let seen = first_id.clone();
        repository
            .expect_collapse_or_insert()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |candidate, _| {
                *seen.lock().unwrap() = Some(candidate.id);
                Err(RepositoryError::unavailable("timeout"))
            });
        let expected = first_id.clone();
        repository
            .expect_collapse_or_insert()
            .withf(move |candidate, window_start| {
                Some(candidate.id) == *expected.lock().unwrap()
                    && *window_start < candidate.created_at
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|candidate, _| Ok(CollapseOutcome::Created(candidate)));

        let dispatch = dispatcher(repository)
            .notify(NotifyRequest::new(NotificationType::Like, actor, target).with_content_ref("post1"))
            .await
            .unwrap();
        assert!(matches!(dispatch, Dispatch::Created(_)));
    }

    #[tokio::test]
    async fn feed_limit_is_clamped() {
        let target = UserId::from(Uuid::new_v4());
        let mut repository = MockNotificationRepository::new();
        repository
            .expect_list_for_target()
            .withf(|_, limit| *limit == 50)
            .times(1)
            .returning(|_, _| Ok(Vec::new()));

        let events = dispatcher(repository).feed(target, Some(10_000)).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn oversized_window_covers_all_history_without_overflow() {
        let settings = NotificationSettings::from(&config::NotificationConfig {
            collapse_window_secs: 10_000_000_000_000,
            feed_page_limit: 50,
        });
        assert_eq!(settings.collapse_window, Duration::MAX);

        let mut repository = MockNotificationRepository::new();
        repository
            .expect_collapse_or_insert()
            .withf(|_, window_start| *window_start == DateTime::<Utc>::MIN_UTC)
            .times(1)
            .returning(|candidate, _| Ok(CollapseOutcome::Created(candidate)));

        let dispatcher = NotificationDispatcher::new(
            Arc::new(repository),
            Arc::new(MockChangeFeed::new()),
            Arc::new(ManualClock::default()),
            RetryPolicy::immediate(1),
            settings,
        );
        let (actor, target) = (UserId::from(Uuid::new_v4()), UserId::from(Uuid::new_v4()));
        let dispatch = dispatcher
            .notify(NotifyRequest::new(NotificationType::Follow, actor, target))
            .await
            .unwrap();
        assert!(matches!(dispatch, Dispatch::Created(_)));
    }
}
