use std::sync::Arc;

use domain::{ChangeFeed, PresenceRepository, PresenceState, StoreEvent, UserId};

use crate::{
    clock::Clock,
    error::ApplicationError,
    retry::{retry_transient, AttemptError, RetryPolicy},
    subscription::{next_event, ListenerRegistry, Subscription},
};

/// 在线状态：每个用户一条记录，覆盖写入，最后一次写入生效
pub struct PresenceTracker {
    repository: Arc<dyn PresenceRepository>,
    feed: Arc<dyn ChangeFeed>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    listeners: Arc<ListenerRegistry>,
}

impl PresenceTracker {
    pub fn new(
        repository: Arc<dyn PresenceRepository>,
        feed: Arc<dyn ChangeFeed>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            repository,
            feed,
            clock,
            retry,
            listeners: Arc::new(ListenerRegistry::default()),
        }
    }

    pub async fn set_presence(
        &self,
        user: UserId,
        online: bool,
    ) -> Result<PresenceState, ApplicationError> {
        let state = PresenceState::new(user, online, self.clock.now());

        retry_transient(&self.retry, "set_presence", || {
            let state = state.clone();
            async move { Ok::<_, AttemptError>(self.repository.set(state).await?) }
        })
        .await?;

        tracing::debug!(user_id = %user, online, "更新在线状态");
        Ok(state)
    }

    /// 没有记录的用户视为离线
    pub async fn presence(&self, user: UserId) -> Result<PresenceState, ApplicationError> {
        let state = retry_transient(&self.retry, "get_presence", move || async move {
            Ok::<_, AttemptError>(self.repository.get(user).await?)
        })
        .await?;
        Ok(state.unwrap_or_else(|| PresenceState::unknown(user)))
    }

    /// 订阅某个用户的在线状态变化
    pub fn on_presence_change<F>(&self, user: UserId, mut callback: F) -> Subscription
    where
        F: FnMut(PresenceState) + Send + 'static,
    {
        let mut receiver = self.feed.subscribe();
        Subscription::spawn("presence", self.listeners.clone(), async move {
            while let Some(event) = next_event(&mut receiver, "presence").await {
                if let StoreEvent::PresenceChanged { state } = event {
                    if state.user_id == user {
                        callback(state);
                    }
                }
            }
        })
    }

    pub fn active_listeners(&self) -> usize {
        self.listeners.active()
    }
}

/// 一次客户端连接的在线会话。
///
/// 建立时置为在线，`end` 时释放会话持有的全部订阅并置为离线。
/// 未调用 `end` 就被丢弃时，会在后台补写离线状态。
pub struct PresenceSession {
    tracker: Arc<PresenceTracker>,
    user: UserId,
    watches: Vec<Subscription>,
    ended: bool,
}

impl PresenceSession {
    pub async fn start(
        tracker: Arc<PresenceTracker>,
        user: UserId,
    ) -> Result<Self, ApplicationError> {
        tracker.set_presence(user, true).await?;
        tracing::info!(user_id = %user, "在线会话开始");
        Ok(Self {
            tracker,
            user,
            watches: Vec::new(),
            ended: false,
        })
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    /// 关注对方的在线状态，订阅的生命周期跟随本会话
    pub fn watch<F>(&mut self, peer: UserId, callback: F)
    where
        F: FnMut(PresenceState) + Send + 'static,
    {
        let subscription = self.tracker.on_presence_change(peer, callback);
        self.watches.push(subscription);
    }

    pub fn watching(&self) -> usize {
        self.watches.len()
    }

    pub async fn end(mut self) -> Result<PresenceState, ApplicationError> {
        self.ended = true;
        self.watches.clear();
        let state = self.tracker.set_presence(self.user, false).await?;
        tracing::info!(user_id = %self.user, "在线会话结束");
        Ok(state)
    }
}

impl Drop for PresenceSession {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        self.watches.clear();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(user_id = %self.user, "运行时已关闭，无法写入离线状态");
            return;
        };
        let tracker = self.tracker.clone();
        let user = self.user;
        runtime.spawn(async move {
            if let Err(err) = tracker.set_presence(user, false).await {
                tracing::warn!(user_id = %user, error = %err, "写入离线状态失败");
            }
        });
    }
}
