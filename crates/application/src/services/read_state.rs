//! 未读数聚合
//!
//! 未读数是消息日志的派生投影：缓存只是加速，随时可以从日志重新计算。
//! 缓存持有变更流的私有接收端，每次读写缓存前先排空已到达的事件，
//! 因此无论写入经由哪个服务发出，追加与已读都会在下一次读取前失效对应缓存。

use std::collections::HashMap;
use std::sync::Arc;

use domain::{ChangeFeed, ConversationId, MessageRepository, StoreEvent, UserId};
use tokio::sync::{broadcast, Mutex};

use crate::{
    error::ApplicationError,
    retry::{retry_transient, AttemptError, RetryPolicy},
    subscription::{next_event, ListenerRegistry, Subscription},
};

type Scope = (UserId, Option<ConversationId>);

struct UnreadCache {
    counts: HashMap<Scope, u64>,
    /// 每个用户的失效代数，扫描期间发生失效时丢弃扫描结果
    generations: HashMap<UserId, u64>,
    /// 整体清空的次数，丢失事件时递增
    epoch: u64,
    /// 为 None 时不缓存，每次都从日志计算
    changes: Option<broadcast::Receiver<StoreEvent>>,
}

impl UnreadCache {
    fn new(changes: Option<broadcast::Receiver<StoreEvent>>) -> Self {
        Self {
            counts: HashMap::new(),
            generations: HashMap::new(),
            epoch: 0,
            changes,
        }
    }

    fn enabled(&self) -> bool {
        self.changes.is_some()
    }

    fn generation(&self, user: UserId) -> (u64, u64) {
        (
            self.epoch,
            self.generations.get(&user).copied().unwrap_or(0),
        )
    }

    fn invalidate(&mut self, user: UserId) {
        *self.generations.entry(user).or_insert(0) += 1;
        self.counts.retain(|(owner, _), _| *owner != user);
    }

    fn clear(&mut self) {
        self.epoch += 1;
        self.counts.clear();
    }

    /// 应用变更流中已经到达的全部事件
    fn catch_up(&mut self) {
        let Some(receiver) = self.changes.as_mut() else {
            return;
        };
        let mut stale = Vec::new();
        let mut lagged = false;
        let mut closed = false;
        loop {
            match receiver.try_recv() {
                Ok(event) => stale.extend(event.unread_owner()),
                Err(broadcast::error::TryRecvError::Empty) => break,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "未读数缓存丢失变更事件，清空缓存");
                    lagged = true;
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    tracing::warn!("变更流已关闭，停止缓存未读数");
                    closed = true;
                    break;
                }
            }
        }

        for user in stale {
            self.invalidate(user);
        }
        if lagged || closed {
            self.clear();
        }
        if closed {
            self.changes = None;
        }
    }
}

pub struct ReadStateAggregator {
    messages: Arc<dyn MessageRepository>,
    feed: Arc<dyn ChangeFeed>,
    retry: RetryPolicy,
    cache: Arc<Mutex<UnreadCache>>,
    listeners: Arc<ListenerRegistry>,
}

impl ReadStateAggregator {
    /// `caching` 为 false 时每次都从日志计算。
    ///
    /// 变更流只覆盖本进程的写入，存储被多个进程共享时应关闭缓存。
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        feed: Arc<dyn ChangeFeed>,
        retry: RetryPolicy,
        caching: bool,
    ) -> Self {
        let changes = caching.then(|| feed.subscribe());
        Self {
            messages,
            feed,
            retry,
            cache: Arc::new(Mutex::new(UnreadCache::new(changes))),
            listeners: Arc::new(ListenerRegistry::default()),
        }
    }

    /// 用户的未读消息数，`conversation_id` 为空时统计全部会话
    pub async fn unread_count(
        &self,
        user: UserId,
        conversation_id: Option<ConversationId>,
    ) -> Result<u64, ApplicationError> {
        let scope = (user, conversation_id);
        let generation = {
            let mut cache = self.cache.lock().await;
            cache.catch_up();
            if !cache.enabled() {
                drop(cache);
                return self.scan(user, conversation_id).await;
            }
            if let Some(count) = cache.counts.get(&scope) {
                tracing::debug!(user_id = %user, "未读数命中缓存");
                return Ok(*count);
            }
            cache.generation(user)
        };

        let count = self.scan(user, conversation_id).await?;

        let mut cache = self.cache.lock().await;
        cache.catch_up();
        if cache.enabled() && cache.generation(user) == generation {
            cache.counts.insert(scope, count);
        }
        Ok(count)
    }

    /// 失效用户的全部缓存
    pub async fn invalidate(&self, user: UserId) {
        self.cache.lock().await.invalidate(user);
        tracing::debug!(user_id = %user, "未读数缓存失效");
    }

    /// 修复路径：丢弃缓存并从日志重新计算总未读数
    pub async fn recompute(&self, user: UserId) -> Result<u64, ApplicationError> {
        self.invalidate(user).await;
        self.unread_count(user, None).await
    }

    async fn scan(
        &self,
        user: UserId,
        conversation_id: Option<ConversationId>,
    ) -> Result<u64, ApplicationError> {
        retry_transient(&self.retry, "unread_count", move || async move {
            Ok::<_, AttemptError>(self.messages.count_unread(user, conversation_id).await?)
        })
        .await
    }

    /// 订阅用户的总未读数。
    ///
    /// 变更流中出现影响该用户未读数的事件时，失效缓存、重新计算并回调。
    pub fn subscribe<F>(&self, user: UserId, mut callback: F) -> Subscription
    where
        F: FnMut(u64) + Send + 'static,
    {
        let mut receiver = self.feed.subscribe();
        let messages = self.messages.clone();
        let cache = self.cache.clone();

        Subscription::spawn("unread_count", self.listeners.clone(), async move {
            while let Some(event) = next_event(&mut receiver, "unread_count").await {
                if !event.affects_unread_of(user) {
                    continue;
                }
                cache.lock().await.invalidate(user);
                match messages.count_unread(user, None).await {
                    Ok(count) => callback(count),
                    Err(err) => {
                        tracing::warn!(user_id = %user, error = %err, "重新计算未读数失败")
                    }
                }
            }
        })
    }

    pub fn active_listeners(&self) -> usize {
        self.listeners.active()
    }
}
