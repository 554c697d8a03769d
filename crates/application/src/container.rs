//! 依赖注入容器
//!
//! 由存储适配器集合与配置装配所有应用服务，服务之间共享同一组存储、
//! 同一个时钟与同一个重试策略。

use std::sync::Arc;

use config::{AppConfig, StoreBackend};
use domain::{
    ChangeFeed, ConversationRepository, InterestRepository, MessageRepository,
    NotificationRepository, PresenceRepository,
};

use crate::{
    clock::Clock,
    retry::RetryPolicy,
    services::{
        ChatService, ChatServiceDependencies, ConversationDirectory, InterestLedger, MatchService,
        MessageLimits, MessageStream, NotificationDispatcher, NotificationSettings,
        PresenceTracker, ReadStateAggregator,
    },
};

/// 存储适配器集合
#[derive(Clone)]
pub struct StoreSet {
    pub feed: Arc<dyn ChangeFeed>,
    pub interests: Arc<dyn InterestRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub presence: Arc<dyn PresenceRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
}

#[derive(Clone)]
pub struct ServiceContainer {
    pub ledger: Arc<InterestLedger>,
    pub directory: Arc<ConversationDirectory>,
    pub stream: Arc<MessageStream>,
    pub read_state: Arc<ReadStateAggregator>,
    pub presence: Arc<PresenceTracker>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub matches: Arc<MatchService>,
    pub chat: Arc<ChatService>,
}

impl ServiceContainer {
    pub fn new(stores: StoreSet, clock: Arc<dyn Clock>, config: &AppConfig) -> Self {
        let retry = RetryPolicy::from(&config.retry);

        let ledger = Arc::new(InterestLedger::new(
            stores.interests.clone(),
            clock.clone(),
            retry.clone(),
        ));
        let directory = Arc::new(ConversationDirectory::new(
            stores.conversations.clone(),
            clock.clone(),
            retry.clone(),
        ));
        let stream = Arc::new(MessageStream::new(
            stores.conversations.clone(),
            stores.messages.clone(),
            stores.feed.clone(),
            clock.clone(),
            retry.clone(),
            MessageLimits::from(&config.messaging),
        ));
        let read_state = Arc::new(ReadStateAggregator::new(
            stores.messages.clone(),
            stores.feed.clone(),
            retry.clone(),
            // 变更流只覆盖本进程的写入，共享数据库时未读数不缓存
            config.store.backend == StoreBackend::Memory,
        ));
        let presence = Arc::new(PresenceTracker::new(
            stores.presence.clone(),
            stores.feed.clone(),
            clock.clone(),
            retry.clone(),
        ));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            stores.notifications.clone(),
            stores.feed.clone(),
            clock,
            retry,
            NotificationSettings::from(&config.notifications),
        ));

        let matches = Arc::new(MatchService::new(ledger.clone(), dispatcher.clone()));
        let chat = Arc::new(ChatService::new(ChatServiceDependencies {
            directory: directory.clone(),
            stream: stream.clone(),
            read_state: read_state.clone(),
            presence: presence.clone(),
            dispatcher: dispatcher.clone(),
            notify_on_message: config.messaging.notify_on_message,
        }));

        tracing::debug!("应用服务装配完成");

        Self {
            ledger,
            directory,
            stream,
            read_state,
            presence,
            dispatcher,
            matches,
            chat,
        }
    }
}
