#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use application::{ManualClock, ServiceContainer, StoreSet};
use config::AppConfig;
use domain::UserId;
use infrastructure::{BroadcastFeed, MemoryStore};
use tokio::sync::mpsc;
use uuid::Uuid;

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub services: ServiceContainer,
}

impl TestApp {
    pub fn clock_now(&self) -> domain::Timestamp {
        application::Clock::now(self.clock.as_ref())
    }
}

pub fn stores(store: &Arc<MemoryStore>) -> StoreSet {
    StoreSet {
        feed: store.clone(),
        interests: store.clone(),
        conversations: store.clone(),
        messages: store.clone(),
        presence: store.clone(),
        notifications: store.clone(),
    }
}

pub fn test_app() -> TestApp {
    test_app_with(AppConfig::default())
}

pub fn test_app_with(mut config: AppConfig) -> TestApp {
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.retry.max_attempts = 10;

    let store = Arc::new(MemoryStore::new(BroadcastFeed::new(1024)));
    let clock = Arc::new(ManualClock::default());
    let services = ServiceContainer::new(stores(&store), clock.clone(), &config);
    TestApp {
        store,
        clock,
        services,
    }
}

pub fn user() -> UserId {
    UserId::from(Uuid::new_v4())
}

/// 等待订阅回调推送的下一个值
pub async fn next<T>(receiver: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), receiver.recv())
        .await
        .expect("callback not delivered in time")
        .expect("channel closed")
}

/// 断言短时间内没有新的回调
pub async fn assert_quiet<T: std::fmt::Debug>(receiver: &mut mpsc::UnboundedReceiver<T>) {
    let result = tokio::time::timeout(Duration::from_millis(100), receiver.recv()).await;
    assert!(result.is_err(), "unexpected callback: {result:?}");
}
