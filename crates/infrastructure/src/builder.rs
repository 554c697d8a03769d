use std::sync::Arc;

use config::{AppConfig, StoreBackend};
use domain::{
    ChangeFeed, ConversationRepository, InterestRepository, MessageRepository,
    NotificationRepository, PresenceRepository,
};
use thiserror::Error;

use crate::{
    db::{create_pg_pool, PgStore, MIGRATOR},
    feed::BroadcastFeed,
    memory::MemoryStore,
    redis_presence::RedisPresenceStore,
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// 按配置装配的存储适配器集合，所有适配器共享同一个变更流
#[derive(Clone)]
pub struct Infrastructure {
    pub feed: Arc<dyn ChangeFeed>,
    pub interests: Arc<dyn InterestRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub presence: Arc<dyn PresenceRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
}

impl Infrastructure {
    pub fn in_memory(feed_capacity: usize) -> Self {
        Self::from_memory(Arc::new(MemoryStore::new(BroadcastFeed::new(feed_capacity))))
    }

    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            feed: store.clone(),
            interests: store.clone(),
            conversations: store.clone(),
            messages: store.clone(),
            presence: store.clone(),
            notifications: store,
        }
    }

    pub fn from_postgres(store: Arc<PgStore>) -> Self {
        Self {
            feed: store.clone(),
            interests: store.clone(),
            conversations: store.clone(),
            messages: store.clone(),
            presence: store.clone(),
            notifications: store,
        }
    }

    pub async fn connect(config: &AppConfig) -> Result<Self, InfrastructureError> {
        let feed = BroadcastFeed::new(config.feed.capacity);

        let mut infrastructure = match config.store.backend {
            StoreBackend::Memory => {
                tracing::info!("使用内存存储");
                Self::from_memory(Arc::new(MemoryStore::new(feed.clone())))
            }
            StoreBackend::Postgres => {
                let pool =
                    create_pg_pool(&config.database.url, config.database.max_connections).await?;
                MIGRATOR.run(&pool).await?;
                tracing::info!(
                    max_connections = config.database.max_connections,
                    "PostgreSQL 存储已就绪"
                );
                Self::from_postgres(Arc::new(PgStore::new(pool, feed.clone())))
            }
        };

        if let Some(url) = config.redis.url.as_deref() {
            infrastructure.presence = Arc::new(RedisPresenceStore::connect(url, feed).await?);
        }
        Ok(infrastructure)
    }
}
