//! Redis 在线状态存储
//!
//! 每个用户一个键，值为 JSON 序列化的 `PresenceState`，覆盖写入。

use async_trait::async_trait;
use domain::{PresenceRepository, PresenceState, RepositoryError, RepositoryResult, StoreEvent, UserId};
use redis::{aio::ConnectionManager, AsyncCommands, Client};

use crate::feed::BroadcastFeed;

fn map_redis_err(err: redis::RedisError) -> RepositoryError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
        RepositoryError::unavailable(format!("redis: {err}"))
    } else {
        RepositoryError::storage(format!("redis: {err}"))
    }
}

#[derive(Clone)]
pub struct RedisPresenceStore {
    connection: ConnectionManager,
    feed: BroadcastFeed,
}

impl RedisPresenceStore {
    pub async fn connect(url: &str, feed: BroadcastFeed) -> Result<Self, redis::RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        tracing::info!("Redis 在线状态存储已连接");
        Ok(Self { connection, feed })
    }

    fn key(user: UserId) -> String {
        format!("presence:{user}")
    }
}

#[async_trait]
impl PresenceRepository for RedisPresenceStore {
    async fn set(&self, state: PresenceState) -> RepositoryResult<()> {
        let payload =
            serde_json::to_string(&state).map_err(|err| RepositoryError::storage(err.to_string()))?;
        let mut connection = self.connection.clone();
        let _: () = connection
            .set(Self::key(state.user_id), payload)
            .await
            .map_err(map_redis_err)?;

        self.feed.publish(StoreEvent::PresenceChanged { state });
        Ok(())
    }

    async fn get(&self, user: UserId) -> RepositoryResult<Option<PresenceState>> {
        let mut connection = self.connection.clone();
        let payload: Option<String> = connection
            .get(Self::key(user))
            .await
            .map_err(map_redis_err)?;

        payload
            .map(|raw| {
                serde_json::from_str(&raw).map_err(|err| RepositoryError::storage(err.to_string()))
            })
            .transpose()
    }
}
