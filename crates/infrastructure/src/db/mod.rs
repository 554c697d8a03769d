//! PostgreSQL 存储
//!
//! 每个接口方法是一条语句或一个事务；变更在提交之后发布到进程内变更流。

use domain::{ChangeFeed, RepositoryError, StoreEvent};
use sqlx::{migrate::Migrator, postgres::PgPoolOptions, Pool, Postgres};
use tokio::sync::broadcast;

use crate::feed::BroadcastFeed;

pub mod repositories;

pub type DbPool = Pool<Postgres>;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn create_pg_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// 连接与序列化失败可以重试，唯一约束冲突视为并发写冲突
pub(crate) fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RepositoryError::unavailable(err.to_string())
        }
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::conflict(db.table().unwrap_or("row"))
        }
        sqlx::Error::Database(db) if matches!(db.code().as_deref(), Some("40001" | "40P01")) => {
            RepositoryError::unavailable(err.to_string())
        }
        _ => RepositoryError::storage(err.to_string()),
    }
}

pub(crate) fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
    feed: BroadcastFeed,
}

impl PgStore {
    pub fn new(pool: DbPool, feed: BroadcastFeed) -> Self {
        Self { pool, feed }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub(crate) fn publish(&self, event: StoreEvent) {
        self.feed.publish(event);
    }

    pub async fn health_check(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }
}

impl ChangeFeed for PgStore {
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.feed.subscribe()
    }
}
