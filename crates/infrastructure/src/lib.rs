//! 基础设施层实现。
//!
//! 提供内存存储、PostgreSQL 存储、Redis 在线状态存储与进程内变更流，
//! 实现领域层定义的存储接口。

pub mod builder;
pub mod db;
pub mod feed;
pub mod memory;
pub mod redis_presence;

pub use builder::{Infrastructure, InfrastructureError};
pub use db::{create_pg_pool, DbPool, PgStore, MIGRATOR};
pub use feed::BroadcastFeed;
pub use memory::MemoryStore;
pub use redis_presence::RedisPresenceStore;
