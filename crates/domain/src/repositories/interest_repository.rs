//! 兴趣记录Repository接口定义

use async_trait::async_trait;

use crate::entities::InterestRecord;
use crate::errors::RepositoryResult;
use crate::value_objects::{PairKey, UserId};

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait InterestRepository: Send + Sync {
    /// 按规范用户对点查
    async fn find(&self, pair: PairKey) -> RepositoryResult<Option<InterestRecord>>;

    /// 记录不存在时插入；已存在返回 `RepositoryError::Conflict`
    async fn insert_if_absent(&self, record: InterestRecord) -> RepositoryResult<()>;

    /// 仅当存储中的版本等于 `expected_version` 时写入，否则返回 `Conflict`
    async fn compare_and_swap(
        &self,
        record: InterestRecord,
        expected_version: i64,
    ) -> RepositoryResult<()>;

    /// 列出包含该用户且已互相匹配的记录，按最近互动倒序
    async fn list_mutual(&self, user: UserId) -> RepositoryResult<Vec<InterestRecord>>;
}
