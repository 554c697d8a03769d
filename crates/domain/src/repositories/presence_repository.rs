use async_trait::async_trait;

use crate::entities::PresenceState;
use crate::errors::RepositoryResult;
use crate::value_objects::UserId;

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait PresenceRepository: Send + Sync {
    /// 覆盖写入，最后一次写入生效
    async fn set(&self, state: PresenceState) -> RepositoryResult<()>;

    async fn get(&self, user: UserId) -> RepositoryResult<Option<PresenceState>>;
}
