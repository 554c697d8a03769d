//! 在线状态Repository实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{PresenceRepository, PresenceState, RepositoryResult, StoreEvent, UserId};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::{map_sqlx_err, PgStore};

#[derive(Debug, FromRow)]
struct DbPresence {
    user_id: Uuid,
    online: bool,
    last_changed: Option<DateTime<Utc>>,
}

impl From<DbPresence> for PresenceState {
    fn from(value: DbPresence) -> Self {
        PresenceState {
            user_id: UserId::from(value.user_id),
            online: value.online,
            last_changed: value.last_changed,
        }
    }
}

#[async_trait]
impl PresenceRepository for PgStore {
    async fn set(&self, state: PresenceState) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO presence (user_id, online, last_changed)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET online = EXCLUDED.online, last_changed = EXCLUDED.last_changed
            "#,
        )
        .bind(Uuid::from(state.user_id))
        .bind(state.online)
        .bind(state.last_changed)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_err)?;

        self.publish(StoreEvent::PresenceChanged { state });
        Ok(())
    }

    async fn get(&self, user: UserId) -> RepositoryResult<Option<PresenceState>> {
        let row = sqlx::query_as::<_, DbPresence>(
            "SELECT user_id, online, last_changed FROM presence WHERE user_id = $1",
        )
        .bind(Uuid::from(user))
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_err)?;
        Ok(row.map(PresenceState::from))
    }
}
