//! 通知Repository实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    CollapseOutcome, NotificationEvent, NotificationId, NotificationKey, NotificationRepository,
    NotificationState, NotificationType, RepositoryError, RepositoryResult, StoreEvent, Timestamp,
    UserId,
};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::{invalid_data, map_sqlx_err, PgStore};

#[derive(Debug, FromRow)]
struct DbNotification {
    id: Uuid,
    kind: String,
    actor_id: Uuid,
    target_id: Uuid,
    content_ref: Option<String>,
    message: Option<String>,
    state: String,
    created_at: DateTime<Utc>,
    refresh_count: i32,
}

impl TryFrom<DbNotification> for NotificationEvent {
    type Error = RepositoryError;

    fn try_from(value: DbNotification) -> Result<Self, Self::Error> {
        Ok(NotificationEvent {
            id: NotificationId::from(value.id),
            kind: NotificationType::parse(&value.kind).map_err(|err| invalid_data(err.to_string()))?,
            actor_id: UserId::from(value.actor_id),
            target_id: UserId::from(value.target_id),
            content_ref: value.content_ref,
            message: value.message,
            state: NotificationState::parse(&value.state)
                .map_err(|err| invalid_data(err.to_string()))?,
            created_at: value.created_at,
            refresh_count: value.refresh_count,
        })
    }
}

const NOTIFICATION_COLUMNS: &str =
    "id, kind, actor_id, target_id, content_ref, message, state, created_at, refresh_count";

/// 折叠时按键加事务级咨询锁，同键的并发触发依次执行
fn advisory_key(key: &NotificationKey) -> String {
    format!(
        "notification:{}:{}:{}:{}",
        key.kind,
        key.actor_id,
        key.target_id,
        key.content_ref.as_deref().unwrap_or("")
    )
}

#[async_trait]
impl NotificationRepository for PgStore {
    async fn collapse_or_insert(
        &self,
        candidate: NotificationEvent,
        window_start: Timestamp,
    ) -> RepositoryResult<CollapseOutcome> {
        let key = candidate.key();
        let mut tx = self.pool().begin().await.map_err(map_sqlx_err)?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(advisory_key(&key))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        let existing = sqlx::query_as::<_, DbNotification>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS} FROM notifications
            WHERE kind = $1 AND actor_id = $2 AND target_id = $3
              AND content_ref IS NOT DISTINCT FROM $4
              AND created_at >= $5
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE
            "#
        ))
        .bind(key.kind.as_str())
        .bind(Uuid::from(key.actor_id))
        .bind(Uuid::from(key.target_id))
        .bind(key.content_ref.as_deref())
        .bind(window_start)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        let outcome = match existing {
            Some(row) => {
                let mut event = NotificationEvent::try_from(row)?;
                event.refresh(candidate.message, candidate.created_at);
                sqlx::query(
                    r#"
                    UPDATE notifications
                    SET message = $2, state = $3, created_at = $4, refresh_count = $5
                    WHERE id = $1
                    "#,
                )
                .bind(Uuid::from(event.id))
                .bind(event.message.as_deref())
                .bind(event.state.as_str())
                .bind(event.created_at)
                .bind(event.refresh_count)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
                CollapseOutcome::Refreshed(event)
            }
            None => {
                sqlx::query(&format!(
                    "INSERT INTO notifications ({NOTIFICATION_COLUMNS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
                ))
                .bind(Uuid::from(candidate.id))
                .bind(candidate.kind.as_str())
                .bind(Uuid::from(candidate.actor_id))
                .bind(Uuid::from(candidate.target_id))
                .bind(candidate.content_ref.as_deref())
                .bind(candidate.message.as_deref())
                .bind(candidate.state.as_str())
                .bind(candidate.created_at)
                .bind(candidate.refresh_count)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
                CollapseOutcome::Created(candidate)
            }
        };

        tx.commit().await.map_err(map_sqlx_err)?;

        self.publish(StoreEvent::NotificationUpserted {
            event: outcome.event().clone(),
        });
        Ok(outcome)
    }

    async fn retract(&self, key: NotificationKey) -> RepositoryResult<u64> {
        let removed = sqlx::query(
            r#"
            DELETE FROM notifications
            WHERE kind = $1 AND actor_id = $2 AND target_id = $3
              AND content_ref IS NOT DISTINCT FROM $4
            "#,
        )
        .bind(key.kind.as_str())
        .bind(Uuid::from(key.actor_id))
        .bind(Uuid::from(key.target_id))
        .bind(key.content_ref.as_deref())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_err)?
        .rows_affected();

        if removed > 0 {
            self.publish(StoreEvent::NotificationRetracted { key, removed });
        }
        Ok(removed)
    }

    async fn mark_read(&self, target: UserId, id: NotificationId) -> RepositoryResult<bool> {
        let flipped = sqlx::query(
            "UPDATE notifications SET state = 'read' WHERE id = $1 AND target_id = $2 AND state <> 'read'",
        )
        .bind(Uuid::from(id))
        .bind(Uuid::from(target))
        .execute(self.pool())
        .await
        .map_err(map_sqlx_err)?
        .rows_affected();

        if flipped > 0 {
            self.publish(StoreEvent::NotificationsRead {
                target_id: target,
                count: flipped,
            });
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM notifications WHERE id = $1 AND target_id = $2)",
        )
        .bind(Uuid::from(id))
        .bind(Uuid::from(target))
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_err)?;
        if exists {
            Ok(false)
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    async fn mark_all_read(&self, target: UserId) -> RepositoryResult<u64> {
        let count = sqlx::query(
            "UPDATE notifications SET state = 'read' WHERE target_id = $1 AND state <> 'read'",
        )
        .bind(Uuid::from(target))
        .execute(self.pool())
        .await
        .map_err(map_sqlx_err)?
        .rows_affected();

        if count > 0 {
            self.publish(StoreEvent::NotificationsRead {
                target_id: target,
                count,
            });
        }
        Ok(count)
    }

    async fn list_for_target(
        &self,
        target: UserId,
        limit: u32,
    ) -> RepositoryResult<Vec<NotificationEvent>> {
        let rows = sqlx::query_as::<_, DbNotification>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS} FROM notifications
            WHERE target_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(Uuid::from(target))
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_err)?;
        rows.into_iter().map(NotificationEvent::try_from).collect()
    }

    async fn count_unread(&self, target: UserId) -> RepositoryResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE target_id = $1 AND state <> 'read'",
        )
        .bind(Uuid::from(target))
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_err)?;
        Ok(count.max(0) as u64)
    }
}
