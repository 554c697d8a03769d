//! 会话Repository实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Conversation, ConversationId, ConversationRepository, MessageSummary, PairKey,
    RepositoryError, RepositoryResult, UserId,
};
use sqlx::{types::Json, FromRow};
use uuid::Uuid;

use crate::db::{invalid_data, map_sqlx_err, PgStore};

#[derive(Debug, FromRow)]
struct DbConversation {
    id: Uuid,
    low_user: Uuid,
    high_user: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_message: Option<Json<MessageSummary>>,
    last_seq: i64,
}

impl TryFrom<DbConversation> for Conversation {
    type Error = RepositoryError;

    fn try_from(value: DbConversation) -> Result<Self, Self::Error> {
        let pair = PairKey::new(UserId::from(value.low_user), UserId::from(value.high_user))
            .map_err(|err| invalid_data(err.to_string()))?;
        Ok(Conversation {
            id: ConversationId::from(value.id),
            pair,
            created_at: value.created_at,
            updated_at: value.updated_at,
            last_message: value.last_message.map(|summary| summary.0),
            last_seq: value.last_seq,
        })
    }
}

const CONVERSATION_COLUMNS: &str =
    "id, low_user, high_user, created_at, updated_at, last_message, last_seq";

#[async_trait]
impl ConversationRepository for PgStore {
    async fn create_if_absent(
        &self,
        conversation: Conversation,
    ) -> RepositoryResult<(Conversation, bool)> {
        let inserted = sqlx::query_as::<_, DbConversation>(&format!(
            r#"
            INSERT INTO conversations (id, low_user, high_user, created_at, updated_at, last_seq)
            VALUES ($1, $2, $3, $4, $5, 0)
            ON CONFLICT (id) DO NOTHING
            RETURNING {CONVERSATION_COLUMNS}
            "#
        ))
        .bind(Uuid::from(conversation.id))
        .bind(Uuid::from(conversation.pair.low()))
        .bind(Uuid::from(conversation.pair.high()))
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_err)?;

        if let Some(row) = inserted {
            return Ok((Conversation::try_from(row)?, true));
        }

        let existing = ConversationRepository::find(self, conversation.id)
            .await?
            .ok_or_else(|| RepositoryError::conflict("conversation"))?;
        Ok((existing, false))
    }

    async fn find(&self, id: ConversationId) -> RepositoryResult<Option<Conversation>> {
        let row = sqlx::query_as::<_, DbConversation>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_err)?;
        row.map(Conversation::try_from).transpose()
    }

    async fn list_for_user(&self, user: UserId, limit: u32) -> RepositoryResult<Vec<Conversation>> {
        let rows = sqlx::query_as::<_, DbConversation>(&format!(
            r#"
            SELECT {CONVERSATION_COLUMNS} FROM conversations
            WHERE low_user = $1 OR high_user = $1
            ORDER BY updated_at DESC
            LIMIT $2
            "#
        ))
        .bind(Uuid::from(user))
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_err)?;
        rows.into_iter().map(Conversation::try_from).collect()
    }
}
