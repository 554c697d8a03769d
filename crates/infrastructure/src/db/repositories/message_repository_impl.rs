//! 消息Repository实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    ConversationId, Message, MessageBody, MessageId, MessageRepository, MessageSummary,
    RepositoryError, RepositoryResult, StoreEvent, UserId,
};
use sqlx::{types::Json, FromRow};
use uuid::Uuid;

use crate::db::{map_sqlx_err, PgStore};

#[derive(Debug, FromRow)]
struct DbMessage {
    id: Uuid,
    conversation_id: Uuid,
    seq: i64,
    sender_id: Uuid,
    receiver_id: Uuid,
    body: Json<MessageBody>,
    created_at: DateTime<Utc>,
    read: bool,
}

impl From<DbMessage> for Message {
    fn from(value: DbMessage) -> Self {
        Message {
            id: MessageId::from(value.id),
            conversation_id: ConversationId::from(value.conversation_id),
            seq: value.seq,
            sender_id: UserId::from(value.sender_id),
            receiver_id: UserId::from(value.receiver_id),
            body: value.body.0,
            created_at: value.created_at,
            read: value.read,
        }
    }
}

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, seq, sender_id, receiver_id, body, created_at, read";

#[async_trait]
impl MessageRepository for PgStore {
    async fn append(&self, mut message: Message) -> RepositoryResult<Message> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_err)?;

        // 重试的追加带着同一个 id，直接返回已存储的消息
        let existing = sqlx::query_as::<_, DbMessage>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(Uuid::from(message.id))
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;
        if let Some(row) = existing {
            tx.rollback().await.map_err(map_sqlx_err)?;
            return Ok(row.into());
        }

        // 行锁串行化同一会话的追加
        let seq: Option<i64> = sqlx::query_scalar(
            "UPDATE conversations SET last_seq = last_seq + 1 WHERE id = $1 RETURNING last_seq",
        )
        .bind(Uuid::from(message.conversation_id))
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;
        message.seq = seq.ok_or(RepositoryError::NotFound)?;

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, seq, sender_id, receiver_id, body, created_at, read)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.conversation_id))
        .bind(message.seq)
        .bind(Uuid::from(message.sender_id))
        .bind(Uuid::from(message.receiver_id))
        .bind(Json(&message.body))
        .bind(message.created_at)
        .bind(message.read)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        // 并发发送时消息时间可能晚于提交顺序，updated_at 只前进
        sqlx::query(
            "UPDATE conversations \
             SET last_message = $2, updated_at = GREATEST(updated_at, $3) \
             WHERE id = $1",
        )
        .bind(Uuid::from(message.conversation_id))
        .bind(Json(MessageSummary::from(&message)))
        .bind(message.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;

        self.publish(StoreEvent::MessageAppended {
            message: message.clone(),
        });
        Ok(message)
    }

    async fn list(
        &self,
        conversation_id: ConversationId,
        before_seq: Option<i64>,
        limit: u32,
    ) -> RepositoryResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, DbMessage>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE conversation_id = $1 AND ($2::BIGINT IS NULL OR seq < $2)
            ORDER BY seq DESC
            LIMIT $3
            "#
        ))
        .bind(Uuid::from(conversation_id))
        .bind(before_seq)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_err)?;

        Ok(rows.into_iter().rev().map(Message::from).collect())
    }

    async fn mark_read(
        &self,
        conversation_id: ConversationId,
        reader: UserId,
    ) -> RepositoryResult<u64> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_err)?;

        let flipped = sqlx::query(
            "UPDATE messages SET read = TRUE WHERE conversation_id = $1 AND receiver_id = $2 AND NOT read",
        )
        .bind(Uuid::from(conversation_id))
        .bind(Uuid::from(reader))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?
        .rows_affected();

        if flipped > 0 {
            sqlx::query(
                r#"
                UPDATE conversations
                SET last_message = jsonb_set(last_message, '{read}', 'true'::jsonb)
                WHERE id = $1 AND last_message ->> 'receiver_id' = $2
                "#,
            )
            .bind(Uuid::from(conversation_id))
            .bind(reader.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        }

        tx.commit().await.map_err(map_sqlx_err)?;

        if flipped > 0 {
            self.publish(StoreEvent::MessagesRead {
                conversation_id,
                reader_id: reader,
                flipped,
            });
        }
        Ok(flipped)
    }

    async fn count_unread(
        &self,
        receiver: UserId,
        conversation_id: Option<ConversationId>,
    ) -> RepositoryResult<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE receiver_id = $1 AND NOT read
              AND ($2::UUID IS NULL OR conversation_id = $2)
            "#,
        )
        .bind(Uuid::from(receiver))
        .bind(conversation_id.map(Uuid::from))
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_err)?;
        Ok(count.max(0) as u64)
    }
}
