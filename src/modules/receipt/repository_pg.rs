use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    api::error,
    modules::{
        message::schema::{MessageEntity, MessageStatus},
        receipt::{repository::ReceiptRepository, schema::ReceiptEntity},
    },
};

#[derive(Clone)]
pub struct ReceiptPgRepository {
    pool: sqlx::PgPool,
}

impl ReceiptPgRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ReceiptRepository for ReceiptPgRepository {
    async fn record_delivered(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
        message_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        let messages = sqlx::query_as::<_, MessageEntity>(
            r#"
            WITH marked AS (
                INSERT INTO message_receipts (message_id, user_id, delivered_at)
                SELECT m.id, $2, $4
                FROM messages m
                WHERE m.conversation_id = $1
                AND m.id = ANY($3)
                AND m.sender_id <> $2
                ON CONFLICT (message_id, user_id) DO UPDATE
                SET delivered_at = EXCLUDED.delivered_at
                WHERE message_receipts.delivered_at IS NULL
                AND message_receipts.read_at IS NULL
                RETURNING message_id
            )
            SELECT m.*
            FROM messages m
            JOIN marked ON marked.message_id = m.id
            ORDER BY m.created_at, m.id
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(message_ids)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    async fn record_read(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
        message_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        let messages = sqlx::query_as::<_, MessageEntity>(
            r#"
            WITH marked AS (
                INSERT INTO message_receipts (message_id, user_id, delivered_at, read_at)
                SELECT m.id, $2, $4, $4
                FROM messages m
                WHERE m.conversation_id = $1
                AND m.id = ANY($3)
                AND m.sender_id <> $2
                ON CONFLICT (message_id, user_id) DO UPDATE
                SET read_at = EXCLUDED.read_at,
                    delivered_at = COALESCE(message_receipts.delivered_at, EXCLUDED.delivered_at)
                WHERE message_receipts.read_at IS NULL
                RETURNING message_id
            )
            SELECT m.*
            FROM messages m
            JOIN marked ON marked.message_id = m.id
            ORDER BY m.created_at, m.id
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(message_ids)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    async fn reset_unread(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), error::SystemError> {
        sqlx::query(
            r#"
            UPDATE participants
            SET unread_count = 0,
                last_read_at = GREATEST(COALESCE(last_read_at, $3), $3)
            WHERE conversation_id = $1
            AND user_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_messages(
        &self,
        message_ids: &[Uuid],
    ) -> Result<Vec<ReceiptEntity>, error::SystemError> {
        let receipts = sqlx::query_as::<_, ReceiptEntity>(
            "SELECT * FROM message_receipts WHERE message_id = ANY($1)",
        )
        .bind(message_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(receipts)
    }

    async fn raise_status(
        &self,
        message_id: &Uuid,
        status: MessageStatus,
    ) -> Result<bool, error::SystemError> {
        let result = sqlx::query("UPDATE messages SET status = $2 WHERE id = $1 AND status < $2")
            .bind(message_id)
            .bind(status)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
