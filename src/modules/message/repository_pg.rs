use uuid::Uuid;

use crate::{
    api::error,
    modules::message::{
        model::{FanOut, InsertMessage, MessageQuery},
        repository::MessageRepository,
        schema::MessageEntity,
    },
};

#[derive(Clone)]
pub struct MessageRepositoryPg {
    pool: sqlx::PgPool,
}

impl MessageRepositoryPg {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MessageRepository for MessageRepositoryPg {
    async fn append(
        &self,
        message: &InsertMessage,
        fan_out: &FanOut,
    ) -> Result<MessageEntity, error::SystemError> {
        let mut tx = self.pool.begin().await?;

        let entity = sqlx::query_as::<_, MessageEntity>(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, type, content, attachment_url, client_ref, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(message._type)
        .bind(&message.content)
        .bind(&message.attachment_url)
        .bind(message.client_ref)
        .bind(message.created_at)
        .fetch_one(tx.as_mut())
        .await?;

        sqlx::query("UPDATE conversations SET updated_at = GREATEST(updated_at, $2) WHERE id = $1")
            .bind(message.conversation_id)
            .bind(message.created_at)
            .execute(tx.as_mut())
            .await?;

        if !fan_out.reactivate.is_empty() {
            sqlx::query(
                r#"
                UPDATE participants
                SET left_at = NULL
                WHERE conversation_id = $1
                AND user_id = ANY($2)
                "#,
            )
            .bind(message.conversation_id)
            .bind(&fan_out.reactivate)
            .execute(tx.as_mut())
            .await?;
        }

        if !fan_out.unread_for.is_empty() {
            // row locks taken here serialize against a concurrent mark_read
            sqlx::query(
                r#"
                UPDATE participants
                SET unread_count = unread_count + 1,
                    archived = FALSE
                WHERE conversation_id = $1
                AND user_id = ANY($2)
                AND left_at IS NULL
                AND (last_read_at IS NULL OR last_read_at < $3)
                "#,
            )
            .bind(message.conversation_id)
            .bind(&fan_out.unread_for)
            .bind(message.created_at)
            .execute(tx.as_mut())
            .await?;
        }

        tx.commit().await?;
        Ok(entity)
    }

    async fn find_by_id(
        &self,
        message_id: &Uuid,
    ) -> Result<Option<MessageEntity>, error::SystemError> {
        let message = sqlx::query_as::<_, MessageEntity>("SELECT * FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(message)
    }

    async fn find_by_query(
        &self,
        query: &MessageQuery,
        limit: usize,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        // served by messages_keyset_idx (conversation_id, created_at DESC, id DESC)
        let messages = match query.before {
            Some(cursor) => match cursor.id {
                Some(id) => {
                    sqlx::query_as::<_, MessageEntity>(
                        r#"
                        SELECT * FROM messages
                        WHERE conversation_id = $1
                        AND (created_at, id) < ($2, $3)
                        AND sender_id <> ALL($4)
                        ORDER BY created_at DESC, id DESC
                        LIMIT $5
                        "#,
                    )
                    .bind(query.conversation_id)
                    .bind(cursor.created_at)
                    .bind(id)
                    .bind(&query.hidden_senders)
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_as::<_, MessageEntity>(
                        r#"
                        SELECT * FROM messages
                        WHERE conversation_id = $1
                        AND created_at < $2
                        AND sender_id <> ALL($3)
                        ORDER BY created_at DESC, id DESC
                        LIMIT $4
                        "#,
                    )
                    .bind(query.conversation_id)
                    .bind(cursor.created_at)
                    .bind(&query.hidden_senders)
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
                }
            },
            None => {
                sqlx::query_as::<_, MessageEntity>(
                    r#"
                    SELECT * FROM messages
                    WHERE conversation_id = $1
                    AND sender_id <> ALL($2)
                    ORDER BY created_at DESC, id DESC
                    LIMIT $3
                    "#,
                )
                .bind(query.conversation_id)
                .bind(&query.hidden_senders)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(messages)
    }

    async fn find_last_messages(
        &self,
        conversation_ids: &[Uuid],
        hidden_senders: &[Uuid],
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        let messages = sqlx::query_as::<_, MessageEntity>(
            r#"
            SELECT lm.*
            FROM unnest($1::uuid[]) AS c(id)
            JOIN LATERAL (
                SELECT *
                FROM messages m
                WHERE m.conversation_id = c.id
                AND m.sender_id <> ALL($2)
                ORDER BY m.created_at DESC, m.id DESC
                LIMIT 1
            ) lm ON TRUE
            "#,
        )
        .bind(conversation_ids)
        .bind(hidden_senders)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }
}
