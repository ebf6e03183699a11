use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::modules::conversation::model::{direct_key, NewGroupConversation};
use crate::modules::conversation::repository::ConversationRepository;
use crate::modules::conversation::schema::{ConversationType, ParticipantEntity};
use crate::{api::error, modules::conversation::schema::ConversationEntity};

#[derive(Clone)]
pub struct ConversationPgRepository {
    pool: sqlx::PgPool,
}

impl ConversationPgRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

async fn insert_participant<'e, E>(
    conversation_id: &Uuid,
    user_id: &Uuid,
    now: DateTime<Utc>,
    tx: E,
) -> Result<ParticipantEntity, error::SystemError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let entity = sqlx::query_as::<_, ParticipantEntity>(
        r#"
        INSERT INTO participants (conversation_id, user_id, joined_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (conversation_id, user_id) DO UPDATE
        SET left_at = NULL
        RETURNING *
        "#,
    )
    .bind(conversation_id)
    .bind(user_id)
    .bind(now)
    .fetch_one(tx)
    .await?;

    Ok(entity)
}

#[async_trait::async_trait]
impl ConversationRepository for ConversationPgRepository {
    async fn find_by_id(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Option<ConversationEntity>, error::SystemError> {
        let conversation =
            sqlx::query_as::<_, ConversationEntity>("SELECT * FROM conversations WHERE id = $1")
                .bind(conversation_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(conversation)
    }

    async fn find_or_create_direct(
        &self,
        user_a: &Uuid,
        user_b: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<(ConversationEntity, bool), error::SystemError> {
        let key = direct_key(user_a, user_b);
        let mut tx = self.pool.begin().await?;

        // The unique index on direct_key serializes racing creators: losers
        // wait for the winner's commit and then fall through to the SELECT.
        let created = sqlx::query_as::<_, ConversationEntity>(
            r#"
            INSERT INTO conversations (id, type, created_by, direct_key, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (direct_key) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(ConversationType::Direct)
        .bind(user_a)
        .bind(&key)
        .bind(now)
        .fetch_optional(tx.as_mut())
        .await?;

        let result = match created {
            Some(conversation) => {
                insert_participant(&conversation.id, user_a, now, tx.as_mut()).await?;
                insert_participant(&conversation.id, user_b, now, tx.as_mut()).await?;
                (conversation, true)
            }
            None => {
                let conversation = sqlx::query_as::<_, ConversationEntity>(
                    "SELECT * FROM conversations WHERE direct_key = $1",
                )
                .bind(&key)
                .fetch_one(tx.as_mut())
                .await?;

                // the caller may have left earlier; looking the pair up again rejoins
                sqlx::query(
                    r#"
                    UPDATE participants
                    SET left_at = NULL
                    WHERE conversation_id = $1
                    AND user_id = $2
                    AND left_at IS NOT NULL
                    "#,
                )
                .bind(conversation.id)
                .bind(user_a)
                .execute(tx.as_mut())
                .await?;

                (conversation, false)
            }
        };

        tx.commit().await?;
        Ok(result)
    }

    async fn create_group(
        &self,
        group: &NewGroupConversation,
        now: DateTime<Utc>,
    ) -> Result<ConversationEntity, error::SystemError> {
        let mut tx = self.pool.begin().await?;

        let conversation = sqlx::query_as::<_, ConversationEntity>(
            r#"
            INSERT INTO conversations (id, type, name, description, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(ConversationType::Group)
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.created_by)
        .bind(now)
        .fetch_one(tx.as_mut())
        .await?;

        sqlx::query(
            r#"
            INSERT INTO participants (conversation_id, user_id, joined_at)
            SELECT $1, unnest($2::uuid[]), $3
            "#,
        )
        .bind(conversation.id)
        .bind(&group.member_ids)
        .bind(now)
        .execute(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(conversation)
    }

    async fn find_by_user(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<ConversationEntity>, error::SystemError> {
        let rows = sqlx::query_as::<_, ConversationEntity>(
            r#"
            SELECT c.*
            FROM conversations c
            JOIN participants p
                ON p.conversation_id = c.id
            AND p.user_id = $1
            AND p.left_at IS NULL
            ORDER BY c.updated_at DESC, c.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn find_participants(
        &self,
        conversation_ids: &[Uuid],
    ) -> Result<Vec<ParticipantEntity>, error::SystemError> {
        let participants = sqlx::query_as::<_, ParticipantEntity>(
            "SELECT * FROM participants WHERE conversation_id = ANY($1) ORDER BY joined_at",
        )
        .bind(conversation_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(participants)
    }

    async fn find_participant(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<Option<ParticipantEntity>, error::SystemError> {
        let participant = sqlx::query_as::<_, ParticipantEntity>(
            "SELECT * FROM participants WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(participant)
    }

    async fn upsert_participant(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<ParticipantEntity, error::SystemError> {
        insert_participant(conversation_id, user_id, now, &self.pool).await
    }

    async fn leave(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, error::SystemError> {
        let result = sqlx::query(
            r#"
            UPDATE participants
            SET left_at = $3
            WHERE conversation_id = $1
            AND user_id = $2
            AND left_at IS NULL
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
