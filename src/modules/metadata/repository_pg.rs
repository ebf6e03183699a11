use uuid::Uuid;

use crate::{
    api::error,
    modules::metadata::{
        model::MetadataPatch, repository::MetadataRepository, schema::ConversationMetadata,
    },
};

#[derive(Clone)]
pub struct MetadataPgRepository {
    pool: sqlx::PgPool,
}

impl MetadataPgRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MetadataRepository for MetadataPgRepository {
    async fn find(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<Option<ConversationMetadata>, error::SystemError> {
        let metadata = sqlx::query_as::<_, ConversationMetadata>(
            r#"
            SELECT unread_count, last_read_at, muted, archived, pinned
            FROM participants
            WHERE conversation_id = $1
            AND user_id = $2
            AND left_at IS NULL
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(metadata)
    }

    async fn update(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
        patch: &MetadataPatch,
    ) -> Result<Option<ConversationMetadata>, error::SystemError> {
        let metadata = sqlx::query_as::<_, ConversationMetadata>(
            r#"
            UPDATE participants
            SET pinned = COALESCE($3, pinned),
                muted = COALESCE($4, muted),
                archived = COALESCE($5, archived)
            WHERE conversation_id = $1
            AND user_id = $2
            AND left_at IS NULL
            RETURNING unread_count, last_read_at, muted, archived, pinned
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(patch.pinned)
        .bind(patch.muted)
        .bind(patch.archived)
        .fetch_optional(&self.pool)
        .await?;

        Ok(metadata)
    }
}
