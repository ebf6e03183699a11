use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    api::error,
    modules::block::{repository::BlockRepository, schema::BlockEntity},
};

#[derive(Clone)]
pub struct BlockPgRepository {
    pool: sqlx::PgPool,
}

impl BlockPgRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BlockRepository for BlockPgRepository {
    async fn upsert(
        &self,
        blocker_id: &Uuid,
        blocked_id: &Uuid,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<BlockEntity, error::SystemError> {
        // DO UPDATE with a no-op so RETURNING yields the existing row too
        let block = sqlx::query_as::<_, BlockEntity>(
            r#"
            INSERT INTO blocks (blocker_id, blocked_id, reason, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (blocker_id, blocked_id) DO UPDATE
            SET blocker_id = EXCLUDED.blocker_id
            RETURNING *
            "#,
        )
        .bind(blocker_id)
        .bind(blocked_id)
        .bind(reason)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(block)
    }

    async fn delete(
        &self,
        blocker_id: &Uuid,
        blocked_id: &Uuid,
    ) -> Result<bool, error::SystemError> {
        let result = sqlx::query("DELETE FROM blocks WHERE blocker_id = $1 AND blocked_id = $2")
            .bind(blocker_id)
            .bind(blocked_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_blocker(
        &self,
        blocker_id: &Uuid,
    ) -> Result<Vec<BlockEntity>, error::SystemError> {
        let blocks = sqlx::query_as::<_, BlockEntity>(
            "SELECT * FROM blocks WHERE blocker_id = $1 ORDER BY created_at DESC",
        )
        .bind(blocker_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(blocks)
    }

    async fn is_blocked_between(
        &self,
        user_a: &Uuid,
        user_b: &Uuid,
    ) -> Result<bool, error::SystemError> {
        let blocked = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM blocks
                WHERE (blocker_id = $1 AND blocked_id = $2)
                OR (blocker_id = $2 AND blocked_id = $1)
            )
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_one(&self.pool)
        .await?;

        Ok(blocked)
    }

    async fn find_blockers_among(
        &self,
        target: &Uuid,
        candidates: &[Uuid],
    ) -> Result<Vec<Uuid>, error::SystemError> {
        if candidates.is_empty() {
            return Ok(vec![]);
        }

        let blockers = sqlx::query_scalar::<_, Uuid>(
            "SELECT blocker_id FROM blocks WHERE blocked_id = $1 AND blocker_id = ANY($2)",
        )
        .bind(target)
        .bind(candidates)
        .fetch_all(&self.pool)
        .await?;

        Ok(blockers)
    }
}
