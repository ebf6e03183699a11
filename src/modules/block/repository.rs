use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{api::error, modules::block::schema::BlockEntity};

#[async_trait::async_trait]
pub trait BlockRepository {
    /// Idempotent: an existing edge is returned unchanged.
    async fn upsert(
        &self,
        blocker_id: &Uuid,
        blocked_id: &Uuid,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<BlockEntity, error::SystemError>;

    async fn delete(&self, blocker_id: &Uuid, blocked_id: &Uuid)
        -> Result<bool, error::SystemError>;

    async fn find_by_blocker(
        &self,
        blocker_id: &Uuid,
    ) -> Result<Vec<BlockEntity>, error::SystemError>;

    async fn is_blocked_between(
        &self,
        user_a: &Uuid,
        user_b: &Uuid,
    ) -> Result<bool, error::SystemError>;

    /// The subset of `candidates` that blocked `target`.
    async fn find_blockers_among(
        &self,
        target: &Uuid,
        candidates: &[Uuid],
    ) -> Result<Vec<Uuid>, error::SystemError>;
}
