use uuid::Uuid;

use crate::{api::error, modules::presence::schema::PresenceRecord};

#[async_trait::async_trait]
pub trait PresenceRepository {
    async fn upsert(&self, record: &PresenceRecord) -> Result<(), error::SystemError>;

    async fn find(&self, user_id: &Uuid) -> Result<Option<PresenceRecord>, error::SystemError>;

    /// One entry per requested user, in order; `None` for users never seen.
    async fn find_many(
        &self,
        user_ids: &[Uuid],
    ) -> Result<Vec<Option<PresenceRecord>>, error::SystemError>;
}
