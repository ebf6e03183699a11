use uuid::Uuid;

use crate::{api::error, modules::typing::schema::TypingIndicator};

#[async_trait::async_trait]
pub trait TypingRepository {
    async fn upsert(&self, indicator: &TypingIndicator) -> Result<(), error::SystemError>;

    async fn remove(&self, conversation_id: &Uuid, user_id: &Uuid)
        -> Result<(), error::SystemError>;

    /// Raw rows, possibly expired; readers apply the TTL.
    async fn find_by_conversation(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Vec<TypingIndicator>, error::SystemError>;
}
