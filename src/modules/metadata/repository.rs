use uuid::Uuid;

use crate::{
    api::error,
    modules::metadata::{model::MetadataPatch, schema::ConversationMetadata},
};

#[async_trait::async_trait]
pub trait MetadataRepository {
    /// `None` when the user is not an active participant.
    async fn find(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<Option<ConversationMetadata>, error::SystemError>;

    async fn update(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
        patch: &MetadataPatch,
    ) -> Result<Option<ConversationMetadata>, error::SystemError>;
}
