use std::sync::Arc;
use uuid::Uuid;

use crate::{
    api::error,
    modules::metadata::{
        model::MetadataPatch, repository::MetadataRepository, schema::ConversationMetadata,
    },
};

#[derive(Clone)]
pub struct MetadataService<D>
where
    D: MetadataRepository + Send + Sync + 'static,
{
    metadata_repo: Arc<D>,
}

impl<D> MetadataService<D>
where
    D: MetadataRepository + Send + Sync + 'static,
{
    pub fn with_dependencies(metadata_repo: Arc<D>) -> Self {
        MetadataService { metadata_repo }
    }

    pub async fn get(
        &self,
        conversation_id: Uuid,
        viewer_id: Uuid,
    ) -> Result<ConversationMetadata, error::SystemError> {
        self.metadata_repo
            .find(&conversation_id, &viewer_id)
            .await?
            .ok_or_else(|| error::SystemError::not_a_participant(conversation_id, viewer_id))
    }

    /// Archiving only hides the conversation from default listings; the
    /// membership and history stay untouched.
    pub async fn set(
        &self,
        conversation_id: Uuid,
        viewer_id: Uuid,
        patch: MetadataPatch,
    ) -> Result<ConversationMetadata, error::SystemError> {
        if patch.is_empty() {
            return self.get(conversation_id, viewer_id).await;
        }

        let metadata = self
            .metadata_repo
            .update(&conversation_id, &viewer_id, &patch)
            .await?
            .ok_or_else(|| error::SystemError::not_a_participant(conversation_id, viewer_id))?;

        tracing::debug!(%conversation_id, user_id = %viewer_id, ?patch, "conversation metadata updated");
        Ok(metadata)
    }
}
