use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    api::error,
    modules::conversation::{
        model::NewGroupConversation,
        schema::{ConversationEntity, ParticipantEntity},
    },
};

#[async_trait::async_trait]
pub trait ConversationRepository {
    async fn find_by_id(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Option<ConversationEntity>, error::SystemError>;

    /// Returns the direct conversation for the unordered pair, creating it and
    /// both participant rows atomically when missing. Concurrent callers for
    /// the same pair all observe the single winning row. The `bool` is true
    /// only for the caller that created it.
    async fn find_or_create_direct(
        &self,
        user_a: &Uuid,
        user_b: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<(ConversationEntity, bool), error::SystemError>;

    async fn create_group(
        &self,
        group: &NewGroupConversation,
        now: DateTime<Utc>,
    ) -> Result<ConversationEntity, error::SystemError>;

    /// Conversations where the user is an active participant, most recently
    /// updated first.
    async fn find_by_user(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<ConversationEntity>, error::SystemError>;

    /// All participant rows (including ones that left) of the given conversations.
    async fn find_participants(
        &self,
        conversation_ids: &[Uuid],
    ) -> Result<Vec<ParticipantEntity>, error::SystemError>;

    async fn find_participant(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<Option<ParticipantEntity>, error::SystemError>;

    /// Inserts the participant or clears `left_at` on an existing row.
    async fn upsert_participant(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<ParticipantEntity, error::SystemError>;

    /// Soft leave: stamps `left_at`, keeps the row and the history.
    async fn leave(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, error::SystemError>;
}
