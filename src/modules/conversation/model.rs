use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::modules::{
    conversation::schema::{ConversationEntity, ConversationType, ParticipantEntity},
    message::schema::MessageEntity,
    metadata::schema::ConversationMetadata,
};

/// Key shared by both orderings of a user pair; backs the direct-conversation
/// uniqueness constraint.
pub fn direct_key(user_a: &Uuid, user_b: &Uuid) -> String {
    let (low, high) = if user_a <= user_b { (user_a, user_b) } else { (user_b, user_a) };
    format!("{low}:{high}")
}

#[derive(Debug, Clone)]
pub struct NewGroupConversation {
    pub name: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    /// Deduplicated and including the creator.
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRow {
    pub user_id: Uuid,
    pub joined_at: chrono::DateTime<chrono::Utc>,
    pub last_read_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&ParticipantEntity> for ParticipantRow {
    fn from(p: &ParticipantEntity) -> Self {
        ParticipantRow { user_id: p.user_id, joined_at: p.joined_at, last_read_at: p.last_read_at }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    pub conversation_id: Uuid,
    #[serde(rename = "type")]
    pub _type: ConversationType,
    pub name: Option<String>,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub participants: Vec<ParticipantRow>,
    pub last_message: Option<MessageEntity>,
    pub metadata: ConversationMetadata,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ConversationDetail {
    pub fn assemble(
        conversation: ConversationEntity,
        participants: &[ParticipantEntity],
        last_message: Option<MessageEntity>,
        viewer: &ParticipantEntity,
    ) -> Self {
        ConversationDetail {
            conversation_id: conversation.id,
            _type: conversation._type,
            name: conversation.name,
            description: conversation.description,
            created_by: conversation.created_by,
            participants: participants
                .iter()
                .filter(|p| p.is_active())
                .map(ParticipantRow::from)
                .collect(),
            last_message,
            metadata: ConversationMetadata::from(viewer),
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewDirectConversation {
    pub recipient_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewGroupConversationBody {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(length(min = 1))]
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddParticipantBody {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConversationListQuery {
    #[serde(default)]
    pub include_archived: bool,
}
