use serde::{Deserialize, Serialize};
use sqlx::prelude::{FromRow, Type};
use uuid::Uuid;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Type, Serialize, Deserialize)]
#[sqlx(type_name = "conversation_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConversationType {
    Direct,
    Group,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntity {
    pub id: Uuid,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub _type: ConversationType,
    pub name: Option<String>,
    pub description: Option<String>,
    pub created_by: Uuid,
    /// Canonical unordered user pair, set only for direct conversations.
    #[serde(skip)]
    pub direct_key: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ParticipantEntity {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: chrono::DateTime<chrono::Utc>,
    pub last_read_at: Option<chrono::DateTime<chrono::Utc>>,
    pub left_at: Option<chrono::DateTime<chrono::Utc>>,
    pub unread_count: i32,
    pub muted: bool,
    pub archived: bool,
    pub pinned: bool,
}

impl ParticipantEntity {
    pub fn new(conversation_id: Uuid, user_id: Uuid, joined_at: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            conversation_id,
            user_id,
            joined_at,
            last_read_at: None,
            left_at: None,
            unread_count: 0,
            muted: false,
            archived: false,
            pinned: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }
}
