use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::prelude::FromRow;

use crate::modules::conversation::schema::ParticipantEntity;

/// Per-viewer state of a conversation. Lives on the viewer's participant row,
/// so it is created with the membership and never shared with other members.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMetadata {
    pub unread_count: i32,
    pub last_read_at: Option<DateTime<Utc>>,
    pub muted: bool,
    pub archived: bool,
    pub pinned: bool,
}

impl From<&ParticipantEntity> for ConversationMetadata {
    fn from(p: &ParticipantEntity) -> Self {
        ConversationMetadata {
            unread_count: p.unread_count,
            last_read_at: p.last_read_at,
            muted: p.muted,
            archived: p.archived,
            pinned: p.pinned,
        }
    }
}
