use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ephemeral; keyed by (conversation, user) and replaced by the latest start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl TypingIndicator {
    pub fn is_live(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.started_at < ttl
    }

    pub fn expires_at(&self, ttl: chrono::Duration) -> DateTime<Utc> {
        self.started_at + ttl
    }
}
