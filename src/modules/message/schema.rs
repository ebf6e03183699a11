use serde::{Deserialize, Serialize};
use sqlx::prelude::{FromRow, Type};
use uuid::Uuid;

use crate::modules::message::model::MessageCursor;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Type, Serialize, Deserialize)]
#[sqlx(type_name = "message_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    System,
}

/// Delivery status as seen by the sender. Variants are declared in
/// advancement order so `Ord` follows sent < delivered < read.
#[derive(
    Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default, Type, Serialize, Deserialize,
)]
#[sqlx(type_name = "message_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    /// Never moves backwards.
    pub fn advance(self, to: MessageStatus) -> MessageStatus {
        self.max(to)
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEntity {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub _type: MessageType,
    pub content: Option<String>,
    pub attachment_url: Option<String>,
    /// Client-generated id of the optimistic copy this row confirms.
    pub client_ref: Option<Uuid>,
    pub status: MessageStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl MessageEntity {
    pub fn cursor(&self) -> MessageCursor {
        MessageCursor { created_at: self.created_at, id: Some(self.id) }
    }

    /// Total order within a conversation: timestamp, then id.
    pub fn order_key(&self) -> (chrono::DateTime<chrono::Utc>, Uuid) {
        (self.created_at, self.id)
    }
}
