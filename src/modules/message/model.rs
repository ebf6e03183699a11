use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::api::error;
use crate::modules::message::schema::{MessageEntity, MessageStatus, MessageType};

pub const MAX_CONTENT_LENGTH: u64 = 4000;

/// Row handed to the store; `id` and `created_at` are always server-assigned.
#[derive(Debug, Clone)]
pub struct InsertMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub _type: MessageType,
    pub content: Option<String>,
    pub attachment_url: Option<String>,
    pub client_ref: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl InsertMessage {
    pub fn into_entity(self) -> MessageEntity {
        MessageEntity {
            id: self.id,
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            _type: self._type,
            content: self.content,
            attachment_url: self.attachment_url,
            client_ref: self.client_ref,
            status: MessageStatus::Sent,
            created_at: self.created_at,
        }
    }
}

/// Side effects applied in the same transaction as the insert.
#[derive(Debug, Clone, Default)]
pub struct FanOut {
    /// Recipients whose unread counter is bumped (and who get un-archived).
    pub unread_for: Vec<Uuid>,
    /// Participants whose `left_at` is cleared, e.g. the other side of a direct chat.
    pub reactivate: Vec<Uuid>,
}

/// What a user composes: text, or an attachment reference with optional caption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    #[serde(rename = "type", default)]
    pub _type: MessageType,
    #[validate(length(max = MAX_CONTENT_LENGTH))]
    pub content: Option<String>,
    #[validate(url)]
    pub attachment_url: Option<String>,
}

impl NewMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self { _type: MessageType::Text, content: Some(content.into()), attachment_url: None }
    }

    pub fn attachment(_type: MessageType, url: impl Into<String>, caption: Option<String>) -> Self {
        Self { _type, content: caption, attachment_url: Some(url.into()) }
    }

    pub fn check(&self) -> Result<(), error::SystemError> {
        self.validate().map_err(|e| error::SystemError::bad_request(e.to_string()))?;

        match self._type {
            MessageType::Text => {
                let has_text = self.content.as_deref().is_some_and(|c| !c.trim().is_empty());
                if !has_text {
                    return Err(error::SystemError::bad_request("Message content is required"));
                }
                if self.attachment_url.is_some() {
                    return Err(error::SystemError::bad_request(
                        "Text messages cannot carry an attachment",
                    ));
                }
            }
            MessageType::Image | MessageType::File => {
                if self.attachment_url.is_none() {
                    return Err(error::SystemError::bad_request("Attachment URL is required"));
                }
            }
            MessageType::System => {
                return Err(error::SystemError::bad_request("System messages cannot be sent"));
            }
        }

        Ok(())
    }
}

/// Keyset position: everything strictly older than `(created_at, id)`.
/// Without an id the cursor is a bare timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageCursor {
    pub created_at: DateTime<Utc>,
    pub id: Option<Uuid>,
}

impl MessageCursor {
    pub fn is_after(&self, message: &MessageEntity) -> bool {
        match self.id {
            Some(id) => message.order_key() < (self.created_at, id),
            None => message.created_at < self.created_at,
        }
    }
}

impl fmt::Display for MessageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ts = self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true);
        match self.id {
            Some(id) => write!(f, "{ts}|{id}"),
            None => write!(f, "{ts}"),
        }
    }
}

impl FromStr for MessageCursor {
    type Err = error::SystemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ts, id) = match s.split_once('|') {
            Some((ts, id)) => (ts, Some(id)),
            None => (s, None),
        };

        let created_at = DateTime::parse_from_rfc3339(ts)
            .map_err(|_| error::SystemError::bad_request("Invalid cursor format"))?
            .with_timezone(&Utc);

        let id = id
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|_| error::SystemError::bad_request("Invalid cursor format"))?;

        Ok(MessageCursor { created_at, id })
    }
}

#[derive(Debug, Clone)]
pub struct MessageQuery {
    pub conversation_id: Uuid,
    pub before: Option<MessageCursor>,
    /// Senders hidden from this viewer by a block relation.
    pub hidden_senders: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    /// Oldest first.
    pub messages: Vec<MessageEntity>,
    /// Cursor for the next (older) page; present exactly when the page is full.
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

impl MessagePage {
    /// Builds a page from a newest-first fetch of at most `limit` rows.
    pub fn from_newest_first(mut messages: Vec<MessageEntity>, limit: usize) -> Self {
        let has_more = messages.len() == limit;
        messages.reverse();
        let next_cursor =
            if has_more { messages.first().map(|m| m.cursor().to_string()) } else { None };
        MessagePage { messages, next_cursor, has_more }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MessageQueryRequest {
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageBody {
    #[serde(flatten)]
    #[validate(nested)]
    pub message: NewMessage,
    pub client_ref: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_parses_timestamp_and_id() {
        let id = Uuid::now_v7();
        let cursor: MessageCursor = format!("2026-01-02T03:04:05.000006Z|{id}").parse().unwrap();
        assert_eq!(cursor.id, Some(id));
        assert_eq!(cursor.to_string(), format!("2026-01-02T03:04:05.000006Z|{id}"));

        let bare: MessageCursor = "2026-01-02T03:04:05Z".parse().unwrap();
        assert_eq!(bare.id, None);
    }

    #[test]
    fn test_cursor_rejects_garbage() {
        assert!("yesterday".parse::<MessageCursor>().is_err());
        assert!("2026-01-02T03:04:05Z|not-a-uuid".parse::<MessageCursor>().is_err());
    }

    #[test]
    fn test_new_message_rules() {
        assert!(NewMessage::text("hi").check().is_ok());
        assert!(NewMessage::text("   ").check().is_err());
        assert!(NewMessage::attachment(MessageType::Image, "https://cdn.example/a.png", None)
            .check()
            .is_ok());
        assert!(NewMessage { _type: MessageType::File, content: None, attachment_url: None }
            .check()
            .is_err());
        assert!(NewMessage { _type: MessageType::System, ..NewMessage::text("x") }.check().is_err());
        assert!(NewMessage::text("a".repeat(MAX_CONTENT_LENGTH as usize + 1)).check().is_err());
    }

    #[test]
    fn test_send_body_flattens_message() {
        let json = r#"{"type":"text","content":"hello","clientRef":"0190f5d2-3a4b-7c8d-9e0f-112233445566"}"#;
        let body: SendMessageBody = serde_json::from_str(json).unwrap();
        assert_eq!(body.message, NewMessage::text("hello"));
        assert!(body.client_ref.is_some());
    }
}
