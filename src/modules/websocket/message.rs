/// WebSocket message protocol.
///
/// Frames are JSON objects tagged by `type`. Stream events from the delivery
/// engine travel inside `{"type":"stream", "event": ...}`.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::modules::{
    block::schema::BlockEntity,
    delivery::engine::StreamEvent,
    message::model::NewMessage,
    metadata::{model::MetadataPatch, schema::ConversationMetadata},
    presence::schema::{PresenceRecord, PresenceStatus},
    receipt::model::StatusChange,
};

/// Client to server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Auth { token: String },

    #[serde(rename_all = "camelCase")]
    Open { conversation_id: Uuid },

    #[serde(rename_all = "camelCase")]
    Close { conversation_id: Uuid },

    #[serde(rename_all = "camelCase")]
    Send { conversation_id: Uuid, message: NewMessage },

    /// `cursor` is the `nextCursor` of an earlier page; omitted means "before
    /// the oldest message already loaded".
    #[serde(rename_all = "camelCase")]
    LoadOlder { conversation_id: Uuid, cursor: Option<String> },

    #[serde(rename_all = "camelCase")]
    SetTyping { conversation_id: Uuid, is_typing: bool },

    #[serde(rename_all = "camelCase")]
    MarkRead { conversation_id: Uuid, message_ids: Vec<Uuid> },

    #[serde(rename_all = "camelCase")]
    SetMetadata { conversation_id: Uuid, patch: MetadataPatch },

    #[serde(rename_all = "camelCase")]
    Block { user_id: Uuid, reason: Option<String> },

    #[serde(rename_all = "camelCase")]
    Unblock { user_id: Uuid },

    Heartbeat { status: PresenceStatus },

    Ping,
}

/// Server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    AuthSuccess { user_id: Uuid },

    AuthFailed { reason: String },

    #[serde(rename_all = "camelCase")]
    Opened { conversation_id: Uuid },

    #[serde(rename_all = "camelCase")]
    Closed { conversation_id: Uuid },

    Stream(StreamEvent),

    #[serde(rename_all = "camelCase")]
    ReadMarked { conversation_id: Uuid, changes: Vec<StatusChange> },

    #[serde(rename_all = "camelCase")]
    MetadataUpdated { conversation_id: Uuid, metadata: ConversationMetadata },

    Blocked { block: BlockEntity },

    #[serde(rename_all = "camelCase")]
    Unblocked { user_id: Uuid, removed: bool },

    Presence { presence: PresenceRecord },

    Pong,

    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::message::schema::MessageType;

    #[test]
    fn test_client_send_keeps_message_type_nested() {
        let id = Uuid::now_v7();
        let json = format!(
            r#"{{"type":"send","conversationId":"{id}","message":{{"type":"image","attachmentUrl":"https://cdn.example/a.png"}}}}"#
        );
        let msg: ClientMessage = serde_json::from_str(&json).unwrap();
        match msg {
            ClientMessage::Send { conversation_id, message } => {
                assert_eq!(conversation_id, id);
                assert_eq!(message._type, MessageType::Image);
                assert_eq!(message.attachment_url.as_deref(), Some("https://cdn.example/a.png"));
            }
            other => panic!("expected send, got {other:?}"),
        }
    }

    #[test]
    fn test_client_load_older_cursor_is_optional() {
        let id = Uuid::now_v7();
        let json = format!(r#"{{"type":"loadOlder","conversationId":"{id}"}}"#);
        let msg: ClientMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(msg, ClientMessage::LoadOlder { cursor: None, .. }));
    }

    #[test]
    fn test_client_set_metadata_partial_patch() {
        let id = Uuid::now_v7();
        let json = format!(r#"{{"type":"setMetadata","conversationId":"{id}","patch":{{"muted":true}}}}"#);
        let msg: ClientMessage = serde_json::from_str(&json).unwrap();
        match msg {
            ClientMessage::SetMetadata { patch, .. } => {
                assert_eq!(patch.muted, Some(true));
                assert_eq!(patch.pinned, None);
            }
            other => panic!("expected setMetadata, got {other:?}"),
        }
    }

    #[test]
    fn test_client_heartbeat_and_ping() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"heartbeat","status":"away"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Heartbeat { status: PresenceStatus::Away }));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_client_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"editMessage"}"#).is_err());
    }

    #[test]
    fn test_server_stream_event_is_wrapped() {
        let conversation_id = Uuid::now_v7();
        let msg = ServerMessage::Stream(StreamEvent::PushLost { conversation_id });
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["type"], "stream");
        assert_eq!(value["event"], "pushLost");
        assert_eq!(value["conversationId"], conversation_id.to_string());
    }

    #[test]
    fn test_server_error_and_pong_shape() {
        let value = serde_json::to_value(ServerMessage::Error { message: "nope".into() }).unwrap();
        assert_eq!(value, serde_json::json!({"type": "error", "message": "nope"}));

        let value = serde_json::to_value(ServerMessage::Pong).unwrap();
        assert_eq!(value, serde_json::json!({"type": "pong"}));
    }
}
