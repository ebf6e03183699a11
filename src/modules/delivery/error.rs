use uuid::Uuid;

use crate::{api::error::SystemError, modules::delivery::transport::TransportError};

#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    /// Push is down; subscriptions keep working by polling.
    #[error(transparent)]
    TransportUnavailable(#[from] TransportError),
    /// Background append after an optimistic insert; the pending copy is rolled back.
    #[error("Sending message {temp_id} failed: {source}")]
    SendFailed {
        temp_id: Uuid,
        #[source]
        source: SystemError,
    },
    #[error("No open subscription for conversation {0}")]
    UnknownSubscription(Uuid),
    #[error(transparent)]
    Core(#[from] SystemError),
}

impl DeliveryError {
    /// Whether asking the user to try again can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::SendFailed { source, .. } | DeliveryError::Core(source) => !matches!(
                source,
                SystemError::Blocked { .. }
                    | SystemError::NotAParticipant { .. }
                    | SystemError::BadRequest(_)
                    | SystemError::Forbidden(_)
                    | SystemError::NotFound(_)
            ),
            DeliveryError::TransportUnavailable(_) => true,
            DeliveryError::UnknownSubscription(_) => false,
        }
    }

    /// Text safe to show to the client; internal details stay in the logs.
    pub fn client_message(&self) -> String {
        let core = match self {
            DeliveryError::SendFailed { source, .. } | DeliveryError::Core(source) => source,
            DeliveryError::UnknownSubscription(_) => return "Conversation is not open".into(),
            DeliveryError::TransportUnavailable(_) => return "Live updates are unavailable".into(),
        };

        match core {
            SystemError::NotAParticipant { .. } => {
                "You are not a participant of this conversation".into()
            }
            SystemError::Blocked { .. } => "Message cannot be delivered to this user".into(),
            SystemError::StaleCursor(_) => "History position expired, reloading".into(),
            SystemError::BadRequest(msg) | SystemError::NotFound(msg) | SystemError::Forbidden(msg) => {
                msg.to_string()
            }
            _ => "Something went wrong, please try again".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_send_is_not_retryable() {
        let blocked = DeliveryError::SendFailed {
            temp_id: Uuid::now_v7(),
            source: SystemError::Blocked { sender_id: Uuid::now_v7(), recipient_id: Uuid::now_v7() },
        };
        assert!(!blocked.is_retryable());
        assert_eq!(blocked.client_message(), "Message cannot be delivered to this user");

        let flaky = DeliveryError::SendFailed {
            temp_id: Uuid::now_v7(),
            source: SystemError::DatabaseError("connection reset".into()),
        };
        assert!(flaky.is_retryable());
        assert!(!flaky.client_message().contains("connection reset"));
    }
}
