use uuid::Uuid;

use crate::modules::message::model::{FanOut, InsertMessage, MessageQuery};
use crate::{api::error, modules::message::schema::MessageEntity};

#[async_trait::async_trait]
pub trait MessageRepository {
    /// Inserts the message, touches the conversation's `updated_at` and applies
    /// the fan-out, all in one transaction so unread counters cannot miss a
    /// concurrent append.
    async fn append(
        &self,
        message: &InsertMessage,
        fan_out: &FanOut,
    ) -> Result<MessageEntity, error::SystemError>;

    async fn find_by_id(
        &self,
        message_id: &Uuid,
    ) -> Result<Option<MessageEntity>, error::SystemError>;

    /// Newest first, at most `limit` rows strictly older than the cursor.
    async fn find_by_query(
        &self,
        query: &MessageQuery,
        limit: usize,
    ) -> Result<Vec<MessageEntity>, error::SystemError>;

    /// Latest message per conversation, skipping hidden senders.
    async fn find_last_messages(
        &self,
        conversation_ids: &[Uuid],
        hidden_senders: &[Uuid],
    ) -> Result<Vec<MessageEntity>, error::SystemError>;
}
