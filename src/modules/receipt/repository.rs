use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    api::error,
    modules::{
        message::schema::{MessageEntity, MessageStatus},
        receipt::schema::ReceiptEntity,
    },
};

#[async_trait::async_trait]
pub trait ReceiptRepository {
    /// Marks delivery for messages of the conversation not sent by `user_id`.
    /// Returns only messages whose marker was newly set.
    async fn record_delivered(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
        message_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<MessageEntity>, error::SystemError>;

    /// Like [`ReceiptRepository::record_delivered`] for reads; a read implies delivery.
    async fn record_read(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
        message_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<MessageEntity>, error::SystemError>;

    /// Zeroes the unread counter and moves `last_read_at` forward to `now`.
    async fn reset_unread(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), error::SystemError>;

    async fn find_by_messages(
        &self,
        message_ids: &[Uuid],
    ) -> Result<Vec<ReceiptEntity>, error::SystemError>;

    /// Moves the stored status forward; never lowers it.
    async fn raise_status(
        &self,
        message_id: &Uuid,
        status: MessageStatus,
    ) -> Result<bool, error::SystemError>;
}
