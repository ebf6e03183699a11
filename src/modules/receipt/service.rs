use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

use crate::{
    api::error,
    modules::{
        block::repository::BlockRepository,
        conversation::{repository::ConversationRepository, service::require_active_participant},
        delivery::transport::{PushEvent, PushHub, PushTransport, Topic},
        message::schema::MessageEntity,
        receipt::{
            model::{ReceiptTally, StatusChange},
            repository::ReceiptRepository,
        },
    },
    utils::Clock,
};

#[derive(Clone)]
pub struct ReceiptService<R, C, B>
where
    R: ReceiptRepository + Send + Sync + 'static,
    C: ConversationRepository + Send + Sync + 'static,
    B: BlockRepository + Send + Sync + 'static,
{
    receipt_repo: Arc<R>,
    conversation_repo: Arc<C>,
    block_repo: Arc<B>,
    hub: Arc<PushHub>,
    clock: Arc<dyn Clock>,
}

impl<R, C, B> ReceiptService<R, C, B>
where
    R: ReceiptRepository + Send + Sync + 'static,
    C: ConversationRepository + Send + Sync + 'static,
    B: BlockRepository + Send + Sync + 'static,
{
    pub fn with_dependencies(
        receipt_repo: Arc<R>,
        conversation_repo: Arc<C>,
        block_repo: Arc<B>,
        hub: Arc<PushHub>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        ReceiptService { receipt_repo, conversation_repo, block_repo, hub, clock }
    }

    /// Records reads, resets the reader's unread counter and advances
    /// `last_read_at`. Safe to repeat with the same ids.
    pub async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        message_ids: &[Uuid],
    ) -> Result<Vec<StatusChange>, error::SystemError> {
        require_active_participant(self.conversation_repo.as_ref(), conversation_id, reader_id)
            .await?;

        let now = self.clock.now();
        let newly_read = if message_ids.is_empty() {
            vec![]
        } else {
            self.receipt_repo.record_read(&conversation_id, &reader_id, message_ids, now).await?
        };
        self.receipt_repo.reset_unread(&conversation_id, &reader_id, now).await?;

        tracing::debug!(%conversation_id, user_id = %reader_id, marked = newly_read.len(), "messages read");
        self.refresh_status(conversation_id, newly_read).await
    }

    /// Called when a recipient's client has received messages over push.
    pub async fn acknowledge_delivered(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        message_ids: &[Uuid],
    ) -> Result<Vec<StatusChange>, error::SystemError> {
        require_active_participant(self.conversation_repo.as_ref(), conversation_id, user_id)
            .await?;

        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        let delivered = self
            .receipt_repo
            .record_delivered(&conversation_id, &user_id, message_ids, self.clock.now())
            .await?;

        self.refresh_status(conversation_id, delivered).await
    }

    async fn refresh_status(
        &self,
        conversation_id: Uuid,
        messages: Vec<MessageEntity>,
    ) -> Result<Vec<StatusChange>, error::SystemError> {
        if messages.is_empty() {
            return Ok(vec![]);
        }

        let participants = self.conversation_repo.find_participants(&[conversation_id]).await?;
        let message_ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();
        let receipts = self.receipt_repo.find_by_messages(&message_ids).await?;

        let mut recipients_by_sender: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut changes = Vec::new();

        for message in messages {
            let recipients = match recipients_by_sender.get(&message.sender_id) {
                Some(recipients) => recipients.clone(),
                None => {
                    let others: Vec<Uuid> = participants
                        .iter()
                        .filter(|p| p.user_id != message.sender_id && p.is_active())
                        .map(|p| p.user_id)
                        .collect();
                    let blockers =
                        self.block_repo.find_blockers_among(&message.sender_id, &others).await?;
                    let recipients: Vec<Uuid> =
                        others.into_iter().filter(|id| !blockers.contains(id)).collect();
                    recipients_by_sender.insert(message.sender_id, recipients.clone());
                    recipients
                }
            };

            let own: Vec<_> = receipts.iter().filter(|r| r.message_id == message.id).collect();
            let next = message.status.advance(ReceiptTally::count(&recipients, &own).status());
            if next == message.status {
                continue;
            }

            if self.receipt_repo.raise_status(&message.id, next).await? {
                let change = StatusChange { conversation_id, message_id: message.id, status: next };
                self.hub.publish(
                    Topic::Conversation(conversation_id),
                    PushEvent::StatusChanged {
                        conversation_id,
                        message_id: message.id,
                        status: next,
                    },
                );
                changes.push(change);
            }
        }

        Ok(changes)
    }
}
