use std::sync::Arc;
use uuid::Uuid;

use crate::{
    api::error::SystemError,
    modules::{
        block::{repository::BlockRepository, schema::BlockEntity, service::BlockService},
        conversation::repository::ConversationRepository,
        message::{
            model::{MessageCursor, MessagePage, NewMessage},
            repository::MessageRepository,
            schema::MessageEntity,
            service::MessageService,
        },
        metadata::{
            model::MetadataPatch, repository::MetadataRepository, schema::ConversationMetadata,
            service::MetadataService,
        },
        receipt::{model::StatusChange, repository::ReceiptRepository, service::ReceiptService},
        typing::{repository::TypingRepository, schema::TypingIndicator, service::TypingService},
    },
};

/// Everything the delivery engine needs from the messaging services, acting
/// on behalf of one user.
#[async_trait::async_trait]
pub trait MessagingBackend: Send + Sync + 'static {
    async fn page(
        &self,
        conversation_id: Uuid,
        viewer_id: Uuid,
        limit: Option<usize>,
        before: Option<MessageCursor>,
    ) -> Result<MessagePage, SystemError>;

    async fn append(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        message: NewMessage,
        client_ref: Option<Uuid>,
    ) -> Result<MessageEntity, SystemError>;

    async fn acknowledge_delivered(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        message_ids: &[Uuid],
    ) -> Result<Vec<StatusChange>, SystemError>;

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        message_ids: &[Uuid],
    ) -> Result<Vec<StatusChange>, SystemError>;

    async fn start_typing(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<TypingIndicator, SystemError>;

    async fn stop_typing(&self, conversation_id: Uuid, user_id: Uuid) -> Result<(), SystemError>;

    async fn observe_typing(
        &self,
        conversation_id: Uuid,
        viewer_id: Uuid,
    ) -> Result<Vec<TypingIndicator>, SystemError>;

    async fn set_metadata(
        &self,
        conversation_id: Uuid,
        viewer_id: Uuid,
        patch: MetadataPatch,
    ) -> Result<ConversationMetadata, SystemError>;

    async fn block(
        &self,
        blocker_id: Uuid,
        blocked_id: Uuid,
        reason: Option<String>,
    ) -> Result<BlockEntity, SystemError>;

    async fn unblock(&self, blocker_id: Uuid, blocked_id: Uuid) -> Result<bool, SystemError>;

    async fn hidden_senders(&self, viewer_id: Uuid) -> Result<Vec<Uuid>, SystemError>;
}

/// Backend wired straight onto the in-process services.
pub struct ServiceBackend<C, M, R, D, T, B>
where
    C: ConversationRepository + Send + Sync + 'static,
    M: MessageRepository + Send + Sync + 'static,
    R: ReceiptRepository + Send + Sync + 'static,
    D: MetadataRepository + Send + Sync + 'static,
    T: TypingRepository + Send + Sync + 'static,
    B: BlockRepository + Send + Sync + 'static,
{
    pub messages: MessageService<M, C, B>,
    pub receipts: ReceiptService<R, C, B>,
    pub metadata: MetadataService<D>,
    pub typing: TypingService<T, C>,
    pub blocks: BlockService<B>,
}

impl<C, M, R, D, T, B> ServiceBackend<C, M, R, D, T, B>
where
    C: ConversationRepository + Send + Sync + 'static,
    M: MessageRepository + Send + Sync + 'static,
    R: ReceiptRepository + Send + Sync + 'static,
    D: MetadataRepository + Send + Sync + 'static,
    T: TypingRepository + Send + Sync + 'static,
    B: BlockRepository + Send + Sync + 'static,
{
    pub fn with_dependencies(
        messages: MessageService<M, C, B>,
        receipts: ReceiptService<R, C, B>,
        metadata: MetadataService<D>,
        typing: TypingService<T, C>,
        blocks: BlockService<B>,
    ) -> Arc<Self> {
        Arc::new(ServiceBackend { messages, receipts, metadata, typing, blocks })
    }
}

#[async_trait::async_trait]
impl<C, M, R, D, T, B> MessagingBackend for ServiceBackend<C, M, R, D, T, B>
where
    C: ConversationRepository + Send + Sync + 'static,
    M: MessageRepository + Send + Sync + 'static,
    R: ReceiptRepository + Send + Sync + 'static,
    D: MetadataRepository + Send + Sync + 'static,
    T: TypingRepository + Send + Sync + 'static,
    B: BlockRepository + Send + Sync + 'static,
{
    async fn page(
        &self,
        conversation_id: Uuid,
        viewer_id: Uuid,
        limit: Option<usize>,
        before: Option<MessageCursor>,
    ) -> Result<MessagePage, SystemError> {
        self.messages.page(conversation_id, viewer_id, limit, before).await
    }

    async fn append(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        message: NewMessage,
        client_ref: Option<Uuid>,
    ) -> Result<MessageEntity, SystemError> {
        self.messages.append(conversation_id, sender_id, message, client_ref).await
    }

    async fn acknowledge_delivered(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        message_ids: &[Uuid],
    ) -> Result<Vec<StatusChange>, SystemError> {
        self.receipts.acknowledge_delivered(conversation_id, user_id, message_ids).await
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        message_ids: &[Uuid],
    ) -> Result<Vec<StatusChange>, SystemError> {
        self.receipts.mark_read(conversation_id, reader_id, message_ids).await
    }

    async fn start_typing(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<TypingIndicator, SystemError> {
        self.typing.start(conversation_id, user_id).await
    }

    async fn stop_typing(&self, conversation_id: Uuid, user_id: Uuid) -> Result<(), SystemError> {
        self.typing.stop(conversation_id, user_id).await
    }

    async fn observe_typing(
        &self,
        conversation_id: Uuid,
        viewer_id: Uuid,
    ) -> Result<Vec<TypingIndicator>, SystemError> {
        self.typing.observe(conversation_id, viewer_id).await
    }

    async fn set_metadata(
        &self,
        conversation_id: Uuid,
        viewer_id: Uuid,
        patch: MetadataPatch,
    ) -> Result<ConversationMetadata, SystemError> {
        self.metadata.set(conversation_id, viewer_id, patch).await
    }

    async fn block(
        &self,
        blocker_id: Uuid,
        blocked_id: Uuid,
        reason: Option<String>,
    ) -> Result<BlockEntity, SystemError> {
        self.blocks.block(blocker_id, blocked_id, reason).await
    }

    async fn unblock(&self, blocker_id: Uuid, blocked_id: Uuid) -> Result<bool, SystemError> {
        self.blocks.unblock(blocker_id, blocked_id).await
    }

    async fn hidden_senders(&self, viewer_id: Uuid) -> Result<Vec<Uuid>, SystemError> {
        self.blocks.hidden_senders(viewer_id).await
    }
}
