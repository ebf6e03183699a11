use std::sync::Arc;

use chrono::SubsecRound;
use uuid::Uuid;

use crate::{
    api::error,
    constants::MessagingConfig,
    modules::{
        block::repository::BlockRepository,
        conversation::{
            repository::ConversationRepository, schema::ConversationType,
            service::require_active_participant,
        },
        delivery::transport::{PushEvent, PushHub, PushTransport, Topic},
        message::{
            model::{FanOut, InsertMessage, MessageCursor, MessagePage, MessageQuery, NewMessage},
            repository::MessageRepository,
            schema::MessageEntity,
        },
    },
    utils::Clock,
};

#[derive(Clone)]
pub struct MessageService<M, C, B>
where
    M: MessageRepository + Send + Sync + 'static,
    C: ConversationRepository + Send + Sync + 'static,
    B: BlockRepository + Send + Sync + 'static,
{
    message_repo: Arc<M>,
    conversation_repo: Arc<C>,
    block_repo: Arc<B>,
    hub: Arc<PushHub>,
    clock: Arc<dyn Clock>,
    config: MessagingConfig,
}

impl<M, C, B> MessageService<M, C, B>
where
    M: MessageRepository + Send + Sync + 'static,
    C: ConversationRepository + Send + Sync + 'static,
    B: BlockRepository + Send + Sync + 'static,
{
    pub fn with_dependencies(
        message_repo: Arc<M>,
        conversation_repo: Arc<C>,
        block_repo: Arc<B>,
        hub: Arc<PushHub>,
        clock: Arc<dyn Clock>,
        config: MessagingConfig,
    ) -> Self {
        MessageService { message_repo, conversation_repo, block_repo, hub, clock, config }
    }

    /// Appends a message stamped with the server clock.
    ///
    /// In a direct conversation a block in either direction fails the send
    /// with `Blocked`. In a group the message is stored, but members who
    /// blocked the sender get no unread bump and never see it.
    pub async fn append(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        message: NewMessage,
        client_ref: Option<Uuid>,
    ) -> Result<MessageEntity, error::SystemError> {
        message.check()?;

        let conversation = self
            .conversation_repo
            .find_by_id(&conversation_id)
            .await?
            .ok_or_else(|| error::SystemError::not_found("Conversation not found"))?;

        let participants = self.conversation_repo.find_participants(&[conversation_id]).await?;
        if !participants.iter().any(|p| p.user_id == sender_id && p.is_active()) {
            return Err(error::SystemError::not_a_participant(conversation_id, sender_id));
        }

        let fan_out = match conversation._type {
            ConversationType::Direct => {
                let Some(other) = participants.iter().find(|p| p.user_id != sender_id) else {
                    return Err(error::SystemError::bad_request("Conversation has no recipient"));
                };

                if self.block_repo.is_blocked_between(&sender_id, &other.user_id).await? {
                    tracing::info!(%conversation_id, %sender_id, recipient_id = %other.user_id, "send suppressed by block");
                    return Err(error::SystemError::Blocked {
                        sender_id,
                        recipient_id: other.user_id,
                    });
                }

                // a direct chat the other side left comes back when written to
                let reactivate = if other.is_active() { vec![] } else { vec![other.user_id] };
                FanOut { unread_for: vec![other.user_id], reactivate }
            }
            ConversationType::Group => {
                let recipients: Vec<Uuid> = participants
                    .iter()
                    .filter(|p| p.user_id != sender_id && p.is_active())
                    .map(|p| p.user_id)
                    .collect();

                let blockers = self.block_repo.find_blockers_among(&sender_id, &recipients).await?;
                let unread_for =
                    recipients.into_iter().filter(|id| !blockers.contains(id)).collect();

                FanOut { unread_for, reactivate: vec![] }
            }
        };

        let insert = InsertMessage {
            id: Uuid::now_v7(),
            conversation_id,
            sender_id,
            _type: message._type,
            content: message.content,
            attachment_url: message.attachment_url,
            client_ref,
            // storage keeps microseconds; cursors must round-trip exactly
            created_at: self.clock.now().trunc_subsecs(6),
        };

        let entity = self.message_repo.append(&insert, &fan_out).await?;

        tracing::debug!(%conversation_id, %sender_id, message_id = %entity.id, "message appended");
        self.hub.publish(
            Topic::Conversation(conversation_id),
            PushEvent::MessageInserted { message: entity.clone() },
        );

        Ok(entity)
    }

    /// Keyset page strictly older than `before`, returned oldest first.
    ///
    /// A cursor naming a message that no longer resolves in this
    /// conversation fails with `StaleCursor`; callers restart from the top.
    pub async fn page(
        &self,
        conversation_id: Uuid,
        viewer_id: Uuid,
        limit: Option<usize>,
        before: Option<MessageCursor>,
    ) -> Result<MessagePage, error::SystemError> {
        require_active_participant(self.conversation_repo.as_ref(), conversation_id, viewer_id)
            .await?;

        if let Some(MessageCursor { created_at, id: Some(id) }) = before {
            let anchor = self.message_repo.find_by_id(&id).await?;
            let resolves = anchor
                .is_some_and(|m| m.conversation_id == conversation_id && m.created_at == created_at);
            if !resolves {
                return Err(error::SystemError::stale_cursor(
                    "Cursor no longer matches a message in this conversation",
                ));
            }
        }

        let limit = self.config.clamp_limit(limit);
        let hidden_senders =
            self.block_repo.find_by_blocker(&viewer_id).await?.into_iter().map(|b| b.blocked_id).collect();

        let query = MessageQuery { conversation_id, before, hidden_senders };
        let rows = self.message_repo.find_by_query(&query, limit).await?;

        Ok(MessagePage::from_newest_first(rows, limit))
    }

    pub async fn find_by_id(&self, message_id: Uuid) -> Result<Option<MessageEntity>, error::SystemError> {
        self.message_repo.find_by_id(&message_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::Fixture;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_append_rejects_outsider() {
        let fx = Fixture::new();
        let (alice, bob, mallory) = (fx.user(), fx.user(), fx.user());
        let conversation = fx.direct(alice, bob).await;

        let err = fx
            .message_service()
            .append(conversation.id, mallory, NewMessage::text("hi"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, error::SystemError::NotAParticipant { user_id, .. } if user_id == mallory));
    }

    #[tokio::test]
    async fn test_append_bumps_recipient_unread_and_publishes() {
        let fx = Fixture::new();
        let (alice, bob) = (fx.user(), fx.user());
        let conversation = fx.direct(alice, bob).await;
        let mut sub = fx.hub.subscribe(Topic::Conversation(conversation.id)).unwrap();

        let sent = fx
            .message_service()
            .append(conversation.id, alice, NewMessage::text("hi"), None)
            .await
            .unwrap();
        fx.send(conversation.id, alice, "again").await;

        assert_eq!(fx.metadata_service().get(conversation.id, bob).await.unwrap().unread_count, 2);
        assert_eq!(fx.metadata_service().get(conversation.id, alice).await.unwrap().unread_count, 0);

        let event = sub.recv().await.unwrap();
        assert_eq!(event, PushEvent::MessageInserted { message: sent });
    }

    #[tokio::test]
    async fn test_block_either_direction_fails_direct_send_until_unblocked() {
        let fx = Fixture::new();
        let (alice, bob) = (fx.user(), fx.user());
        let conversation = fx.direct(alice, bob).await;
        let svc = fx.message_service();

        fx.block_service().block(alice, bob, None).await.unwrap();

        let err = svc.append(conversation.id, alice, NewMessage::text("hi"), None).await.unwrap_err();
        assert!(matches!(err, error::SystemError::Blocked { .. }));
        let err = svc.append(conversation.id, bob, NewMessage::text("hi"), None).await.unwrap_err();
        assert!(matches!(err, error::SystemError::Blocked { .. }));

        fx.block_service().unblock(alice, bob).await.unwrap();
        let again = fx.conversation_service().find_or_create_direct(alice, bob).await.unwrap();
        assert_eq!(again.conversation_id, conversation.id);
        assert!(svc.append(conversation.id, alice, NewMessage::text("hi"), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_group_blocker_gets_no_unread_and_hidden_history() {
        let fx = Fixture::new();
        let (alice, bob, carol) = (fx.user(), fx.user(), fx.user());
        let group = fx.group(alice, &[bob, carol]).await;
        fx.block_service().block(carol, alice, None).await.unwrap();

        fx.send(group.id, alice, "hello team").await;

        let metadata = fx.metadata_service();
        assert_eq!(metadata.get(group.id, bob).await.unwrap().unread_count, 1);
        assert_eq!(metadata.get(group.id, carol).await.unwrap().unread_count, 0);

        let svc = fx.message_service();
        assert_eq!(svc.page(group.id, bob, None, None).await.unwrap().messages.len(), 1);
        assert!(svc.page(group.id, carol, None, None).await.unwrap().messages.is_empty());

        fx.block_service().unblock(carol, alice).await.unwrap();
        assert_eq!(svc.page(group.id, carol, None, None).await.unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_sixty_messages_page_in_two_steps() {
        let fx = Fixture::new();
        let (alice, bob) = (fx.user(), fx.user());
        let conversation = fx.direct(alice, bob).await;
        let mut sent = Vec::new();
        for i in 0..60 {
            fx.tick();
            sent.push(fx.send(conversation.id, alice, &format!("m{i}")).await.id);
        }
        let svc = fx.message_service();

        let first = svc.page(conversation.id, bob, Some(50), None).await.unwrap();
        assert_eq!(first.messages.len(), 50);
        assert!(first.has_more);
        let first_ids: Vec<Uuid> = first.messages.iter().map(|m| m.id).collect();
        assert_eq!(first_ids, sent[10..]);

        let cursor: MessageCursor = first.next_cursor.unwrap().parse().unwrap();
        let second = svc.page(conversation.id, bob, Some(50), Some(cursor)).await.unwrap();
        assert_eq!(second.messages.len(), 10);
        assert!(!second.has_more);
        assert!(second.next_cursor.is_none());
        let second_ids: Vec<Uuid> = second.messages.iter().map(|m| m.id).collect();
        assert_eq!(second_ids, sent[..10]);
    }

    #[tokio::test]
    async fn test_paging_is_stable_under_concurrent_appends() {
        let fx = Fixture::new();
        let (alice, bob) = (fx.user(), fx.user());
        let conversation = fx.direct(alice, bob).await;
        for i in 0..25 {
            fx.tick();
            fx.send(conversation.id, alice, &format!("old {i}")).await;
        }
        let svc = fx.message_service();

        let mut seen = HashSet::new();
        let mut previous_oldest = None;
        let mut cursor = None;
        loop {
            let page = svc.page(conversation.id, bob, Some(10), cursor).await.unwrap();
            // new traffic lands while scrolling back
            fx.tick();
            fx.send(conversation.id, bob, "meanwhile").await;

            for pair in page.messages.windows(2) {
                assert!(pair[0].order_key() < pair[1].order_key());
            }
            if let (Some(newest), Some(oldest_before)) = (page.messages.last(), previous_oldest) {
                assert!(newest.order_key() < oldest_before);
            }
            for message in &page.messages {
                assert!(seen.insert(message.id), "duplicate across pages");
            }

            previous_oldest = page.messages.first().map(MessageEntity::order_key);
            match page.next_cursor {
                Some(next) => cursor = Some(next.parse().unwrap()),
                None => break,
            }
        }

        assert_eq!(seen.len(), 25);
    }

    #[tokio::test]
    async fn test_unknown_cursor_is_stale() {
        let fx = Fixture::new();
        let (alice, bob) = (fx.user(), fx.user());
        let conversation = fx.direct(alice, bob).await;
        let other = fx.direct(alice, fx.user()).await;
        let foreign = fx.send(other.id, alice, "elsewhere").await;
        let svc = fx.message_service();

        let missing = MessageCursor { created_at: fx.now(), id: Some(Uuid::now_v7()) };
        let err = svc.page(conversation.id, bob, None, Some(missing)).await.unwrap_err();
        assert!(matches!(err, error::SystemError::StaleCursor(_)));

        let err = svc.page(conversation.id, bob, None, Some(foreign.cursor())).await.unwrap_err();
        assert!(matches!(err, error::SystemError::StaleCursor(_)));

        let bare = MessageCursor { created_at: fx.now(), id: None };
        assert!(svc.page(conversation.id, bob, None, Some(bare)).await.is_ok());
    }

    #[tokio::test]
    async fn test_server_assigns_timestamp_and_keeps_client_ref() {
        let fx = Fixture::new();
        let (alice, bob) = (fx.user(), fx.user());
        let conversation = fx.direct(alice, bob).await;
        let temp_id = Uuid::now_v7();

        let before = fx.now();
        let message = fx
            .message_service()
            .append(conversation.id, alice, NewMessage::text("hi"), Some(temp_id))
            .await
            .unwrap();

        assert_eq!(message.client_ref, Some(temp_id));
        assert_ne!(message.id, temp_id);
        assert!(message.created_at >= before.trunc_subsecs(6));
    }
}
