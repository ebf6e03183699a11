#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

use crate::{
    api::error::SystemError,
    constants::MessagingConfig,
    modules::{
        block::{repository::BlockRepository, schema::BlockEntity, service::BlockService},
        conversation::{
            model::{direct_key, NewGroupConversation},
            repository::ConversationRepository,
            schema::{ConversationEntity, ConversationType, ParticipantEntity},
            service::ConversationService,
        },
        delivery::{
            backend::ServiceBackend,
            engine::{DeliveryEngine, StreamEvent},
            transport::PushHub,
        },
        message::{
            model::{FanOut, InsertMessage, MessageQuery, NewMessage},
            repository::MessageRepository,
            schema::{MessageEntity, MessageStatus},
            service::MessageService,
        },
        metadata::{
            model::MetadataPatch, repository::MetadataRepository, schema::ConversationMetadata,
            service::MetadataService,
        },
        presence::{repository::PresenceRepository, schema::PresenceRecord, service::PresenceService},
        receipt::{repository::ReceiptRepository, schema::ReceiptEntity, service::ReceiptService},
        typing::{repository::TypingRepository, schema::TypingIndicator, service::TypingService},
    },
    utils::Clock,
};

pub type MemoryBackend =
    ServiceBackend<MemoryStore, MemoryStore, MemoryStore, MemoryStore, MemoryStore, MemoryStore>;

/// Follows tokio's clock, so paused tests move timestamps and timers together.
/// `tick` nudges it forward without touching tokio time.
pub struct TestClock {
    base: DateTime<Utc>,
    start: tokio::time::Instant,
    offset: Mutex<chrono::Duration>,
}

impl TestClock {
    pub fn new() -> Self {
        TestClock {
            base: Utc::now().trunc_subsecs(6),
            start: tokio::time::Instant::now(),
            offset: Mutex::new(chrono::Duration::zero()),
        }
    }

    pub fn tick(&self) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += chrono::Duration::milliseconds(1);
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.start.elapsed()).unwrap_or_default();
        let offset = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.base + elapsed + offset
    }
}

#[derive(Default)]
struct Tables {
    conversations: Vec<ConversationEntity>,
    participants: Vec<ParticipantEntity>,
    messages: Vec<MessageEntity>,
    receipts: Vec<ReceiptEntity>,
    blocks: Vec<BlockEntity>,
    presence: HashMap<Uuid, PresenceRecord>,
    typing: HashMap<Uuid, HashMap<Uuid, TypingIndicator>>,
}

impl Tables {
    fn participant_mut(&mut self, conversation_id: &Uuid, user_id: &Uuid) -> Option<&mut ParticipantEntity> {
        self.participants
            .iter_mut()
            .find(|p| p.conversation_id == *conversation_id && p.user_id == *user_id)
    }

    fn upsert_participant(&mut self, conversation_id: &Uuid, user_id: &Uuid, now: DateTime<Utc>) -> ParticipantEntity {
        if let Some(existing) = self.participant_mut(conversation_id, user_id) {
            existing.left_at = None;
            return existing.clone();
        }
        let participant = ParticipantEntity::new(*conversation_id, *user_id, now);
        self.participants.push(participant.clone());
        participant
    }

    fn record_receipt(
        &mut self,
        conversation_id: &Uuid,
        user_id: &Uuid,
        message_ids: &[Uuid],
        now: DateTime<Utc>,
        read: bool,
    ) -> Vec<MessageEntity> {
        let candidates: Vec<MessageEntity> = self
            .messages
            .iter()
            .filter(|m| {
                m.conversation_id == *conversation_id
                    && message_ids.contains(&m.id)
                    && m.sender_id != *user_id
            })
            .cloned()
            .collect();

        let mut marked = Vec::new();
        for message in candidates {
            let existing = self
                .receipts
                .iter()
                .position(|r| r.message_id == message.id && r.user_id == *user_id);

            let changed = match existing {
                None => {
                    self.receipts.push(ReceiptEntity {
                        message_id: message.id,
                        user_id: *user_id,
                        delivered_at: Some(now),
                        read_at: read.then_some(now),
                    });
                    true
                }
                Some(index) => {
                    let receipt = &mut self.receipts[index];
                    if read && receipt.read_at.is_none() {
                        receipt.read_at = Some(now);
                        receipt.delivered_at.get_or_insert(now);
                        true
                    } else if !read && receipt.delivered_at.is_none() && receipt.read_at.is_none() {
                        receipt.delivered_at = Some(now);
                        true
                    } else {
                        false
                    }
                }
            };
            if changed {
                marked.push(message);
            }
        }

        marked.sort_by_key(MessageEntity::order_key);
        marked
    }
}

/// In-memory stand-in for Postgres and Redis, implementing every repository
/// over one lock so each call is atomic like the SQL it replaces.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_appends: AtomicBool,
}

impl MemoryStore {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every append fail like a dropped database connection.
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Raw typing rows, expired ones included.
    pub fn typing_rows(&self, conversation_id: Uuid) -> Vec<TypingIndicator> {
        self.tables()
            .typing
            .get(&conversation_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ConversationRepository for MemoryStore {
    async fn find_by_id(&self, conversation_id: &Uuid) -> Result<Option<ConversationEntity>, SystemError> {
        Ok(self.tables().conversations.iter().find(|c| c.id == *conversation_id).cloned())
    }

    async fn find_or_create_direct(
        &self,
        user_a: &Uuid,
        user_b: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<(ConversationEntity, bool), SystemError> {
        let key = direct_key(user_a, user_b);
        let mut tables = self.tables();

        let existing =
            tables.conversations.iter().find(|c| c.direct_key.as_deref() == Some(key.as_str())).cloned();
        if let Some(conversation) = existing {
            if let Some(participant) = tables.participant_mut(&conversation.id, user_a) {
                participant.left_at = None;
            }
            return Ok((conversation, false));
        }

        let conversation = ConversationEntity {
            id: Uuid::now_v7(),
            _type: ConversationType::Direct,
            name: None,
            description: None,
            created_by: *user_a,
            direct_key: Some(key),
            created_at: now,
            updated_at: now,
        };
        tables.conversations.push(conversation.clone());
        tables.upsert_participant(&conversation.id, user_a, now);
        tables.upsert_participant(&conversation.id, user_b, now);
        Ok((conversation, true))
    }

    async fn create_group(
        &self,
        group: &NewGroupConversation,
        now: DateTime<Utc>,
    ) -> Result<ConversationEntity, SystemError> {
        let conversation = ConversationEntity {
            id: Uuid::now_v7(),
            _type: ConversationType::Group,
            name: Some(group.name.clone()),
            description: group.description.clone(),
            created_by: group.created_by,
            direct_key: None,
            created_at: now,
            updated_at: now,
        };

        let mut tables = self.tables();
        tables.conversations.push(conversation.clone());
        for member in &group.member_ids {
            tables.upsert_participant(&conversation.id, member, now);
        }
        Ok(conversation)
    }

    async fn find_by_user(&self, user_id: &Uuid) -> Result<Vec<ConversationEntity>, SystemError> {
        let tables = self.tables();
        let mut conversations: Vec<ConversationEntity> = tables
            .conversations
            .iter()
            .filter(|c| {
                tables
                    .participants
                    .iter()
                    .any(|p| p.conversation_id == c.id && p.user_id == *user_id && p.is_active())
            })
            .cloned()
            .collect();
        conversations.sort_by(|a, b| (b.updated_at, b.id).cmp(&(a.updated_at, a.id)));
        Ok(conversations)
    }

    async fn find_participants(&self, conversation_ids: &[Uuid]) -> Result<Vec<ParticipantEntity>, SystemError> {
        let mut participants: Vec<ParticipantEntity> = self
            .tables()
            .participants
            .iter()
            .filter(|p| conversation_ids.contains(&p.conversation_id))
            .cloned()
            .collect();
        participants.sort_by_key(|p| p.joined_at);
        Ok(participants)
    }

    async fn find_participant(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<Option<ParticipantEntity>, SystemError> {
        Ok(self.tables().participant_mut(conversation_id, user_id).cloned())
    }

    async fn upsert_participant(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<ParticipantEntity, SystemError> {
        Ok(self.tables().upsert_participant(conversation_id, user_id, now))
    }

    async fn leave(&self, conversation_id: &Uuid, user_id: &Uuid, now: DateTime<Utc>) -> Result<bool, SystemError> {
        let mut tables = self.tables();
        match tables.participant_mut(conversation_id, user_id) {
            Some(p) if p.is_active() => {
                p.left_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait::async_trait]
impl MessageRepository for MemoryStore {
    async fn append(&self, message: &InsertMessage, fan_out: &FanOut) -> Result<MessageEntity, SystemError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(SystemError::DatabaseError("connection reset by peer".into()));
        }

        let entity = message.clone().into_entity();
        let mut tables = self.tables();
        tables.messages.push(entity.clone());

        if let Some(conversation) =
            tables.conversations.iter_mut().find(|c| c.id == message.conversation_id)
        {
            conversation.updated_at = conversation.updated_at.max(message.created_at);
        }

        for user_id in &fan_out.reactivate {
            if let Some(p) = tables.participant_mut(&message.conversation_id, user_id) {
                p.left_at = None;
            }
        }

        for user_id in &fan_out.unread_for {
            if let Some(p) = tables.participant_mut(&message.conversation_id, user_id) {
                let unread = p.is_active() && p.last_read_at.is_none_or(|read| read < message.created_at);
                if unread {
                    p.unread_count += 1;
                    p.archived = false;
                }
            }
        }

        Ok(entity)
    }

    async fn find_by_id(&self, message_id: &Uuid) -> Result<Option<MessageEntity>, SystemError> {
        Ok(self.tables().messages.iter().find(|m| m.id == *message_id).cloned())
    }

    async fn find_by_query(&self, query: &MessageQuery, limit: usize) -> Result<Vec<MessageEntity>, SystemError> {
        let mut messages: Vec<MessageEntity> = self
            .tables()
            .messages
            .iter()
            .filter(|m| m.conversation_id == query.conversation_id)
            .filter(|m| !query.hidden_senders.contains(&m.sender_id))
            .filter(|m| match query.before {
                Some(cursor) => match cursor.id {
                    Some(id) => m.order_key() < (cursor.created_at, id),
                    None => m.created_at < cursor.created_at,
                },
                None => true,
            })
            .cloned()
            .collect();

        messages.sort_by(|a, b| b.order_key().cmp(&a.order_key()));
        messages.truncate(limit);
        Ok(messages)
    }

    async fn find_last_messages(
        &self,
        conversation_ids: &[Uuid],
        hidden_senders: &[Uuid],
    ) -> Result<Vec<MessageEntity>, SystemError> {
        let tables = self.tables();
        Ok(conversation_ids
            .iter()
            .filter_map(|conversation_id| {
                tables
                    .messages
                    .iter()
                    .filter(|m| m.conversation_id == *conversation_id)
                    .filter(|m| !hidden_senders.contains(&m.sender_id))
                    .max_by_key(|m| m.order_key())
                    .cloned()
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl ReceiptRepository for MemoryStore {
    async fn record_delivered(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
        message_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<MessageEntity>, SystemError> {
        Ok(self.tables().record_receipt(conversation_id, user_id, message_ids, now, false))
    }

    async fn record_read(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
        message_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<MessageEntity>, SystemError> {
        Ok(self.tables().record_receipt(conversation_id, user_id, message_ids, now, true))
    }

    async fn reset_unread(&self, conversation_id: &Uuid, user_id: &Uuid, now: DateTime<Utc>) -> Result<(), SystemError> {
        if let Some(p) = self.tables().participant_mut(conversation_id, user_id) {
            p.unread_count = 0;
            p.last_read_at = Some(p.last_read_at.map_or(now, |read| read.max(now)));
        }
        Ok(())
    }

    async fn find_by_messages(&self, message_ids: &[Uuid]) -> Result<Vec<ReceiptEntity>, SystemError> {
        Ok(self
            .tables()
            .receipts
            .iter()
            .filter(|r| message_ids.contains(&r.message_id))
            .cloned()
            .collect())
    }

    async fn raise_status(&self, message_id: &Uuid, status: MessageStatus) -> Result<bool, SystemError> {
        let mut tables = self.tables();
        match tables.messages.iter_mut().find(|m| m.id == *message_id) {
            Some(m) if m.status < status => {
                m.status = status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait::async_trait]
impl MetadataRepository for MemoryStore {
    async fn find(&self, conversation_id: &Uuid, user_id: &Uuid) -> Result<Option<ConversationMetadata>, SystemError> {
        Ok(self
            .tables()
            .participant_mut(conversation_id, user_id)
            .filter(|p| p.is_active())
            .map(|p| ConversationMetadata::from(&*p)))
    }

    async fn update(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
        patch: &MetadataPatch,
    ) -> Result<Option<ConversationMetadata>, SystemError> {
        let mut tables = self.tables();
        let Some(p) = tables.participant_mut(conversation_id, user_id).filter(|p| p.is_active()) else {
            return Ok(None);
        };

        p.pinned = patch.pinned.unwrap_or(p.pinned);
        p.muted = patch.muted.unwrap_or(p.muted);
        p.archived = patch.archived.unwrap_or(p.archived);
        Ok(Some(ConversationMetadata::from(&*p)))
    }
}

#[async_trait::async_trait]
impl BlockRepository for MemoryStore {
    async fn upsert(
        &self,
        blocker_id: &Uuid,
        blocked_id: &Uuid,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<BlockEntity, SystemError> {
        let mut tables = self.tables();
        if let Some(existing) =
            tables.blocks.iter().find(|b| b.blocker_id == *blocker_id && b.blocked_id == *blocked_id)
        {
            return Ok(existing.clone());
        }

        let block = BlockEntity {
            blocker_id: *blocker_id,
            blocked_id: *blocked_id,
            reason: reason.map(str::to_string),
            created_at: now,
        };
        tables.blocks.push(block.clone());
        Ok(block)
    }

    async fn delete(&self, blocker_id: &Uuid, blocked_id: &Uuid) -> Result<bool, SystemError> {
        let mut tables = self.tables();
        let before = tables.blocks.len();
        tables.blocks.retain(|b| !(b.blocker_id == *blocker_id && b.blocked_id == *blocked_id));
        Ok(tables.blocks.len() < before)
    }

    async fn find_by_blocker(&self, blocker_id: &Uuid) -> Result<Vec<BlockEntity>, SystemError> {
        Ok(self.tables().blocks.iter().filter(|b| b.blocker_id == *blocker_id).cloned().collect())
    }

    async fn is_blocked_between(&self, user_a: &Uuid, user_b: &Uuid) -> Result<bool, SystemError> {
        Ok(self.tables().blocks.iter().any(|b| {
            (b.blocker_id == *user_a && b.blocked_id == *user_b)
                || (b.blocker_id == *user_b && b.blocked_id == *user_a)
        }))
    }

    async fn find_blockers_among(&self, target: &Uuid, candidates: &[Uuid]) -> Result<Vec<Uuid>, SystemError> {
        Ok(self
            .tables()
            .blocks
            .iter()
            .filter(|b| b.blocked_id == *target && candidates.contains(&b.blocker_id))
            .map(|b| b.blocker_id)
            .collect())
    }
}

#[async_trait::async_trait]
impl PresenceRepository for MemoryStore {
    async fn upsert(&self, record: &PresenceRecord) -> Result<(), SystemError> {
        self.tables().presence.insert(record.user_id, record.clone());
        Ok(())
    }

    async fn find(&self, user_id: &Uuid) -> Result<Option<PresenceRecord>, SystemError> {
        Ok(self.tables().presence.get(user_id).cloned())
    }

    async fn find_many(&self, user_ids: &[Uuid]) -> Result<Vec<Option<PresenceRecord>>, SystemError> {
        let tables = self.tables();
        Ok(user_ids.iter().map(|id| tables.presence.get(id).cloned()).collect())
    }
}

#[async_trait::async_trait]
impl TypingRepository for MemoryStore {
    async fn upsert(&self, indicator: &TypingIndicator) -> Result<(), SystemError> {
        self.tables()
            .typing
            .entry(indicator.conversation_id)
            .or_default()
            .insert(indicator.user_id, indicator.clone());
        Ok(())
    }

    async fn remove(&self, conversation_id: &Uuid, user_id: &Uuid) -> Result<(), SystemError> {
        if let Some(rows) = self.tables().typing.get_mut(conversation_id) {
            rows.remove(user_id);
        }
        Ok(())
    }

    async fn find_by_conversation(&self, conversation_id: &Uuid) -> Result<Vec<TypingIndicator>, SystemError> {
        Ok(self.typing_rows(*conversation_id))
    }
}

/// Services wired onto one [`MemoryStore`], one hub and one clock.
pub struct Fixture {
    pub hub: Arc<PushHub>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<TestClock>,
    pub config: MessagingConfig,
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Fixture {
    pub fn new() -> Self {
        let config = MessagingConfig::default();
        Fixture {
            hub: Arc::new(PushHub::new(config.push_channel_capacity)),
            store: Arc::new(MemoryStore::default()),
            clock: Arc::new(TestClock::new()),
            config,
        }
    }

    pub fn user(&self) -> Uuid {
        Uuid::now_v7()
    }

    pub fn tick(&self) {
        self.clock.tick();
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub async fn direct(&self, user_a: Uuid, user_b: Uuid) -> ConversationEntity {
        let (conversation, _) =
            self.store.find_or_create_direct(&user_a, &user_b, self.now()).await.unwrap();
        conversation
    }

    pub async fn group(&self, creator_id: Uuid, member_ids: &[Uuid]) -> ConversationEntity {
        let detail = self
            .conversation_service()
            .create_group(creator_id, "Group".into(), None, member_ids.to_vec())
            .await
            .unwrap();
        ConversationRepository::find_by_id(self.store.as_ref(), &detail.conversation_id)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn send(&self, conversation_id: Uuid, sender_id: Uuid, content: &str) -> MessageEntity {
        self.message_service()
            .append(conversation_id, sender_id, NewMessage::text(content), None)
            .await
            .unwrap()
    }

    pub fn conversation_service(&self) -> ConversationService<MemoryStore, MemoryStore, MemoryStore> {
        ConversationService::with_dependencies(
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            self.clock(),
        )
    }

    pub fn message_service(&self) -> MessageService<MemoryStore, MemoryStore, MemoryStore> {
        MessageService::with_dependencies(
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            self.hub.clone(),
            self.clock(),
            self.config.clone(),
        )
    }

    pub fn receipt_service(&self) -> ReceiptService<MemoryStore, MemoryStore, MemoryStore> {
        ReceiptService::with_dependencies(
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            self.hub.clone(),
            self.clock(),
        )
    }

    pub fn metadata_service(&self) -> MetadataService<MemoryStore> {
        MetadataService::with_dependencies(self.store.clone())
    }

    pub fn block_service(&self) -> BlockService<MemoryStore> {
        BlockService::with_dependencies(self.store.clone(), self.clock())
    }

    pub fn presence_service(&self) -> PresenceService<MemoryStore> {
        PresenceService::with_dependencies(
            self.store.clone(),
            self.hub.clone(),
            self.clock(),
            self.config.presence_stale_after,
        )
    }

    pub fn typing_service(&self) -> TypingService<MemoryStore, MemoryStore> {
        TypingService::with_dependencies(
            self.store.clone(),
            self.store.clone(),
            self.hub.clone(),
            self.clock(),
            self.config.typing_ttl,
        )
    }

    pub fn backend(&self) -> Arc<MemoryBackend> {
        ServiceBackend::with_dependencies(
            self.message_service(),
            self.receipt_service(),
            self.metadata_service(),
            self.typing_service(),
            self.block_service(),
        )
    }

    pub fn engine(
        &self,
        viewer_id: Uuid,
    ) -> (DeliveryEngine<MemoryBackend, PushHub>, tokio::sync::mpsc::UnboundedReceiver<StreamEvent>) {
        DeliveryEngine::start(viewer_id, self.backend(), self.hub.clone(), self.clock(), self.config.clone())
    }
}
