use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::{
    api::error::SystemError,
    constants::MessagingConfig,
    modules::{
        block::schema::BlockEntity,
        delivery::{
            backend::MessagingBackend,
            error::DeliveryError,
            stream::{MergeOutcome, MessageStream, PendingMessage, ReconcileOutcome, StreamEntry},
            transport::{PushEvent, PushSubscription, PushTransport, Topic, TransportError},
        },
        message::{
            model::{MessageCursor, MessagePage, NewMessage},
            schema::{MessageEntity, MessageStatus},
        },
        metadata::{model::MetadataPatch, schema::ConversationMetadata},
        receipt::model::StatusChange,
        typing::timer::TypingTimer,
    },
    utils::Clock,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionHandle {
    pub id: u64,
    pub conversation_id: Uuid,
}

/// What the viewer's stream observers are told, in the order it happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum StreamEvent {
    #[serde(rename_all = "camelCase")]
    MessagesLoaded {
        conversation_id: Uuid,
        messages: Vec<MessageEntity>,
        has_more: bool,
        next_cursor: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    MessageAdded { conversation_id: Uuid, entry: StreamEntry, index: usize },
    #[serde(rename_all = "camelCase")]
    MessageReconciled { conversation_id: Uuid, temp_id: Uuid, message: MessageEntity, index: usize },
    #[serde(rename_all = "camelCase")]
    SendFailed {
        conversation_id: Uuid,
        temp_id: Uuid,
        restored: NewMessage,
        reason: String,
        retryable: bool,
    },
    #[serde(rename_all = "camelCase")]
    StatusChanged { conversation_id: Uuid, message_id: Uuid, status: MessageStatus },
    #[serde(rename_all = "camelCase")]
    TypingChanged { conversation_id: Uuid, user_ids: Vec<Uuid> },
    #[serde(rename_all = "camelCase")]
    MessagesHidden { conversation_id: Uuid, message_ids: Vec<Uuid> },
    #[serde(rename_all = "camelCase")]
    PushLost { conversation_id: Uuid },
    #[serde(rename_all = "camelCase")]
    PushRestored { conversation_id: Uuid },
}

struct Subscription {
    handle: SubscriptionHandle,
    stream: MessageStream,
    listener: Option<JoinHandle<()>>,
    poller: Option<JoinHandle<()>>,
    typing: TypingTimer,
    typing_sweep: Option<JoinHandle<()>>,
    typing_seen: Vec<Uuid>,
}

impl Subscription {
    fn new(handle: SubscriptionHandle, stream: MessageStream) -> Self {
        Subscription {
            handle,
            stream,
            listener: None,
            poller: None,
            typing: TypingTimer::new(),
            typing_sweep: None,
            typing_seen: Vec::new(),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        for task in [self.listener.take(), self.poller.take(), self.typing_sweep.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
        self.typing.cancel();
    }
}

/// Where a catch-up may stop walking back.
#[derive(Debug, Clone, Copy)]
enum Backfill {
    /// Newest message already held: recovers what arrived while push was away.
    Newest,
    /// Oldest message already held: refills gaps left inside the stream.
    Oldest,
}

#[derive(Default)]
struct EngineState {
    subscriptions: HashMap<Uuid, Subscription>,
    hidden_senders: HashSet<Uuid>,
}

impl EngineState {
    fn subscription(&mut self, handle: SubscriptionHandle) -> Option<&mut Subscription> {
        self.subscriptions.get_mut(&handle.conversation_id).filter(|s| s.handle == handle)
    }
}

struct Shared<B: MessagingBackend, T: PushTransport> {
    viewer_id: Uuid,
    backend: Arc<B>,
    transport: Arc<T>,
    clock: Arc<dyn Clock>,
    config: MessagingConfig,
    events: mpsc::UnboundedSender<StreamEvent>,
    state: Mutex<EngineState>,
    next_id: AtomicU64,
}

/// Per-viewer delivery engine: keeps one ordered, de-duplicated stream per open
/// conversation, fed by the push channel or, while push is down, by polling.
///
/// Engine state sits behind a std mutex that is never held across an await;
/// events are emitted while holding it so observers see them in state order.
pub struct DeliveryEngine<B: MessagingBackend, T: PushTransport> {
    shared: Arc<Shared<B, T>>,
}

impl<B: MessagingBackend, T: PushTransport> DeliveryEngine<B, T> {
    pub fn start(
        viewer_id: Uuid,
        backend: Arc<B>,
        transport: Arc<T>,
        clock: Arc<dyn Clock>,
        config: MessagingConfig,
    ) -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            viewer_id,
            backend,
            transport,
            clock,
            config,
            events,
            state: Mutex::new(EngineState::default()),
            next_id: AtomicU64::new(1),
        });
        (DeliveryEngine { shared }, rx)
    }

    pub fn viewer_id(&self) -> Uuid {
        self.shared.viewer_id
    }

    /// Opens (or returns the existing) subscription and loads the newest page.
    pub async fn open(&self, conversation_id: Uuid) -> Result<SubscriptionHandle, DeliveryError> {
        let shared = &self.shared;
        if let Some(handle) = shared.handle_of(conversation_id) {
            return Ok(handle);
        }

        let hidden = shared.backend.hidden_senders(shared.viewer_id).await?;

        // subscribe before loading so nothing inserted in between is missed
        let push = shared.transport.subscribe(Topic::Conversation(conversation_id));
        let page = shared.backend.page(conversation_id, shared.viewer_id, None, None).await?;

        let mut state = shared.lock();
        state.hidden_senders = hidden.into_iter().collect();
        if let Some(existing) = state.subscriptions.get(&conversation_id) {
            return Ok(existing.handle);
        }

        let handle = SubscriptionHandle {
            id: shared.next_id.fetch_add(1, Ordering::Relaxed),
            conversation_id,
        };

        let mut stream = MessageStream::new();
        for message in page.messages.iter().cloned() {
            stream.merge(message);
        }
        let mut subscription = Subscription::new(handle, stream);

        shared.emit(StreamEvent::MessagesLoaded {
            conversation_id,
            messages: page.messages,
            has_more: page.has_more,
            next_cursor: page.next_cursor,
        });

        match push {
            Ok(push) => {
                subscription.listener = Some(tokio::spawn(listen(Arc::downgrade(shared), handle, push)));
            }
            Err(err) => {
                tracing::warn!(%conversation_id, error = %err, "push unavailable, polling instead");
                subscription.poller = Some(shared.spawn_poller(handle));
                shared.emit(StreamEvent::PushLost { conversation_id });
            }
        }

        state.subscriptions.insert(conversation_id, subscription);
        tracing::debug!(%conversation_id, user_id = %shared.viewer_id, "conversation opened");
        Ok(handle)
    }

    /// Releases the push listener and every timer of the subscription. Closing
    /// an unknown or already closed handle is a no-op.
    pub fn close(&self, handle: SubscriptionHandle) -> bool {
        let removed = {
            let mut state = self.shared.lock();
            match state.subscriptions.get(&handle.conversation_id) {
                Some(s) if s.handle == handle => state.subscriptions.remove(&handle.conversation_id),
                _ => None,
            }
        };

        match removed {
            Some(subscription) => {
                drop(subscription);
                tracing::debug!(conversation_id = %handle.conversation_id, "conversation closed");
                true
            }
            None => false,
        }
    }

    pub fn shutdown(&self) {
        let subscriptions: Vec<Subscription> = {
            let mut state = self.shared.lock();
            state.subscriptions.drain().map(|(_, s)| s).collect()
        };
        drop(subscriptions);
    }

    pub fn is_open(&self, conversation_id: Uuid) -> bool {
        self.shared.handle_of(conversation_id).is_some()
    }

    pub fn is_polling(&self, conversation_id: Uuid) -> bool {
        self.shared
            .lock()
            .subscriptions
            .get(&conversation_id)
            .is_some_and(|s| s.poller.is_some())
    }

    pub fn snapshot(&self, conversation_id: Uuid) -> Option<Vec<StreamEntry>> {
        self.shared
            .lock()
            .subscriptions
            .get(&conversation_id)
            .map(|s| s.stream.entries().to_vec())
    }

    /// Shows the message immediately as pending and appends it in the
    /// background. The outcome arrives as `MessageReconciled` or, after a
    /// rollback, as `SendFailed` carrying the original content. Nothing is
    /// retried automatically.
    pub fn send(
        &self,
        conversation_id: Uuid,
        message: NewMessage,
    ) -> Result<PendingMessage, DeliveryError> {
        message.check()?;
        let shared = &self.shared;

        let (pending, handle, was_typing) = {
            let mut state = shared.lock();
            let subscription = state
                .subscriptions
                .get_mut(&conversation_id)
                .ok_or(DeliveryError::UnknownSubscription(conversation_id))?;

            let pending = PendingMessage {
                temp_id: Uuid::now_v7(),
                conversation_id,
                sender_id: shared.viewer_id,
                message: message.clone(),
                status: MessageStatus::Sent,
                created_at: shared.clock.now(),
            };
            let index = subscription.stream.insert_pending(pending.clone());
            let was_typing = subscription.typing.cancel();
            let handle = subscription.handle;

            shared.emit(StreamEvent::MessageAdded {
                conversation_id,
                entry: StreamEntry::Pending(pending.clone()),
                index,
            });
            (pending, handle, was_typing)
        };

        let shared = Arc::clone(shared);
        let temp_id = pending.temp_id;
        tokio::spawn(async move {
            let restored = message.clone();
            let result =
                shared.backend.append(conversation_id, shared.viewer_id, message, Some(temp_id)).await;
            shared.finish_send(handle, temp_id, restored, result);

            if was_typing {
                if let Err(e) = shared.backend.stop_typing(conversation_id, shared.viewer_id).await {
                    tracing::debug!(%conversation_id, error = %e, "typing stop after send failed");
                }
            }
        });

        Ok(pending)
    }

    /// Loads the page before `before`, or before the oldest loaded message.
    /// A stale cursor restarts pagination from the newest message.
    pub async fn load_older(
        &self,
        conversation_id: Uuid,
        before: Option<MessageCursor>,
    ) -> Result<MessagePage, DeliveryError> {
        let shared = &self.shared;
        let (handle, before) = {
            let mut state = shared.lock();
            let subscription = state
                .subscriptions
                .get_mut(&conversation_id)
                .ok_or(DeliveryError::UnknownSubscription(conversation_id))?;
            let before = before.or_else(|| subscription.stream.oldest_confirmed().map(|m| m.cursor()));
            (subscription.handle, before)
        };

        let page = match shared.backend.page(conversation_id, shared.viewer_id, None, before).await {
            Err(SystemError::StaleCursor(reason)) => {
                tracing::warn!(%conversation_id, %reason, "stale cursor, restarting from newest");
                shared.backend.page(conversation_id, shared.viewer_id, None, None).await?
            }
            other => other?,
        };

        let mut state = shared.lock();
        if let Some(subscription) = state.subscription(handle) {
            for message in page.messages.iter().cloned() {
                subscription.stream.merge(message);
            }
            shared.emit(StreamEvent::MessagesLoaded {
                conversation_id,
                messages: page.messages.clone(),
                has_more: page.has_more,
                next_cursor: page.next_cursor.clone(),
            });
        }

        Ok(page)
    }

    /// Starting re-arms the local expiry; stopping deletes the indicator now.
    /// Typing is best effort, so backend failures are only logged.
    pub async fn set_typing(&self, conversation_id: Uuid, is_typing: bool) -> Result<(), DeliveryError> {
        let shared = &self.shared;
        let viewer_id = shared.viewer_id;

        if is_typing {
            {
                let mut state = shared.lock();
                let subscription = state
                    .subscriptions
                    .get_mut(&conversation_id)
                    .ok_or(DeliveryError::UnknownSubscription(conversation_id))?;

                let weak = Arc::downgrade(shared);
                subscription.typing.arm(shared.config.typing_ttl, async move {
                    let Some(shared) = weak.upgrade() else { return };
                    if let Err(e) = shared.backend.stop_typing(conversation_id, viewer_id).await {
                        tracing::debug!(%conversation_id, error = %e, "typing expiry failed");
                    }
                });
            }

            if let Err(e) = shared.backend.start_typing(conversation_id, viewer_id).await {
                tracing::debug!(%conversation_id, error = %e, "typing start failed");
            }
        } else {
            {
                let mut state = shared.lock();
                let subscription = state
                    .subscriptions
                    .get_mut(&conversation_id)
                    .ok_or(DeliveryError::UnknownSubscription(conversation_id))?;
                subscription.typing.cancel();
            }

            if let Err(e) = shared.backend.stop_typing(conversation_id, viewer_id).await {
                tracing::debug!(%conversation_id, error = %e, "typing stop failed");
            }
        }

        Ok(())
    }

    pub async fn mark_read(
        &self,
        conversation_id: Uuid,
        message_ids: &[Uuid],
    ) -> Result<Vec<StatusChange>, DeliveryError> {
        let changes =
            self.shared.backend.mark_read(conversation_id, self.shared.viewer_id, message_ids).await?;
        Ok(changes)
    }

    pub async fn set_metadata(
        &self,
        conversation_id: Uuid,
        patch: MetadataPatch,
    ) -> Result<ConversationMetadata, DeliveryError> {
        let metadata =
            self.shared.backend.set_metadata(conversation_id, self.shared.viewer_id, patch).await?;
        Ok(metadata)
    }

    /// Blocks `user_id` and drops their messages from every open stream.
    pub async fn block(
        &self,
        user_id: Uuid,
        reason: Option<String>,
    ) -> Result<BlockEntity, DeliveryError> {
        let shared = &self.shared;
        let block = shared.backend.block(shared.viewer_id, user_id, reason).await?;

        let mut state = shared.lock();
        state.hidden_senders.insert(user_id);
        for (conversation_id, subscription) in state.subscriptions.iter_mut() {
            let message_ids = subscription.stream.remove_from_sender(&user_id);
            if !message_ids.is_empty() {
                shared.emit(StreamEvent::MessagesHidden {
                    conversation_id: *conversation_id,
                    message_ids,
                });
            }
        }

        Ok(block)
    }

    /// Unblocks `user_id` and re-pages every open stream back to its oldest
    /// loaded message so their messages reappear in place. History older than
    /// that comes back through `load_older` as usual.
    pub async fn unblock(&self, user_id: Uuid) -> Result<bool, DeliveryError> {
        let shared = &self.shared;
        let removed = shared.backend.unblock(shared.viewer_id, user_id).await?;

        let handles: Vec<SubscriptionHandle> = {
            let mut state = shared.lock();
            state.hidden_senders.remove(&user_id);
            state.subscriptions.values().map(|s| s.handle).collect()
        };

        for handle in handles {
            shared.catch_up(handle, Backfill::Oldest).await;
        }

        Ok(removed)
    }
}

impl<B: MessagingBackend, T: PushTransport> Drop for DeliveryEngine<B, T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<B: MessagingBackend, T: PushTransport> Shared<B, T> {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: StreamEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!(user_id = %self.viewer_id, "stream observer gone, event dropped");
        }
    }

    fn handle_of(&self, conversation_id: Uuid) -> Option<SubscriptionHandle> {
        self.lock().subscriptions.get(&conversation_id).map(|s| s.handle)
    }

    fn spawn_poller(self: &Arc<Self>, handle: SubscriptionHandle) -> JoinHandle<()> {
        tokio::spawn(poll(Arc::downgrade(self), handle, self.config.poll_interval))
    }

    fn finish_send(
        &self,
        handle: SubscriptionHandle,
        temp_id: Uuid,
        restored: NewMessage,
        result: Result<MessageEntity, SystemError>,
    ) {
        let conversation_id = handle.conversation_id;
        let mut state = self.lock();

        match result {
            Ok(message) => {
                let Some(subscription) = state.subscription(handle) else {
                    return;
                };
                if let ReconcileOutcome::Replaced(index) =
                    subscription.stream.reconcile(&temp_id, message.clone())
                {
                    self.emit(StreamEvent::MessageReconciled { conversation_id, temp_id, message, index });
                }
            }
            Err(source) => {
                let err = DeliveryError::SendFailed { temp_id, source };
                tracing::warn!(%conversation_id, error = %err, "optimistic send rolled back");

                if let Some(subscription) = state.subscription(handle) {
                    subscription.stream.rollback(&temp_id);
                }
                self.emit(StreamEvent::SendFailed {
                    conversation_id,
                    temp_id,
                    restored,
                    reason: err.client_message(),
                    retryable: err.is_retryable(),
                });
            }
        }
    }

    /// Merges incoming rows and acknowledges delivery of new ones from others.
    async fn deliver(self: &Arc<Self>, handle: SubscriptionHandle, messages: Vec<MessageEntity>) {
        let conversation_id = handle.conversation_id;

        let delivered: Vec<Uuid> = {
            let mut state = self.lock();
            let hidden = state.hidden_senders.clone();
            let Some(subscription) = state.subscription(handle) else {
                return;
            };

            let mut delivered = Vec::new();
            for message in messages.into_iter().filter(|m| !hidden.contains(&m.sender_id)) {
                let from_other = message.sender_id != self.viewer_id;
                let message_id = message.id;

                match subscription.stream.merge(message.clone()) {
                    MergeOutcome::Inserted(index) => {
                        self.emit(StreamEvent::MessageAdded {
                            conversation_id,
                            entry: StreamEntry::Confirmed(message),
                            index,
                        });
                        if from_other {
                            delivered.push(message_id);
                        }
                    }
                    MergeOutcome::Reconciled { temp_id, index } => {
                        self.emit(StreamEvent::MessageReconciled {
                            conversation_id,
                            temp_id,
                            message,
                            index,
                        });
                    }
                    MergeOutcome::Duplicate => {}
                }
            }
            delivered
        };

        if delivered.is_empty() {
            return;
        }
        if let Err(e) =
            self.backend.acknowledge_delivered(conversation_id, self.viewer_id, &delivered).await
        {
            tracing::warn!(%conversation_id, error = %e, "delivery acknowledgement failed");
        }
    }

    async fn on_push(self: &Arc<Self>, handle: SubscriptionHandle, event: PushEvent) {
        let conversation_id = handle.conversation_id;

        match event {
            PushEvent::MessageInserted { message } => {
                if message.conversation_id == conversation_id {
                    self.deliver(handle, vec![message]).await;
                }
            }
            PushEvent::StatusChanged { message_id, status, .. } => {
                let mut state = self.lock();
                let Some(subscription) = state.subscription(handle) else {
                    return;
                };
                if let Some(status) = subscription.stream.advance_status(&message_id, status) {
                    self.emit(StreamEvent::StatusChanged { conversation_id, message_id, status });
                }
            }
            PushEvent::TypingChanged { indicator, .. } => {
                if indicator.user_id != self.viewer_id {
                    self.on_typing(handle).await;
                }
            }
            PushEvent::PresenceChanged { .. } => {}
        }
    }

    /// Re-reads live typing indicators. Returns how long until the oldest one
    /// expires, if anyone is still typing.
    async fn refresh_typing(&self, handle: SubscriptionHandle) -> Option<Duration> {
        let conversation_id = handle.conversation_id;
        let typing = match self.backend.observe_typing(conversation_id, self.viewer_id).await {
            Ok(typing) => typing,
            Err(e) => {
                tracing::debug!(%conversation_id, error = %e, "typing refresh failed");
                return None;
            }
        };

        let ttl = chrono::Duration::from_std(self.config.typing_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(5));
        let now = self.clock.now();
        let user_ids: Vec<Uuid> = typing.iter().map(|t| t.user_id).collect();
        let next_expiry = typing.iter().map(|t| t.expires_at(ttl)).min();

        let mut state = self.lock();
        let subscription = state.subscription(handle)?;
        if subscription.typing_seen != user_ids {
            subscription.typing_seen = user_ids.clone();
            self.emit(StreamEvent::TypingChanged { conversation_id, user_ids });
        }

        next_expiry.map(|expiry| (expiry - now).to_std().unwrap_or(Duration::ZERO))
    }

    /// Refreshes now and keeps one sweep task re-checking at each expiry.
    async fn on_typing(self: &Arc<Self>, handle: SubscriptionHandle) {
        let Some(delay) = self.refresh_typing(handle).await else {
            return;
        };

        let deadline = tokio::time::Instant::now() + delay;
        let sweep = tokio::spawn(sweep_typing(Arc::downgrade(self), handle, deadline));
        let mut state = self.lock();
        match state.subscription(handle) {
            Some(subscription) => {
                if let Some(previous) = subscription.typing_sweep.replace(sweep) {
                    previous.abort();
                }
            }
            None => sweep.abort(),
        }
    }

    /// Pages back from the newest message until the fetched range meets the
    /// `backfill` anchor in the stream, so nothing between them is skipped.
    /// An empty stream only needs the newest page.
    async fn catch_up(self: &Arc<Self>, handle: SubscriptionHandle, backfill: Backfill) {
        let conversation_id = handle.conversation_id;
        let floor = {
            let mut state = self.lock();
            let Some(subscription) = state.subscription(handle) else {
                return;
            };
            let anchor = match backfill {
                Backfill::Newest => subscription.stream.newest_confirmed(),
                Backfill::Oldest => subscription.stream.oldest_confirmed(),
            };
            anchor.map(MessageEntity::order_key)
        };

        let mut before = None;
        loop {
            let page = match self.backend.page(conversation_id, self.viewer_id, None, before).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(%conversation_id, error = %e, "catch-up page failed");
                    return;
                }
            };

            let oldest = page.messages.first().map(|m| (m.order_key(), m.cursor()));
            let has_more = page.has_more;
            self.deliver(handle, page.messages).await;

            if self.handle_of(conversation_id) != Some(handle) {
                return;
            }
            match (floor, oldest) {
                (Some(floor), Some((key, cursor))) if has_more && key > floor => {
                    tracing::debug!(%conversation_id, "catch-up walking back past a full page");
                    before = Some(cursor);
                }
                _ => return,
            }
        }
    }

    fn push_lost(self: &Arc<Self>, handle: SubscriptionHandle, err: TransportError) {
        let conversation_id = handle.conversation_id;
        let mut state = self.lock();
        let Some(subscription) = state.subscription(handle) else {
            return;
        };

        tracing::warn!(%conversation_id, error = %err, "push lost, falling back to polling");
        subscription.listener = None;
        if subscription.poller.is_none() {
            subscription.poller = Some(self.spawn_poller(handle));
        }
        self.emit(StreamEvent::PushLost { conversation_id });
    }

    /// Returns true when polling should stop: push is back or the
    /// subscription is gone.
    fn try_restore_push(self: &Arc<Self>, handle: SubscriptionHandle) -> bool {
        let conversation_id = handle.conversation_id;
        let Ok(push) = self.transport.subscribe(Topic::Conversation(conversation_id)) else {
            return false;
        };

        let mut state = self.lock();
        let Some(subscription) = state.subscription(handle) else {
            return true;
        };

        subscription.listener = Some(tokio::spawn(listen(Arc::downgrade(self), handle, push)));
        // detaches the calling poll task, which returns right after
        subscription.poller = None;
        tracing::info!(%conversation_id, "push restored");
        self.emit(StreamEvent::PushRestored { conversation_id });
        true
    }
}

async fn listen<B: MessagingBackend, T: PushTransport>(
    shared: Weak<Shared<B, T>>,
    handle: SubscriptionHandle,
    mut push: PushSubscription,
) {
    loop {
        let received = push.recv().await;
        let Some(shared) = shared.upgrade() else {
            return;
        };

        match received {
            Ok(event) => shared.on_push(handle, event).await,
            Err(TransportError::Lagged(missed)) => {
                tracing::warn!(conversation_id = %handle.conversation_id, missed, "push lagged, resyncing");
                shared.catch_up(handle, Backfill::Newest).await;
            }
            Err(err) => {
                shared.push_lost(handle, err);
                return;
            }
        }
    }
}

async fn sweep_typing<B: MessagingBackend, T: PushTransport>(
    shared: Weak<Shared<B, T>>,
    handle: SubscriptionHandle,
    mut deadline: tokio::time::Instant,
) {
    loop {
        tokio::time::sleep_until(deadline).await;
        let Some(shared) = shared.upgrade() else {
            return;
        };

        match shared.refresh_typing(handle).await {
            Some(next) => deadline = tokio::time::Instant::now() + next,
            None => return,
        }
    }
}

/// Polls every `interval`, first tick immediately. Each tick tries to get
/// push back before polling; the task ends once it has.
async fn poll<B: MessagingBackend, T: PushTransport>(
    shared: Weak<Shared<B, T>>,
    handle: SubscriptionHandle,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            return;
        };

        let restored = shared.try_restore_push(handle);
        shared.catch_up(handle, Backfill::Newest).await;
        if restored {
            return;
        }
    }
}
