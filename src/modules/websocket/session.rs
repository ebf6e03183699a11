/// WebSocket session actor.
///
/// One actor per connection. After `auth` it owns a delivery engine for the
/// user; engine events and presence changes are forwarded to the socket
/// through the outbound channel bridged in `handler.rs`.
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use actix::prelude::*;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    constants::MessagingConfig,
    modules::{
        block::repository_pg::BlockPgRepository,
        conversation::{handle::ConversationSvc, repository_pg::ConversationPgRepository},
        delivery::{
            backend::ServiceBackend,
            engine::{DeliveryEngine, SubscriptionHandle},
            error::DeliveryError,
            transport::{PushEvent, PushHub, PushTransport, Topic, TransportError},
        },
        message::{model::MessageCursor, repository_pg::MessageRepositoryPg},
        metadata::repository_pg::MetadataPgRepository,
        presence::{handle::PresenceSvc, schema::PresenceStatus},
        receipt::repository_pg::ReceiptPgRepository,
        typing::repository_redis::TypingRedisRepository,
    },
    utils::{Claims, Clock},
    ENV,
};

use super::message::{ClientMessage, ServerMessage};
use super::registry::SessionRegistry;

pub type PgBackend = ServiceBackend<
    ConversationPgRepository,
    MessageRepositoryPg,
    ReceiptPgRepository,
    MetadataPgRepository,
    TypingRedisRepository,
    BlockPgRepository,
>;

pub type Engine = DeliveryEngine<PgBackend, PushHub>;

/// Dependencies shared by every socket, built once at startup.
#[derive(Clone)]
pub struct Realtime {
    pub backend: Arc<PgBackend>,
    pub hub: Arc<PushHub>,
    pub presence: PresenceSvc,
    pub conversations: ConversationSvc,
    pub sessions: Arc<SessionRegistry>,
    pub clock: Arc<dyn Clock>,
    pub config: MessagingConfig,
}

/// Users whose presence changes this socket forwards. Loaded after auth and
/// reloaded whenever the viewer's peers may have changed.
#[derive(Debug, Default)]
struct PresenceAudience {
    peers: RwLock<HashSet<Uuid>>,
}

impl PresenceAudience {
    fn contains(&self, user_id: &Uuid) -> bool {
        self.peers.read().unwrap_or_else(PoisonError::into_inner).contains(user_id)
    }

    fn replace(&self, peers: HashSet<Uuid>) {
        *self.peers.write().unwrap_or_else(PoisonError::into_inner) = peers;
    }
}

/// Returns false once the socket side is gone.
fn send_json(tx: &mpsc::UnboundedSender<String>, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => tx.send(json).is_ok(),
        Err(e) => {
            tracing::error!("Cannot serialize server message: {}", e);
            true
        }
    }
}

pub struct WebSocketSession {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    realtime: Realtime,
    tx: mpsc::UnboundedSender<String>,
    engine: Option<Arc<Engine>>,
    subscriptions: HashMap<Uuid, SubscriptionHandle>,
    forwarders: Vec<JoinHandle<()>>,
    audience: Arc<PresenceAudience>,
}

impl WebSocketSession {
    pub fn new(realtime: Realtime, tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: None,
            realtime,
            tx,
            engine: None,
            subscriptions: HashMap::new(),
            forwarders: Vec::new(),
            audience: Arc::new(PresenceAudience::default()),
        }
    }

    /// Future that reloads the presence audience; a no-op before auth.
    fn reload_audience(&self) -> impl Future<Output = ()> + 'static {
        let user_id = self.user_id;
        let conversations = self.realtime.conversations.clone();
        let audience = self.audience.clone();
        async move {
            let Some(user_id) = user_id else {
                return;
            };
            match conversations.presence_peers(user_id).await {
                Ok(peers) => audience.replace(peers),
                Err(e) => tracing::warn!("Cannot load presence peers for user {}: {}", user_id, e),
            }
        }
    }

    fn send_to_client(&self, msg: &ServerMessage) {
        if !send_json(&self.tx, msg) {
            tracing::debug!("Session {} outbound channel closed", self.id);
        }
    }

    fn send_error(&self, message: impl Into<String>) {
        self.send_to_client(&ServerMessage::Error { message: message.into() });
    }

    fn require_engine(&self) -> Option<Arc<Engine>> {
        if self.engine.is_none() {
            self.send_error("Authenticate before using this connection");
            tracing::warn!("Session {} is not authenticated, request rejected", self.id);
        }
        self.engine.clone()
    }

    /// Runs `work` on the actor and sends whatever it yields back to the client.
    fn reply<F>(&self, ctx: &mut Context<Self>, work: F)
    where
        F: std::future::Future<Output = ServerMessage> + 'static,
    {
        let tx = self.tx.clone();
        ctx.spawn(
            async move {
                send_json(&tx, &work.await);
            }
            .into_actor(self),
        );
    }

    fn handle_client_message(&mut self, msg: ClientMessage, ctx: &mut Context<Self>) {
        match msg {
            ClientMessage::Auth { token } => self.handle_auth(&token),
            ClientMessage::Ping => self.send_to_client(&ServerMessage::Pong),
            ClientMessage::Heartbeat { status } => self.handle_heartbeat(status, ctx),
            ClientMessage::Open { conversation_id } => self.handle_open(conversation_id, ctx),
            ClientMessage::Close { conversation_id } => self.handle_close(conversation_id),
            other => {
                let Some(engine) = self.require_engine() else {
                    return;
                };
                self.handle_engine_message(engine, other, ctx);
            }
        }
    }

    fn handle_auth(&mut self, token: &str) {
        if self.user_id.is_some() {
            self.send_error("Session is already authenticated");
            return;
        }

        let claims = match Claims::decode(token, ENV.jwt_secret.as_ref()) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!("JWT verification failed (session {}): {}", self.id, e);
                self.send_to_client(&ServerMessage::AuthFailed {
                    reason: "Token invalid or expired".to_string(),
                });
                return;
            }
        };

        let user_id = claims.sub;
        let realtime = &self.realtime;
        let (engine, mut events) = DeliveryEngine::start(
            user_id,
            realtime.backend.clone(),
            realtime.hub.clone(),
            realtime.clock.clone(),
            realtime.config.clone(),
        );

        let tx = self.tx.clone();
        self.forwarders.push(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if !send_json(&tx, &ServerMessage::Stream(event)) {
                    break;
                }
            }
        }));

        match realtime.hub.subscribe(Topic::Presence) {
            Ok(mut presence_events) => {
                let tx = self.tx.clone();
                let audience = self.audience.clone();
                self.forwarders.push(tokio::spawn(async move {
                    loop {
                        match presence_events.recv().await {
                            Ok(PushEvent::PresenceChanged { presence }) => {
                                if !audience.contains(&presence.user_id) {
                                    continue;
                                }
                                if !send_json(&tx, &ServerMessage::Presence { presence }) {
                                    break;
                                }
                            }
                            Ok(_) | Err(TransportError::Lagged(_)) => {}
                            Err(_) => break,
                        }
                    }
                }));
            }
            Err(e) => tracing::warn!("Presence updates unavailable (session {}): {}", self.id, e),
        }

        let presence = realtime.presence.clone();
        actix_web::rt::spawn(async move {
            if let Err(e) = presence.heartbeat(user_id, PresenceStatus::Online).await {
                tracing::warn!("Cannot mark user {} online: {}", user_id, e);
            }
        });

        if !realtime.sessions.connect(user_id, self.id) {
            tracing::debug!("User {} has {} live sessions", user_id, realtime.sessions.session_count(&user_id));
        }

        self.user_id = Some(user_id);
        actix_web::rt::spawn(self.reload_audience());
        self.engine = Some(Arc::new(engine));
        self.send_to_client(&ServerMessage::AuthSuccess { user_id });
        tracing::info!("User {} authenticated on session {}", user_id, self.id);
    }

    fn handle_heartbeat(&self, status: PresenceStatus, ctx: &mut Context<Self>) {
        let Some(user_id) = self.user_id else {
            self.send_error("Authenticate before using this connection");
            return;
        };

        let presence = self.realtime.presence.clone();
        self.reply(ctx, async move {
            match presence.heartbeat(user_id, status).await {
                Ok(presence) => ServerMessage::Presence { presence },
                Err(e) => ServerMessage::Error { message: DeliveryError::from(e).client_message() },
            }
        });
    }

    fn handle_open(&self, conversation_id: Uuid, ctx: &mut Context<Self>) {
        let Some(engine) = self.require_engine() else {
            return;
        };

        ctx.spawn(async move { engine.open(conversation_id).await }.into_actor(self).map(
            move |result, act, _ctx| match result {
                Ok(handle) => {
                    act.subscriptions.insert(conversation_id, handle);
                    actix_web::rt::spawn(act.reload_audience());
                    act.send_to_client(&ServerMessage::Opened { conversation_id });
                }
                Err(e) => {
                    tracing::warn!("Cannot open conversation {} (session {}): {}", conversation_id, act.id, e);
                    act.send_error(e.client_message());
                }
            },
        ));
    }

    fn handle_close(&mut self, conversation_id: Uuid) {
        let Some(engine) = self.require_engine() else {
            return;
        };

        if let Some(handle) = self.subscriptions.remove(&conversation_id) {
            engine.close(handle);
        }
        self.send_to_client(&ServerMessage::Closed { conversation_id });
    }

    fn handle_engine_message(&self, engine: Arc<Engine>, msg: ClientMessage, ctx: &mut Context<Self>) {
        match msg {
            ClientMessage::Send { conversation_id, message } => {
                if let Err(e) = engine.send(conversation_id, message) {
                    self.send_error(e.client_message());
                }
            }

            ClientMessage::LoadOlder { conversation_id, cursor } => {
                let before = match cursor.as_deref().map(str::parse::<MessageCursor>).transpose() {
                    Ok(before) => before,
                    Err(_) => {
                        self.send_error("Invalid cursor");
                        return;
                    }
                };
                let tx = self.tx.clone();
                ctx.spawn(
                    async move {
                        // the page itself arrives as a stream event
                        if let Err(e) = engine.load_older(conversation_id, before).await {
                            send_json(&tx, &ServerMessage::Error { message: e.client_message() });
                        }
                    }
                    .into_actor(self),
                );
            }

            ClientMessage::SetTyping { conversation_id, is_typing } => {
                let tx = self.tx.clone();
                ctx.spawn(
                    async move {
                        if let Err(e) = engine.set_typing(conversation_id, is_typing).await {
                            send_json(&tx, &ServerMessage::Error { message: e.client_message() });
                        }
                    }
                    .into_actor(self),
                );
            }

            ClientMessage::MarkRead { conversation_id, message_ids } => {
                self.reply(ctx, async move {
                    match engine.mark_read(conversation_id, &message_ids).await {
                        Ok(changes) => ServerMessage::ReadMarked { conversation_id, changes },
                        Err(e) => ServerMessage::Error { message: e.client_message() },
                    }
                });
            }

            ClientMessage::SetMetadata { conversation_id, patch } => {
                self.reply(ctx, async move {
                    match engine.set_metadata(conversation_id, patch).await {
                        Ok(metadata) => ServerMessage::MetadataUpdated { conversation_id, metadata },
                        Err(e) => ServerMessage::Error { message: e.client_message() },
                    }
                });
            }

            ClientMessage::Block { user_id, reason } => {
                let reload = self.reload_audience();
                self.reply(ctx, async move {
                    match engine.block(user_id, reason).await {
                        Ok(block) => {
                            reload.await;
                            ServerMessage::Blocked { block }
                        }
                        Err(e) => ServerMessage::Error { message: e.client_message() },
                    }
                });
            }

            ClientMessage::Unblock { user_id } => {
                let reload = self.reload_audience();
                self.reply(ctx, async move {
                    match engine.unblock(user_id).await {
                        Ok(removed) => {
                            reload.await;
                            ServerMessage::Unblocked { user_id, removed }
                        }
                        Err(e) => ServerMessage::Error { message: e.client_message() },
                    }
                });
            }

            ClientMessage::Auth { .. }
            | ClientMessage::Ping
            | ClientMessage::Heartbeat { .. }
            | ClientMessage::Open { .. }
            | ClientMessage::Close { .. } => {}
        }
    }
}

impl Actor for WebSocketSession {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::debug!("WebSocket session started: {}", self.id);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        for task in self.forwarders.drain(..) {
            task.abort();
        }
        if let Some(engine) = self.engine.take() {
            engine.shutdown();
        }

        // other devices keep the user online; staleness covers crashed ones
        let last_session =
            self.user_id.filter(|user_id| self.realtime.sessions.disconnect(*user_id, self.id));
        if let Some(user_id) = last_session {
            let presence = self.realtime.presence.clone();
            actix_web::rt::spawn(async move {
                if let Err(e) = presence.sign_out(user_id).await {
                    tracing::warn!("Cannot mark user {} offline: {}", user_id, e);
                }
            });
        }

        tracing::debug!("WebSocket session stopped: {}", self.id);
    }
}

impl Message for ClientMessage {
    type Result = ();
}

impl Handler<ClientMessage> for WebSocketSession {
    type Result = ();

    fn handle(&mut self, msg: ClientMessage, ctx: &mut Context<Self>) {
        self.handle_client_message(msg, ctx);
    }
}

/// Sent by the socket loop when the connection ends.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect;

impl Handler<Disconnect> for WebSocketSession {
    type Result = ();

    fn handle(&mut self, _msg: Disconnect, ctx: &mut Context<Self>) {
        ctx.stop();
    }
}
