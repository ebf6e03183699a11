use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::modules::{
    message::schema::{MessageEntity, MessageStatus},
    presence::schema::PresenceRecord,
    typing::schema::TypingIndicator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Conversation(Uuid),
    Presence,
}

/// Row-change notifications fanned out to subscribers of a topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PushEvent {
    #[serde(rename_all = "camelCase")]
    MessageInserted { message: MessageEntity },
    #[serde(rename_all = "camelCase")]
    StatusChanged { conversation_id: Uuid, message_id: Uuid, status: MessageStatus },
    #[serde(rename_all = "camelCase")]
    TypingChanged { indicator: TypingIndicator, active: bool },
    #[serde(rename_all = "camelCase")]
    PresenceChanged { presence: PresenceRecord },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Push transport is unavailable")]
    Unavailable,
    #[error("Push subscription closed")]
    Closed,
    #[error("Push subscriber lagged behind by {0} events")]
    Lagged(u64),
}

pub struct PushSubscription {
    topic: Topic,
    rx: broadcast::Receiver<PushEvent>,
}

impl PushSubscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub async fn recv(&mut self) -> Result<PushEvent, TransportError> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => TransportError::Closed,
            broadcast::error::RecvError::Lagged(n) => TransportError::Lagged(n),
        })
    }
}

/// Subscribe/publish contract of the push channel. Delivery is best effort:
/// publishing never fails, a subscriber that cannot keep up sees `Lagged`.
pub trait PushTransport: Send + Sync + 'static {
    fn subscribe(&self, topic: Topic) -> Result<PushSubscription, TransportError>;

    fn publish(&self, topic: Topic, event: PushEvent);
}

struct HubState {
    online: bool,
    topics: HashMap<Topic, broadcast::Sender<PushEvent>>,
}

/// In-process push transport: one broadcast channel per topic.
pub struct PushHub {
    capacity: usize,
    state: Mutex<HubState>,
}

impl PushHub {
    pub fn new(capacity: usize) -> Self {
        PushHub {
            capacity: capacity.max(1),
            state: Mutex::new(HubState { online: true, topics: HashMap::new() }),
        }
    }

    /// Drops every channel so all subscribers observe `Closed`, and rejects new
    /// subscriptions until [`PushHub::resume`].
    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.online = false;
        let dropped = state.topics.len();
        state.topics.clear();
        tracing::info!(topics = dropped, "push hub shut down");
    }

    pub fn resume(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.online = true;
        tracing::info!("push hub resumed");
    }

    pub fn is_online(&self) -> bool {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).online
    }
}

impl PushTransport for PushHub {
    fn subscribe(&self, topic: Topic) -> Result<PushSubscription, TransportError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.online {
            return Err(TransportError::Unavailable);
        }

        let capacity = self.capacity;
        let rx = state
            .topics
            .entry(topic)
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe();

        Ok(PushSubscription { topic, rx })
    }

    fn publish(&self, topic: Topic, event: PushEvent) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.online {
            tracing::debug!(?topic, "push hub offline, event dropped");
            return;
        }

        let Some(sender) = state.topics.get(&topic) else {
            return;
        };

        if sender.send(event).is_err() {
            // last receiver went away
            state.topics.remove(&topic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_event(conversation_id: Uuid) -> PushEvent {
        PushEvent::StatusChanged {
            conversation_id,
            message_id: Uuid::now_v7(),
            status: MessageStatus::Delivered,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_only_topic_subscribers() {
        let hub = PushHub::new(8);
        let (c1, c2) = (Uuid::now_v7(), Uuid::now_v7());
        let mut sub1 = hub.subscribe(Topic::Conversation(c1)).unwrap();
        let mut sub2 = hub.subscribe(Topic::Conversation(c2)).unwrap();

        let event = status_event(c1);
        hub.publish(Topic::Conversation(c1), event.clone());

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert!(sub2.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_closes_subscribers_and_rejects_new_ones() {
        let hub = PushHub::new(8);
        let topic = Topic::Conversation(Uuid::now_v7());
        let mut sub = hub.subscribe(topic).unwrap();

        hub.shutdown();
        assert_eq!(sub.recv().await.unwrap_err(), TransportError::Closed);
        assert_eq!(hub.subscribe(topic).err(), Some(TransportError::Unavailable));

        hub.resume();
        assert!(hub.subscribe(topic).is_ok());
    }

    #[tokio::test]
    async fn test_slow_subscriber_reports_lag() {
        let hub = PushHub::new(1);
        let conversation_id = Uuid::now_v7();
        let topic = Topic::Conversation(conversation_id);
        let mut sub = hub.subscribe(topic).unwrap();

        hub.publish(topic, status_event(conversation_id));
        hub.publish(topic, status_event(conversation_id));

        assert_eq!(sub.recv().await.unwrap_err(), TransportError::Lagged(1));
    }

    #[test]
    fn test_push_event_is_tagged() {
        let event = status_event(Uuid::now_v7());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"statusChanged\""));
        assert!(json.contains("\"messageId\""));
    }
}
