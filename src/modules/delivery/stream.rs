use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::modules::message::{
    model::NewMessage,
    schema::{MessageEntity, MessageStatus},
};

/// Locally fabricated copy of a message the viewer is sending.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMessage {
    pub temp_id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub message: NewMessage,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum StreamEntry {
    Pending(PendingMessage),
    Confirmed(MessageEntity),
}

impl StreamEntry {
    pub fn id(&self) -> Uuid {
        match self {
            StreamEntry::Pending(p) => p.temp_id,
            StreamEntry::Confirmed(m) => m.id,
        }
    }

    fn order_key(&self) -> (DateTime<Utc>, Uuid) {
        match self {
            StreamEntry::Pending(p) => (p.created_at, p.temp_id),
            StreamEntry::Confirmed(m) => m.order_key(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New identity, placed by total order.
    Inserted(usize),
    /// Identity already visible; nothing changed.
    Duplicate,
    /// Echo of one of our pending sends; swapped in at the pending slot.
    Reconciled { temp_id: Uuid, index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Replaced(usize),
    /// The authoritative row arrived first (push beat the append response).
    AlreadyPresent,
    /// The pending entry is gone, e.g. rolled back or the stream was reset.
    Unknown,
}

/// Ordered, identity-indexed view of one conversation. Every insertion is an
/// upsert by id, so a message reaching us over several paths shows up once.
#[derive(Debug, Default)]
pub struct MessageStream {
    entries: Vec<StreamEntry>,
    confirmed: HashSet<Uuid>,
}

impl MessageStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[StreamEntry] {
        &self.entries
    }

    pub fn contains(&self, message_id: &Uuid) -> bool {
        self.confirmed.contains(message_id)
    }

    pub fn insert_pending(&mut self, pending: PendingMessage) -> usize {
        let entry = StreamEntry::Pending(pending);
        let index = self.position_for(entry.order_key());
        self.entries.insert(index, entry);
        index
    }

    pub fn merge(&mut self, message: MessageEntity) -> MergeOutcome {
        if self.confirmed.contains(&message.id) {
            return MergeOutcome::Duplicate;
        }

        if let Some(temp_id) = message.client_ref {
            if let Some(index) = self.pending_index(&temp_id) {
                self.confirmed.insert(message.id);
                self.entries[index] = StreamEntry::Confirmed(message);
                return MergeOutcome::Reconciled { temp_id, index };
            }
        }

        let index = self.position_for(message.order_key());
        self.confirmed.insert(message.id);
        self.entries.insert(index, StreamEntry::Confirmed(message));
        MergeOutcome::Inserted(index)
    }

    /// Swaps the pending entry for the stored row, in place.
    pub fn reconcile(&mut self, temp_id: &Uuid, message: MessageEntity) -> ReconcileOutcome {
        if self.confirmed.contains(&message.id) {
            if let Some(index) = self.pending_index(temp_id) {
                self.entries.remove(index);
            }
            return ReconcileOutcome::AlreadyPresent;
        }

        match self.pending_index(temp_id) {
            Some(index) => {
                self.confirmed.insert(message.id);
                self.entries[index] = StreamEntry::Confirmed(message);
                ReconcileOutcome::Replaced(index)
            }
            None => ReconcileOutcome::Unknown,
        }
    }

    /// Drops a pending entry and hands it back so its content can be restored.
    pub fn rollback(&mut self, temp_id: &Uuid) -> Option<PendingMessage> {
        let index = self.pending_index(temp_id)?;
        match self.entries.remove(index) {
            StreamEntry::Pending(pending) => Some(pending),
            StreamEntry::Confirmed(_) => None,
        }
    }

    /// Returns the new status when it moved forward.
    pub fn advance_status(
        &mut self,
        message_id: &Uuid,
        status: MessageStatus,
    ) -> Option<MessageStatus> {
        self.entries.iter_mut().find_map(|entry| match entry {
            StreamEntry::Confirmed(m) if m.id == *message_id => {
                let next = m.status.advance(status);
                if next == m.status {
                    None
                } else {
                    m.status = next;
                    Some(next)
                }
            }
            _ => None,
        })
    }

    /// Removes every confirmed message of `sender_id`; returns their ids.
    pub fn remove_from_sender(&mut self, sender_id: &Uuid) -> Vec<Uuid> {
        let mut removed = Vec::new();
        self.entries.retain(|entry| match entry {
            StreamEntry::Confirmed(m) if m.sender_id == *sender_id => {
                removed.push(m.id);
                false
            }
            _ => true,
        });
        for id in &removed {
            self.confirmed.remove(id);
        }
        removed
    }

    pub fn oldest_confirmed(&self) -> Option<&MessageEntity> {
        self.entries.iter().find_map(|entry| match entry {
            StreamEntry::Confirmed(m) => Some(m),
            StreamEntry::Pending(_) => None,
        })
    }

    pub fn newest_confirmed(&self) -> Option<&MessageEntity> {
        self.entries.iter().rev().find_map(|entry| match entry {
            StreamEntry::Confirmed(m) => Some(m),
            StreamEntry::Pending(_) => None,
        })
    }

    fn pending_index(&self, temp_id: &Uuid) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| matches!(entry, StreamEntry::Pending(p) if p.temp_id == *temp_id))
    }

    /// Slot after the last entry that sorts before `key`. Scans from the tail
    /// since live traffic lands at the end.
    fn position_for(&self, key: (DateTime<Utc>, Uuid)) -> usize {
        self.entries
            .iter()
            .rposition(|entry| entry.order_key() < key)
            .map_or(0, |index| index + 1)
    }
}
