use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
}

/// Stored under `presence:{user_id}`; overwritten on every heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub user_id: Uuid,
    pub status: PresenceStatus,
    pub last_seen: Option<DateTime<Utc>>,
}

impl PresenceRecord {
    pub fn unknown(user_id: Uuid) -> Self {
        PresenceRecord { user_id, status: PresenceStatus::Offline, last_seen: None }
    }

    /// Reported status once staleness is applied: a user that stopped
    /// heartbeating is offline regardless of the last asserted status.
    pub fn effective(mut self, now: DateTime<Utc>, stale_after: chrono::Duration) -> Self {
        let stale = match self.last_seen {
            Some(seen) => now - seen >= stale_after,
            None => true,
        };
        if stale {
            self.status = PresenceStatus::Offline;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_heartbeat_reads_as_offline() {
        let now = Utc::now();
        let record = PresenceRecord {
            user_id: Uuid::now_v7(),
            status: PresenceStatus::Away,
            last_seen: Some(now - chrono::Duration::seconds(61)),
        };

        let fresh = record.clone().effective(now - chrono::Duration::seconds(30), chrono::Duration::seconds(60));
        assert_eq!(fresh.status, PresenceStatus::Away);

        let stale = record.effective(now, chrono::Duration::seconds(60));
        assert_eq!(stale.status, PresenceStatus::Offline);
        assert!(stale.last_seen.is_some());
    }
}
