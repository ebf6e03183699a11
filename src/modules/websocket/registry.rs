/// Live sockets per user.
///
/// A user can be connected from several devices at once; presence only goes
/// offline when the last of their sockets closes.
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    users: Mutex<HashMap<Uuid, HashSet<Uuid>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn users(&self) -> MutexGuard<'_, HashMap<Uuid, HashSet<Uuid>>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true for the user's first live session.
    pub fn connect(&self, user_id: Uuid, session_id: Uuid) -> bool {
        let mut users = self.users();
        let sessions = users.entry(user_id).or_default();
        sessions.insert(session_id);
        sessions.len() == 1
    }

    /// Returns true when this was the user's last live session.
    pub fn disconnect(&self, user_id: Uuid, session_id: Uuid) -> bool {
        let mut users = self.users();
        let Some(sessions) = users.get_mut(&user_id) else {
            return false;
        };
        if !sessions.remove(&session_id) {
            return false;
        }

        if sessions.is_empty() {
            users.remove(&user_id);
            tracing::debug!(%user_id, "last session closed");
            return true;
        }
        false
    }

    pub fn session_count(&self, user_id: &Uuid) -> usize {
        self.users().get(user_id).map_or(0, HashSet::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_last_session_reports_gone() {
        let registry = SessionRegistry::new();
        let user = Uuid::now_v7();
        let (phone, laptop) = (Uuid::now_v7(), Uuid::now_v7());

        assert!(registry.connect(user, phone));
        assert!(!registry.connect(user, laptop));
        assert_eq!(registry.session_count(&user), 2);

        assert!(!registry.disconnect(user, phone));
        assert_eq!(registry.session_count(&user), 1);
        assert!(registry.disconnect(user, laptop));
        assert_eq!(registry.session_count(&user), 0);
    }

    #[test]
    fn test_unknown_or_repeated_disconnect_is_ignored() {
        let registry = SessionRegistry::new();
        let (user, other) = (Uuid::now_v7(), Uuid::now_v7());
        let session = Uuid::now_v7();

        assert!(!registry.disconnect(user, session));
        registry.connect(user, session);
        assert!(!registry.disconnect(other, session));
        assert!(registry.disconnect(user, session));
        assert!(!registry.disconnect(user, session));

        // a reconnect after going fully offline counts as first again
        assert!(registry.connect(user, Uuid::now_v7()));
    }
}
