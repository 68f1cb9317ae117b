use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::state::session::BattleSession;

/// Registry of live sessions keyed by match id.
///
/// Each session sits behind its own async mutex; all reads and writes of one
/// match serialize on that lock while different matches proceed in parallel.
pub struct SessionStore {
    sessions: DashMap<Uuid, Arc<Mutex<BattleSession>>>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Install a session for a match. Replaces any previous one.
    pub fn insert(&self, session: BattleSession) -> Arc<Mutex<BattleSession>> {
        let match_id = session.match_id;
        let handle = Arc::new(Mutex::new(session));
        self.sessions.insert(match_id, handle.clone());
        handle
    }

    /// Handle to the live session of a match, if one exists.
    pub fn get(&self, match_id: Uuid) -> Option<Arc<Mutex<BattleSession>>> {
        self.sessions.get(&match_id).map(|entry| entry.clone())
    }

    /// Whether a live session exists for the match.
    pub fn contains(&self, match_id: Uuid) -> bool {
        self.sessions.contains_key(&match_id)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Tear down the session of a finished match.
    pub fn remove(&self, match_id: Uuid) {
        self.sessions.remove(&match_id);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
