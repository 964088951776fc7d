// src/bot/sessions.rs - Active 1:1 pairings

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::types::{SessionError, UserId};

/// One direction of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub partner: UserId,
    /// Shared by both directions, for log correlation
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
}

/// Symmetric user -> partner map. `A -> B` exists iff `B -> A` exists, and a
/// user is a key at most once.
#[derive(Debug, Default)]
pub struct SessionTable {
    entries: HashMap<UserId, SessionEntry>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair `a` with `b`. Nothing is written unless both sides are free.
    pub fn start(&mut self, a: UserId, b: UserId, now: DateTime<Utc>) -> Result<Uuid, SessionError> {
        if a == b {
            return Err(SessionError::SelfPairing(a));
        }
        if let Some(user) = [a, b].into_iter().find(|u| self.entries.contains_key(u)) {
            return Err(SessionError::AlreadyInSession { user });
        }

        let session_id = Uuid::new_v4();
        self.entries.insert(a, SessionEntry { partner: b, session_id, started_at: now });
        self.entries.insert(b, SessionEntry { partner: a, session_id, started_at: now });
        Ok(session_id)
    }

    pub fn partner_of(&self, user: UserId) -> Option<UserId> {
        self.entries.get(&user).map(|e| e.partner)
    }

    pub fn session_of(&self, user: UserId) -> Option<&SessionEntry> {
        self.entries.get(&user)
    }

    /// Remove both directions and return the partner; `None` when there was no session
    pub fn end(&mut self, user: UserId) -> Option<UserId> {
        let entry = self.entries.remove(&user)?;
        self.entries.remove(&entry.partner);
        Some(entry.partner)
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.entries.contains_key(&user)
    }

    /// Number of sessions (not directions)
    pub fn len(&self) -> usize {
        self.entries.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn users(&self) -> impl Iterator<Item = UserId> + '_ {
        self.entries.keys().copied()
    }
}
