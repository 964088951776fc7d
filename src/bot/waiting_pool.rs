// src/bot/waiting_pool.rs - Two-tier FIFO of users waiting for a partner

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};

use crate::types::{Gender, GenderPreference, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingEntry {
    pub user_id: UserId,
    /// Immutable after registration, so safe to snapshot
    pub gender: Gender,
    pub preferred_gender: GenderPreference,
    pub enqueued_at: DateTime<Utc>,
    /// Snapshot taken at enqueue time
    pub is_premium: bool,
}

/// Users awaiting a partner. Premium entries are iterated before regular ones,
/// insertion order within each tier. A user id is present at most once.
#[derive(Debug, Default)]
pub struct WaitingPool {
    premium: VecDeque<UserId>,
    regular: VecDeque<UserId>,
    entries: HashMap<UserId, WaitingEntry>,
}

impl WaitingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; a stale entry for the same user is removed first
    pub fn enqueue(&mut self, entry: WaitingEntry) -> Option<WaitingEntry> {
        let stale = self.dequeue_if_present(entry.user_id);
        if entry.is_premium {
            self.premium.push_back(entry.user_id);
        } else {
            self.regular.push_back(entry.user_id);
        }
        self.entries.insert(entry.user_id, entry);
        stale
    }

    pub fn dequeue_if_present(&mut self, user: UserId) -> Option<WaitingEntry> {
        let entry = self.entries.remove(&user)?;
        let tier = if entry.is_premium { &mut self.premium } else { &mut self.regular };
        tier.retain(|id| *id != user);
        Some(entry)
    }

    /// First acceptable partner for `requester`, without mutating the pool.
    ///
    /// A premium requester with a concrete preference gets premium users of that
    /// gender first, then anyone of that gender. Everyone else gets the head of
    /// the pool regardless of gender.
    pub fn find_match(
        &self,
        requester: UserId,
        requester_is_premium: bool,
        preferred_gender: GenderPreference,
    ) -> Option<UserId> {
        let mut candidates = self.iter().filter(|e| e.user_id != requester);

        if requester_is_premium && preferred_gender.is_specific() {
            let premium_hit = self
                .premium_entries()
                .find(|e| e.user_id != requester && preferred_gender.accepts(e.gender));
            if let Some(entry) = premium_hit {
                return Some(entry.user_id);
            }
            return candidates
                .find(|e| preferred_gender.accepts(e.gender))
                .map(|e| e.user_id);
        }

        candidates.next().map(|e| e.user_id)
    }

    /// Entries in priority order
    pub fn iter(&self) -> impl Iterator<Item = &WaitingEntry> + '_ {
        self.premium
            .iter()
            .chain(self.regular.iter())
            .filter_map(move |id| self.entries.get(id))
    }

    fn premium_entries(&self) -> impl Iterator<Item = &WaitingEntry> + '_ {
        self.premium.iter().filter_map(move |id| self.entries.get(id))
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.entries.contains_key(&user)
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn premium_len(&self) -> usize {
        self.premium.len()
    }

    pub fn regular_len(&self) -> usize {
        self.regular.len()
    }
}
