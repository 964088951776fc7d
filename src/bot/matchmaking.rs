// src/bot/matchmaking.rs - Pairing algorithm and session lifecycle

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::bot::sessions::SessionTable;
use crate::bot::waiting_pool::{WaitingEntry, WaitingPool};
use crate::store::{load_with_premium, UserStore};
use crate::types::{GenderPreference, MatchOutcome, UserId};

/// Pool and sessions always change together, so they share one lock
#[derive(Debug, Default)]
struct MatchState {
    pool: WaitingPool,
    sessions: SessionTable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchStats {
    pub premium_waiting: usize,
    pub regular_waiting: usize,
    pub active_sessions: usize,
}

/// Where a user currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserState {
    Idle,
    Waiting,
    Paired { partner: UserId },
}

pub struct MatchEngine {
    state: Arc<Mutex<MatchState>>,
    store: Arc<dyn UserStore>,
}

impl MatchEngine {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MatchState::default())),
            store,
        }
    }

    /// Pair the user with a waiting partner, or put them in the pool
    pub async fn request_match(
        &self,
        user: UserId,
        preferred_gender: GenderPreference,
        now: DateTime<Utc>,
    ) -> Result<MatchOutcome> {
        if self.state.lock().await.sessions.contains(user) {
            return Ok(MatchOutcome::AlreadyInSession);
        }

        let (profile, premium) = load_with_premium(self.store.as_ref(), user, now).await?;
        if !profile.is_active {
            // A banned user must not linger in the pool either
            self.state.lock().await.pool.dequeue_if_present(user);
            debug!("Rejected match request from banned user {}", user);
            return Ok(MatchOutcome::Banned);
        }

        let mut state = self.state.lock().await;

        // Re-check: someone may have paired with us while the profile was read
        if state.sessions.contains(user) {
            return Ok(MatchOutcome::AlreadyInSession);
        }

        state.pool.dequeue_if_present(user);

        if let Some(candidate) = state.pool.find_match(user, premium, preferred_gender) {
            state.pool.dequeue_if_present(candidate);
            match state.sessions.start(user, candidate, now) {
                Ok(session_id) => {
                    info!(
                        "Session {} started: {} <-> {} (premium requester: {})",
                        session_id, user, candidate, premium
                    );
                    return Ok(MatchOutcome::Matched { partner: candidate });
                }
                Err(e) => {
                    // The candidate was both waiting and paired; keep the session, drop the stale entry
                    error!("Invariant violation while pairing {} with {}: {}", user, candidate, e);
                }
            }
        }

        state.pool.enqueue(WaitingEntry {
            user_id: user,
            gender: profile.gender,
            preferred_gender,
            enqueued_at: now,
            is_premium: premium,
        });
        debug!(
            "User {} waiting (preference: {:?}, premium: {}, pool size: {})",
            user,
            preferred_gender,
            premium,
            state.pool.size()
        );
        Ok(MatchOutcome::Waiting)
    }

    /// End the user's session, if any, and drop any waiting entry
    pub async fn end_session(&self, user: UserId) -> Option<UserId> {
        let mut state = self.state.lock().await;
        let partner = state.sessions.end(user);
        state.pool.dequeue_if_present(user);
        if let Some(partner) = partner {
            info!("Session ended: {} <-> {}", user, partner);
        }
        partner
    }

    /// Same as `end_session`, for bans and abuse triggers; the caller notifies both sides
    pub async fn force_terminate(&self, user: UserId, reason: &str) -> Option<UserId> {
        let mut state = self.state.lock().await;
        let partner = state.sessions.end(user);
        state.pool.dequeue_if_present(user);
        warn!(
            "Force-terminated user {} ({}), partner: {}",
            user,
            reason,
            partner.map_or_else(|| "none".to_string(), |p| p.to_string())
        );
        partner
    }

    /// Leave the pool without touching any session; true if the user was waiting
    pub async fn cancel_search(&self, user: UserId) -> bool {
        let removed = self.state.lock().await.pool.dequeue_if_present(user).is_some();
        if removed {
            debug!("User {} left the waiting pool", user);
        }
        removed
    }

    pub async fn partner_of(&self, user: UserId) -> Option<UserId> {
        self.state.lock().await.sessions.partner_of(user)
    }

    pub async fn user_state(&self, user: UserId) -> UserState {
        let state = self.state.lock().await;
        if let Some(partner) = state.sessions.partner_of(user) {
            UserState::Paired { partner }
        } else if state.pool.contains(user) {
            UserState::Waiting
        } else {
            UserState::Idle
        }
    }

    pub async fn is_waiting(&self, user: UserId) -> bool {
        self.state.lock().await.pool.contains(user)
    }

    pub async fn stats(&self) -> MatchStats {
        let state = self.state.lock().await;
        MatchStats {
            premium_waiting: state.pool.premium_len(),
            regular_waiting: state.pool.regular_len(),
            active_sessions: state.sessions.len(),
        }
    }

    /// Every user is either waiting or paired, never both, and pairs are symmetric
    pub async fn invariants_hold(&self) -> bool {
        let state = self.state.lock().await;
        let consistent = state.sessions.users().all(|u| {
            !state.pool.contains(u)
                && state
                    .sessions
                    .partner_of(u)
                    .and_then(|p| state.sessions.partner_of(p))
                    == Some(u)
        });
        consistent
    }
}
