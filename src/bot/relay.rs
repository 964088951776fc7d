// src/bot/relay.rs - Decides what happens to a message sent inside a session

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::bot::abuse::AbuseTracker;
use crate::bot::content_filter::ContentFilter;
use crate::bot::matchmaking::MatchEngine;
use crate::bot::moderation::ModerationSystem;
use crate::store::{load_with_premium, UserStore};
use crate::types::{ChatMessage, MessageContent, RelayOutcome, StoreError, UserProfile};

/// Pure decision layer: the caller turns each `RelayOutcome` into transport calls
pub struct MessageRelay {
    engine: Arc<MatchEngine>,
    tracker: Arc<AbuseTracker>,
    moderation: Arc<ModerationSystem>,
    filter: Arc<RwLock<ContentFilter>>,
    store: Arc<dyn UserStore>,
}

impl MessageRelay {
    pub fn new(
        engine: Arc<MatchEngine>,
        tracker: Arc<AbuseTracker>,
        moderation: Arc<ModerationSystem>,
        filter: Arc<RwLock<ContentFilter>>,
        store: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            engine,
            tracker,
            moderation,
            filter,
            store,
        }
    }

    pub async fn relay(&self, message: &ChatMessage, now: DateTime<Utc>) -> Result<RelayOutcome> {
        let sender = message.sender;
        let Some(partner) = self.engine.partner_of(sender).await else {
            return Ok(RelayOutcome::NoActiveSession);
        };

        let sender_state = match load_with_premium(self.store.as_ref(), sender, now).await {
            Ok(state) => Some(state),
            Err(StoreError::UserNotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        let partner_profile = self.store.get(partner).await?;

        let (sender_profile, premium) = match (sender_state, partner_profile.as_ref()) {
            (Some((profile, premium)), Some(p)) if profile.is_active && p.is_active => (profile, premium),
            _ => {
                self.engine.end_session(sender).await;
                self.tracker.forget(sender).await;
                self.tracker.forget(partner).await;
                info!("Session of {} and {} ended: one side is restricted", sender, partner);
                return Ok(RelayOutcome::SessionEndedRestriction { partner });
            }
        };

        let classification = match message.content.text() {
            Some(text) => Some(self.filter.read().await.classify(text)),
            None => None,
        };

        if !premium {
            let report = self
                .tracker
                .record_message(sender, message.content.text(), classification.as_ref(), now)
                .await;

            let profile = if report.has_counter_deltas() {
                let (bad_words, links) = (report.bad_word_delta, report.link_spam_delta);
                self.store
                    .update(
                        sender,
                        Box::new(move |p: &mut UserProfile| {
                            p.bad_word_total += bad_words;
                            p.link_spam_total += links;
                        }),
                    )
                    .await?
            } else {
                sender_profile
            };

            if let Some(reason) = self.tracker.should_auto_ban(&report.counters(&profile)).await {
                self.moderation.auto_ban(sender, reason).await?;
                return Ok(RelayOutcome::AutoBanned { partner, reason });
            }
        }

        let outcome = match (&message.content, classification) {
            (MessageContent::Media { kind, .. }, _)
                if partner_profile.as_ref().map_or(false, |p| p.safe_mode_enabled) =>
            {
                debug!("Blocked {} from {} to {} (safe mode)", kind, sender, partner);
                RelayOutcome::BlockedBySafeMode { partner }
            }
            (_, Some(c)) if c.has_violation => RelayOutcome::FilteredAndRelayed {
                partner,
                masked: c.masked,
            },
            _ => RelayOutcome::Relayed { partner },
        };
        Ok(outcome)
    }
}
