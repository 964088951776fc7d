// src/bot/moderation.rs - Bans, reports and admin overrides

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::sync::Arc;

use crate::bot::abuse::{AbuseTracker, ReportRecord};
use crate::bot::matchmaking::MatchEngine;
use crate::config::AbuseCounters;
use crate::store::{load_with_premium, UserStore};
use crate::types::{BanReason, ReportOutcome, UserId, UserProfile};

/// Result of an admin warning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarnOutcome {
    Warned { count: u32 },
    /// The warning crossed the limit; `partner` was in session with the user
    Banned { count: u32, partner: Option<UserId> },
}

/// Applies moderation decisions to the store and the session state together, so
/// a banned user is never left in the pool or a session.
pub struct ModerationSystem {
    engine: Arc<MatchEngine>,
    tracker: Arc<AbuseTracker>,
    store: Arc<dyn UserStore>,
}

impl ModerationSystem {
    pub fn new(engine: Arc<MatchEngine>, tracker: Arc<AbuseTracker>, store: Arc<dyn UserStore>) -> Self {
        Self { engine, tracker, store }
    }

    /// Mark the user inactive, then tear down their session. Returns the former partner.
    pub async fn auto_ban(&self, user: UserId, reason: BanReason) -> Result<Option<UserId>> {
        self.store
            .update(
                user,
                Box::new(move |p: &mut UserProfile| {
                    p.is_active = false;
                    p.ban_reason = Some(reason.as_str().to_string());
                }),
            )
            .await?;

        let partner = self.engine.force_terminate(user, reason.as_str()).await;
        self.forget_windows(user, partner).await;
        warn!("User {} banned ({})", user, reason);
        Ok(partner)
    }

    /// Count a report by distinct reporter and ban once the threshold is reached
    pub async fn record_report(
        &self,
        reporter: UserId,
        reported: UserId,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ReportOutcome> {
        if reporter == reported {
            return Ok(ReportOutcome::SelfReport);
        }

        let (_, premium) = load_with_premium(self.store.as_ref(), reported, now).await?;
        if premium {
            info!("Ignored report against premium user {} from {}", reported, reporter);
            return Ok(ReportOutcome::Immune);
        }

        let unique_reporters = match self.tracker.record_report(reporter, reported).await {
            ReportRecord::Duplicate => return Ok(ReportOutcome::AlreadyReported),
            ReportRecord::New { unique_reporters } => unique_reporters as u32,
        };
        info!(
            "User {} reported by {} ({}), {} unique reporter(s)",
            reported,
            reporter,
            reason.unwrap_or("no reason given"),
            unique_reporters
        );

        let profile = self
            .store
            .update(
                reported,
                Box::new(move |p: &mut UserProfile| p.report_total = p.report_total.max(unique_reporters)),
            )
            .await?;

        let counters = AbuseCounters {
            report_total: profile.report_total,
            ..AbuseCounters::default()
        };
        let auto_banned = match self.tracker.should_auto_ban(&counters).await {
            Some(reason) if profile.is_active => {
                self.auto_ban(reported, reason).await?;
                Some(reason)
            }
            _ => None,
        };

        Ok(ReportOutcome::Recorded {
            total: profile.report_total,
            auto_banned,
        })
    }

    pub async fn admin_ban(&self, user: UserId) -> Result<Option<UserId>> {
        info!("Admin ban requested for {}", user);
        self.auto_ban(user, BanReason::Admin).await
    }

    /// Reactivate the user and reset everything that could ban them again right away
    pub async fn admin_unban(&self, user: UserId) -> Result<()> {
        self.store
            .update(
                user,
                Box::new(|p: &mut UserProfile| {
                    p.is_active = true;
                    p.ban_reason = None;
                    p.bad_word_total = 0;
                    p.link_spam_total = 0;
                    p.report_total = 0;
                    p.warning_count = 0;
                }),
            )
            .await?;
        self.tracker.clear_reports(user).await;
        self.tracker.forget(user).await;
        info!("User {} unbanned", user);
        Ok(())
    }

    /// Add a warning; premium users collect warnings but are not auto-banned for them
    pub async fn admin_warn(&self, user: UserId, now: DateTime<Utc>) -> Result<WarnOutcome> {
        let (_, premium) = load_with_premium(self.store.as_ref(), user, now).await?;
        let profile = self
            .store
            .update(user, Box::new(|p: &mut UserProfile| p.warning_count += 1))
            .await?;
        let count = profile.warning_count;
        info!("User {} warned ({} total)", user, count);

        if premium || !profile.is_active {
            return Ok(WarnOutcome::Warned { count });
        }

        let counters = AbuseCounters {
            warning_count: count,
            ..AbuseCounters::default()
        };
        match self.tracker.should_auto_ban(&counters).await {
            Some(reason) => {
                let partner = self.auto_ban(user, reason).await?;
                Ok(WarnOutcome::Banned { count, partner })
            }
            None => Ok(WarnOutcome::Warned { count }),
        }
    }

    pub async fn admin_force_end(&self, user: UserId) -> Option<UserId> {
        let partner = self.engine.force_terminate(user, "admin").await;
        self.forget_windows(user, partner).await;
        partner
    }

    async fn forget_windows(&self, user: UserId, partner: Option<UserId>) {
        self.tracker.forget(user).await;
        if let Some(partner) = partner {
            self.tracker.forget(partner).await;
        }
    }
}
