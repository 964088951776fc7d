// src/bot/abuse.rs - Per-user sliding windows and report bookkeeping for auto-moderation

use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::bot::content_filter::Classification;
use crate::config::{AbuseCounters, ModerationThresholds};
use crate::types::{BanReason, UserId, UserProfile};

/// Bounded recent-activity buffers for one user
#[derive(Debug, Default)]
pub struct AbuseWindow {
    timestamps: VecDeque<DateTime<Utc>>,
    recent_texts: VecDeque<String>,
}

impl AbuseWindow {
    /// Push one message and evict what fell out of either window.
    ///
    /// Returns `(flood, repeat)` trigger flags.
    fn record(
        &mut self,
        text: Option<&str>,
        now: DateTime<Utc>,
        thresholds: &ModerationThresholds,
    ) -> (bool, bool) {
        let span = thresholds.flood_window();
        self.timestamps.push_back(now);
        while let Some(oldest) = self.timestamps.front() {
            if now.signed_duration_since(*oldest) >= span {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
        while self.timestamps.len() > thresholds.flood_messages {
            self.timestamps.pop_front();
        }
        let flood = self.timestamps.len() >= thresholds.flood_messages;

        let repeat = match text {
            Some(text) => {
                self.recent_texts.push_back(text.to_string());
                while self.recent_texts.len() > thresholds.repeat_window_size {
                    self.recent_texts.pop_front();
                }
                let duplicates = self.recent_texts.iter().filter(|t| t.as_str() == text).count();
                duplicates >= thresholds.repeat_threshold
            }
            None => false,
        };

        (flood, repeat)
    }

    pub fn message_count(&self) -> usize {
        self.timestamps.len()
    }

    pub fn text_count(&self) -> usize {
        self.recent_texts.len()
    }
}

/// What a single message contributed to a user's abuse state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViolationReport {
    pub flood_triggered: bool,
    pub repeat_triggered: bool,
    pub bad_word_delta: u32,
    pub link_spam_delta: u32,
}

impl ViolationReport {
    pub fn has_counter_deltas(&self) -> bool {
        self.bad_word_delta > 0 || self.link_spam_delta > 0
    }

    /// Combine window flags with the stored cumulative counters
    pub fn counters(&self, profile: &UserProfile) -> AbuseCounters {
        AbuseCounters {
            flood_triggered: self.flood_triggered,
            repeat_triggered: self.repeat_triggered,
            bad_word_total: profile.bad_word_total,
            link_spam_total: profile.link_spam_total,
            report_total: profile.report_total,
            warning_count: profile.warning_count,
        }
    }
}

/// Whether a report came from a new reporter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportRecord {
    New { unique_reporters: usize },
    Duplicate,
}

/// Rolling abuse state for non-premium users. Premium users are never fed in.
pub struct AbuseTracker {
    windows: Arc<RwLock<HashMap<UserId, AbuseWindow>>>,
    reporters: Arc<RwLock<HashMap<UserId, HashSet<UserId>>>>,
    thresholds: Arc<RwLock<ModerationThresholds>>,
}

impl AbuseTracker {
    pub fn new(thresholds: ModerationThresholds) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            reporters: Arc::new(RwLock::new(HashMap::new())),
            thresholds: Arc::new(RwLock::new(thresholds)),
        }
    }

    pub async fn set_thresholds(&self, thresholds: ModerationThresholds) {
        *self.thresholds.write().await = thresholds;
        info!("Moderation thresholds updated");
    }

    pub async fn thresholds(&self) -> ModerationThresholds {
        self.thresholds.read().await.clone()
    }

    /// Update the user's windows with one message. Window pruning happens here, lazily.
    pub async fn record_message(
        &self,
        user: UserId,
        text: Option<&str>,
        classification: Option<&Classification>,
        now: DateTime<Utc>,
    ) -> ViolationReport {
        let thresholds = self.thresholds.read().await.clone();
        let (flood_triggered, repeat_triggered) = {
            let mut windows = self.windows.write().await;
            windows.entry(user).or_default().record(text, now, &thresholds)
        };

        let (bad_word_delta, link_spam_delta) = classification
            .map(|c| (c.bad_words as u32, c.links as u32))
            .unwrap_or((0, 0));

        if flood_triggered || repeat_triggered {
            debug!(
                "User {} tripped a window (flood: {}, repeat: {})",
                user, flood_triggered, repeat_triggered
            );
        }

        ViolationReport {
            flood_triggered,
            repeat_triggered,
            bad_word_delta,
            link_spam_delta,
        }
    }

    /// Count a report by distinct reporter; repeats from the same reporter are ignored
    pub async fn record_report(&self, reporter: UserId, reported: UserId) -> ReportRecord {
        let mut reporters = self.reporters.write().await;
        let set = reporters.entry(reported).or_default();
        if set.insert(reporter) {
            debug!("User {} reported by {} ({} unique)", reported, reporter, set.len());
            ReportRecord::New { unique_reporters: set.len() }
        } else {
            ReportRecord::Duplicate
        }
    }

    pub async fn unique_reporters(&self, reported: UserId) -> usize {
        self.reporters.read().await.get(&reported).map_or(0, |s| s.len())
    }

    pub async fn should_auto_ban(&self, counters: &AbuseCounters) -> Option<BanReason> {
        self.thresholds.read().await.crossed(counters)
    }

    /// Drop the user's sliding windows, e.g. after a ban
    pub async fn forget(&self, user: UserId) {
        self.windows.write().await.remove(&user);
    }

    /// Clear reports as part of an unban
    pub async fn clear_reports(&self, user: UserId) {
        self.reporters.write().await.remove(&user);
    }

    pub async fn tracked_users(&self) -> usize {
        self.windows.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tracker() -> AbuseTracker {
        AbuseTracker::new(ModerationThresholds::default())
    }

    #[tokio::test]
    async fn test_flood_triggers_on_twentieth_message() {
        let tracker = tracker();
        let start = Utc::now();
        for i in 0..19 {
            let report = tracker
                .record_message(UserId(1), Some(format!("msg {}", i).as_str()), None, start + Duration::milliseconds(i * 100))
                .await;
            assert!(!report.flood_triggered, "message {} should not flood", i + 1);
        }
        let report = tracker
            .record_message(UserId(1), Some("msg 19"), None, start + Duration::milliseconds(1900))
            .await;
        assert!(report.flood_triggered);
    }

    #[tokio::test]
    async fn test_flood_window_slides() {
        let tracker = tracker();
        let start = Utc::now();
        // One message per second never accumulates 20 inside 10s
        for i in 0..60 {
            let report = tracker
                .record_message(UserId(1), Some(i.to_string().as_str()), None, start + Duration::seconds(i))
                .await;
            assert!(!report.flood_triggered);
        }
        let windows = tracker.windows.read().await;
        assert_eq!(windows[&UserId(1)].message_count(), 10);
    }

    #[tokio::test]
    async fn test_repeat_spam_detection() {
        let tracker = tracker();
        let start = Utc::now();
        for i in 0..14 {
            let report = tracker
                .record_message(UserId(1), Some("buy now"), None, start + Duration::seconds(i))
                .await;
            assert!(!report.repeat_triggered);
        }
        let report = tracker
            .record_message(UserId(1), Some("buy now"), None, start + Duration::seconds(14))
            .await;
        assert!(report.repeat_triggered);

        let windows = tracker.windows.read().await;
        assert!(windows[&UserId(1)].text_count() <= 20);
    }

    #[tokio::test]
    async fn test_media_counts_toward_flood_only() {
        let tracker = tracker();
        let report = tracker.record_message(UserId(1), None, None, Utc::now()).await;
        assert_eq!(report, ViolationReport::default());
        let windows = tracker.windows.read().await;
        assert_eq!(windows[&UserId(1)].message_count(), 1);
        assert_eq!(windows[&UserId(1)].text_count(), 0);
    }

    #[tokio::test]
    async fn test_classification_deltas_are_reported() {
        let tracker = tracker();
        let classification = Classification {
            has_violation: true,
            masked: "**** ****".to_string(),
            bad_words: 1,
            links: 1,
        };
        let report = tracker
            .record_message(UserId(1), Some("crap x.com"), Some(&classification), Utc::now())
            .await;
        assert_eq!(report.bad_word_delta, 1);
        assert_eq!(report.link_spam_delta, 1);
        assert!(report.has_counter_deltas());
    }

    #[tokio::test]
    async fn test_reports_count_unique_reporters() {
        let tracker = tracker();
        assert_eq!(tracker.record_report(UserId(2), UserId(1)).await, ReportRecord::New { unique_reporters: 1 });
        assert_eq!(tracker.record_report(UserId(2), UserId(1)).await, ReportRecord::Duplicate);
        assert_eq!(tracker.record_report(UserId(3), UserId(1)).await, ReportRecord::New { unique_reporters: 2 });
        assert_eq!(tracker.unique_reporters(UserId(1)).await, 2);

        tracker.clear_reports(UserId(1)).await;
        assert_eq!(tracker.unique_reporters(UserId(1)).await, 0);
    }

    #[tokio::test]
    async fn test_threshold_update_applies() {
        let tracker = tracker();
        let counters = AbuseCounters { warning_count: 2, ..Default::default() };
        assert_eq!(tracker.should_auto_ban(&counters).await, None);

        tracker
            .set_thresholds(ModerationThresholds { warning_limit: 2, ..ModerationThresholds::default() })
            .await;
        assert_eq!(tracker.should_auto_ban(&counters).await, Some(BanReason::Warnings));
    }
}
