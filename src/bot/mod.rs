use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};

use crate::config::{BotConfiguration, ConfigChangeEvent, ConfigurationManager, CoreSettings};
use crate::platforms::{InboundEvent, Messenger, TransportError};
use crate::store::UserStore;
use crate::types::{
    BanReason, ChatMessage, Gender, GenderPreference, MatchOutcome, MessageContent, PaymentCheck,
    PaymentProduct, RelayOutcome, ReportOutcome, RevealOutcome, StoreError, UserId, UserProfile,
};

pub mod abuse;
pub mod commands;
pub mod content_filter;
pub mod matchmaking;
pub mod moderation;
pub mod payments;
pub mod relay;
pub mod replies;
pub mod sessions;
pub mod waiting_pool;

use abuse::AbuseTracker;
use commands::Command;
use content_filter::ContentFilter;
use matchmaking::{MatchEngine, MatchStats, UserState};
use moderation::{ModerationSystem, WarnOutcome};
use payments::{PaymentResult, PaymentService};
use relay::MessageRelay;

/// Routes inbound platform events through the core and turns outcomes into messages
pub struct ChatService {
    engine: Arc<MatchEngine>,
    tracker: Arc<AbuseTracker>,
    moderation: Arc<ModerationSystem>,
    relay: MessageRelay,
    payments: PaymentService,
    filter: Arc<RwLock<ContentFilter>>,
    store: Arc<dyn UserStore>,
    messenger: Arc<dyn Messenger>,
    core: Arc<RwLock<CoreSettings>>,
    /// "Looking for a partner" message per waiting user, edited once matched
    search_notices: Arc<RwLock<HashMap<UserId, i64>>>,
    /// Last /find preference, reused by /next
    preferences: Arc<RwLock<HashMap<UserId, GenderPreference>>>,
}

impl ChatService {
    pub fn new(config: &BotConfiguration, store: Arc<dyn UserStore>, messenger: Arc<dyn Messenger>) -> Result<Self> {
        let filter = Arc::new(RwLock::new(
            ContentFilter::new(&config.filter).context("building content filter")?,
        ));
        let engine = Arc::new(MatchEngine::new(Arc::clone(&store)));
        let tracker = Arc::new(AbuseTracker::new(config.moderation.clone()));
        let moderation = Arc::new(ModerationSystem::new(
            Arc::clone(&engine),
            Arc::clone(&tracker),
            Arc::clone(&store),
        ));
        let relay = MessageRelay::new(
            Arc::clone(&engine),
            Arc::clone(&tracker),
            Arc::clone(&moderation),
            Arc::clone(&filter),
            Arc::clone(&store),
        );
        let payments = PaymentService::new(Arc::clone(&engine), Arc::clone(&store), config.payments.clone());

        info!("Chat service '{}' ready on {}", config.core.bot_name, messenger.platform_name());

        Ok(Self {
            engine,
            tracker,
            moderation,
            relay,
            payments,
            filter,
            store,
            messenger,
            core: Arc::new(RwLock::new(config.core.clone())),
            search_notices: Arc::new(RwLock::new(HashMap::new())),
            preferences: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn engine(&self) -> &Arc<MatchEngine> {
        &self.engine
    }

    pub async fn stats(&self) -> MatchStats {
        self.engine.stats().await
    }

    /// Apply a reloaded configuration; on error nothing is changed
    pub async fn apply_config(&self, config: &BotConfiguration) -> Result<()> {
        let filter = ContentFilter::new(&config.filter).context("rebuilding content filter")?;
        *self.filter.write().await = filter;
        self.tracker.set_thresholds(config.moderation.clone()).await;
        self.payments.set_settings(config.payments.clone()).await;
        *self.core.write().await = config.core.clone();
        info!("Applied configuration version {}", config.version);
        Ok(())
    }

    // =================================================================
    // EVENT LOOP
    // =================================================================

    /// Process events one at a time until the channel closes
    pub async fn run(&self, mut events: mpsc::Receiver<InboundEvent>, config: &ConfigurationManager) {
        let mut changes = config.subscribe_changes();
        let mut watching_config = true;

        info!("Chat service event loop started");
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        info!("Event channel closed, stopping chat service");
                        break;
                    };
                    let sender = event.sender();
                    if let Err(e) = self.handle_event(event).await {
                        error!("Failed to handle event from {}: {:#}", sender, e);
                        self.notify(sender, replies::INTERNAL_ERROR).await;
                    }
                }
                change = changes.recv(), if watching_config => match change {
                    Ok(ConfigChangeEvent::BotConfigUpdated { file }) => {
                        let updated = config.get_bot_config().await;
                        if let Err(e) = self.apply_config(&updated).await {
                            error!("Could not apply {}: {:#}", file, e);
                        }
                    }
                    Ok(ConfigChangeEvent::ValidationError { file, error }) => {
                        warn!("Ignoring invalid {}: {}", file, error);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Config change receiver lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Config change channel closed");
                        watching_config = false;
                    }
                },
            }
        }
    }

    pub async fn handle_event(&self, event: InboundEvent) -> Result<()> {
        match event {
            InboundEvent::Message { from, message_id, content, timestamp } => {
                if let MessageContent::Text(text) = &content {
                    if let Some(command) = Command::parse(text) {
                        return self.handle_command(from, command, timestamp).await;
                    }
                }
                self.handle_chat_message(ChatMessage {
                    sender: from,
                    message_id,
                    content,
                    timestamp,
                })
                .await
            }
            InboundEvent::PreCheckout { from, payment_id, payload, total_amount } => {
                let check = self.payments.check_pre_checkout(from, &payload, total_amount).await?;
                let answer = match &check {
                    PaymentCheck::Accept => self.messenger.answer_payment(&payment_id, true, None).await,
                    PaymentCheck::Reject(reason) => {
                        info!("Rejected payment {} from {}: {}", payment_id, from, reason);
                        self.messenger.answer_payment(&payment_id, false, Some(reason)).await
                    }
                };
                answer.context("answering pre-checkout query")
            }
            InboundEvent::PaymentConfirmed { from, payload, total_amount, charge_id } => {
                info!("Payment {} confirmed for {} ({})", charge_id, from, payload);
                match self.payments.on_payment_confirmed(from, &payload, total_amount, Utc::now()).await? {
                    PaymentResult::PremiumGranted { expires_at } => {
                        self.notify(from, &replies::premium_granted(expires_at)).await;
                    }
                    PaymentResult::Reveal(RevealOutcome::Revealed { buyer_nickname, partner_nickname }) => {
                        self.notify(from, &replies::revealed(&partner_nickname)).await;
                        if let Some(PaymentProduct::IdentityReveal { partner }) = PaymentProduct::parse(&payload) {
                            self.notify(partner, &replies::revealed(&buyer_nickname)).await;
                        }
                    }
                    PaymentResult::Reveal(RevealOutcome::StaleSession) => {
                        self.notify(from, replies::REVEAL_STALE).await;
                    }
                }
                Ok(())
            }
        }
    }

    // =================================================================
    // CHAT MESSAGES
    // =================================================================

    async fn handle_chat_message(&self, message: ChatMessage) -> Result<()> {
        let from = message.sender;
        if let MessageContent::Text(text) = &message.content {
            let max = self.core.read().await.max_message_length;
            if text.chars().count() > max {
                self.notify(from, &replies::message_too_long(max)).await;
                return Ok(());
            }
        }

        match self.relay.relay(&message, message.timestamp).await? {
            RelayOutcome::NoActiveSession => {
                let reply = match self.store.get(from).await? {
                    Some(_) => replies::NOT_IN_SESSION,
                    None => replies::NOT_REGISTERED,
                };
                self.notify(from, reply).await;
            }
            RelayOutcome::SessionEndedRestriction { partner } => {
                self.notify(from, replies::SESSION_RESTRICTED).await;
                self.notify(partner, replies::SESSION_RESTRICTED).await;
            }
            RelayOutcome::AutoBanned { partner, reason } => {
                self.forget_search(from).await;
                self.notify(from, &replies::banned(reason)).await;
                self.notify(partner, replies::PARTNER_LEFT).await;
            }
            RelayOutcome::Relayed { partner } => {
                if let Err(e) = self.messenger.forward(partner, from, message.message_id, None).await {
                    self.delivery_failed(from, partner, e).await;
                }
            }
            RelayOutcome::FilteredAndRelayed { partner, masked } => {
                let delivered = match &message.content {
                    MessageContent::Text(_) => self.messenger.send(partner, &masked).await,
                    MessageContent::Media { .. } => {
                        self.messenger
                            .forward(partner, from, message.message_id, Some(&masked))
                            .await
                    }
                };
                match delivered {
                    Ok(_) => {
                        self.notify(from, replies::MESSAGE_FILTERED).await;
                    }
                    Err(e) => self.delivery_failed(from, partner, e).await,
                }
            }
            RelayOutcome::BlockedBySafeMode { partner } => {
                self.notify(from, replies::MEDIA_BLOCKED_SENDER).await;
                if let MessageContent::Media { kind, .. } = &message.content {
                    self.notify(partner, &replies::media_blocked_recipient(*kind)).await;
                }
            }
        }
        Ok(())
    }

    /// An unreachable partner is treated as one who left
    async fn delivery_failed(&self, from: UserId, partner: UserId, error: TransportError) {
        warn!("Could not deliver message from {} to {}: {}", from, partner, error);
        if self.end_session(from).await.is_some() {
            self.notify(from, replies::PARTNER_UNREACHABLE).await;
        }
    }

    // =================================================================
    // COMMANDS
    // =================================================================

    async fn handle_command(&self, from: UserId, command: Command, now: DateTime<Utc>) -> Result<()> {
        debug!("Command {:?} from {}", command, from);

        if command.is_admin() {
            if !self.core.read().await.admins().contains(&from) {
                warn!("User {} attempted admin command {:?}", from, command);
                self.notify(from, replies::UNKNOWN_COMMAND).await;
                return Ok(());
            }
            if let Err(e) = self.handle_admin_command(from, command, now).await {
                self.notify(from, &format!("Admin command failed: {:#}", e)).await;
            }
            return Ok(());
        }

        match command {
            Command::Start => {
                let bot_name = self.core.read().await.bot_name.clone();
                self.notify(from, &replies::welcome(&bot_name)).await;
                return Ok(());
            }
            Command::Help => {
                self.notify(from, &replies::help()).await;
                return Ok(());
            }
            Command::Usage(usage) => {
                self.notify(from, &replies::usage(usage)).await;
                return Ok(());
            }
            Command::Unknown(_) => {
                self.notify(from, replies::UNKNOWN_COMMAND).await;
                return Ok(());
            }
            Command::Register { gender, nickname } => return self.register(from, gender, &nickname).await,
            _ => {}
        }

        let Some(profile) = self.store.get(from).await? else {
            self.notify(from, replies::NOT_REGISTERED).await;
            return Ok(());
        };
        if !profile.is_active && command != Command::Stop {
            self.notify(from, replies::BANNED).await;
            return Ok(());
        }

        match command {
            Command::Find(preference) => {
                self.preferences.write().await.insert(from, preference);
                self.find(from, preference, now).await?;
            }
            Command::Stop => self.stop(from).await,
            Command::Next => {
                if let Some(partner) = self.end_session(from).await {
                    self.notify(partner, replies::PARTNER_LEFT).await;
                }
                let preference = self.preferences.read().await.get(&from).copied().unwrap_or_default();
                self.find(from, preference, now).await?;
            }
            Command::Report(reason) => self.report(from, reason.as_deref(), now).await?,
            Command::SafeMode(enabled) => {
                self.store
                    .update(from, Box::new(move |p: &mut UserProfile| p.safe_mode_enabled = enabled))
                    .await?;
                let reply = if enabled { replies::SAFE_MODE_ON } else { replies::SAFE_MODE_OFF };
                self.notify(from, reply).await;
            }
            Command::Nick(nickname) => {
                let validation = self.filter.read().await.validate_nickname(&nickname);
                match validation {
                    Ok(()) => {
                        let nickname = nickname.trim().to_string();
                        let stored = nickname.clone();
                        self.store
                            .update(from, Box::new(move |p: &mut UserProfile| p.nickname = stored))
                            .await?;
                        self.notify(from, &replies::nickname_changed(&nickname)).await;
                    }
                    Err(e) => {
                        self.notify(from, &replies::nickname_rejected(&e)).await;
                    }
                }
            }
            Command::Premium(None) => {
                let settings = self.payments.settings().await;
                self.notify(from, &replies::premium_plans(&settings)).await;
            }
            Command::Premium(Some(plan_id)) => {
                let product = PaymentProduct::Premium { plan_id };
                match self.payments.invoice_for(&product).await {
                    Ok(invoice) => self.messenger.send_invoice(from, &invoice).await.context("sending invoice")?,
                    Err(_) => {
                        let settings = self.payments.settings().await;
                        self.notify(from, &replies::premium_plans(&settings)).await;
                    }
                }
            }
            Command::Reveal => match self.engine.partner_of(from).await {
                Some(partner) => {
                    let invoice = self
                        .payments
                        .invoice_for(&PaymentProduct::IdentityReveal { partner })
                        .await?;
                    self.messenger.send_invoice(from, &invoice).await.context("sending invoice")?;
                }
                None => {
                    self.notify(from, replies::NOT_IN_SESSION).await;
                }
            },
            other => debug!("Command {:?} needs no handling here", other),
        }
        Ok(())
    }

    async fn register(&self, from: UserId, gender: Gender, nickname: &str) -> Result<()> {
        let validation = self.filter.read().await.validate_nickname(nickname);
        if let Err(e) = validation {
            self.notify(from, &replies::nickname_rejected(&e)).await;
            return Ok(());
        }

        let nickname = nickname.trim();
        match self.store.insert(UserProfile::new(from, nickname, gender)).await {
            Ok(()) => {
                info!("Registered user {} as {:?}", from, gender);
                self.notify(from, &replies::registered(nickname)).await;
            }
            Err(StoreError::AlreadyRegistered(_)) => {
                self.notify(from, replies::ALREADY_REGISTERED).await;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    async fn find(&self, from: UserId, preference: GenderPreference, now: DateTime<Utc>) -> Result<()> {
        match self.engine.request_match(from, preference, now).await? {
            MatchOutcome::AlreadyInSession => {
                self.notify(from, replies::ALREADY_IN_SESSION).await;
            }
            MatchOutcome::Banned => {
                self.notify(from, replies::BANNED).await;
            }
            MatchOutcome::Waiting => {
                let premium = self.store.get(from).await?.map_or(false, |p| p.premium_active(now));
                match self.messenger.send(from, &replies::searching(preference, premium)).await {
                    Ok(message_id) => {
                        self.search_notices.write().await.insert(from, message_id);
                    }
                    Err(e) => {
                        warn!("User {} unreachable while searching, leaving the pool: {}", from, e);
                        self.engine.cancel_search(from).await;
                    }
                }
            }
            MatchOutcome::Matched { partner } => self.announce_match(from, partner).await,
        }
        Ok(())
    }

    /// Tell both sides; whoever cannot be reached ends the session
    async fn announce_match(&self, from: UserId, partner: UserId) {
        let partner_notice = {
            let mut notices = self.search_notices.write().await;
            notices.remove(&from);
            notices.remove(&partner)
        };
        let text = replies::matched();

        let edited = match partner_notice {
            Some(message_id) => match self.messenger.edit(partner, message_id, &text).await {
                Ok(()) => true,
                Err(e) => {
                    debug!("Could not edit search notice for {}: {}", partner, e);
                    false
                }
            },
            None => false,
        };
        if !edited {
            if let Err(e) = self.messenger.send(partner, &text).await {
                self.delivery_failed(from, partner, e).await;
                return;
            }
        }

        if let Err(e) = self.messenger.send(from, &text).await {
            warn!("Could not announce match to {}: {}", from, e);
            if self.end_session(partner).await.is_some() {
                self.notify(partner, replies::PARTNER_LEFT).await;
            }
        }
    }

    async fn stop(&self, from: UserId) {
        let state = self.engine.user_state(from).await;
        self.forget_search(from).await;
        match state {
            UserState::Paired { .. } => {
                if let Some(partner) = self.end_session(from).await {
                    self.notify(from, replies::YOU_ENDED).await;
                    self.notify(partner, replies::PARTNER_LEFT).await;
                }
            }
            UserState::Waiting => {
                self.engine.cancel_search(from).await;
                self.notify(from, replies::SEARCH_CANCELLED).await;
            }
            UserState::Idle => {
                self.notify(from, replies::NOT_IN_SESSION).await;
            }
        }
    }

    /// Report the current partner; the session ends either way
    async fn report(&self, from: UserId, reason: Option<&str>, now: DateTime<Utc>) -> Result<()> {
        let Some(partner) = self.engine.partner_of(from).await else {
            self.notify(from, replies::NOT_IN_SESSION).await;
            return Ok(());
        };

        let outcome = self.moderation.record_report(from, partner, reason, now).await?;
        self.end_session(from).await;
        if let ReportOutcome::Recorded { auto_banned: Some(_), .. } = outcome {
            self.forget_search(partner).await;
        }

        let (reply, partner_reply) = match outcome {
            ReportOutcome::Recorded { auto_banned: Some(reason), .. } => (replies::REPORT_RECORDED, replies::banned(reason)),
            ReportOutcome::Recorded { .. } => (replies::REPORT_RECORDED, replies::PARTNER_LEFT.to_string()),
            ReportOutcome::AlreadyReported => (replies::ALREADY_REPORTED, replies::PARTNER_LEFT.to_string()),
            ReportOutcome::Immune => (replies::REPORT_IMMUNE, replies::PARTNER_LEFT.to_string()),
            ReportOutcome::SelfReport => {
                self.notify(from, replies::SELF_REPORT).await;
                return Ok(());
            }
        };
        self.notify(from, reply).await;
        self.notify(partner, &partner_reply).await;
        Ok(())
    }

    // =================================================================
    // ADMIN
    // =================================================================

    async fn handle_admin_command(&self, admin: UserId, command: Command, now: DateTime<Utc>) -> Result<()> {
        info!("Admin {} issued {:?}", admin, command);
        match command {
            Command::Ban(user) => {
                let partner = self.moderation.admin_ban(user).await?;
                self.forget_search(user).await;
                self.notify(user, &replies::banned(BanReason::Admin)).await;
                if let Some(partner) = partner {
                    self.notify(partner, replies::PARTNER_LEFT).await;
                }
                self.notify(admin, &replies::admin_done("Ban", user)).await;
            }
            Command::Unban(user) => {
                self.moderation.admin_unban(user).await?;
                self.notify(user, replies::UNBANNED).await;
                self.notify(admin, &replies::admin_done("Unban", user)).await;
            }
            Command::Warn(user) => {
                match self.moderation.admin_warn(user, now).await? {
                    WarnOutcome::Warned { count } => {
                        let limit = self.tracker.thresholds().await.warning_limit;
                        self.notify(user, &replies::warned(count, limit)).await;
                    }
                    WarnOutcome::Banned { partner, .. } => {
                        self.forget_search(user).await;
                        self.notify(user, &replies::banned(BanReason::Warnings)).await;
                        if let Some(partner) = partner {
                            self.notify(partner, replies::PARTNER_LEFT).await;
                        }
                    }
                }
                self.notify(admin, &replies::admin_done("Warning", user)).await;
            }
            Command::End(user) => {
                let partner = self.moderation.admin_force_end(user).await;
                self.forget_search(user).await;
                if let Some(partner) = partner {
                    self.notify(user, replies::ENDED_BY_ADMIN).await;
                    self.notify(partner, replies::ENDED_BY_ADMIN).await;
                }
                self.notify(admin, &replies::admin_done("End", user)).await;
            }
            Command::Stats => {
                let stats = self.engine.stats().await;
                let watched = self.tracker.tracked_users().await;
                self.notify(admin, &replies::stats(&stats, watched)).await;
            }
            other => debug!("Not an admin command: {:?}", other),
        }
        Ok(())
    }

    /// End the user's session and drop the abuse windows of both sides
    async fn end_session(&self, user: UserId) -> Option<UserId> {
        let partner = self.engine.end_session(user).await;
        self.tracker.forget(user).await;
        if let Some(partner) = partner {
            self.tracker.forget(partner).await;
        }
        partner
    }

    /// Drop the search notice and remembered preference of a user who stopped searching
    async fn forget_search(&self, user: UserId) {
        self.search_notices.write().await.remove(&user);
        self.preferences.write().await.remove(&user);
    }

    /// Best-effort send; failures are logged and otherwise ignored
    async fn notify(&self, to: UserId, text: &str) -> bool {
        match self.messenger.send(to, text).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Failed to send message to {}: {}", to, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryUserStore;
    use crate::types::Invoice;
    use async_trait::async_trait;

    /// Accepts everything and hands out increasing message ids
    #[derive(Default)]
    struct SilentMessenger {
        next_id: std::sync::atomic::AtomicI64,
    }

    #[async_trait]
    impl Messenger for SilentMessenger {
        async fn send(&self, _to: UserId, _text: &str) -> Result<i64, TransportError> {
            Ok(self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst))
        }

        async fn forward(
            &self,
            _to: UserId,
            _from: UserId,
            _message_id: i64,
            _caption: Option<&str>,
        ) -> Result<i64, TransportError> {
            Ok(self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst))
        }

        async fn answer_payment(&self, _id: &str, _accept: bool, _error: Option<&str>) -> Result<(), TransportError> {
            Ok(())
        }

        async fn edit(&self, _to: UserId, _message_id: i64, _text: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn send_invoice(&self, _to: UserId, _invoice: &Invoice) -> Result<(), TransportError> {
            Ok(())
        }

        fn platform_name(&self) -> &str {
            "silent"
        }
    }

    const ADMIN: UserId = UserId(99);

    async fn service() -> ChatService {
        let mut config = BotConfiguration::default();
        config.core.admin_ids = vec![ADMIN.0];
        let service = ChatService::new(
            &config,
            Arc::new(InMemoryUserStore::new()),
            Arc::new(SilentMessenger::default()),
        )
        .unwrap();
        for (id, gender) in [(1, Gender::Female), (2, Gender::Male)] {
            service
                .handle_command(UserId(id), Command::Register { gender, nickname: format!("user{}", id) }, Utc::now())
                .await
                .unwrap();
        }
        service
    }

    async fn search_state(service: &ChatService, user: UserId) -> (bool, bool) {
        (
            service.search_notices.read().await.contains_key(&user),
            service.preferences.read().await.contains_key(&user),
        )
    }

    #[tokio::test]
    async fn test_admin_ban_drops_search_state() {
        let service = service().await;
        service.handle_command(UserId(1), Command::Find(GenderPreference::Any), Utc::now()).await.unwrap();
        assert_eq!(search_state(&service, UserId(1)).await, (true, true));

        service.handle_command(ADMIN, Command::Ban(UserId(1)), Utc::now()).await.unwrap();
        assert_eq!(search_state(&service, UserId(1)).await, (false, false));
        assert!(!service.engine.is_waiting(UserId(1)).await);
    }

    #[tokio::test]
    async fn test_stop_drops_search_state() {
        let service = service().await;
        service.handle_command(UserId(2), Command::Find(GenderPreference::Any), Utc::now()).await.unwrap();
        service.handle_command(UserId(2), Command::Stop, Utc::now()).await.unwrap();
        assert_eq!(search_state(&service, UserId(2)).await, (false, false));
    }

    #[tokio::test]
    async fn test_next_keeps_preference() {
        let service = service().await;
        let now = Utc::now();
        service.handle_command(UserId(1), Command::Find(GenderPreference::Any), now).await.unwrap();
        service.handle_command(UserId(2), Command::Find(GenderPreference::Any), now).await.unwrap();
        assert_eq!(service.engine.partner_of(UserId(1)).await, Some(UserId(2)));

        service.handle_command(UserId(1), Command::Next, now).await.unwrap();
        assert!(service.engine.is_waiting(UserId(1)).await);
        assert_eq!(search_state(&service, UserId(1)).await, (true, true));
    }
}
