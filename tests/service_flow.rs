// tests/service_flow.rs - ChatService end to end with a recording messenger

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anonchat::config::BotConfiguration;
use anonchat::platforms::{InboundEvent, Messenger, TransportError};
use anonchat::prelude::*;
use anonchat::types::{Invoice, MediaKind};

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Text { to: UserId, text: String },
    Forward { to: UserId, from: UserId, message_id: i64, caption: Option<String> },
    Edit { to: UserId, message_id: i64, text: String },
    Invoice { to: UserId, payload: String, amount: i64 },
    PaymentAnswer { payment_id: String, accept: bool },
}

#[derive(Default)]
struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
    blocked: Mutex<HashSet<UserId>>,
    next_id: Mutex<i64>,
}

impl RecordingMessenger {
    fn block(&self, user: UserId) {
        self.blocked.lock().unwrap().insert(user);
    }

    fn check(&self, to: UserId) -> Result<(), TransportError> {
        if self.blocked.lock().unwrap().contains(&to) {
            return Err(TransportError::BlockedByUser(to));
        }
        Ok(())
    }

    fn record(&self, sent: Sent) -> i64 {
        self.sent.lock().unwrap().push(sent);
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        *id
    }

    fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    fn texts_to(sent: &[Sent], user: UserId) -> Vec<String> {
        sent.iter()
            .filter_map(|s| match s {
                Sent::Text { to, text } if *to == user => Some(text.clone()),
                Sent::Edit { to, text, .. } if *to == user => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, to: UserId, text: &str) -> Result<i64, TransportError> {
        self.check(to)?;
        Ok(self.record(Sent::Text { to, text: text.to_string() }))
    }

    async fn forward(
        &self,
        to: UserId,
        from: UserId,
        message_id: i64,
        caption: Option<&str>,
    ) -> Result<i64, TransportError> {
        self.check(to)?;
        Ok(self.record(Sent::Forward { to, from, message_id, caption: caption.map(str::to_string) }))
    }

    async fn answer_payment(&self, payment_id: &str, accept: bool, _error: Option<&str>) -> Result<(), TransportError> {
        self.record(Sent::PaymentAnswer { payment_id: payment_id.to_string(), accept });
        Ok(())
    }

    async fn edit(&self, to: UserId, message_id: i64, text: &str) -> Result<(), TransportError> {
        self.check(to)?;
        self.record(Sent::Edit { to, message_id, text: text.to_string() });
        Ok(())
    }

    async fn send_invoice(&self, to: UserId, invoice: &Invoice) -> Result<(), TransportError> {
        self.check(to)?;
        self.record(Sent::Invoice { to, payload: invoice.payload.clone(), amount: invoice.amount });
        Ok(())
    }

    fn platform_name(&self) -> &str {
        "recording"
    }
}

const ALICE: UserId = UserId(1);
const BOB: UserId = UserId(2);
const ADMIN: UserId = UserId(99);

struct Harness {
    service: ChatService,
    messenger: Arc<RecordingMessenger>,
    store: InMemoryUserStore,
    next_message_id: i64,
}

impl Harness {
    fn new() -> Self {
        let mut config = BotConfiguration::default();
        config.core.admin_ids = vec![ADMIN.0];
        config.filter.bad_words = vec!["crap".to_string()];

        let messenger = Arc::new(RecordingMessenger::default());
        let store = InMemoryUserStore::new();
        let service = ChatService::new(&config, Arc::new(store.clone()), messenger.clone()).unwrap();
        Self { service, messenger, store, next_message_id: 100 }
    }

    async fn text(&mut self, from: UserId, text: &str) {
        self.text_at(from, text, Utc::now()).await;
    }

    async fn text_at(&mut self, from: UserId, text: &str, at: chrono::DateTime<Utc>) {
        self.next_message_id += 1;
        let event = InboundEvent::Message {
            from,
            message_id: self.next_message_id,
            content: MessageContent::Text(text.to_string()),
            timestamp: at,
        };
        self.service.handle_event(event).await.unwrap();
    }

    /// Register Alice and Bob and pair them
    async fn paired(&mut self) {
        self.text(ALICE, "/register female Alice").await;
        self.text(BOB, "/register male Bob").await;
        self.text(ALICE, "/find").await;
        self.text(BOB, "/find").await;
        self.messenger.take();
    }
}

#[test_log::test(tokio::test)]
async fn test_register_find_and_chat() {
    let mut h = Harness::new();
    h.text(ALICE, "/register female Alice").await;
    h.text(BOB, "/register male Bob").await;
    assert_eq!(h.store.len().await, 2);

    h.text(ALICE, "/find").await;
    assert_eq!(h.service.stats().await.regular_waiting, 1);

    h.text(BOB, "/find").await;
    assert_eq!(h.service.engine().partner_of(ALICE).await, Some(BOB));

    // Alice's "searching" notice is edited in place
    let sent = h.messenger.take();
    assert!(sent.iter().any(|s| matches!(s, Sent::Edit { to, .. } if *to == ALICE)));
    assert!(!RecordingMessenger::texts_to(&sent, BOB).is_empty());

    h.text(ALICE, "hello").await;
    let sent = h.messenger.take();
    assert_eq!(sent, vec![Sent::Forward { to: BOB, from: ALICE, message_id: h.next_message_id, caption: None }]);

    h.text(ALICE, "what crap").await;
    let sent = h.messenger.take();
    assert_eq!(RecordingMessenger::texts_to(&sent, BOB), vec!["what ****".to_string()]);
    assert!(!sent.iter().any(|s| matches!(s, Sent::Forward { .. })));
}

#[test_log::test(tokio::test)]
async fn test_photo_caption_is_masked_on_delivery() {
    let mut h = Harness::new();
    h.paired().await;

    h.next_message_id += 1;
    let message_id = h.next_message_id;
    h.service
        .handle_event(InboundEvent::Message {
            from: ALICE,
            message_id,
            content: MessageContent::Media { kind: MediaKind::Photo, caption: Some("crap pic".to_string()) },
            timestamp: Utc::now(),
        })
        .await
        .unwrap();

    let sent = h.messenger.take();
    assert!(sent.contains(&Sent::Forward {
        to: BOB,
        from: ALICE,
        message_id,
        caption: Some("**** pic".to_string()),
    }));
    assert_eq!(RecordingMessenger::texts_to(&sent, ALICE).len(), 1);
    assert_eq!(h.store.fetch(ALICE).await.unwrap().bad_word_total, 1);
}

#[test_log::test(tokio::test)]
async fn test_unregistered_user_is_told_to_register() {
    let mut h = Harness::new();
    h.text(ALICE, "/find").await;
    h.text(ALICE, "hi").await;
    let sent = h.messenger.take();
    assert_eq!(RecordingMessenger::texts_to(&sent, ALICE).len(), 2);
    assert_eq!(h.service.stats().await.regular_waiting, 0);
}

#[test_log::test(tokio::test)]
async fn test_stop_notifies_both_sides() {
    let mut h = Harness::new();
    h.paired().await;

    h.text(BOB, "/stop").await;
    let sent = h.messenger.take();
    assert_eq!(RecordingMessenger::texts_to(&sent, ALICE).len(), 1);
    assert_eq!(RecordingMessenger::texts_to(&sent, BOB).len(), 1);
    assert_eq!(h.service.engine().partner_of(ALICE).await, None);

    // A second stop finds nothing to end
    h.text(BOB, "/stop").await;
    assert_eq!(h.service.stats().await.active_sessions, 0);
}

#[test_log::test(tokio::test)]
async fn test_unreachable_partner_ends_session() {
    let mut h = Harness::new();
    h.paired().await;
    h.messenger.block(BOB);

    h.text(ALICE, "are you there?").await;
    assert_eq!(h.service.engine().partner_of(ALICE).await, None);
    assert_eq!(h.service.engine().partner_of(BOB).await, None);
    let sent = h.messenger.take();
    assert_eq!(RecordingMessenger::texts_to(&sent, ALICE).len(), 1);
}

#[test_log::test(tokio::test)]
async fn test_flood_bans_sender_and_frees_partner() {
    let mut h = Harness::new();
    h.paired().await;

    let start = Utc::now();
    for i in 0..20 {
        h.text_at(ALICE, &format!("spam {}", i), start + Duration::milliseconds(i * 100)).await;
    }

    let alice = h.store.fetch(ALICE).await.unwrap();
    assert!(!alice.is_active);
    assert_eq!(alice.ban_reason.as_deref(), Some("flood"));
    assert_eq!(h.service.engine().partner_of(BOB).await, None);

    // A banned user cannot search again
    h.text(ALICE, "/find").await;
    assert_eq!(h.service.stats().await.regular_waiting, 0);
}

#[test_log::test(tokio::test)]
async fn test_report_ends_session() {
    let mut h = Harness::new();
    h.paired().await;

    h.text(ALICE, "/report rude").await;
    assert_eq!(h.service.engine().partner_of(ALICE).await, None);
    assert_eq!(h.store.fetch(BOB).await.unwrap().report_total, 1);
}

#[test_log::test(tokio::test)]
async fn test_admin_commands_require_admin() {
    let mut h = Harness::new();
    h.paired().await;

    h.text(ALICE, "/ban 2").await;
    assert!(h.store.fetch(BOB).await.unwrap().is_active);

    h.text(ADMIN, "/ban 2").await;
    assert!(!h.store.fetch(BOB).await.unwrap().is_active);
    assert_eq!(h.service.engine().partner_of(ALICE).await, None);

    h.text(ADMIN, "/unban 2").await;
    assert!(h.store.fetch(BOB).await.unwrap().is_active);

    h.messenger.take();
    h.text(ADMIN, "/stats").await;
    let sent = h.messenger.take();
    assert!(RecordingMessenger::texts_to(&sent, ADMIN)[0].contains("Active chats: 0"));
}

#[test_log::test(tokio::test)]
async fn test_premium_purchase_flow() {
    let mut h = Harness::new();
    h.text(ALICE, "/register female Alice").await;
    h.messenger.take();

    h.text(ALICE, "/premium week").await;
    let sent = h.messenger.take();
    assert_eq!(
        sent,
        vec![Sent::Invoice { to: ALICE, payload: "premium:week".to_string(), amount: 199 }]
    );

    h.service
        .handle_event(InboundEvent::PreCheckout {
            from: ALICE,
            payment_id: "pcq-1".to_string(),
            payload: "premium:week".to_string(),
            total_amount: 199,
        })
        .await
        .unwrap();
    assert_eq!(
        h.messenger.take(),
        vec![Sent::PaymentAnswer { payment_id: "pcq-1".to_string(), accept: true }]
    );

    h.service
        .handle_event(InboundEvent::PaymentConfirmed {
            from: ALICE,
            payload: "premium:week".to_string(),
            total_amount: 199,
            charge_id: "ch-1".to_string(),
        })
        .await
        .unwrap();
    assert!(h.store.fetch(ALICE).await.unwrap().premium_active(Utc::now()));
}

#[test_log::test(tokio::test)]
async fn test_reveal_requires_live_chat() {
    let mut h = Harness::new();
    h.paired().await;

    h.text(ALICE, "/reveal").await;
    let sent = h.messenger.take();
    assert_eq!(
        sent,
        vec![Sent::Invoice { to: ALICE, payload: "reveal:2".to_string(), amount: 99 }]
    );

    h.text(BOB, "/stop").await;
    h.service
        .handle_event(InboundEvent::PreCheckout {
            from: ALICE,
            payment_id: "pcq-2".to_string(),
            payload: "reveal:2".to_string(),
            total_amount: 99,
        })
        .await
        .unwrap();
    let sent = h.messenger.take();
    assert!(sent.contains(&Sent::PaymentAnswer { payment_id: "pcq-2".to_string(), accept: false }));
}

#[test_log::test(tokio::test)]
async fn test_abuse_windows_released_when_chat_ends() {
    let mut h = Harness::new();
    h.paired().await;

    h.text(ALICE, "hi").await;
    h.text(BOB, "hello").await;
    h.messenger.take();
    h.text(ADMIN, "/stats").await;
    let sent = h.messenger.take();
    assert!(RecordingMessenger::texts_to(&sent, ADMIN)[0].contains("Users under abuse watch: 2"));

    h.text(BOB, "/stop").await;
    h.messenger.take();
    h.text(ADMIN, "/stats").await;
    let sent = h.messenger.take();
    assert!(RecordingMessenger::texts_to(&sent, ADMIN)[0].contains("Users under abuse watch: 0"));
}
