use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::env;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use url::Url;

use crate::config::{PaymentSettings, TelegramSettings};
use crate::platforms::{InboundEvent, Messenger, TransportError};
use crate::types::{Invoice, MediaKind, MessageContent, UserId};

/// Bot API envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<TelegramMessage>,
    pre_checkout_query: Option<PreCheckoutQuery>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    message_id: i64,
    chat: Chat,
    date: i64,
    text: Option<String>,
    caption: Option<String>,
    photo: Option<serde_json::Value>,
    video: Option<serde_json::Value>,
    animation: Option<serde_json::Value>,
    sticker: Option<serde_json::Value>,
    voice: Option<serde_json::Value>,
    video_note: Option<serde_json::Value>,
    audio: Option<serde_json::Value>,
    document: Option<serde_json::Value>,
    successful_payment: Option<SuccessfulPayment>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    #[serde(rename = "type")]
    chat_type: String,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct PreCheckoutQuery {
    id: String,
    from: TelegramUser,
    total_amount: i64,
    invoice_payload: String,
}

#[derive(Debug, Deserialize)]
struct SuccessfulPayment {
    total_amount: i64,
    invoice_payload: String,
    telegram_payment_charge_id: String,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct MessageIdResult {
    message_id: i64,
}

/// Configuration for the Telegram Bot API
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub api_base: Url,
    pub poll_timeout_seconds: u64,
    pub retry_delay_seconds: u64,
    /// Empty for payments in Telegram Stars
    pub provider_token: String,
}

impl TelegramConfig {
    /// Secrets from the environment, everything else from `bot.yaml`
    pub fn from_env(settings: &TelegramSettings, payments: &PaymentSettings) -> Result<Self> {
        let bot_token = env::var("TELEGRAM_BOT_TOKEN")
            .context("TELEGRAM_BOT_TOKEN environment variable not set")?;
        if !bot_token.contains(':') {
            return Err(anyhow::anyhow!("TELEGRAM_BOT_TOKEN does not look like a bot token"));
        }

        let provider_token = env::var(&payments.provider_token_env).unwrap_or_default();
        if provider_token.is_empty() {
            warn!("{} not set, invoices will use an empty provider token", payments.provider_token_env);
        }

        let api_base = Url::parse(&settings.api_base)
            .with_context(|| format!("Invalid Telegram API base '{}'", settings.api_base))?;

        info!("Loaded Telegram config (API base {})", api_base);
        Ok(Self {
            bot_token,
            api_base,
            poll_timeout_seconds: settings.poll_timeout_seconds,
            retry_delay_seconds: settings.retry_delay_seconds,
            provider_token,
        })
    }

    fn method_url(&self, method: &str) -> Result<Url, url::ParseError> {
        let base = self.api_base.as_str().trim_end_matches('/');
        Url::parse(&format!("{}/bot{}/{}", base, self.bot_token, method))
    }
}

/// Thin Bot API client shared by the messenger and the poller
#[derive(Clone)]
struct BotApi {
    config: TelegramConfig,
    http_client: reqwest::Client,
}

impl BotApi {
    fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T, TransportError> {
        let url = self.config.method_url(method).map_err(|e| TransportError::Api {
            code: 0,
            description: format!("bad method URL: {}", e),
        })?;

        let response: ApiResponse<T> = self.http_client.post(url).json(&body).send().await?.json().await?;
        match response {
            ApiResponse { ok: true, result: Some(result), .. } => Ok(result),
            ApiResponse { error_code, description, .. } => Err(TransportError::Api {
                code: error_code.unwrap_or(0),
                description: description.unwrap_or_else(|| format!("{} failed", method)),
            }),
        }
    }
}

/// 403 from the Bot API means the user blocked the bot or deleted the chat
fn for_recipient(err: TransportError, to: UserId) -> TransportError {
    match err {
        TransportError::Api { code: 403, .. } => TransportError::BlockedByUser(to),
        other => other,
    }
}

pub struct TelegramMessenger {
    api: BotApi,
}

impl TelegramMessenger {
    pub fn new(config: TelegramConfig) -> Self {
        Self { api: BotApi::new(config) }
    }

    /// Long-polling receiver sharing this messenger's HTTP client
    pub fn poller(&self) -> TelegramPoller {
        TelegramPoller {
            api: self.api.clone(),
            offset: 0,
        }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send(&self, to: UserId, text: &str) -> Result<i64, TransportError> {
        let sent: SentMessage = self
            .api
            .call("sendMessage", json!({ "chat_id": to.0, "text": text }))
            .await
            .map_err(|e| for_recipient(e, to))?;
        Ok(sent.message_id)
    }

    async fn forward(
        &self,
        to: UserId,
        from: UserId,
        message_id: i64,
        caption: Option<&str>,
    ) -> Result<i64, TransportError> {
        let mut body = json!({ "chat_id": to.0, "from_chat_id": from.0, "message_id": message_id });
        if let Some(caption) = caption {
            body["caption"] = json!(caption);
        }
        let copied: MessageIdResult = self
            .api
            .call("copyMessage", body)
            .await
            .map_err(|e| for_recipient(e, to))?;
        Ok(copied.message_id)
    }

    async fn answer_payment(&self, payment_id: &str, accept: bool, error: Option<&str>) -> Result<(), TransportError> {
        let mut body = json!({ "pre_checkout_query_id": payment_id, "ok": accept });
        if let Some(message) = error {
            body["error_message"] = json!(message);
        }
        let _: bool = self.api.call("answerPreCheckoutQuery", body).await?;
        Ok(())
    }

    async fn edit(&self, to: UserId, message_id: i64, text: &str) -> Result<(), TransportError> {
        let _: serde_json::Value = self
            .api
            .call(
                "editMessageText",
                json!({ "chat_id": to.0, "message_id": message_id, "text": text }),
            )
            .await
            .map_err(|e| for_recipient(e, to))?;
        Ok(())
    }

    async fn send_invoice(&self, to: UserId, invoice: &Invoice) -> Result<(), TransportError> {
        let body = json!({
            "chat_id": to.0,
            "title": invoice.title,
            "description": invoice.description,
            "payload": invoice.payload,
            "provider_token": self.api.config.provider_token,
            "currency": invoice.currency,
            "prices": [{ "label": invoice.title, "amount": invoice.amount }],
        });
        let _: SentMessage = self.api.call("sendInvoice", body).await.map_err(|e| for_recipient(e, to))?;
        Ok(())
    }

    fn platform_name(&self) -> &str {
        "telegram"
    }
}

/// Pulls updates with `getUpdates` and hands them to the service loop
pub struct TelegramPoller {
    api: BotApi,
    offset: i64,
}

impl TelegramPoller {
    /// Runs until the receiving side of `events` is dropped
    pub async fn run(mut self, events: mpsc::Sender<InboundEvent>) {
        info!("Telegram poller started");
        loop {
            let updates = match self.poll_once().await {
                Ok(updates) => updates,
                Err(e) => {
                    error!("getUpdates failed: {}", e);
                    sleep(Duration::from_secs(self.api.config.retry_delay_seconds)).await;
                    continue;
                }
            };

            for update in updates {
                self.offset = self.offset.max(update.update_id + 1);
                let Some(event) = update_to_event(update) else {
                    continue;
                };
                if events.send(event).await.is_err() {
                    info!("Event channel closed, stopping Telegram poller");
                    return;
                }
            }
        }
    }

    async fn poll_once(&self) -> Result<Vec<Update>, TransportError> {
        let body = json!({
            "offset": self.offset,
            "timeout": self.api.config.poll_timeout_seconds,
            "allowed_updates": ["message", "pre_checkout_query"],
        });
        let updates: Vec<Update> = self.api.call("getUpdates", body).await?;
        if !updates.is_empty() {
            debug!("Received {} update(s)", updates.len());
        }
        Ok(updates)
    }
}

fn update_to_event(update: Update) -> Option<InboundEvent> {
    if let Some(query) = update.pre_checkout_query {
        return Some(InboundEvent::PreCheckout {
            from: UserId(query.from.id),
            payment_id: query.id,
            payload: query.invoice_payload,
            total_amount: query.total_amount,
        });
    }

    let message = update.message?;
    if message.chat.chat_type != "private" {
        debug!("Ignoring update {} from {} chat", update.update_id, message.chat.chat_type);
        return None;
    }
    let from = UserId(message.chat.id);

    if let Some(payment) = message.successful_payment {
        return Some(InboundEvent::PaymentConfirmed {
            from,
            payload: payment.invoice_payload,
            total_amount: payment.total_amount,
            charge_id: payment.telegram_payment_charge_id,
        });
    }

    let content = message_content(&message)?;
    let timestamp: DateTime<Utc> = Utc.timestamp_opt(message.date, 0).single().unwrap_or_else(Utc::now);
    Some(InboundEvent::Message {
        from,
        message_id: message.message_id,
        content,
        timestamp,
    })
}

fn message_content(message: &TelegramMessage) -> Option<MessageContent> {
    if let Some(text) = &message.text {
        return Some(MessageContent::Text(text.clone()));
    }

    let kinds = [
        (&message.photo, MediaKind::Photo),
        (&message.video, MediaKind::Video),
        (&message.animation, MediaKind::Animation),
        (&message.sticker, MediaKind::Sticker),
        (&message.voice, MediaKind::Voice),
        (&message.video_note, MediaKind::VideoNote),
        (&message.audio, MediaKind::Audio),
        (&message.document, MediaKind::Document),
    ];
    // Animations also carry a `document` field, so the order above matters
    kinds.into_iter().find(|(field, _)| field.is_some()).map(|(_, kind)| MessageContent::Media {
        kind,
        caption: message.caption.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: serde_json::Value) -> Option<InboundEvent> {
        update_to_event(serde_json::from_value(raw).unwrap())
    }

    #[test]
    fn test_text_message() {
        let event = parse(json!({
            "update_id": 10,
            "message": {
                "message_id": 5,
                "chat": { "id": 42, "type": "private" },
                "date": 1700000000,
                "text": "hello"
            }
        }));
        assert_eq!(
            event,
            Some(InboundEvent::Message {
                from: UserId(42),
                message_id: 5,
                content: MessageContent::Text("hello".to_string()),
                timestamp: Utc.timestamp_opt(1700000000, 0).unwrap(),
            })
        );
    }

    #[test]
    fn test_animation_wins_over_document() {
        let event = parse(json!({
            "update_id": 11,
            "message": {
                "message_id": 6,
                "chat": { "id": 42, "type": "private" },
                "date": 1700000000,
                "animation": { "file_id": "a" },
                "document": { "file_id": "a" },
                "caption": "lol"
            }
        }));
        match event {
            Some(InboundEvent::Message { content, .. }) => assert_eq!(
                content,
                MessageContent::Media { kind: MediaKind::Animation, caption: Some("lol".to_string()) }
            ),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_group_chats_are_ignored() {
        let event = parse(json!({
            "update_id": 12,
            "message": {
                "message_id": 7,
                "chat": { "id": -100, "type": "supergroup" },
                "date": 1700000000,
                "text": "hi all"
            }
        }));
        assert_eq!(event, None);
    }

    #[test]
    fn test_payment_updates() {
        let pre_checkout = parse(json!({
            "update_id": 13,
            "pre_checkout_query": {
                "id": "pcq-1",
                "from": { "id": 42 },
                "currency": "USD",
                "total_amount": 199,
                "invoice_payload": "premium:week"
            }
        }));
        assert_eq!(
            pre_checkout,
            Some(InboundEvent::PreCheckout {
                from: UserId(42),
                payment_id: "pcq-1".to_string(),
                payload: "premium:week".to_string(),
                total_amount: 199,
            })
        );

        let confirmed = parse(json!({
            "update_id": 14,
            "message": {
                "message_id": 8,
                "chat": { "id": 42, "type": "private" },
                "date": 1700000000,
                "successful_payment": {
                    "currency": "USD",
                    "total_amount": 199,
                    "invoice_payload": "premium:week",
                    "telegram_payment_charge_id": "ch-1"
                }
            }
        }));
        assert_eq!(confirmed.map(|e| e.sender()), Some(UserId(42)));
    }

    #[test]
    fn test_method_url() {
        let mut config = TelegramConfig {
            bot_token: "123:abc".to_string(),
            api_base: Url::parse("https://api.telegram.org").unwrap(),
            poll_timeout_seconds: 30,
            retry_delay_seconds: 5,
            provider_token: String::new(),
        };
        assert_eq!(config.method_url("getMe").unwrap().as_str(), "https://api.telegram.org/bot123:abc/getMe");

        config.api_base = Url::parse("http://localhost:8081/tg/").unwrap();
        assert_eq!(config.method_url("getMe").unwrap().as_str(), "http://localhost:8081/tg/bot123:abc/getMe");
    }

    #[test]
    fn test_api_errors_map_to_blocked() {
        let err = TransportError::Api { code: 403, description: "Forbidden: bot was blocked by the user".to_string() };
        assert!(matches!(for_recipient(err, UserId(1)), TransportError::BlockedByUser(UserId(1))));
        let err = TransportError::Api { code: 400, description: "Bad Request".to_string() };
        assert!(matches!(for_recipient(err, UserId(1)), TransportError::Api { code: 400, .. }));
    }
}
