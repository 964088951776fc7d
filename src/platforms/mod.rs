use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{Invoice, MessageContent, UserId};

pub mod telegram;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("platform API error {code}: {description}")]
    Api { code: i64, description: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("user {0} blocked the bot")]
    BlockedByUser(UserId),
}

/// Everything the chat service receives from a platform
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Message {
        from: UserId,
        message_id: i64,
        content: MessageContent,
        timestamp: DateTime<Utc>,
    },
    /// The platform asks whether a payment may go ahead
    PreCheckout {
        from: UserId,
        payment_id: String,
        payload: String,
        total_amount: i64,
    },
    PaymentConfirmed {
        from: UserId,
        payload: String,
        total_amount: i64,
        charge_id: String,
    },
}

impl InboundEvent {
    pub fn sender(&self) -> UserId {
        match self {
            InboundEvent::Message { from, .. }
            | InboundEvent::PreCheckout { from, .. }
            | InboundEvent::PaymentConfirmed { from, .. } => *from,
        }
    }
}

/// Outbound side of a messaging platform
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a text message, returning the platform's message id
    async fn send(&self, to: UserId, text: &str) -> Result<i64, TransportError>;

    /// Copy a message to `to` without revealing its origin; `caption` replaces the original caption
    async fn forward(
        &self,
        to: UserId,
        from: UserId,
        message_id: i64,
        caption: Option<&str>,
    ) -> Result<i64, TransportError>;

    /// Answer a pending payment; `error` is shown to the user on rejection
    async fn answer_payment(&self, payment_id: &str, accept: bool, error: Option<&str>) -> Result<(), TransportError>;

    /// Replace the text of a message the bot sent earlier
    async fn edit(&self, to: UserId, message_id: i64, text: &str) -> Result<(), TransportError>;

    async fn send_invoice(&self, to: UserId, invoice: &Invoice) -> Result<(), TransportError>;

    /// Platform identifier, e.g. "telegram"
    fn platform_name(&self) -> &str;
}
