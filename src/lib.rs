//! # Anonymous Chat Matchmaking
//!
//! An anonymous one-to-one chat bot: users join a waiting pool, get paired with
//! a stranger, and talk through the bot while it relays and moderates messages.
//!
//! ## Features
//!
//! - **Two-tier matchmaking**: premium users are matched first and may choose a partner's gender
//! - **Exclusive sessions**: nobody is ever waiting and chatting at once, or in two chats
//! - **Automatic moderation**: flood, repeat spam, bad words, links and reports lead to bans
//! - **Content filtering**: offending words and links are masked before delivery
//! - **Payments**: premium plans and paid identity reveals
//! - **Hot-reloaded YAML configuration**
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use anonchat::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BotConfiguration::default();
//!     let messenger = TelegramMessenger::new(TelegramConfig::from_env(&config.telegram, &config.payments)?);
//!     let store = Arc::new(InMemoryUserStore::new());
//!
//!     let service = ChatService::new(&config, store, Arc::new(messenger))?;
//!     println!("{:?}", service.stats().await);
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod config;
pub mod platforms;
pub mod store;
pub mod types;

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::matchmaking::{MatchEngine, MatchStats};
    pub use crate::bot::ChatService;
    pub use crate::config::{BotConfiguration, ConfigurationManager};
    pub use crate::platforms::{
        telegram::{TelegramConfig, TelegramMessenger, TelegramPoller},
        InboundEvent, Messenger, TransportError,
    };
    pub use crate::store::{InMemoryUserStore, UserStore};
    pub use crate::types::{
        ChatMessage, Gender, GenderPreference, MatchOutcome, MessageContent, RelayOutcome, UserId, UserProfile,
    };
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
