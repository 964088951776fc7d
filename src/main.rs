// src/main.rs - Telegram entry point

use anyhow::{Context, Result};
use log::{error, info, warn};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use anonchat::prelude::*;
use anonchat::VERSION;

const EVENT_QUEUE_SIZE: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // =================================================================
    // CONFIGURATION AND LOGGING
    // =================================================================

    let config_dir = env::var("ANONCHAT_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"));
    let config_manager = ConfigurationManager::new(&config_dir);
    let initialized = config_manager.initialize().await;
    let bot_config = config_manager.get_bot_config().await;

    // RUST_LOG wins over core.log_level
    let level = bot_config
        .core
        .log_level
        .parse::<log::LevelFilter>()
        .unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new().filter_level(level).parse_default_env().init();

    info!("Starting {} v{}", bot_config.core.bot_name, VERSION);

    if let Err(e) = initialized {
        error!("Failed to initialize configuration in {}: {:#}", config_dir.display(), e);
        return Err(e);
    }
    if let Err(e) = config_manager.watch().await {
        warn!("Configuration hot reload disabled: {:#}", e);
    }

    // =================================================================
    // TRANSPORT AND SERVICE
    // =================================================================

    let telegram_config = TelegramConfig::from_env(&bot_config.telegram, &bot_config.payments)?;
    let messenger = TelegramMessenger::new(telegram_config);
    let poller = messenger.poller();

    let users = InMemoryUserStore::new();
    let store: Arc<dyn UserStore> = Arc::new(users.clone());
    let service = ChatService::new(&bot_config, store, Arc::new(messenger)).context("creating chat service")?;
    info!("{} admin(s) configured", bot_config.core.admin_ids.len());

    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
    let poller_handle = tokio::spawn(poller.run(event_tx));

    // =================================================================
    // RUN UNTIL SHUTDOWN
    // =================================================================

    tokio::select! {
        _ = service.run(event_rx, &config_manager) => {
            warn!("Chat service stopped on its own");
        }
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        },
    }

    poller_handle.abort();
    let stats = service.stats().await;
    info!(
        "Shut down with {} active chat(s), {} waiting user(s), {} registered user(s)",
        stats.active_sessions,
        stats.premium_waiting + stats.regular_waiting,
        users.len().await
    );
    Ok(())
}
