// src/config/mod.rs - YAML configuration with validation and hot reload

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::Duration;

use crate::types::{BanReason, UserId};

pub const BOT_CONFIG_FILE: &str = "bot.yaml";

/// Quiet period after the last write before a reload
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(500);

/// Owns `bot.yaml`: loads it, writes defaults, watches it for edits
#[derive(Clone)]
pub struct ConfigurationManager {
    config_dir: PathBuf,
    bot_config: Arc<RwLock<BotConfiguration>>,

    /// Kept alive for as long as the manager lives
    watchers: Arc<RwLock<Vec<RecommendedWatcher>>>,

    change_notifier: broadcast::Sender<ConfigChangeEvent>,
    validator: Arc<ConfigValidator>,
}

/// Events broadcast when configuration changes
#[derive(Debug, Clone)]
pub enum ConfigChangeEvent {
    BotConfigUpdated { file: String },
    ValidationError { file: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfiguration {
    pub version: String,
    pub core: CoreSettings,
    pub moderation: ModerationThresholds,
    pub filter: FilterSettings,
    pub payments: PaymentSettings,
    pub telegram: TelegramSettings,
}

impl Default for BotConfiguration {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            core: CoreSettings::default(),
            moderation: ModerationThresholds::default(),
            filter: FilterSettings::default(),
            payments: PaymentSettings::default(),
            telegram: TelegramSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreSettings {
    pub bot_name: String,
    pub log_level: String,
    pub admin_ids: Vec<i64>,
    pub max_message_length: usize,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            bot_name: "AnonChat".to_string(),
            log_level: "info".to_string(),
            admin_ids: Vec::new(),
            max_message_length: 4096,
        }
    }
}

impl CoreSettings {
    pub fn admins(&self) -> HashSet<UserId> {
        self.admin_ids.iter().copied().map(UserId).collect()
    }
}

/// Auto-ban thresholds for non-premium users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationThresholds {
    /// Messages allowed inside the flood window before a ban
    pub flood_messages: usize,
    pub flood_window_seconds: i64,
    /// How many recent texts are kept for duplicate detection
    pub repeat_window_size: usize,
    pub repeat_threshold: usize,
    pub bad_word_limit: u32,
    pub link_spam_limit: u32,
    pub report_limit: u32,
    pub warning_limit: u32,
}

impl Default for ModerationThresholds {
    fn default() -> Self {
        Self {
            flood_messages: 20,
            flood_window_seconds: 10,
            repeat_window_size: 20,
            repeat_threshold: 15,
            bad_word_limit: 50,
            link_spam_limit: 20,
            report_limit: 50,
            warning_limit: 3,
        }
    }
}

impl ModerationThresholds {
    pub fn flood_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.flood_window_seconds)
    }

    /// First crossed threshold, checked in a fixed order
    pub fn crossed(&self, counters: &AbuseCounters) -> Option<BanReason> {
        if counters.flood_triggered {
            Some(BanReason::Flood)
        } else if counters.repeat_triggered {
            Some(BanReason::RepeatSpam)
        } else if counters.bad_word_total >= self.bad_word_limit {
            Some(BanReason::BadWords)
        } else if counters.link_spam_total >= self.link_spam_limit {
            Some(BanReason::LinkSpam)
        } else if counters.report_total >= self.report_limit {
            Some(BanReason::Reports)
        } else if counters.warning_count >= self.warning_limit {
            Some(BanReason::Warnings)
        } else {
            None
        }
    }
}

/// Snapshot of everything an auto-ban decision looks at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AbuseCounters {
    pub flood_triggered: bool,
    pub repeat_triggered: bool,
    pub bad_word_total: u32,
    pub link_spam_total: u32,
    pub report_total: u32,
    pub warning_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub bad_words: Vec<String>,
    /// Links to these hosts (and their subdomains) are not counted or masked
    pub allowed_domains: Vec<String>,
    pub mask_char: char,
    pub nickname_min_length: usize,
    pub nickname_max_length: usize,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            bad_words: ["fuck", "shit", "bitch", "bastard", "asshole", "dick", "cunt", "whore", "slut"]
                .iter()
                .map(|w| w.to_string())
                .collect(),
            allowed_domains: Vec::new(),
            mask_char: '*',
            nickname_min_length: 2,
            nickname_max_length: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumPlan {
    pub id: String,
    pub title: String,
    pub days: i64,
    /// Smallest currency unit
    pub price: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentSettings {
    pub currency: String,
    /// Environment variable holding the payment provider token
    pub provider_token_env: String,
    pub premium_plans: Vec<PremiumPlan>,
    pub reveal_price: i64,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            provider_token_env: "PAYMENT_PROVIDER_TOKEN".to_string(),
            premium_plans: vec![
                PremiumPlan { id: "week".to_string(), title: "Premium for 7 days".to_string(), days: 7, price: 199 },
                PremiumPlan { id: "month".to_string(), title: "Premium for 30 days".to_string(), days: 30, price: 499 },
            ],
            reveal_price: 99,
        }
    }
}

impl PaymentSettings {
    pub fn plan(&self, id: &str) -> Option<&PremiumPlan> {
        self.premium_plans.iter().find(|p| p.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub api_base: String,
    pub poll_timeout_seconds: u64,
    pub retry_delay_seconds: u64,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            poll_timeout_seconds: 30,
            retry_delay_seconds: 5,
        }
    }
}

/// Structural checks run before a configuration replaces the live one
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_bot_config(&self, config: &BotConfiguration) -> Result<()> {
        if config.version.is_empty() {
            return Err(anyhow::anyhow!("Version cannot be empty"));
        }
        self.validate_thresholds(&config.moderation)?;
        self.validate_filter(&config.filter)?;
        self.validate_payments(&config.payments)?;
        Ok(())
    }

    fn validate_thresholds(&self, t: &ModerationThresholds) -> Result<()> {
        let counts = [
            ("flood_messages", t.flood_messages as u64),
            ("repeat_window_size", t.repeat_window_size as u64),
            ("repeat_threshold", t.repeat_threshold as u64),
            ("bad_word_limit", t.bad_word_limit as u64),
            ("link_spam_limit", t.link_spam_limit as u64),
            ("report_limit", t.report_limit as u64),
            ("warning_limit", t.warning_limit as u64),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(anyhow::anyhow!("moderation.{} must be greater than zero", name));
            }
        }
        if t.flood_window_seconds <= 0 {
            return Err(anyhow::anyhow!("moderation.flood_window_seconds must be positive"));
        }
        if t.repeat_window_size < t.repeat_threshold {
            return Err(anyhow::anyhow!(
                "moderation.repeat_window_size ({}) cannot be smaller than repeat_threshold ({})",
                t.repeat_window_size,
                t.repeat_threshold
            ));
        }
        Ok(())
    }

    fn validate_filter(&self, filter: &FilterSettings) -> Result<()> {
        if filter.nickname_min_length == 0 || filter.nickname_min_length > filter.nickname_max_length {
            return Err(anyhow::anyhow!(
                "filter nickname bounds are invalid: {}..={}",
                filter.nickname_min_length,
                filter.nickname_max_length
            ));
        }
        if filter.bad_words.iter().any(|w| w.trim().is_empty()) {
            return Err(anyhow::anyhow!("filter.bad_words cannot contain empty entries"));
        }
        Ok(())
    }

    fn validate_payments(&self, payments: &PaymentSettings) -> Result<()> {
        if payments.currency.len() != 3 {
            return Err(anyhow::anyhow!("payments.currency must be a 3-letter code"));
        }
        let mut seen = HashSet::new();
        for plan in &payments.premium_plans {
            if plan.id.is_empty() {
                return Err(anyhow::anyhow!("premium plan id cannot be empty"));
            }
            if !seen.insert(plan.id.as_str()) {
                return Err(anyhow::anyhow!("duplicate premium plan id '{}'", plan.id));
            }
            if plan.days <= 0 || plan.price <= 0 {
                return Err(anyhow::anyhow!("premium plan '{}' needs positive days and price", plan.id));
            }
        }
        if payments.reveal_price <= 0 {
            return Err(anyhow::anyhow!("payments.reveal_price must be positive"));
        }
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationManager {
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        let (tx, _) = broadcast::channel(16);

        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
            bot_config: Arc::new(RwLock::new(BotConfiguration::default())),
            watchers: Arc::new(RwLock::new(Vec::new())),
            change_notifier: tx,
            validator: Arc::new(ConfigValidator::new()),
        }
    }

    /// Create the directory, load or write `bot.yaml`
    pub async fn initialize(&self) -> Result<()> {
        if !self.config_dir.exists() {
            fs::create_dir_all(&self.config_dir)
                .await
                .with_context(|| format!("creating {}", self.config_dir.display()))?;
            info!("Created configuration directory: {}", self.config_dir.display());
        }

        let path = self.bot_config_path();
        if path.exists() {
            let config = Self::read_bot_config(&path, &self.validator).await?;
            *self.bot_config.write().await = config;
            debug!("Loaded bot configuration from {}", path.display());
        } else {
            warn!("{} not found, writing defaults", path.display());
            self.save_bot_config(&BotConfiguration::default()).await?;
        }

        Ok(())
    }

    /// Start watching the directory; changes are broadcast to subscribers
    pub async fn watch(&self) -> Result<()> {
        let config_dir = self.config_dir.clone();
        let change_notifier = self.change_notifier.clone();
        let bot_config = self.bot_config.clone();
        let validator = self.validator.clone();

        let (tx, mut rx) = mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                if let Err(e) = tx.blocking_send(event) {
                    error!("Failed to send file watch event: {}", e);
                }
            }
        })?;

        watcher.watch(&config_dir, RecursiveMode::NonRecursive)?;
        self.watchers.write().await.push(watcher);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(path) = Self::touched_bot_config(&event) else {
                    continue;
                };
                let path = Self::settle(&mut rx, path, RELOAD_DEBOUNCE).await;
                let filename = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(BOT_CONFIG_FILE)
                    .to_string();

                info!("Bot configuration file changed, reloading...");
                match Self::read_bot_config(&path, &validator).await {
                    Ok(config) => {
                        *bot_config.write().await = config;
                        let _ = change_notifier.send(ConfigChangeEvent::BotConfigUpdated { file: filename });
                    }
                    Err(e) => {
                        error!("Failed to reload bot config, keeping previous: {}", e);
                        let _ = change_notifier.send(ConfigChangeEvent::ValidationError {
                            file: filename,
                            error: e.to_string(),
                        });
                    }
                }
            }
        });

        info!("Watching {} for configuration changes", self.config_dir.display());
        Ok(())
    }

    /// The bot config file this event wrote to, if any
    fn touched_bot_config(event: &Event) -> Option<PathBuf> {
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            return None;
        }
        event
            .paths
            .iter()
            .find(|path| {
                matches!(
                    path.file_name().and_then(|n| n.to_str()),
                    Some(name) if name == BOT_CONFIG_FILE || name == "bot.yml"
                )
            })
            .cloned()
    }

    /// Swallow further writes until none arrives for `quiet`, so a burst reloads once with its final content
    async fn settle(rx: &mut mpsc::Receiver<Event>, mut path: PathBuf, quiet: Duration) -> PathBuf {
        loop {
            match tokio::time::timeout(quiet, rx.recv()).await {
                Ok(Some(event)) => {
                    if let Some(touched) = Self::touched_bot_config(&event) {
                        debug!("Coalescing another write to {}", touched.display());
                        path = touched;
                    }
                }
                Ok(None) | Err(_) => return path,
            }
        }
    }

    /// Re-read `bot.yaml` on demand
    pub async fn reload(&self) -> Result<()> {
        let path = self.bot_config_path();
        let config = Self::read_bot_config(&path, &self.validator).await?;
        *self.bot_config.write().await = config;
        let _ = self.change_notifier.send(ConfigChangeEvent::BotConfigUpdated {
            file: BOT_CONFIG_FILE.to_string(),
        });
        info!("Reloaded {}", path.display());
        Ok(())
    }

    pub async fn get_bot_config(&self) -> BotConfiguration {
        self.bot_config.read().await.clone()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.change_notifier.subscribe()
    }

    pub async fn save_bot_config(&self, config: &BotConfiguration) -> Result<()> {
        self.validator.validate_bot_config(config)?;
        let content = serde_yaml::to_string(config)?;
        let path = self.bot_config_path();
        fs::write(&path, content)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        *self.bot_config.write().await = config.clone();
        debug!("Saved bot configuration to {}", path.display());
        Ok(())
    }

    pub fn bot_config_path(&self) -> PathBuf {
        self.config_dir.join(BOT_CONFIG_FILE)
    }

    async fn read_bot_config(path: &Path, validator: &ConfigValidator) -> Result<BotConfiguration> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let config: BotConfiguration =
            serde_yaml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        validator.validate_bot_config(&config)?;
        Ok(config)
    }
}
