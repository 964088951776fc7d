// src/types/mod.rs - Domain types shared by the matchmaking core and its collaborators

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Stable identity of a registered user (the platform's numeric chat id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(UserId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            other => Err(format!("unknown gender '{}'", other)),
        }
    }
}

/// Gender a requester wants to be matched with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenderPreference {
    Male,
    Female,
    #[default]
    Any,
}

impl GenderPreference {
    /// Whether a partner of `gender` satisfies this preference
    pub fn accepts(&self, gender: Gender) -> bool {
        match self {
            GenderPreference::Any => true,
            GenderPreference::Male => gender == Gender::Male,
            GenderPreference::Female => gender == Gender::Female,
        }
    }

    pub fn is_specific(&self) -> bool {
        !matches!(self, GenderPreference::Any)
    }
}

impl FromStr for GenderPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "any" | "random" => Ok(GenderPreference::Any),
            other => other.parse::<Gender>().map(|g| match g {
                Gender::Male => GenderPreference::Male,
                Gender::Female => GenderPreference::Female,
            }),
        }
    }
}

/// The subset of a user's stored profile the core reads and writes through the UserStore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub nickname: String,
    pub gender: Gender,
    pub is_premium: bool,
    pub premium_expires_at: Option<DateTime<Utc>>,
    /// `false` means banned
    pub is_active: bool,
    pub ban_reason: Option<String>,
    /// Blocks non-text media sent *to* this user
    pub safe_mode_enabled: bool,
    pub bad_word_total: u32,
    pub link_spam_total: u32,
    pub report_total: u32,
    pub warning_count: u32,
    pub registered_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(id: UserId, nickname: impl Into<String>, gender: Gender) -> Self {
        Self {
            id,
            nickname: nickname.into(),
            gender,
            is_premium: false,
            premium_expires_at: None,
            is_active: true,
            ban_reason: None,
            safe_mode_enabled: false,
            bad_word_total: 0,
            link_spam_total: 0,
            report_total: 0,
            warning_count: 0,
            registered_at: Utc::now(),
        }
    }

    /// Premium status valid until `expires_at`
    pub fn with_premium(mut self, expires_at: DateTime<Utc>) -> Self {
        self.is_premium = true;
        self.premium_expires_at = Some(expires_at);
        self
    }

    /// Premium counts only while the flag is set and the expiry lies in the future
    pub fn premium_active(&self, now: DateTime<Utc>) -> bool {
        self.is_premium && self.premium_expires_at.map_or(false, |expires| now < expires)
    }

    /// Flag still set but no longer valid; the stored flag should be cleared
    pub fn premium_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.is_premium && !self.premium_active(now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    Animation,
    Sticker,
    Voice,
    VideoNote,
    Audio,
    Document,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Animation => "animation",
            MediaKind::Sticker => "sticker",
            MediaKind::Voice => "voice message",
            MediaKind::VideoNote => "video note",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
        };
        f.write_str(name)
    }
}

/// Body of an inbound chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageContent {
    Text(String),
    Media { kind: MediaKind, caption: Option<String> },
}

impl MessageContent {
    /// Text body, or the caption of a media message
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            MessageContent::Media { caption, .. } => caption.as_deref(),
        }
    }
}

/// Inbound message from a user, as seen by the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: UserId,
    pub message_id: i64,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
}

/// Why a user was banned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BanReason {
    Flood,
    RepeatSpam,
    BadWords,
    LinkSpam,
    Reports,
    Warnings,
    Admin,
}

impl BanReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BanReason::Flood => "flood",
            BanReason::RepeatSpam => "repeat_spam",
            BanReason::BadWords => "bad_words",
            BanReason::LinkSpam => "link_spam",
            BanReason::Reports => "reports",
            BanReason::Warnings => "warnings",
            BanReason::Admin => "admin",
        }
    }
}

impl fmt::Display for BanReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of `MatchEngine::request_match`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    AlreadyInSession,
    Banned,
    Matched { partner: UserId },
    Waiting,
}

/// Result of `MessageRelay::relay`; the caller performs the transport side effects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Sender has no partner; the message is not ours to handle
    NoActiveSession,
    /// One side is banned; the session has been ended
    SessionEndedRestriction { partner: UserId },
    /// Sender crossed an abuse threshold; banned and session terminated, message dropped
    AutoBanned { partner: UserId, reason: BanReason },
    /// Forward the original message unchanged
    Relayed { partner: UserId },
    /// Send `masked` in place of the original text, or of the caption for media
    FilteredAndRelayed { partner: UserId, masked: String },
    /// Recipient has safe mode on; media not delivered
    BlockedBySafeMode { partner: UserId },
}

/// Result of recording a report against a user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Counted; `total` is the number of distinct reporters so far
    Recorded { total: u32, auto_banned: Option<BanReason> },
    AlreadyReported,
    /// Reported user holds active premium
    Immune,
    SelfReport,
}

/// Result of a paid identity reveal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealOutcome {
    Revealed { buyer_nickname: String, partner_nickname: String },
    /// The claimed pair is no longer chatting
    StaleSession,
}

/// Answer to a pending payment before the provider charges the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentCheck {
    Accept,
    Reject(String),
}

/// Product a payment payload refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentProduct {
    Premium { plan_id: String },
    IdentityReveal { partner: UserId },
}

impl PaymentProduct {
    pub fn payload(&self) -> String {
        match self {
            PaymentProduct::Premium { plan_id } => format!("premium:{}", plan_id),
            PaymentProduct::IdentityReveal { partner } => format!("reveal:{}", partner),
        }
    }

    pub fn parse(payload: &str) -> Option<Self> {
        let (kind, value) = payload.split_once(':')?;
        match kind {
            "premium" if !value.is_empty() => Some(PaymentProduct::Premium {
                plan_id: value.to_string(),
            }),
            "reveal" => value
                .parse::<UserId>()
                .ok()
                .map(|partner| PaymentProduct::IdentityReveal { partner }),
            _ => None,
        }
    }
}

/// Invoice handed to the messenger for payment collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub title: String,
    pub description: String,
    pub payload: String,
    pub currency: String,
    /// Smallest currency unit
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("user {user} already has an active session")]
    AlreadyInSession { user: UserId },
    #[error("user {0} cannot be paired with themselves")]
    SelfPairing(UserId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("user {0} is not registered")]
    UserNotFound(UserId),
    #[error("user {0} is already registered")]
    AlreadyRegistered(UserId),
    #[error("user store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NicknameError {
    #[error("nickname must be at least {min} characters")]
    TooShort { min: usize },
    #[error("nickname must be at most {max} characters")]
    TooLong { max: usize },
    #[error("nickname may only contain letters, digits, spaces, '.', '-' and '_'")]
    InvalidCharacters,
    #[error("nickname may not contain links or usernames")]
    ContainsLink,
    #[error("nickname contains a forbidden word")]
    ContainsBadWord,
}
