// src/bot/replies.rs - User-facing text for every outcome

use chrono::{DateTime, Utc};

use crate::bot::matchmaking::MatchStats;
use crate::config::PaymentSettings;
use crate::types::{BanReason, GenderPreference, MediaKind, NicknameError, UserId};

pub const NOT_REGISTERED: &str = "You are not registered yet. Use /register <male|female> <nickname>.";
pub const ALREADY_REGISTERED: &str = "You are already registered. Use /find to meet someone.";
pub const ALREADY_IN_SESSION: &str = "You are already chatting. Use /stop or /next first.";
pub const BANNED: &str = "Your account is banned.";
pub const SEARCHING: &str = "Looking for a partner...";
pub const SEARCH_CANCELLED: &str = "Search cancelled.";
pub const NOT_IN_SESSION: &str = "You are not in a chat. Use /find to start one.";
pub const YOU_ENDED: &str = "You left the chat. Use /find to meet someone new.";
pub const PARTNER_LEFT: &str = "Your partner left the chat. Use /find to meet someone new.";
pub const PARTNER_UNREACHABLE: &str = "Your partner can no longer be reached. The chat has ended.";
pub const SESSION_RESTRICTED: &str = "This chat has ended because one of you is restricted.";
pub const MESSAGE_FILTERED: &str = "Parts of your message were hidden by the filter.";
pub const MEDIA_BLOCKED_SENDER: &str = "Your partner has safe mode on, media was not delivered.";
pub const REPORT_RECORDED: &str = "Thanks, your report was recorded. The chat has ended.";
pub const ALREADY_REPORTED: &str = "You have already reported this user. The chat has ended.";
pub const REPORT_IMMUNE: &str = "Your report could not be applied to this user. The chat has ended.";
pub const SELF_REPORT: &str = "You cannot report yourself.";
pub const REVEAL_STALE: &str = "That chat has already ended, identities were not revealed.";
pub const SAFE_MODE_ON: &str = "Safe mode on: photos, videos and stickers from partners will be hidden.";
pub const SAFE_MODE_OFF: &str = "Safe mode off.";
pub const ENDED_BY_ADMIN: &str = "This chat was ended by a moderator.";
pub const UNBANNED: &str = "Your account has been restored. Welcome back!";
pub const UNKNOWN_COMMAND: &str = "Unknown command. Use /help to see what I understand.";
pub const INTERNAL_ERROR: &str = "Something went wrong, please try again later.";

pub fn welcome(bot_name: &str) -> String {
    format!(
        "Welcome to {}! Chat one on one with a random stranger.\n\
         Register with /register <male|female> <nickname>, then use /find.",
        bot_name
    )
}

pub fn help() -> String {
    [
        "/find [male|female|any] - meet a partner (gender choice is premium)",
        "/stop - leave the chat or the queue",
        "/next - leave and search again",
        "/report [reason] - report your partner",
        "/safemode on|off - hide media from partners",
        "/nick <name> - change nickname",
        "/premium [plan] - premium plans",
        "/reveal - reveal identities with your partner",
    ]
    .join("\n")
}

pub fn registered(nickname: &str) -> String {
    format!("Welcome, {}! Use /find to meet someone.", nickname)
}

pub fn nickname_rejected(error: &NicknameError) -> String {
    format!("That nickname cannot be used: {}.", error)
}

pub fn nickname_changed(nickname: &str) -> String {
    format!("Your nickname is now {}.", nickname)
}

pub fn usage(usage: &str) -> String {
    format!("Usage: {}", usage)
}

pub fn searching(preference: GenderPreference, premium: bool) -> String {
    match preference {
        GenderPreference::Any => SEARCHING.to_string(),
        _ if !premium => format!("{} (gender choice is a premium feature, searching everyone)", SEARCHING),
        GenderPreference::Male => format!("{} (male partners first)", SEARCHING),
        GenderPreference::Female => format!("{} (female partners first)", SEARCHING),
    }
}

pub fn matched() -> String {
    "Partner found! Say hi. /next for someone else, /stop to leave.".to_string()
}

pub fn message_too_long(max: usize) -> String {
    format!("Message too long, the limit is {} characters.", max)
}

pub fn media_blocked_recipient(kind: MediaKind) -> String {
    format!("Your partner sent a {}, hidden because safe mode is on.", kind)
}

pub fn banned(reason: BanReason) -> String {
    let why = match reason {
        BanReason::Flood => "sending too many messages",
        BanReason::RepeatSpam => "repeating the same message",
        BanReason::BadWords => "offensive language",
        BanReason::LinkSpam => "posting links",
        BanReason::Reports => "reports from other users",
        BanReason::Warnings => "repeated warnings",
        BanReason::Admin => "a moderator decision",
    };
    format!("You have been banned for {}.", why)
}

pub fn warned(count: u32, limit: u32) -> String {
    format!("You received a warning from a moderator ({}/{}).", count, limit)
}

pub fn premium_plans(payments: &PaymentSettings) -> String {
    let mut lines = vec!["Premium: choose your partner's gender, skip the queue, no automatic penalties.".to_string()];
    for plan in &payments.premium_plans {
        lines.push(format!("/premium {} - {} ({} {})", plan.id, plan.title, plan.price, payments.currency));
    }
    lines.join("\n")
}

pub fn premium_granted(expires_at: DateTime<Utc>) -> String {
    format!("Premium active until {}.", expires_at.format("%Y-%m-%d %H:%M UTC"))
}

pub fn revealed(partner_nickname: &str) -> String {
    format!("Identities revealed: your partner is {}.", partner_nickname)
}

pub fn admin_done(action: &str, user: UserId) -> String {
    format!("{} applied to {}.", action, user)
}

pub fn stats(stats: &MatchStats, watched: usize) -> String {
    format!(
        "Waiting: {} premium, {} regular\nActive chats: {}\nUsers under abuse watch: {}",
        stats.premium_waiting, stats.regular_waiting, stats.active_sessions, watched
    )
}
