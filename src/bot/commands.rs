use log::debug;

use crate::types::{Gender, GenderPreference, UserId};

pub const COMMAND_PREFIX: char = '/';

/// A parsed slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Register { gender: Gender, nickname: String },
    Find(GenderPreference),
    Stop,
    Next,
    Report(Option<String>),
    SafeMode(bool),
    Nick(String),
    /// Without a plan id the available plans are listed
    Premium(Option<String>),
    Reveal,
    Stats,
    Ban(UserId),
    Unban(UserId),
    Warn(UserId),
    End(UserId),
    /// Known command with bad arguments
    Usage(&'static str),
    Unknown(String),
}

impl Command {
    /// Admin commands are ignored for everyone else
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Command::Ban(_) | Command::Unban(_) | Command::Warn(_) | Command::End(_) | Command::Stats
        )
    }

    /// `None` when the text is not a command at all
    pub fn parse(text: &str) -> Option<Command> {
        let text = text.trim();
        let body = text.strip_prefix(COMMAND_PREFIX)?;

        let (head, rest) = match body.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (body, ""),
        };
        // Group-style "/find@SomeBot"
        let name = head.split('@').next().unwrap_or(head).to_lowercase();
        let args: Vec<&str> = rest.split_whitespace().collect();

        debug!("Parsing command '{}' with {} argument(s)", name, args.len());

        let command = match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "register" => Self::parse_register(&args),
            "find" | "search" => match rest.parse::<GenderPreference>() {
                Ok(preference) => Command::Find(preference),
                Err(_) => Command::Usage("/find [male|female|any]"),
            },
            "stop" => Command::Stop,
            "next" => Command::Next,
            "report" => Command::Report((!rest.is_empty()).then(|| rest.to_string())),
            "safemode" => match args.first().map(|a| a.to_lowercase()).as_deref() {
                Some("on") => Command::SafeMode(true),
                Some("off") => Command::SafeMode(false),
                _ => Command::Usage("/safemode on|off"),
            },
            "nick" if !rest.is_empty() => Command::Nick(rest.to_string()),
            "nick" => Command::Usage("/nick <name>"),
            "premium" => Command::Premium(args.first().map(|a| a.to_lowercase())),
            "reveal" => Command::Reveal,
            "stats" => Command::Stats,
            "ban" => Self::with_target(&args, Command::Ban, "/ban <user id>"),
            "unban" => Self::with_target(&args, Command::Unban, "/unban <user id>"),
            "warn" => Self::with_target(&args, Command::Warn, "/warn <user id>"),
            "end" => Self::with_target(&args, Command::End, "/end <user id>"),
            _ => Command::Unknown(name),
        };
        Some(command)
    }

    fn parse_register(args: &[&str]) -> Command {
        const USAGE: &str = "/register <male|female> <nickname>";
        let Some((gender, nickname)) = args.split_first() else {
            return Command::Usage(USAGE);
        };
        match gender.parse::<Gender>() {
            Ok(gender) if !nickname.is_empty() => Command::Register {
                gender,
                nickname: nickname.join(" "),
            },
            _ => Command::Usage(USAGE),
        }
    }

    fn with_target(args: &[&str], build: fn(UserId) -> Command, usage: &'static str) -> Command {
        match args.first().map(|a| a.parse::<UserId>()) {
            Some(Ok(user)) => build(user),
            _ => Command::Usage(usage),
        }
    }
}
