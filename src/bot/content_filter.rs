// src/bot/content_filter.rs - Stateless text classification: bad words, links, nicknames

use anyhow::Result;
use log::debug;
use regex::Regex;
use std::collections::HashSet;
use std::ops::Range;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use url::Url;

use crate::config::FilterSettings;
use crate::types::NicknameError;

const LINK_PATTERN: &str = r"(?xi)
    (?:https?://|www\.)\S+
  | \bt\.me/\S+
  | \b[a-z0-9](?:[a-z0-9-]*[a-z0-9])?(?:\.[a-z0-9-]+)*\.(?:com|net|org|io|me|ru|info|xyz|tv|gg|co|app|site|online|link|ly|biz|club)\b(?:/\S*)?
  | (?:^|\s)@[a-z][a-z0-9_]{4,31}
";

/// Verdict for one piece of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub has_violation: bool,
    /// Text with every offending span replaced by mask characters
    pub masked: String,
    pub bad_words: usize,
    pub links: usize,
}

pub struct ContentFilter {
    bad_words: HashSet<String>,
    /// Bad words with runs of repeated letters collapsed, for "baaaad" style evasion
    compressed_bad_words: HashSet<String>,
    allowed_domains: Vec<String>,
    mask_char: char,
    nickname_min: usize,
    nickname_max: usize,
    link_regex: Regex,
    word_regex: Regex,
}

impl ContentFilter {
    pub fn new(settings: &FilterSettings) -> Result<Self> {
        let bad_words: HashSet<String> = settings
            .bad_words
            .iter()
            .map(|w| Self::normalize_word(w))
            .filter(|w| !w.is_empty())
            .collect();
        let compressed_bad_words = bad_words.iter().map(|w| Self::compress_repeats(w)).collect();

        Ok(Self {
            bad_words,
            compressed_bad_words,
            allowed_domains: settings
                .allowed_domains
                .iter()
                .map(|d| d.trim().trim_start_matches("www.").to_lowercase())
                .collect(),
            mask_char: settings.mask_char,
            nickname_min: settings.nickname_min_length,
            nickname_max: settings.nickname_max_length,
            link_regex: Regex::new(LINK_PATTERN)?,
            word_regex: Regex::new(r"\w+")?,
        })
    }

    /// Find bad words and links and produce the masked rendition
    pub fn classify(&self, text: &str) -> Classification {
        let mut spans = self.link_spans(text);
        let links = spans.len();

        let mut bad_words = 0;
        for word in self.word_regex.find_iter(text) {
            let range = word.range();
            if spans.iter().any(|s| s.start < range.end && range.start < s.end) {
                continue;
            }
            if self.is_bad_word(word.as_str()) {
                bad_words += 1;
                spans.push(range);
            }
        }

        spans.sort_by_key(|s| s.start);
        let masked = self.mask_spans(text, &spans);

        if !spans.is_empty() {
            debug!("Classified text: {} bad word(s), {} link(s)", bad_words, links);
        }

        Classification {
            has_violation: !spans.is_empty(),
            masked,
            bad_words,
            links,
        }
    }

    pub fn count_links(&self, text: &str) -> usize {
        self.link_spans(text).len()
    }

    pub fn validate_nickname(&self, nickname: &str) -> Result<(), NicknameError> {
        let nickname = nickname.trim();
        let length = nickname.chars().count();

        if length < self.nickname_min {
            return Err(NicknameError::TooShort { min: self.nickname_min });
        }
        if length > self.nickname_max {
            return Err(NicknameError::TooLong { max: self.nickname_max });
        }
        if self.count_links(nickname) > 0 || nickname.contains('@') {
            return Err(NicknameError::ContainsLink);
        }
        if !nickname
            .chars()
            .all(|c| c.is_alphanumeric() || c == ' ' || c == '_' || c == '-' || c == '.')
        {
            return Err(NicknameError::InvalidCharacters);
        }
        if self.word_regex.find_iter(nickname).any(|w| self.is_bad_word(w.as_str())) {
            return Err(NicknameError::ContainsBadWord);
        }
        Ok(())
    }

    fn link_spans(&self, text: &str) -> Vec<Range<usize>> {
        self.link_regex
            .find_iter(text)
            .filter_map(|m| {
                // The mention branch may have consumed a leading space
                let raw = m.as_str();
                let trimmed = raw.trim_start();
                let start = m.start() + (raw.len() - trimmed.len());
                if self.is_allowed_link(trimmed) {
                    None
                } else {
                    Some(start..m.end())
                }
            })
            .collect()
    }

    fn is_allowed_link(&self, link: &str) -> bool {
        if self.allowed_domains.is_empty() || link.starts_with('@') {
            return false;
        }
        let candidate = if link.contains("://") {
            link.to_string()
        } else {
            format!("http://{}", link)
        };
        let Ok(url) = Url::parse(&candidate) else {
            return false;
        };
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.trim_start_matches("www.").to_lowercase();
        self.allowed_domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{}", d)))
    }

    fn is_bad_word(&self, word: &str) -> bool {
        let normalized = Self::normalize_word(word);
        if self.bad_words.contains(&normalized) {
            return true;
        }
        Self::has_long_run(&normalized)
            && self.compressed_bad_words.contains(&Self::compress_repeats(&normalized))
    }

    fn mask_spans(&self, text: &str, spans: &[Range<usize>]) -> String {
        let mut masked = String::with_capacity(text.len());
        let mut last = 0;
        for span in spans {
            masked.push_str(&text[last..span.start]);
            let width = text[span.clone()].chars().count();
            masked.extend(std::iter::repeat(self.mask_char).take(width));
            last = span.end;
        }
        masked.push_str(&text[last..]);
        masked
    }

    /// Lowercase, strip accents, undo common digit substitutions
    fn normalize_word(word: &str) -> String {
        word.nfkd()
            .filter(|c| !is_combining_mark(*c))
            .flat_map(|c| c.to_lowercase())
            .map(|c| match c {
                '0' => 'o',
                '1' => 'i',
                '3' => 'e',
                '4' => 'a',
                '5' => 's',
                '7' => 't',
                other => other,
            })
            .collect()
    }

    fn compress_repeats(word: &str) -> String {
        let mut out = String::with_capacity(word.len());
        let mut prev = None;
        for c in word.chars() {
            if prev != Some(c) {
                out.push(c);
            }
            prev = Some(c);
        }
        out
    }

    fn has_long_run(word: &str) -> bool {
        let chars: Vec<char> = word.chars().collect();
        chars.windows(3).any(|w| w[0] == w[1] && w[1] == w[2])
    }
}
