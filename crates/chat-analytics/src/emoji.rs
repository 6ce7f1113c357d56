// crates/chat-analytics/src/emoji.rs

//! Most-used reaction image per participant.
//!
//! Candidates come either pre-counted from the fast path or from a full scan of the
//! conversation's emoji messages. Both paths share the md5/URL extraction below.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::ControlFlow;
use tracing::debug;

use crate::cursor::{CursorOptions, CursorStream};
use crate::record::{aliases, lookup, message_types, FieldValue, MessageRecord, Ownership, RawRow};
use crate::store::MessageStore;

/// Direct md5 matches shorter than this are treated as noise.
const MIN_DIRECT_MD5_LEN: usize = 24;

lazy_static! {
    static ref MD5_RUN: Regex = Regex::new(r"[a-fA-F0-9]{16,64}").unwrap();
    static ref MD5_PATTERNS: [Regex; 3] = [
        Regex::new(r#"(?i)md5\s*=\s*['"]([a-f0-9]{16,64})['"]"#).unwrap(),
        Regex::new(r"(?i)md5\s*=\s*([a-f0-9]{16,64})").unwrap(),
        Regex::new(r"(?i)<md5>([a-f0-9]{16,64})</md5>").unwrap(),
    ];
    static ref URL_ATTR_PATTERNS: [Regex; 2] = [
        Regex::new(r#"(?i)(?:cdnurl|thumburl)\s*=\s*['"]([^'"]+)['"]"#).unwrap(),
        Regex::new(r#"(?i)(?:cdnurl|thumburl)\s*=\s*([^'"\s>]+)"#).unwrap(),
    ];
    static ref URL_TAG_PATTERNS: [Regex; 2] = [
        Regex::new(r"(?i)<(?:cdnurl|thumburl)>([^<]+)</(?:cdnurl|thumburl)>").unwrap(),
        Regex::new(r"(?i)(?:cdnurl|thumburl)[^>]*>([^<]+)").unwrap(),
    ];
    static ref HTTP_URL: Regex = Regex::new(r"(?i)^https?://").unwrap();
    static ref OWNER_PREFIX: Regex = Regex::new(r"^\s*([01])\s*:\s*").unwrap();
}

const SIDE_MINE: &[&str] = &["me", "self", "mine", "out", "outgoing", "sent"];
const SIDE_THEIRS: &[&str] = &["friend", "peer", "other", "in", "incoming", "received", "recv"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmojiCandidate {
    /// `Some(true)` for the store owner, `Some(false)` for the peer.
    pub owner: Option<bool>,
    pub md5: Option<String>,
    pub url: Option<String>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopEmoji {
    pub md5: String,
    pub url: Option<String>,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopEmojis {
    pub mine: Option<TopEmoji>,
    pub theirs: Option<TopEmoji>,
}

impl TopEmojis {
    pub fn is_complete(&self) -> bool {
        self.mine.is_some() && self.theirs.is_some()
    }

    /// Take each owner's entry from `other` only where this one has none.
    pub fn fill_missing(&mut self, other: TopEmojis) {
        if self.mine.is_none() {
            self.mine = other.mine;
        }
        if self.theirs.is_none() {
            self.theirs = other.theirs;
        }
    }
}

/// Whether the conversation scan must run to complete the top emojis.
pub fn needs_fallback(emoji_count: u64, top: &TopEmojis) -> bool {
    emoji_count > 0 && !top.is_complete()
}

pub struct EmojiResolver;

impl EmojiResolver {
    /// Highest count per owner; the first candidate wins ties. Incomplete candidates are skipped.
    pub fn resolve_top<I>(candidates: I) -> TopEmojis
    where
        I: IntoIterator<Item = EmojiCandidate>,
    {
        let mut top = TopEmojis::default();
        for candidate in candidates {
            let (Some(owner), Some(md5)) = (candidate.owner, candidate.md5) else {
                continue;
            };
            if candidate.count == 0 {
                continue;
            }
            let slot = if owner { &mut top.mine } else { &mut top.theirs };
            if slot.as_ref().map_or(true, |current| candidate.count > current.count) {
                *slot = Some(TopEmoji {
                    md5,
                    url: candidate.url,
                    count: candidate.count,
                });
            }
        }
        top
    }

    /// Read one pre-aggregated candidate row.
    pub fn parse_candidate(item: &RawRow) -> EmojiCandidate {
        let raw_content = text_of(item, aliases::CANDIDATE_CONTENT);
        let content = strip_owner_prefix(&raw_content);

        let count = lookup(item, aliases::CANDIDATE_COUNT)
            .and_then(FieldValue::as_i64)
            .filter(|count| *count > 0)
            .unwrap_or(0) as u64;

        let md5 = normalize_md5(&text_of(item, aliases::CANDIDATE_MD5))
            .or_else(|| extract_md5(content));
        let url = normalize_url(&text_of(item, aliases::CANDIDATE_URL))
            .or_else(|| extract_url(content));

        EmojiCandidate {
            owner: resolve_owner(item, &raw_content),
            md5,
            url,
            count,
        }
    }

    /// Tally every emoji message in one conversation and pick the top per owner.
    pub async fn scan_top_fallback(
        store: &dyn MessageStore,
        ownership: &Ownership,
        session_id: &str,
        begin: i64,
        end: i64,
    ) -> TopEmojis {
        let mut order: Vec<(bool, String)> = Vec::new();
        let mut tally: HashMap<(bool, String), (Option<String>, u64)> = HashMap::new();

        let options = CursorOptions::default().with_range(begin, end);
        let summary = CursorStream::new(store, options)
            .for_each_row(session_id, |row| {
                let record = MessageRecord::from_row(session_id, row);
                if record.local_type != message_types::EMOJI {
                    return ControlFlow::Continue(());
                }
                let raw_content = record.decoded_text();
                let content = strip_owner_prefix(&raw_content);
                let Some(md5) = normalize_md5(&text_of(row, aliases::EMOJI_MD5))
                    .or_else(|| extract_md5(content))
                else {
                    return ControlFlow::Continue(());
                };
                let url = normalize_url(&text_of(row, aliases::EMOJI_URL))
                    .or_else(|| extract_url(content));
                let key = (ownership.is_self(&record), md5);

                match tally.get_mut(&key) {
                    Some((existing_url, count)) => {
                        *count += 1;
                        if existing_url.is_none() {
                            *existing_url = url;
                        }
                    }
                    None => {
                        order.push(key.clone());
                        tally.insert(key, (url, 1));
                    }
                }
                ControlFlow::Continue(())
            })
            .await;
        debug!(
            "Emoji scan of {} covered {} rows, {} distinct emojis",
            session_id,
            summary.rows,
            order.len()
        );

        Self::resolve_top(order.into_iter().filter_map(|key| {
            let (url, count) = tally.remove(&key)?;
            Some(EmojiCandidate {
                owner: Some(key.0),
                md5: Some(key.1),
                url,
                count,
            })
        }))
    }
}

fn text_of(row: &RawRow, keys: &[&str]) -> String {
    lookup(row, keys).map(FieldValue::as_text).unwrap_or_default()
}

fn resolve_owner(item: &RawRow, raw_content: &str) -> Option<bool> {
    if let Some(flag) = lookup(item, aliases::CANDIDATE_OWNER_FLAG).and_then(FieldValue::as_flag) {
        return Some(flag);
    }

    let side = text_of(item, aliases::CANDIDATE_SIDE).trim().to_lowercase();
    if SIDE_MINE.contains(&side.as_str()) {
        return Some(true);
    }
    if SIDE_THEIRS.contains(&side.as_str()) {
        return Some(false);
    }

    OWNER_PREFIX
        .captures(raw_content)
        .map(|caps| &caps[1] == "1")
}

pub fn strip_owner_prefix(content: &str) -> &str {
    match OWNER_PREFIX.find(content) {
        Some(m) => &content[m.end()..],
        None => content,
    }
}

/// First 16-64 character hex run, lowercased.
pub fn normalize_md5(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    MD5_RUN.find(trimmed).map(|m| m.as_str().to_lowercase())
}

pub fn extract_md5(content: &str) -> Option<String> {
    if content.is_empty() {
        return None;
    }
    if let Some(direct) = normalize_md5(content) {
        if direct.len() >= MIN_DIRECT_MD5_LEN {
            return Some(direct);
        }
    }
    MD5_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(content))
        .and_then(|caps| normalize_md5(&caps[1]))
}

pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = raw.trim().replace("&amp;", "&");
    if url.is_empty() {
        return None;
    }
    if url.contains('%') {
        if let Some(decoded) = percent_decode(&url) {
            url = decoded;
        }
    }
    (!url.is_empty()).then_some(url)
}

pub fn extract_url(content: &str) -> Option<String> {
    if content.is_empty() {
        return None;
    }
    if let Some(direct) = normalize_url(content) {
        if HTTP_URL.is_match(&direct) {
            return Some(direct);
        }
    }
    if let Some(caps) = URL_ATTR_PATTERNS.iter().find_map(|p| p.captures(content)) {
        return normalize_url(&caps[1]);
    }
    URL_TAG_PATTERNS
        .iter()
        .find_map(|p| p.captures(content))
        .and_then(|caps| normalize_url(&caps[1]))
}

/// `%XX` decoding; `None` on a malformed escape or a result that is not UTF-8.
fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex_pair = bytes.get(i + 1..i + 3)?;
            let value = u8::from_str_radix(std::str::from_utf8(hex_pair).ok()?, 16).ok()?;
            out.push(value);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
