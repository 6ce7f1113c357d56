// crates/chat-analytics/src/record/fields.rs

//! Loosely typed row values and the alias tables used to read them.
//!
//! Store rows arrive with whatever column names the producing layer chose. Each logical
//! attribute has one ordered table of accepted names; [`lookup`] returns the first present,
//! non-null value.

use std::collections::HashMap;

use crate::payload::PayloadDecoder;

/// A single column value as produced by a message store.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// One row from a store: column name to value.
pub type RawRow = HashMap<String, FieldValue>;

/// Ordered alias tables, one per logical attribute.
pub mod aliases {
    pub const CREATE_TIME: &[&str] = &["create_time", "createTime", "create_time_ms"];
    pub const LOCAL_TYPE: &[&str] = &[
        "local_type",
        "localType",
        "type",
        "msg_type",
        "msgType",
        "WCDB_CT_local_type",
    ];
    pub const IS_SEND: &[&str] = &["computed_is_send", "is_send", "isSend"];
    pub const SENDER: &[&str] = &["sender_username", "sender", "talker"];
    pub const MESSAGE_CONTENT: &[&str] = &[
        "message_content",
        "messageContent",
        "content",
        "msg_content",
        "msgContent",
        "WCDB_CT_message_content",
        "WCDB_CT_messageContent",
    ];
    pub const COMPRESS_CONTENT: &[&str] = &[
        "compress_content",
        "compressContent",
        "compressed_content",
        "WCDB_CT_compress_content",
        "WCDB_CT_compressContent",
    ];
    pub const SESSION_USERNAME: &[&str] = &["username", "user_name", "userName"];
    pub const AVATAR_URL: &[&str] = &["avatar_url", "avatarUrl", "small_head_url", "big_head_url"];
    pub const SESSION_ID: &[&str] = &[
        "id",
        "session_id",
        "sessionId",
        "sid",
        "local_id",
        "user_id",
        "userId",
        "chatroom_id",
        "chatroomId",
    ];
    pub const EMOJI_MD5: &[&str] = &["emoji_md5", "emojiMd5", "md5"];
    pub const EMOJI_URL: &[&str] = &[
        "emoji_cdn_url",
        "emojiCdnUrl",
        "cdnurl",
        "cdn_url",
        "emoji_url",
        "emojiUrl",
        "url",
        "thumburl",
        "thumb_url",
    ];

    // Shapes used by pre-aggregated emoji candidates from the fast path.
    pub const CANDIDATE_CONTENT: &[&str] = &[
        "content",
        "xml",
        "message_content",
        "messageContent",
        "msg",
        "payload",
        "raw",
    ];
    pub const CANDIDATE_COUNT: &[&str] = &["count", "cnt", "times", "total", "num"];
    pub const CANDIDATE_MD5: &[&str] = &["md5", "emojiMd5", "emoji_md5", "emd5"];
    pub const CANDIDATE_URL: &[&str] = &[
        "cdnUrl",
        "cdnurl",
        "emojiUrl",
        "emoji_url",
        "url",
        "thumbUrl",
        "thumburl",
    ];
    pub const CANDIDATE_OWNER_FLAG: &[&str] = &[
        "isMe", "is_me", "isSent", "is_sent", "isSend", "is_send", "fromMe", "from_me",
    ];
    pub const CANDIDATE_SIDE: &[&str] = &["side", "sender", "from", "owner", "role", "direction"];
}

/// First present, non-null value among `keys`.
pub fn lookup<'a>(row: &'a RawRow, keys: &[&str]) -> Option<&'a FieldValue> {
    keys.iter()
        .filter_map(|key| row.get(*key))
        .find(|value| !value.is_null())
}

/// Integer value of the first matching field, or `fallback` when absent or unparsable.
pub fn lookup_i64(row: &RawRow, keys: &[&str], fallback: i64) -> i64 {
    lookup(row, keys).and_then(FieldValue::as_i64).unwrap_or(fallback)
}

/// String value of the first matching field; empty when absent.
pub fn lookup_text(row: &RawRow, keys: &[&str]) -> String {
    lookup(row, keys).map(FieldValue::as_text).unwrap_or_default()
}

/// Build a row from `(name, value)` pairs.
pub fn raw_row<I, K>(fields: I) -> RawRow
where
    I: IntoIterator<Item = (K, FieldValue)>,
    K: Into<String>,
{
    fields.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Numeric coercion. Strings and byte strings parse their leading integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::Float(v) if v.is_finite() => Some(v.trunc() as i64),
            FieldValue::Bool(b) => Some(i64::from(*b)),
            FieldValue::Text(s) => parse_leading_int(s),
            FieldValue::Bytes(b) => std::str::from_utf8(b).ok().and_then(parse_leading_int),
            _ => None,
        }
    }

    /// String coercion. Byte payloads go through the binary decoder.
    pub fn as_text(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Int(v) => v.to_string(),
            FieldValue::Float(v) => v.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Bytes(b) => PayloadDecoder::decode_bytes(b),
        }
    }

    /// `true` when the value is the integer one in any representation.
    pub fn is_one(&self) -> bool {
        match self {
            FieldValue::Bool(b) => *b,
            other => other.as_i64() == Some(1),
        }
    }

    /// Tri-state boolean coercion used for loosely labelled owner flags.
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Null => None,
            FieldValue::Bool(b) => Some(*b),
            FieldValue::Int(v) => Some(*v != 0),
            FieldValue::Float(v) => Some(*v != 0.0),
            other => {
                let normalized = other.as_text().trim().to_lowercase();
                match normalized.as_str() {
                    "" => None,
                    "1" | "true" | "yes" | "me" | "self" | "mine" | "sent" | "out" | "outgoing" => {
                        Some(true)
                    }
                    "0" | "false" | "no" | "friend" | "peer" | "other" | "recv" | "received"
                    | "in" | "incoming" => Some(false),
                    _ => None,
                }
            }
        }
    }
}

/// Leading-integer parse: optional whitespace and sign, then digits up to the first non-digit.
fn parse_leading_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let value: i64 = digits[..end].parse().ok()?;
    Some(if negative { -value } else { value })
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Bytes(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => FieldValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => FieldValue::Text(s),
            other => FieldValue::Text(other.to_string()),
        }
    }
}
