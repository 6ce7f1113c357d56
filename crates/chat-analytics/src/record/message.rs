use super::fields::{aliases, lookup, lookup_i64, lookup_text, FieldValue, RawRow};
use crate::payload::PayloadDecoder;

/// Message type codes as stored.
pub mod message_types {
    pub const TEXT: i64 = 1;
    pub const IMAGE: i64 = 3;
    pub const VOICE: i64 = 34;
    pub const VIDEO: i64 = 43;
    pub const EMOJI: i64 = 47;
    pub const LINK: i64 = 49;
    pub const SYSTEM: i64 = 10000;
    pub const SYSTEM_REVOKE: i64 = 10002;
    pub const LONG_TEXT: i64 = 244813135921;

    pub fn is_text(code: i64) -> bool {
        code == TEXT || code == LONG_TEXT
    }
}

/// Typed view of one stored message, valid for a single fold step.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub session_id: String,
    /// Seconds since the epoch; 0 when missing.
    pub create_time: i64,
    pub local_type: i64,
    pub is_send: Option<bool>,
    pub sender: Option<String>,
    pub content: Option<FieldValue>,
    pub compress_content: Option<FieldValue>,
}

impl MessageRecord {
    pub fn from_row(session_id: &str, row: &RawRow) -> Self {
        let sender = lookup_text(row, aliases::SENDER);
        Self {
            session_id: session_id.to_string(),
            create_time: lookup_i64(row, aliases::CREATE_TIME, 0),
            local_type: lookup_i64(row, aliases::LOCAL_TYPE, message_types::TEXT),
            is_send: lookup(row, aliases::IS_SEND).map(FieldValue::is_one),
            sender: (!sender.is_empty()).then_some(sender),
            content: lookup(row, aliases::MESSAGE_CONTENT).cloned(),
            compress_content: lookup(row, aliases::COMPRESS_CONTENT).cloned(),
        }
    }

    pub fn is_text(&self) -> bool {
        message_types::is_text(self.local_type)
    }

    /// Decoded payload, compressed column first.
    pub fn decoded_text(&self) -> String {
        PayloadDecoder::decode(self.compress_content.as_ref(), self.content.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fields::raw_row;

    #[test]
    fn test_from_row_with_aliases() {
        let row = raw_row([
            ("createTime", FieldValue::Int(1_700_000_000)),
            ("msgType", FieldValue::from("47")),
            ("isSend", FieldValue::Int(1)),
            ("talker", FieldValue::from("wxid_friend")),
            ("content", FieldValue::from("hello")),
        ]);
        let record = MessageRecord::from_row("wxid_friend", &row);
        assert_eq!(record.create_time, 1_700_000_000);
        assert_eq!(record.local_type, message_types::EMOJI);
        assert_eq!(record.is_send, Some(true));
        assert_eq!(record.sender.as_deref(), Some("wxid_friend"));
        assert_eq!(record.decoded_text(), "hello");
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let record = MessageRecord::from_row("s", &RawRow::new());
        assert_eq!(record.create_time, 0);
        assert_eq!(record.local_type, message_types::TEXT);
        assert_eq!(record.is_send, None);
        assert_eq!(record.sender, None);
        assert_eq!(record.decoded_text(), "");
    }

    #[test]
    fn test_long_text_is_text() {
        assert!(message_types::is_text(message_types::LONG_TEXT));
        assert!(!message_types::is_text(message_types::LINK));
    }
}
