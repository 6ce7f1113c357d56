//! SQLite layout used by [`super::SqliteMessageStore`].

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    username TEXT PRIMARY KEY,
    display_name TEXT,
    avatar_url TEXT,
    member_count INTEGER NOT NULL DEFAULT 0,
    sort_order INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS messages (
    local_id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    local_type INTEGER NOT NULL DEFAULT 1,
    create_time INTEGER NOT NULL,
    is_send INTEGER,
    sender_username TEXT,
    message_content BLOB,
    compress_content BLOB
);

CREATE INDEX IF NOT EXISTS idx_messages_session_time
    ON messages(session_id, create_time, local_id);

CREATE TABLE IF NOT EXISTS group_members (
    chatroom_id TEXT NOT NULL,
    username TEXT NOT NULL,
    avatar_url TEXT,
    joined_order INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (chatroom_id, username)
);

CREATE TABLE IF NOT EXISTS emoticons (
    md5 TEXT PRIMARY KEY,
    cdn_url TEXT NOT NULL
);
"#;

/// Payload column contents for an inserted message.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredPayload {
    Text(String),
    Bytes(Vec<u8>),
}

/// One message to insert.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub local_type: i64,
    pub create_time: i64,
    pub is_send: Option<bool>,
    pub sender_username: Option<String>,
    pub content: Option<StoredPayload>,
    pub compress_content: Option<Vec<u8>>,
}

impl NewMessage {
    pub fn text(create_time: i64, is_send: bool, content: &str) -> Self {
        Self {
            local_type: 1,
            create_time,
            is_send: Some(is_send),
            sender_username: None,
            content: Some(StoredPayload::Text(content.to_string())),
            compress_content: None,
        }
    }
}

/// Session metadata row.
#[derive(Debug, Clone, Default)]
pub struct SessionInfo {
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub member_count: u64,
    pub sort_order: i64,
}
