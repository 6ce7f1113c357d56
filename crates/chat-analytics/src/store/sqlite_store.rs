// crates/chat-analytics/src/store/sqlite_store.rs

use async_trait::async_trait;
use dashmap::DashMap;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::schema::{NewMessage, SessionInfo, StoredPayload, SCHEMA_SQL};
use super::{Batch, CursorHandle, CursorRequest, IdentityResolver, MessageStore, StoreCredentials};
use crate::record::{FieldValue, RawRow};

const SELECT_COLUMNS: &str = "local_id, local_type, create_time, is_send, sender_username, \
                              message_content, compress_content";

/// Keyset position: the last `(create_time, local_id)` handed out.
struct SqliteCursor {
    session_id: String,
    request: CursorRequest,
    last: (i64, i64),
    exhausted: bool,
}

/// Message store over a plain SQLite file, paginated with keyset cursors.
pub struct SqliteMessageStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
    cursors: DashMap<u64, SqliteCursor>,
    next_cursor: AtomicU64,
}

impl SqliteMessageStore {
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        info!("Opening message store at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let manager = SqliteConnectionManager::file(db_path).with_flags(
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        );
        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| anyhow::anyhow!("Failed to create connection pool: {}", e))?;
        {
            let conn = pool.get()?;
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
            )?;
            conn.execute_batch(SCHEMA_SQL)?;
        }
        Ok(Self::with_pool(Arc::new(pool)))
    }

    /// Single-connection in-memory database; every pooled connection would otherwise see
    /// its own empty database.
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        {
            let conn = pool.get()?;
            conn.execute_batch(SCHEMA_SQL)?;
        }
        Ok(Self::with_pool(Arc::new(pool)))
    }

    fn with_pool(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self {
            pool,
            cursors: DashMap::new(),
            next_cursor: AtomicU64::new(1),
        }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    pub fn upsert_session(&self, session: &SessionInfo) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO sessions (username, display_name, avatar_url, member_count, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(username) DO UPDATE SET
                display_name = excluded.display_name,
                avatar_url = excluded.avatar_url,
                member_count = excluded.member_count,
                sort_order = excluded.sort_order",
            params![
                session.username,
                session.display_name,
                session.avatar_url,
                session.member_count as i64,
                session.sort_order,
            ],
        )?;
        Ok(())
    }

    /// Insert a message, creating its session row when missing. Returns the new local id.
    pub fn insert_message(&self, session_id: &str, message: &NewMessage) -> anyhow::Result<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO sessions (username) VALUES (?1)",
            params![session_id],
        )?;
        // SQLite keeps whichever storage class was bound, so text and blob share one column.
        let content = match &message.content {
            Some(StoredPayload::Text(s)) => Value::Text(s.clone()),
            Some(StoredPayload::Bytes(b)) => Value::Blob(b.clone()),
            None => Value::Null,
        };
        conn.execute(
            "INSERT INTO messages
             (session_id, local_type, create_time, is_send, sender_username, message_content, compress_content)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session_id,
                message.local_type,
                message.create_time,
                message.is_send.map(i64::from),
                message.sender_username,
                content,
                message.compress_content,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_emoticon(&self, md5: &str, cdn_url: &str) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO emoticons (md5, cdn_url) VALUES (?1, ?2)",
            params![md5.to_lowercase(), cdn_url],
        )?;
        Ok(())
    }

    pub fn add_group_member(
        &self,
        chatroom_id: &str,
        username: &str,
        avatar_url: Option<&str>,
    ) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO group_members (chatroom_id, username, avatar_url, joined_order)
             VALUES (?1, ?2, ?3,
                (SELECT COUNT(*) FROM group_members WHERE chatroom_id = ?1))
             ON CONFLICT(chatroom_id, username) DO UPDATE SET avatar_url = excluded.avatar_url",
            params![chatroom_id, username, avatar_url],
        )?;
        Ok(())
    }

    fn query_page(&self, cursor: &SqliteCursor) -> anyhow::Result<Vec<(i64, i64, RawRow)>> {
        let (comparison, order) = if cursor.request.ascending {
            ("create_time > ?4 OR (create_time = ?4 AND local_id > ?5)", "ASC")
        } else {
            ("create_time < ?4 OR (create_time = ?4 AND local_id < ?5)", "DESC")
        };
        let sql = format!(
            "SELECT {} FROM messages
             WHERE session_id = ?1
               AND (?2 <= 0 OR create_time >= ?2)
               AND (?3 <= 0 OR create_time <= ?3)
               AND ({})
             ORDER BY create_time {order}, local_id {order}
             LIMIT ?6",
            SELECT_COLUMNS,
            comparison,
            order = order
        );
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let limit = cursor.request.batch_size.max(1) as i64 + 1;
        let rows = stmt
            .query_map(
                params![
                    cursor.session_id,
                    cursor.request.begin,
                    cursor.request.end,
                    cursor.last.0,
                    cursor.last.1,
                    limit,
                ],
                |row| {
                    let local_id: i64 = row.get(0)?;
                    let create_time: i64 = row.get(2)?;
                    let mut raw = RawRow::with_capacity(names.len());
                    for (idx, name) in names.iter().enumerate() {
                        raw.insert(name.clone(), field_from_ref(row.get_ref(idx)?));
                    }
                    Ok((create_time, local_id, raw))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn lookup_column(&self, sql: &str, ids: &[String]) -> anyhow::Result<HashMap<String, String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(sql)?;
        let mut found = HashMap::new();
        for id in ids {
            let value: Option<Option<String>> =
                stmt.query_row(params![id], |row| row.get(0)).optional()?;
            if let Some(Some(value)) = value {
                if !value.is_empty() {
                    found.insert(id.clone(), value);
                }
            }
        }
        Ok(found)
    }
}

fn field_from_ref(value: ValueRef<'_>) -> FieldValue {
    match value {
        ValueRef::Null => FieldValue::Null,
        ValueRef::Integer(i) => FieldValue::Int(i),
        ValueRef::Real(f) => FieldValue::Float(f),
        ValueRef::Text(t) => FieldValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => FieldValue::Bytes(b.to_vec()),
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn open(&self, credentials: &StoreCredentials) -> anyhow::Result<()> {
        // Plain SQLite files carry no key; only connectivity is checked.
        let conn = self.get_conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        debug!("Message store ready for {}", credentials.db_path);
        Ok(())
    }

    async fn list_sessions(&self) -> anyhow::Result<Vec<RawRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT username, display_name, member_count FROM sessions
             ORDER BY sort_order DESC, username ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let mut raw = RawRow::new();
                raw.insert("username".into(), field_from_ref(row.get_ref(0)?));
                raw.insert("display_name".into(), field_from_ref(row.get_ref(1)?));
                raw.insert("member_count".into(), field_from_ref(row.get_ref(2)?));
                Ok(raw)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn open_cursor(
        &self,
        session_id: &str,
        request: CursorRequest,
    ) -> anyhow::Result<CursorHandle> {
        let id = self.next_cursor.fetch_add(1, Ordering::SeqCst);
        let last = if request.ascending {
            (i64::MIN, i64::MIN)
        } else {
            (i64::MAX, i64::MAX)
        };
        self.cursors.insert(
            id,
            SqliteCursor {
                session_id: session_id.to_string(),
                request,
                last,
                exhausted: false,
            },
        );
        debug!("Opened cursor {} for session {}", id, session_id);
        Ok(CursorHandle(id))
    }

    async fn fetch_batch(&self, cursor: CursorHandle) -> anyhow::Result<Batch> {
        let mut state = self
            .cursors
            .get_mut(&cursor.0)
            .ok_or_else(|| anyhow::anyhow!("unknown cursor {}", cursor.0))?;
        if state.exhausted {
            return Ok(Batch::default());
        }
        let mut page = self.query_page(&state)?;
        let batch_size = state.request.batch_size.max(1);
        let has_more = page.len() > batch_size;
        page.truncate(batch_size);
        if let Some((create_time, local_id, _)) = page.last() {
            state.last = (*create_time, *local_id);
        }
        state.exhausted = !has_more;
        Ok(Batch {
            rows: page.into_iter().map(|(_, _, row)| row).collect(),
            has_more,
        })
    }

    async fn close_cursor(&self, cursor: CursorHandle) -> anyhow::Result<()> {
        self.cursors
            .remove(&cursor.0)
            .map(|_| ())
            .ok_or_else(|| anyhow::anyhow!("cursor {} already closed", cursor.0))
    }

    async fn get_message_count(&self, session_id: &str) -> anyhow::Result<u64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    async fn list_group_members(&self, chatroom_id: &str) -> anyhow::Result<Vec<RawRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT username, avatar_url FROM group_members
             WHERE chatroom_id = ?1 ORDER BY joined_order",
        )?;
        let rows = stmt
            .query_map(params![chatroom_id], |row| {
                let mut raw = RawRow::new();
                raw.insert("username".into(), field_from_ref(row.get_ref(0)?));
                raw.insert("avatar_url".into(), field_from_ref(row.get_ref(1)?));
                Ok(raw)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[async_trait]
impl IdentityResolver for SqliteMessageStore {
    async fn resolve_display_names(
        &self,
        ids: &[String],
    ) -> anyhow::Result<HashMap<String, String>> {
        self.lookup_column("SELECT display_name FROM sessions WHERE username = ?1", ids)
    }

    async fn resolve_avatar_urls(&self, ids: &[String]) -> anyhow::Result<HashMap<String, String>> {
        self.lookup_column("SELECT avatar_url FROM sessions WHERE username = ?1", ids)
    }

    async fn resolve_artifact_url(&self, md5: &str) -> anyhow::Result<Option<String>> {
        let conn = self.get_conn()?;
        let url = conn
            .query_row(
                "SELECT cdn_url FROM emoticons WHERE md5 = ?1",
                params![md5.to_lowercase()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(url)
    }

    async fn resolve_group_member_counts(
        &self,
        ids: &[String],
    ) -> anyhow::Result<HashMap<String, u64>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT member_count FROM sessions WHERE username = ?1")?;
        let mut counts = HashMap::new();
        for id in ids {
            let count: Option<i64> = stmt.query_row(params![id], |row| row.get(0)).optional()?;
            if let Some(count) = count {
                counts.insert(id.clone(), count.max(0) as u64);
            }
        }
        Ok(counts)
    }
}
