// crates/chat-analytics/src/store/mod.rs

//! Collaborator contracts for message storage, native aggregation and identity lookup,
//! plus the in-memory and SQLite implementations shipped with the crate.

pub mod identity_cache;
pub mod memory_store;
pub mod schema;
pub mod sqlite_store;

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

use crate::aggregate::{AggregateResult, DualStats};
use crate::record::RawRow;

pub use identity_cache::CachedIdentityResolver;
pub use memory_store::InMemoryMessageStore;
pub use sqlite_store::SqliteMessageStore;

/// Opaque handle to an open store cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorHandle(pub u64);

/// One page of rows. `has_more == false` marks the final page.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub rows: Vec<RawRow>,
    pub has_more: bool,
}

/// Arguments for opening a cursor over one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorRequest {
    pub batch_size: usize,
    pub ascending: bool,
    /// Inclusive lower bound in seconds; 0 is unbounded.
    pub begin: i64,
    /// Inclusive upper bound in seconds; 0 is unbounded.
    pub end: i64,
}

#[derive(Clone, Default)]
pub struct StoreCredentials {
    pub db_path: String,
    pub decrypt_key: String,
    pub self_id: String,
}

impl fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("db_path", &self.db_path)
            .field("decrypt_key", &"<redacted>")
            .field("self_id", &self.self_id)
            .finish()
    }
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn open(&self, credentials: &StoreCredentials) -> anyhow::Result<()>;

    /// Session rows, each carrying at least a username field.
    async fn list_sessions(&self) -> anyhow::Result<Vec<RawRow>>;

    async fn open_cursor(
        &self,
        session_id: &str,
        request: CursorRequest,
    ) -> anyhow::Result<CursorHandle>;

    async fn fetch_batch(&self, cursor: CursorHandle) -> anyhow::Result<Batch>;

    async fn close_cursor(&self, cursor: CursorHandle) -> anyhow::Result<()>;

    async fn get_message_count(&self, session_id: &str) -> anyhow::Result<u64>;

    /// Member rows of a group chat, each with a username and optionally an avatar URL.
    async fn list_group_members(&self, chatroom_id: &str) -> anyhow::Result<Vec<RawRow>>;
}

/// Pre-aggregated statistics computed next to the data.
///
/// `Ok(None)` means "no answer", which sends callers down the cursor path.
#[async_trait]
pub trait FastAggregator: Send + Sync {
    async fn compute_aggregate(
        &self,
        session_ids: &[String],
        begin: i64,
        end: i64,
    ) -> anyhow::Result<Option<AggregateResult>>;

    async fn dual_report_stats(
        &self,
        _friend: &str,
        _begin: i64,
        _end: i64,
    ) -> anyhow::Result<Option<DualStats>> {
        Ok(None)
    }
}

/// Fast path that never answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFastPath;

#[async_trait]
impl FastAggregator for NoFastPath {
    async fn compute_aggregate(
        &self,
        _session_ids: &[String],
        _begin: i64,
        _end: i64,
    ) -> anyhow::Result<Option<AggregateResult>> {
        Ok(None)
    }
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_display_names(&self, ids: &[String])
        -> anyhow::Result<HashMap<String, String>>;

    async fn resolve_avatar_urls(&self, ids: &[String]) -> anyhow::Result<HashMap<String, String>>;

    /// CDN location of a stored reaction image.
    async fn resolve_artifact_url(&self, md5: &str) -> anyhow::Result<Option<String>>;

    async fn resolve_group_member_counts(
        &self,
        _ids: &[String],
    ) -> anyhow::Result<HashMap<String, u64>> {
        Ok(HashMap::new())
    }
}
