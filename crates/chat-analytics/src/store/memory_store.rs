
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use super::{Batch, CursorHandle, CursorRequest, IdentityResolver, MessageStore, StoreCredentials};
use crate::record::{aliases, lookup_i64, raw_row, FieldValue, RawRow};

struct CursorState {
    rows: Vec<RawRow>,
    position: usize,
    batch_size: usize,
    served: usize,
    fail_after: Option<usize>,
}

#[derive(Default)]
struct StoreCounters {
    opens: AtomicUsize,
    fetches: AtomicUsize,
    closes: AtomicUsize,
}

#[derive(Default)]
struct Inner {
    sessions: RwLock<Vec<RawRow>>,
    messages: DashMap<String, Vec<RawRow>>,
    cursors: DashMap<u64, CursorState>,
    next_cursor: AtomicU64,
    display_names: DashMap<String, String>,
    avatars: DashMap<String, String>,
    artifact_urls: DashMap<String, String>,
    member_counts: DashMap<String, u64>,
    group_members: DashMap<String, Vec<RawRow>>,
    failing_sessions: DashSet<String>,
    failing_fetches: DashMap<String, usize>,
    fail_open: AtomicBool,
    counters: StoreCounters,
}

/// DashMap-backed message store for embedders and tests.
///
/// Rows are kept exactly as inserted, so any alias spelling can be exercised. Cursor
/// activity is counted to let callers assert on streaming behaviour.
#[derive(Clone, Default)]
pub struct InMemoryMessageStore {
    inner: Arc<Inner>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session by username; repeated calls are ignored.
    pub fn add_session(&self, username: &str) {
        let mut sessions = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let exists = sessions.iter().any(|row| {
            row.get("username")
                .map(|v| v.as_text() == username)
                .unwrap_or(false)
        });
        if !exists {
            sessions.push(raw_row([("username", FieldValue::from(username))]));
        }
    }

    pub fn add_session_row(&self, row: RawRow) {
        self.inner
            .sessions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(row);
    }

    pub fn push_message(&self, session_id: &str, row: RawRow) {
        self.add_session(session_id);
        self.inner
            .messages
            .entry(session_id.to_string())
            .or_default()
            .push(row);
    }

    /// Convenience row with the canonical column names.
    pub fn message_row(create_time: i64, local_type: i64, is_send: bool, content: &str) -> RawRow {
        raw_row([
            ("create_time", FieldValue::Int(create_time)),
            ("local_type", FieldValue::Int(local_type)),
            ("is_send", FieldValue::Int(i64::from(is_send))),
            ("message_content", FieldValue::from(content)),
        ])
    }

    pub fn set_display_name(&self, id: &str, name: &str) {
        self.inner.display_names.insert(id.to_string(), name.to_string());
    }

    pub fn set_avatar_url(&self, id: &str, url: &str) {
        self.inner.avatars.insert(id.to_string(), url.to_string());
    }

    pub fn set_artifact_url(&self, md5: &str, url: &str) {
        self.inner.artifact_urls.insert(md5.to_lowercase(), url.to_string());
    }

    pub fn set_member_count(&self, id: &str, count: u64) {
        self.inner.member_counts.insert(id.to_string(), count);
    }

    pub fn add_group_member(&self, chatroom_id: &str, username: &str, avatar_url: Option<&str>) {
        let mut row = raw_row([("username", FieldValue::from(username))]);
        if let Some(url) = avatar_url {
            row.insert("avatar_url".into(), FieldValue::from(url));
        }
        self.inner
            .group_members
            .entry(chatroom_id.to_string())
            .or_default()
            .push(row);
    }

    /// Make `fetch_batch` fail on cursors over `session_id` once `batches` pages were served.
    pub fn fail_fetch_after(&self, session_id: &str, batches: usize) {
        self.inner
            .failing_fetches
            .insert(session_id.to_string(), batches);
    }

    /// Make `open_cursor` fail for one session.
    pub fn fail_cursor_for(&self, session_id: &str) {
        self.inner.failing_sessions.insert(session_id.to_string());
    }

    pub fn fail_open(&self, fail: bool) {
        self.inner.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn cursor_opens(&self) -> usize {
        self.inner.counters.opens.load(Ordering::SeqCst)
    }

    pub fn batch_fetches(&self) -> usize {
        self.inner.counters.fetches.load(Ordering::SeqCst)
    }

    pub fn cursor_closes(&self) -> usize {
        self.inner.counters.closes.load(Ordering::SeqCst)
    }

    /// Cursors opened and not yet closed.
    pub fn open_cursors(&self) -> usize {
        self.inner.cursors.len()
    }
}

fn in_range(create_time: i64, begin: i64, end: i64) -> bool {
    (begin <= 0 || create_time >= begin) && (end <= 0 || create_time <= end)
}

fn lookup_map(source: &DashMap<String, String>, ids: &[String]) -> HashMap<String, String> {
    ids.iter()
        .filter_map(|id| source.get(id).map(|v| (id.clone(), v.value().clone())))
        .collect()
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn open(&self, credentials: &StoreCredentials) -> anyhow::Result<()> {
        if self.inner.fail_open.load(Ordering::SeqCst) {
            anyhow::bail!("store refused to open {}", credentials.db_path);
        }
        Ok(())
    }

    async fn list_sessions(&self) -> anyhow::Result<Vec<RawRow>> {
        Ok(self
            .inner
            .sessions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone())
    }

    async fn open_cursor(
        &self,
        session_id: &str,
        request: CursorRequest,
    ) -> anyhow::Result<CursorHandle> {
        if self.inner.failing_sessions.contains(session_id) {
            anyhow::bail!("cursor unavailable for session {}", session_id);
        }
        let mut rows: Vec<RawRow> = self
            .inner
            .messages
            .get(session_id)
            .map(|rows| {
                rows.iter()
                    .filter(|row| {
                        in_range(
                            lookup_i64(row, aliases::CREATE_TIME, 0),
                            request.begin,
                            request.end,
                        )
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by_key(|row| lookup_i64(row, aliases::CREATE_TIME, 0));
        if !request.ascending {
            rows.reverse();
        }

        let id = self.inner.next_cursor.fetch_add(1, Ordering::SeqCst);
        self.inner.cursors.insert(
            id,
            CursorState {
                rows,
                position: 0,
                batch_size: request.batch_size.max(1),
                served: 0,
                fail_after: self.inner.failing_fetches.get(session_id).map(|n| *n),
            },
        );
        self.inner.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(CursorHandle(id))
    }

    async fn fetch_batch(&self, cursor: CursorHandle) -> anyhow::Result<Batch> {
        let mut state = self
            .inner
            .cursors
            .get_mut(&cursor.0)
            .ok_or_else(|| anyhow::anyhow!("unknown cursor {}", cursor.0))?;
        self.inner.counters.fetches.fetch_add(1, Ordering::SeqCst);
        if state.fail_after.is_some_and(|limit| state.served >= limit) {
            anyhow::bail!("cursor {} failed after {} batches", cursor.0, state.served);
        }
        state.served += 1;
        let start = state.position;
        let end = (start + state.batch_size).min(state.rows.len());
        let rows = state.rows[start..end].to_vec();
        state.position = end;
        Ok(Batch {
            rows,
            has_more: end < state.rows.len(),
        })
    }

    async fn close_cursor(&self, cursor: CursorHandle) -> anyhow::Result<()> {
        self.inner.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.inner
            .cursors
            .remove(&cursor.0)
            .map(|_| ())
            .ok_or_else(|| anyhow::anyhow!("cursor {} already closed", cursor.0))
    }

    async fn get_message_count(&self, session_id: &str) -> anyhow::Result<u64> {
        Ok(self
            .inner
            .messages
            .get(session_id)
            .map(|rows| rows.len() as u64)
            .unwrap_or(0))
    }

    async fn list_group_members(&self, chatroom_id: &str) -> anyhow::Result<Vec<RawRow>> {
        Ok(self
            .inner
            .group_members
            .get(chatroom_id)
            .map(|rows| rows.value().clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl IdentityResolver for InMemoryMessageStore {
    async fn resolve_display_names(
        &self,
        ids: &[String],
    ) -> anyhow::Result<HashMap<String, String>> {
        Ok(lookup_map(&self.inner.display_names, ids))
    }

    async fn resolve_avatar_urls(&self, ids: &[String]) -> anyhow::Result<HashMap<String, String>> {
        Ok(lookup_map(&self.inner.avatars, ids))
    }

    async fn resolve_artifact_url(&self, md5: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .inner
            .artifact_urls
            .get(&md5.to_lowercase())
            .map(|v| v.value().clone()))
    }

    async fn resolve_group_member_counts(
        &self,
        ids: &[String],
    ) -> anyhow::Result<HashMap<String, u64>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.inner.member_counts.get(id).map(|v| (id.clone(), *v)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(batch_size: usize) -> CursorRequest {
        CursorRequest {
            batch_size,
            ascending: true,
            begin: 0,
            end: 0,
        }
    }

    #[tokio::test]
    async fn test_cursor_pages_in_time_order() {
        let store = InMemoryMessageStore::new();
        for ts in [300, 100, 200] {
            store.push_message("s", InMemoryMessageStore::message_row(ts, 1, true, "x"));
        }
        let handle = store.open_cursor("s", request(2)).await.unwrap();
        let first = store.fetch_batch(handle).await.unwrap();
        assert_eq!(first.rows.len(), 2);
        assert!(first.has_more);
        assert_eq!(lookup_i64(&first.rows[0], aliases::CREATE_TIME, 0), 100);
        let second = store.fetch_batch(handle).await.unwrap();
        assert_eq!(second.rows.len(), 1);
        assert!(!second.has_more);
        store.close_cursor(handle).await.unwrap();
        assert_eq!(store.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_cursor_respects_time_window_and_direction() {
        let store = InMemoryMessageStore::new();
        for ts in [100, 200, 300, 400] {
            store.push_message("s", InMemoryMessageStore::message_row(ts, 1, false, "x"));
        }
        let handle = store
            .open_cursor(
                "s",
                CursorRequest {
                    batch_size: 10,
                    ascending: false,
                    begin: 200,
                    end: 300,
                },
            )
            .await
            .unwrap();
        let batch = store.fetch_batch(handle).await.unwrap();
        let times: Vec<i64> = batch
            .rows
            .iter()
            .map(|row| lookup_i64(row, aliases::CREATE_TIME, 0))
            .collect();
        assert_eq!(times, vec![300, 200]);
    }

    #[tokio::test]
    async fn test_sessions_listed_once() {
        let store = InMemoryMessageStore::new();
        store.add_session("a");
        store.push_message("a", InMemoryMessageStore::message_row(1, 1, true, ""));
        store.push_message("b", InMemoryMessageStore::message_row(1, 1, true, ""));
        assert_eq!(store.list_sessions().await.unwrap().len(), 2);
        assert_eq!(store.get_message_count("a").await.unwrap(), 1);
        assert_eq!(store.get_message_count("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_after_served_batches() {
        let store = InMemoryMessageStore::new();
        for ts in 1..=5 {
            store.push_message("s", InMemoryMessageStore::message_row(ts, 1, true, "x"));
        }
        store.fail_fetch_after("s", 1);
        let handle = store.open_cursor("s", request(2)).await.unwrap();
        assert_eq!(store.fetch_batch(handle).await.unwrap().rows.len(), 2);
        assert!(store.fetch_batch(handle).await.is_err());
        store.close_cursor(handle).await.unwrap();
        assert_eq!(store.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_group_members_listed_in_order() {
        let store = InMemoryMessageStore::new();
        store.add_group_member("g@chatroom", "bob", Some("https://img/bob"));
        store.add_group_member("g@chatroom", "carol", None);
        let members = store.list_group_members("g@chatroom").await.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].get("avatar_url").map(FieldValue::as_text).as_deref(), Some("https://img/bob"));
        assert!(store.list_group_members("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_identity_lookups() {
        let store = InMemoryMessageStore::new();
        store.set_display_name("a", "Alice");
        store.set_artifact_url("ABCDEF", "https://cdn/x");
        let names = store
            .resolve_display_names(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(
            store.resolve_artifact_url("abcdef").await.unwrap().as_deref(),
            Some("https://cdn/x")
        );
    }
}
