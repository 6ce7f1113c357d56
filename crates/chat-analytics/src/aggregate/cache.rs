// crates/chat-analytics/src/aggregate/cache.rs

//! Tiered aggregate cache with request coalescing.
//!
//! Lookup order for a key: hot tier, disk snapshot, an identical in-flight computation, and
//! finally a new computation. A computation tries the native fast path, then the fallback
//! tier, then streams every conversation through an [`Accumulator`].
//!
//! Computations run as spawned tasks shared by every waiter, so a caller that gives up does
//! not cancel work other callers are waiting on.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::accumulator::{Accumulator, AggregateResult, CalendarZone, TimeRange};
use super::snapshot::{SnapshotFile, SnapshotRecord};
use crate::cursor::{CursorOptions, CursorStream};
use crate::metrics;
use crate::progress::ProgressReporter;
use crate::record::Ownership;
use crate::store::{FastAggregator, MessageStore};

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
const KEY_SAMPLE_SIZE: usize = 5;

/// Which tier answered a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregateSource {
    Cache,
    FileCache,
    Native,
    CursorCache,
    Cursor,
}

impl AggregateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateSource::Cache => "cache",
            AggregateSource::FileCache => "file-cache",
            AggregateSource::Native => "native",
            AggregateSource::CursorCache => "cursor-cache",
            AggregateSource::Cursor => "cursor",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub data: Arc<AggregateResult>,
    pub updated_at: i64,
}

impl CacheEntry {
    fn new(key: &str, data: Arc<AggregateResult>) -> Self {
        Self {
            key: key.to_string(),
            data,
            updated_at: now_ms(),
        }
    }

    fn is_fresh_for(&self, key: &str, ttl: Duration) -> bool {
        self.key == key && now_ms().saturating_sub(self.updated_at) < ttl.as_millis() as i64
    }

    fn outcome(&self, source: AggregateSource) -> AggregateOutcome {
        AggregateOutcome {
            data: Arc::clone(&self.data),
            source,
            updated_at: self.updated_at,
        }
    }

    fn to_snapshot(&self) -> SnapshotRecord {
        SnapshotRecord {
            key: self.key.clone(),
            data: (*self.data).clone(),
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregateOutcome {
    pub data: Arc<AggregateResult>,
    pub source: AggregateSource,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct AggregateCacheConfig {
    pub ttl: Duration,
    pub snapshot_path: Option<PathBuf>,
    pub cursor: CursorOptions,
    pub zone: CalendarZone,
}

impl Default for AggregateCacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            snapshot_path: None,
            cursor: CursorOptions::default(),
            zone: CalendarZone::Local,
        }
    }
}

/// Per-tier answer counters, readable without a metrics registry.
#[derive(Debug, Default)]
struct TierCounters {
    cache: AtomicUsize,
    file_cache: AtomicUsize,
    native: AtomicUsize,
    cursor_cache: AtomicUsize,
    cursor: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub cache: usize,
    pub file_cache: usize,
    pub native: usize,
    pub cursor_cache: usize,
    pub cursor: usize,
}

type SharedComputation = Shared<BoxFuture<'static, Result<AggregateOutcome, Arc<anyhow::Error>>>>;

struct InFlight {
    generation: u64,
    computation: SharedComputation,
}

struct CacheInner {
    config: AggregateCacheConfig,
    store: Arc<dyn MessageStore>,
    fast_path: Arc<dyn FastAggregator>,
    ownership: RwLock<Ownership>,
    hot: RwLock<Option<CacheEntry>>,
    fallback: RwLock<Option<CacheEntry>>,
    snapshot: SnapshotFile,
    in_flight: DashMap<String, InFlight>,
    generation: AtomicU64,
    progress: RwLock<ProgressReporter>,
    counters: TierCounters,
}

/// Cheap to clone; clones share tiers and in-flight computations.
#[derive(Clone)]
pub struct AggregateCache {
    inner: Arc<CacheInner>,
}

/// `"{begin}-{end}-{count}-{first five ids}"`. Lists that agree on length and the first five
/// ids share a key.
pub fn cache_key(session_ids: &[String], begin: i64, end: i64) -> String {
    let sample: Vec<&str> = session_ids
        .iter()
        .take(KEY_SAMPLE_SIZE)
        .map(String::as_str)
        .collect();
    format!("{}-{}-{}-{}", begin, end, session_ids.len(), sample.join(","))
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl AggregateCache {
    pub fn new(
        store: Arc<dyn MessageStore>,
        fast_path: Arc<dyn FastAggregator>,
        config: AggregateCacheConfig,
    ) -> Self {
        let snapshot = SnapshotFile::new(config.snapshot_path.clone());
        Self {
            inner: Arc::new(CacheInner {
                config,
                store,
                fast_path,
                ownership: RwLock::new(Ownership::default()),
                hot: RwLock::new(None),
                fallback: RwLock::new(None),
                snapshot,
                in_flight: DashMap::new(),
                generation: AtomicU64::new(0),
                progress: RwLock::new(ProgressReporter::disabled()),
                counters: TierCounters::default(),
            }),
        }
    }

    /// Ownership rule used by cursor recomputation.
    pub fn set_ownership(&self, ownership: Ownership) {
        *self
            .inner
            .ownership
            .write()
            .unwrap_or_else(PoisonError::into_inner) = ownership;
    }

    pub fn set_progress(&self, progress: ProgressReporter) {
        *self
            .inner
            .progress
            .write()
            .unwrap_or_else(PoisonError::into_inner) = progress;
    }

    pub fn config(&self) -> &AggregateCacheConfig {
        &self.inner.config
    }

    pub async fn get_aggregate(
        &self,
        session_ids: &[String],
        begin: i64,
        end: i64,
        force: bool,
    ) -> anyhow::Result<AggregateOutcome> {
        let key = cache_key(session_ids, begin, end);
        if force {
            info!("Forced refresh of aggregate {}", key);
            self.invalidate();
        } else {
            if let Some(outcome) = self.inner.hot_hit(&key) {
                return Ok(outcome);
            }
            if let Some(outcome) = self.inner.snapshot_hit(&key).await {
                return Ok(outcome);
            }
        }

        let computation = self.join_or_start(key, session_ids, begin, end);
        computation
            .await
            .map_err(|e| anyhow::anyhow!("aggregate computation failed: {:#}", e))
    }

    fn join_or_start(
        &self,
        key: String,
        session_ids: &[String],
        begin: i64,
        end: i64,
    ) -> SharedComputation {
        match self.inner.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                debug!("Joining in-flight aggregate {}", key);
                entry.get().computation.clone()
            }
            Entry::Vacant(slot) => {
                let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst);
                let ids = session_ids.to_vec();
                let task_inner = Arc::clone(&self.inner);
                let task_key = key.clone();
                let handle = tokio::spawn(async move {
                    let outcome = task_inner.compute(&task_key, &ids, begin, end).await;
                    task_inner.finish_in_flight(&task_key, generation);
                    outcome
                });

                let waiter_inner = Arc::clone(&self.inner);
                let computation = async move {
                    let joined = handle.await;
                    waiter_inner.finish_in_flight(&key, generation);
                    joined.map_err(|e| Arc::new(anyhow::Error::new(e).context("aggregate task aborted")))
                }
                .boxed()
                .shared();

                slot.insert(InFlight {
                    generation,
                    computation: computation.clone(),
                });
                computation
            }
        }
    }

    /// Drop both in-memory tiers.
    pub fn invalidate(&self) {
        *self.inner.hot.write().unwrap_or_else(PoisonError::into_inner) = None;
        *self
            .inner
            .fallback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub async fn remove_snapshot(&self) {
        self.inner.snapshot.remove().await;
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        CacheStats {
            cache: c.cache.load(Ordering::SeqCst),
            file_cache: c.file_cache.load(Ordering::SeqCst),
            native: c.native.load(Ordering::SeqCst),
            cursor_cache: c.cursor_cache.load(Ordering::SeqCst),
            cursor: c.cursor.load(Ordering::SeqCst),
        }
    }
}

impl CacheInner {
    fn record(&self, source: AggregateSource) {
        let counter = match source {
            AggregateSource::Cache => &self.counters.cache,
            AggregateSource::FileCache => &self.counters.file_cache,
            AggregateSource::Native => &self.counters.native,
            AggregateSource::CursorCache => &self.counters.cursor_cache,
            AggregateSource::Cursor => &self.counters.cursor,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        metrics::inc_aggregate(source.as_str());
    }

    fn read_tier(tier: &RwLock<Option<CacheEntry>>) -> Option<CacheEntry> {
        tier.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn write_tier(tier: &RwLock<Option<CacheEntry>>, entry: CacheEntry) {
        *tier.write().unwrap_or_else(PoisonError::into_inner) = Some(entry);
    }

    fn hot_hit(&self, key: &str) -> Option<AggregateOutcome> {
        let entry = Self::read_tier(&self.hot)?;
        if !entry.is_fresh_for(key, self.config.ttl) {
            return None;
        }
        debug!("Aggregate {} served from hot tier", key);
        self.record(AggregateSource::Cache);
        Some(entry.outcome(AggregateSource::Cache))
    }

    async fn snapshot_hit(&self, key: &str) -> Option<AggregateOutcome> {
        let record = self.snapshot.load().await?;
        if record.key != key {
            debug!("Snapshot holds {}, wanted {}", record.key, key);
            return None;
        }
        let entry = CacheEntry {
            key: record.key,
            data: Arc::new(record.data),
            updated_at: record.updated_at,
        };
        Self::write_tier(&self.hot, entry.clone());
        info!("Aggregate {} restored from snapshot", key);
        self.record(AggregateSource::FileCache);
        Some(entry.outcome(AggregateSource::FileCache))
    }

    fn finish_in_flight(&self, key: &str, generation: u64) {
        self.in_flight
            .remove_if(key, |_, in_flight| in_flight.generation == generation);
    }

    fn progress(&self) -> ProgressReporter {
        self.progress
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn ownership(&self) -> Ownership {
        self.ownership
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn compute(
        &self,
        key: &str,
        session_ids: &[String],
        begin: i64,
        end: i64,
    ) -> AggregateOutcome {
        if let Some(outcome) = self.hot_hit(key) {
            return outcome;
        }

        match self.fast_path.compute_aggregate(session_ids, begin, end).await {
            Ok(Some(mut data)) if data.total > 0 => {
                data.normalize_sessions();
                let entry = CacheEntry::new(key, Arc::new(data));
                Self::write_tier(&self.hot, entry.clone());
                self.snapshot.save(&entry.to_snapshot()).await;
                info!("Aggregate {} answered by fast path ({} messages)", key, entry.data.total);
                self.record(AggregateSource::Native);
                return entry.outcome(AggregateSource::Native);
            }
            Ok(_) => debug!("Fast path returned no data for {}", key),
            Err(e) => warn!("Fast path failed for {}: {:#}", key, e),
        }

        if let Some(entry) = Self::read_tier(&self.fallback) {
            if entry.is_fresh_for(key, self.config.ttl) {
                self.snapshot.save(&entry.to_snapshot()).await;
                info!("Aggregate {} served from fallback tier", key);
                self.record(AggregateSource::CursorCache);
                return entry.outcome(AggregateSource::CursorCache);
            }
        }

        self.progress()
            .report("Fast path returned no data, streaming with cursors", 45);
        info!(
            "Recomputing aggregate {} over {} conversations",
            key,
            session_ids.len()
        );
        let data = self.compute_by_cursor(session_ids, begin, end).await;
        let entry = CacheEntry::new(key, Arc::new(data));
        Self::write_tier(&self.fallback, entry.clone());
        Self::write_tier(&self.hot, entry.clone());
        self.snapshot.save(&entry.to_snapshot()).await;
        info!("Aggregate {} recomputed ({} messages)", key, entry.data.total);
        self.record(AggregateSource::Cursor);
        entry.outcome(AggregateSource::Cursor)
    }

    async fn compute_by_cursor(&self, session_ids: &[String], begin: i64, end: i64) -> AggregateResult {
        let mut accumulator = Accumulator::new(
            TimeRange::new(begin, end),
            self.config.zone,
            self.ownership(),
        );
        let stream = CursorStream::new(
            self.store.as_ref(),
            self.config.cursor.with_range(begin, end),
        );
        for session_id in session_ids {
            let summary = stream
                .for_each_row(session_id, |row| {
                    accumulator.fold_row(session_id, row);
                    ControlFlow::Continue(())
                })
                .await;
            debug!(
                "Folded session {}: {} rows, {} batches, completed={}",
                session_id, summary.rows, summary.batches, summary.completed
            );
        }
        accumulator.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;
    use crate::store::{InMemoryMessageStore, NoFastPath};
    use async_trait::async_trait;
    use tempfile::tempdir;
    use tokio::sync::Notify;

    /// Fast path that answers with a fixed result.
    struct FixedFastPath(Option<AggregateResult>);

    #[async_trait]
    impl FastAggregator for FixedFastPath {
        async fn compute_aggregate(
            &self,
            _session_ids: &[String],
            _begin: i64,
            _end: i64,
        ) -> anyhow::Result<Option<AggregateResult>> {
            Ok(self.0.clone())
        }
    }

    /// Fast path that blocks until released and then answers nothing.
    struct GatedFastPath(Arc<Notify>);

    #[async_trait]
    impl FastAggregator for GatedFastPath {
        async fn compute_aggregate(
            &self,
            _session_ids: &[String],
            _begin: i64,
            _end: i64,
        ) -> anyhow::Result<Option<AggregateResult>> {
            self.0.notified().await;
            Ok(None)
        }
    }

    fn populated_store() -> InMemoryMessageStore {
        let store = InMemoryMessageStore::new();
        store.push_message("a", InMemoryMessageStore::message_row(100, 1, true, "hi"));
        store.push_message("a", InMemoryMessageStore::message_row(150, 3, false, ""));
        store.push_message("b", InMemoryMessageStore::message_row(200, 47, true, ""));
        store
    }

    fn cache_over(store: &InMemoryMessageStore, fast: Arc<dyn FastAggregator>) -> AggregateCache {
        AggregateCache::new(Arc::new(store.clone()), fast, AggregateCacheConfig::default())
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cache_key_samples_first_five() {
        let list = ids(&["a", "b", "c", "d", "e", "f"]);
        assert_eq!(cache_key(&list, 0, 0), "0-0-6-a,b,c,d,e");
        assert_eq!(cache_key(&[], 1, 2), "1-2-0-");
    }

    #[tokio::test]
    async fn test_cursor_then_hot_tier() {
        let store = populated_store();
        let cache = cache_over(&store, Arc::new(NoFastPath));
        let list = ids(&["a", "b"]);

        let first = cache.get_aggregate(&list, 0, 0, false).await.unwrap();
        assert_eq!(first.source, AggregateSource::Cursor);
        assert_eq!(first.data.total, 3);
        assert_eq!(first.data.sent, 2);

        let second = cache.get_aggregate(&list, 0, 0, false).await.unwrap();
        assert_eq!(second.source, AggregateSource::Cache);
        assert_eq!(*second.data, *first.data);
        assert_eq!(store.cursor_opens(), 2);
    }

    #[tokio::test]
    async fn test_repeated_requests_are_idempotent() {
        let store = populated_store();
        let cache = cache_over(&store, Arc::new(NoFastPath));
        let list = ids(&["a", "b"]);
        let first = cache.get_aggregate(&list, 0, 0, false).await.unwrap();
        for _ in 0..3 {
            let again = cache.get_aggregate(&list, 0, 0, false).await.unwrap();
            assert_eq!(*again.data, *first.data);
        }
    }

    #[tokio::test]
    async fn test_force_recomputes() {
        let store = populated_store();
        let cache = cache_over(&store, Arc::new(NoFastPath));
        let list = ids(&["a"]);
        cache.get_aggregate(&list, 0, 0, false).await.unwrap();
        store.push_message("a", InMemoryMessageStore::message_row(300, 1, false, ""));
        let forced = cache.get_aggregate(&list, 0, 0, true).await.unwrap();
        assert_eq!(forced.source, AggregateSource::Cursor);
        assert_eq!(forced.data.total, 3);
    }

    #[tokio::test]
    async fn test_native_result_preferred() {
        let store = populated_store();
        let native = AggregateResult {
            total: 9,
            sent: 4,
            received: 5,
            ..Default::default()
        };
        let cache = cache_over(&store, Arc::new(FixedFastPath(Some(native.clone()))));
        let outcome = cache.get_aggregate(&ids(&["a"]), 0, 0, false).await.unwrap();
        assert_eq!(outcome.source, AggregateSource::Native);
        assert_eq!(*outcome.data, native);
        assert_eq!(store.cursor_opens(), 0);
    }

    #[tokio::test]
    async fn test_zero_fast_path_returns_fresh_fallback() {
        let store = populated_store();
        let zero = AggregateResult::default();
        let cache = cache_over(&store, Arc::new(FixedFastPath(Some(zero))));
        let key_a = ids(&["a"]);

        let a = cache.get_aggregate(&key_a, 0, 0, false).await.unwrap();
        assert_eq!(a.source, AggregateSource::Cursor);
        // Hot tier lost; the fallback tier still holds A.
        *cache.inner.hot.write().unwrap() = None;

        let opens_before = store.cursor_opens();
        let served = cache.get_aggregate(&key_a, 0, 0, false).await.unwrap();
        assert_eq!(served.source, AggregateSource::CursorCache);
        assert_eq!(*served.data, *a.data);
        assert_eq!(store.cursor_opens(), opens_before);

        let key_b = ids(&["b"]);
        let b = cache.get_aggregate(&key_b, 0, 0, false).await.unwrap();
        assert_eq!(b.source, AggregateSource::Cursor);
    }

    #[tokio::test]
    async fn test_concurrent_identical_requests_coalesce() {
        let store = populated_store();
        let gate = Arc::new(Notify::new());
        let cache = cache_over(&store, Arc::new(GatedFastPath(Arc::clone(&gate))));
        let list = ids(&["a", "b"]);

        let first = {
            let cache = cache.clone();
            let list = list.clone();
            tokio::spawn(async move { cache.get_aggregate(&list, 0, 0, false).await })
        };
        let second = {
            let cache = cache.clone();
            let list = list.clone();
            tokio::spawn(async move { cache.get_aggregate(&list, 0, 0, false).await })
        };
        while cache.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert_eq!(*first.data, *second.data);
        assert_eq!(cache.stats().cursor, 1);
        assert_eq!(store.cursor_opens(), 2);
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_caller_does_not_cancel() {
        let store = populated_store();
        let gate = Arc::new(Notify::new());
        let cache = cache_over(&store, Arc::new(GatedFastPath(Arc::clone(&gate))));
        let list = ids(&["a"]);

        let abandoned = {
            let cache = cache.clone();
            let list = list.clone();
            tokio::spawn(async move { cache.get_aggregate(&list, 0, 0, false).await })
        };
        while cache.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        abandoned.abort();
        gate.notify_one();

        while cache.in_flight() > 0 {
            tokio::task::yield_now().await;
        }
        let outcome = cache.get_aggregate(&list, 0, 0, false).await.unwrap();
        assert_eq!(outcome.source, AggregateSource::Cache);
        assert_eq!(cache.stats().cursor, 1);
    }

    #[tokio::test]
    async fn test_snapshot_promoted_to_hot_tier() {
        let dir = tempdir().unwrap();
        let config = AggregateCacheConfig {
            snapshot_path: Some(dir.path().join("aggregate.json")),
            ..Default::default()
        };
        let store = populated_store();
        let list = ids(&["a", "b"]);

        let writer = AggregateCache::new(Arc::new(store.clone()), Arc::new(NoFastPath), config.clone());
        let computed = writer.get_aggregate(&list, 0, 0, false).await.unwrap();

        let reader = AggregateCache::new(Arc::new(store.clone()), Arc::new(NoFastPath), config);
        let restored = reader.get_aggregate(&list, 0, 0, false).await.unwrap();
        assert_eq!(restored.source, AggregateSource::FileCache);
        assert_eq!(*restored.data, *computed.data);
        let hot = reader.get_aggregate(&list, 0, 0, false).await.unwrap();
        assert_eq!(hot.source, AggregateSource::Cache);

        let other = reader.get_aggregate(&ids(&["a"]), 0, 0, false).await.unwrap();
        assert_eq!(other.source, AggregateSource::Cursor);
    }

    #[tokio::test]
    async fn test_failing_conversation_is_truncated_not_fatal() {
        let store = populated_store();
        store.fail_cursor_for("b");
        let cache = cache_over(&store, Arc::new(NoFastPath));
        let outcome = cache.get_aggregate(&ids(&["a", "b"]), 0, 0, false).await.unwrap();
        assert_eq!(outcome.data.total, 2);
        assert!(!outcome.data.sessions.contains_key("b"));
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_partial_aggregate() {
        let store = InMemoryMessageStore::new();
        for ts in 1..=5 {
            store.push_message("a", InMemoryMessageStore::message_row(ts * 100, 1, true, "x"));
        }
        store.push_message("b", InMemoryMessageStore::message_row(900, 3, false, ""));
        store.fail_fetch_after("a", 1);
        let config = AggregateCacheConfig {
            cursor: crate::cursor::CursorOptions {
                batch_size: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let cache = AggregateCache::new(Arc::new(store.clone()), Arc::new(NoFastPath), config);

        let outcome = cache.get_aggregate(&ids(&["a", "b"]), 0, 0, false).await.unwrap();
        assert_eq!(outcome.source, AggregateSource::Cursor);
        assert_eq!(outcome.data.total, 3);
        assert_eq!(outcome.data.sessions["a"].total, 2);
        assert_eq!(outcome.data.sessions["b"].total, 1);
        assert_eq!(store.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_sender_ownership_used_for_recompute() {
        let store = InMemoryMessageStore::new();
        let mut row = InMemoryMessageStore::message_row(10, 1, false, "");
        row.remove("is_send");
        row.insert("sender_username".into(), FieldValue::from("wxid_me"));
        store.push_message("a", row);
        let cache = cache_over(&store, Arc::new(NoFastPath));
        cache.set_ownership(Ownership::for_self("wxid_me_ab12"));
        let outcome = cache.get_aggregate(&ids(&["a"]), 0, 0, false).await.unwrap();
        assert_eq!(outcome.data.sent, 1);
    }
}
