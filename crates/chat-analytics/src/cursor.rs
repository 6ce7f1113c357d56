// crates/chat-analytics/src/cursor.rs

//! Bounded-batch streaming over one conversation.
//!
//! [`CursorStream`] pairs every cursor it opens with a close, whatever happens while the
//! batches drain. Store failures never reach the caller: an unopenable conversation yields
//! nothing and a failed fetch truncates that conversation's contribution.

use anyhow::Context;
use std::ops::ControlFlow;
use tracing::{debug, warn};

use crate::metrics;
use crate::record::RawRow;
use crate::store::{CursorHandle, CursorRequest, MessageStore};

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_YIELD_EVERY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorOptions {
    pub batch_size: usize,
    pub ascending: bool,
    pub begin: i64,
    pub end: i64,
    /// Batches between scheduler yields; 0 never yields.
    pub yield_every: usize,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            ascending: true,
            begin: 0,
            end: 0,
            yield_every: DEFAULT_YIELD_EVERY,
        }
    }
}

impl CursorOptions {
    pub fn with_range(mut self, begin: i64, end: i64) -> Self {
        self.begin = begin;
        self.end = end;
        self
    }

    fn request(&self) -> CursorRequest {
        CursorRequest {
            batch_size: self.batch_size.max(1),
            ascending: self.ascending,
            begin: self.begin,
            end: self.end,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub batches: usize,
    pub rows: usize,
    /// Store reported the final page.
    pub completed: bool,
    /// Row callback asked to stop.
    pub stopped: bool,
}

pub struct CursorStream<'a> {
    store: &'a dyn MessageStore,
    options: CursorOptions,
}

impl<'a> CursorStream<'a> {
    pub fn new(store: &'a dyn MessageStore, options: CursorOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &CursorOptions {
        &self.options
    }

    /// Feed every row of `session_id` to `on_row` until the store runs dry or the callback
    /// breaks.
    pub async fn for_each_row<F>(&self, session_id: &str, mut on_row: F) -> StreamSummary
    where
        F: FnMut(&RawRow) -> ControlFlow<()> + Send,
    {
        let handle = match self
            .store
            .open_cursor(session_id, self.options.request())
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to open cursor for session {}: {:#}", session_id, e);
                return StreamSummary::default();
            }
        };

        let mut summary = StreamSummary::default();
        if let Err(e) = self.drain(handle, session_id, &mut on_row, &mut summary).await {
            warn!(
                "Cursor for session {} stopped after {} batches: {:#}",
                session_id, summary.batches, e
            );
        }
        if let Err(e) = self.store.close_cursor(handle).await {
            warn!("Failed to close cursor for session {}: {:#}", session_id, e);
        }
        debug!(
            "Session {} streamed {} rows in {} batches",
            session_id, summary.rows, summary.batches
        );
        summary
    }

    async fn drain<F>(
        &self,
        handle: CursorHandle,
        session_id: &str,
        on_row: &mut F,
        summary: &mut StreamSummary,
    ) -> anyhow::Result<()>
    where
        F: FnMut(&RawRow) -> ControlFlow<()> + Send,
    {
        loop {
            let batch = self
                .store
                .fetch_batch(handle)
                .await
                .with_context(|| format!("fetching batch {} of {}", summary.batches + 1, session_id))?;
            summary.batches += 1;
            metrics::inc_cursor_batches();

            for row in &batch.rows {
                summary.rows += 1;
                if on_row(row).is_break() {
                    summary.stopped = true;
                    return Ok(());
                }
            }
            if !batch.has_more {
                summary.completed = true;
                return Ok(());
            }
            if self.options.yield_every > 0 && summary.batches % self.options.yield_every == 0 {
                tokio::task::yield_now().await;
            }
        }
    }

    /// Up to `limit` rows from the start of the conversation. An `end` of 0 means "now".
    pub async fn collect_first(
        store: &'a dyn MessageStore,
        session_id: &str,
        limit: usize,
        begin: i64,
        end: i64,
    ) -> Vec<RawRow> {
        let end = if end <= 0 {
            chrono::Utc::now().timestamp()
        } else {
            end
        };
        let options = CursorOptions {
            batch_size: limit.max(1),
            ascending: true,
            begin,
            end,
            yield_every: 0,
        };
        let mut rows = Vec::with_capacity(limit);
        if limit == 0 {
            return rows;
        }
        CursorStream::new(store, options)
            .for_each_row(session_id, |row| {
                rows.push(row.clone());
                if rows.len() >= limit {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await;
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryMessageStore;

    fn store_with(count: i64) -> InMemoryMessageStore {
        let store = InMemoryMessageStore::new();
        for ts in 1..=count {
            store.push_message("s", InMemoryMessageStore::message_row(ts, 1, ts % 2 == 0, "m"));
        }
        store
    }

    fn options(batch_size: usize) -> CursorOptions {
        CursorOptions {
            batch_size,
            ..CursorOptions::default()
        }
    }

    #[tokio::test]
    async fn test_streams_all_rows_and_closes() {
        let store = store_with(25);
        let summary = CursorStream::new(&store, options(10))
            .for_each_row("s", |_| ControlFlow::Continue(()))
            .await;
        assert_eq!(summary.rows, 25);
        assert_eq!(summary.batches, 3);
        assert!(summary.completed);
        assert_eq!(store.cursor_opens(), 1);
        assert_eq!(store.cursor_closes(), 1);
        assert_eq!(store.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_early_stop_still_closes() {
        let store = store_with(25);
        let mut seen = 0;
        let summary = CursorStream::new(&store, options(10))
            .for_each_row("s", |_| {
                seen += 1;
                if seen == 12 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await;
        assert!(summary.stopped);
        assert!(!summary.completed);
        assert_eq!(summary.batches, 2);
        assert_eq!(store.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_open_failure_is_empty() {
        let store = store_with(5);
        store.fail_cursor_for("s");
        let summary = CursorStream::new(&store, options(10))
            .for_each_row("s", |_| ControlFlow::Continue(()))
            .await;
        assert_eq!(summary, StreamSummary::default());
        assert_eq!(store.cursor_closes(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_earlier_rows_and_closes() {
        let store = store_with(25);
        store.fail_fetch_after("s", 2);
        let mut seen = Vec::new();
        let summary = CursorStream::new(&store, options(10))
            .for_each_row("s", |row| {
                seen.push(crate::record::lookup_i64(row, crate::record::aliases::CREATE_TIME, 0));
                ControlFlow::Continue(())
            })
            .await;
        assert_eq!(summary.rows, 20);
        assert_eq!(summary.batches, 2);
        assert!(!summary.completed);
        assert!(!summary.stopped);
        assert_eq!(seen, (1..=20).collect::<Vec<i64>>());
        assert_eq!(store.batch_fetches(), 3);
        assert_eq!(store.cursor_closes(), 1);
        assert_eq!(store.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_yields_without_losing_rows() {
        let store = store_with(100);
        let summary = CursorStream::new(
            &store,
            CursorOptions {
                batch_size: 3,
                yield_every: 2,
                ..CursorOptions::default()
            },
        )
        .for_each_row("s", |_| ControlFlow::Continue(()))
        .await;
        assert_eq!(summary.rows, 100);
        assert_eq!(summary.batches, 34);
    }

    #[tokio::test]
    async fn test_collect_first_limits_rows() {
        let store = store_with(10);
        let rows = CursorStream::collect_first(&store, "s", 3, 0, 0).await;
        assert_eq!(rows.len(), 3);
        assert_eq!(store.open_cursors(), 0);
        assert!(CursorStream::collect_first(&store, "missing", 3, 0, 0)
            .await
            .is_empty());
    }
}
