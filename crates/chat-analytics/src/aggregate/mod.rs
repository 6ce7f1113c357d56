// crates/chat-analytics/src/aggregate/mod.rs

//! Statistical accumulation and the tiered aggregate cache

pub mod accumulator;
pub mod cache;
pub mod classify;
pub mod dual_stats;
pub mod snapshot;

pub use accumulator::{Accumulator, AggregateResult, CalendarZone, SessionTotals, TimeRange};
pub use cache::{
    cache_key, AggregateCache, AggregateCacheConfig, AggregateOutcome, AggregateSource, CacheStats,
};
pub use classify::ChatStatistics;
pub use dual_stats::{
    DualCounts, DualInitiative, DualResponse, DualStats, DualStreak, TopPhrase,
};
pub use snapshot::{SnapshotFile, SnapshotRecord};
