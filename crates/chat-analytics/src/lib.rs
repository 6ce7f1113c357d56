// crates/chat-analytics/src/lib.rs

pub mod aggregate;
pub mod config;
pub mod cursor;
pub mod emoji;
pub mod metrics;
pub mod payload;
pub mod progress;
pub mod record;
pub mod reporting;
pub mod store;
pub mod telemetry;

#[cfg(feature = "cli")]
pub mod api;
#[cfg(feature = "cli")]
pub mod server;

// Public API exports
pub use aggregate::{
    AggregateCache, AggregateCacheConfig, AggregateOutcome, AggregateResult, AggregateSource,
    CalendarZone, ChatStatistics,
};
pub use config::Config;
pub use cursor::{CursorOptions, CursorStream};
pub use emoji::{EmojiResolver, TopEmoji, TopEmojis};
pub use payload::PayloadDecoder;
pub use progress::{ProgressReporter, ProgressUpdate};
pub use record::{FieldValue, MessageRecord, RawRow, SelfIdentity};
pub use reporting::{
    AnalyticsService, ApiResponse, DualReportService, GroupAnalyticsService, ReportContext,
};
pub use store::{
    FastAggregator, IdentityResolver, InMemoryMessageStore, MessageStore, NoFastPath,
    SqliteMessageStore,
};

#[cfg(feature = "cli")]
pub use server::run_server;
