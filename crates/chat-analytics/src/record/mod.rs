// crates/chat-analytics/src/record/mod.rs

//! Store rows and the typed message view folded by the accumulator

pub mod fields;
pub mod identity;
pub mod message;

pub use fields::{aliases, lookup, lookup_i64, lookup_text, raw_row, FieldValue, RawRow};
pub use identity::{clean_account_id, Ownership, SelfIdentity};
pub use message::{message_types, MessageRecord};
