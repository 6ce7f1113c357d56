// crates/chat-analytics/src/aggregate/accumulator.rs

use chrono::{DateTime, Datelike, FixedOffset, Local, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::metrics;
use crate::record::{MessageRecord, Ownership, RawRow};

/// Calendar used to bucket timestamps into hours, weekdays, months and days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalendarZone {
    #[default]
    Local,
    Fixed(FixedOffset),
}

impl CalendarZone {
    /// Offset in minutes east of UTC, or local time when `None` or out of range.
    pub fn from_offset_minutes(minutes: Option<i32>) -> Self {
        minutes
            .and_then(|m| FixedOffset::east_opt(m.saturating_mul(60)))
            .map(CalendarZone::Fixed)
            .unwrap_or(CalendarZone::Local)
    }

    pub(crate) fn parts(&self, timestamp: i64) -> Option<CalendarParts> {
        let utc = DateTime::<Utc>::from_timestamp(timestamp, 0)?;
        Some(match self {
            CalendarZone::Local => CalendarParts::of(&utc.with_timezone(&Local)),
            CalendarZone::Fixed(offset) => CalendarParts::of(&utc.with_timezone(offset)),
        })
    }

    /// First and last second of `year` in this calendar.
    pub fn year_bounds(&self, year: i32) -> Option<(i64, i64)> {
        match self {
            CalendarZone::Local => Some((
                Local.with_ymd_and_hms(year, 1, 1, 0, 0, 0).earliest()?.timestamp(),
                Local.with_ymd_and_hms(year, 12, 31, 23, 59, 59).latest()?.timestamp(),
            )),
            CalendarZone::Fixed(offset) => Some((
                offset.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single()?.timestamp(),
                offset.with_ymd_and_hms(year, 12, 31, 23, 59, 59).single()?.timestamp(),
            )),
        }
    }

    /// `MM/DD HH:mm` for a millisecond timestamp.
    pub fn format_short(&self, millis: i64) -> String {
        let Some(utc) = DateTime::<Utc>::from_timestamp_millis(millis) else {
            return String::new();
        };
        match self {
            CalendarZone::Local => utc.with_timezone(&Local).format("%m/%d %H:%M").to_string(),
            CalendarZone::Fixed(offset) => utc.with_timezone(offset).format("%m/%d %H:%M").to_string(),
        }
    }
}

pub(crate) struct CalendarParts {
    pub hour: u32,
    /// 0 = Sunday.
    pub weekday: u32,
    pub month: String,
    pub day: String,
}

impl CalendarParts {
    fn of<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        Self {
            hour: dt.hour(),
            weekday: dt.weekday().num_days_from_sunday(),
            month: format!("{:04}-{:02}", dt.year(), dt.month()),
            day: format!("{:04}-{:02}-{:02}", dt.year(), dt.month(), dt.day()),
        }
    }
}

/// Inclusive time window in seconds; either bound may be 0 for "unbounded".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub begin: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(begin: i64, end: i64) -> Self {
        Self { begin, end }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        (self.begin <= 0 || timestamp >= self.begin) && (self.end <= 0 || timestamp <= self.end)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionTotals {
    pub total: u64,
    pub sent: u64,
    pub received: u64,
    pub last_time: i64,
}

/// Everything the reporting layer needs from one pass over a set of conversations.
///
/// Field names follow the JSON produced by native aggregators so either source can fill the
/// cache. Maps are ordered so equal inputs serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregateResult {
    pub total: u64,
    pub sent: u64,
    pub received: u64,
    pub first_time: i64,
    pub last_time: i64,
    pub type_counts: BTreeMap<i64, u64>,
    pub hourly: BTreeMap<u32, u64>,
    /// 0 = Sunday.
    pub weekday: BTreeMap<u32, u64>,
    pub monthly: BTreeMap<String, u64>,
    pub daily: BTreeMap<String, u64>,
    pub sessions: BTreeMap<String, SessionTotals>,
    pub id_map: BTreeMap<String, String>,
}

impl AggregateResult {
    pub fn count_of(&self, type_code: i64) -> u64 {
        self.type_counts.get(&type_code).copied().unwrap_or(0)
    }

    /// Re-key sessions by username when the producer keyed them by numeric id.
    pub fn normalize_sessions(&mut self) {
        if self.id_map.is_empty() || self.sessions.is_empty() {
            return;
        }
        let all_numeric = self
            .sessions
            .keys()
            .all(|key| !key.is_empty() && key.chars().all(|c| c.is_ascii_digit()));
        if !all_numeric {
            return;
        }
        let sessions = std::mem::take(&mut self.sessions);
        for (key, totals) in sessions {
            let username = self.id_map.get(&key).cloned().unwrap_or(key);
            let entry = self.sessions.entry(username).or_default();
            entry.total += totals.total;
            entry.sent += totals.sent;
            entry.received += totals.received;
            entry.last_time = entry.last_time.max(totals.last_time);
        }
    }
}

/// Folds message records into an [`AggregateResult`].
pub struct Accumulator {
    range: TimeRange,
    zone: CalendarZone,
    ownership: Ownership,
    result: AggregateResult,
}

impl Accumulator {
    pub fn new(range: TimeRange, zone: CalendarZone, ownership: Ownership) -> Self {
        Self {
            range,
            zone,
            ownership,
            result: AggregateResult::default(),
        }
    }

    /// Returns `false` when the record falls outside the window and was skipped.
    pub fn fold(&mut self, record: &MessageRecord) -> bool {
        let ts = record.create_time;
        if ts == 0 || !self.range.contains(ts) {
            return false;
        }
        let Some(parts) = self.zone.parts(ts) else {
            return false;
        };
        let is_self = self.ownership.is_self(record);
        let result = &mut self.result;

        result.total += 1;
        *result.type_counts.entry(record.local_type).or_default() += 1;
        if is_self {
            result.sent += 1;
        } else {
            result.received += 1;
        }

        if result.first_time == 0 || ts < result.first_time {
            result.first_time = ts;
        }
        if ts > result.last_time {
            result.last_time = ts;
        }

        let session = result
            .sessions
            .entry(record.session_id.clone())
            .or_default();
        session.total += 1;
        if is_self {
            session.sent += 1;
        } else {
            session.received += 1;
        }
        if ts > session.last_time {
            session.last_time = ts;
        }

        *result.hourly.entry(parts.hour).or_default() += 1;
        *result.weekday.entry(parts.weekday).or_default() += 1;
        *result.monthly.entry(parts.month).or_default() += 1;
        *result.daily.entry(parts.day).or_default() += 1;
        true
    }

    pub fn fold_row(&mut self, session_id: &str, row: &RawRow) -> bool {
        self.fold(&MessageRecord::from_row(session_id, row))
    }

    pub fn total(&self) -> u64 {
        self.result.total
    }

    pub fn finish(mut self) -> AggregateResult {
        self.result.sessions.retain(|_, totals| totals.total > 0);
        metrics::add_records_folded(self.result.total);
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::message_types;
    use proptest::prelude::*;

    fn utc() -> CalendarZone {
        CalendarZone::Fixed(FixedOffset::east_opt(0).unwrap())
    }

    fn record(session: &str, ts: i64, local_type: i64, is_send: Option<bool>) -> MessageRecord {
        MessageRecord {
            session_id: session.into(),
            create_time: ts,
            local_type,
            is_send,
            sender: None,
            content: None,
            compress_content: None,
        }
    }

    #[test]
    fn test_fold_counts_and_histograms() {
        let mut acc = Accumulator::new(TimeRange::all(), utc(), Ownership::default());
        // 2023-11-14 22:13:20 UTC, a Tuesday
        assert!(acc.fold(&record("a", 1_700_000_000, 1, Some(true))));
        assert!(acc.fold(&record("b", 1_700_003_600, 3, Some(false))));
        let result = acc.finish();

        assert_eq!(result.total, 2);
        assert_eq!(result.sent, 1);
        assert_eq!(result.received, 1);
        assert_eq!(result.first_time, 1_700_000_000);
        assert_eq!(result.last_time, 1_700_003_600);
        assert_eq!(result.hourly.get(&22), Some(&1));
        assert_eq!(result.hourly.get(&23), Some(&1));
        assert_eq!(result.weekday.get(&2), Some(&2));
        assert_eq!(result.monthly.get("2023-11"), Some(&2));
        assert_eq!(result.daily.get("2023-11-14"), Some(&2));
        assert_eq!(result.sessions["a"].sent, 1);
        assert_eq!(result.sessions["b"].received, 1);
    }

    #[test]
    fn test_window_and_zero_timestamp_skipped() {
        let mut acc = Accumulator::new(TimeRange::new(100, 200), utc(), Ownership::default());
        assert!(!acc.fold(&record("a", 0, 1, None)));
        assert!(!acc.fold(&record("a", 99, 1, None)));
        assert!(!acc.fold(&record("a", 201, 1, None)));
        assert!(acc.fold(&record("a", 200, 1, None)));
        let result = acc.finish();
        assert_eq!(result.total, 1);
        assert_eq!(result.received, 1);
    }

    #[test]
    fn test_fixed_offset_shifts_buckets() {
        let tokyo = CalendarZone::from_offset_minutes(Some(9 * 60));
        let mut acc = Accumulator::new(TimeRange::all(), tokyo, Ownership::default());
        acc.fold(&record("a", 1_700_000_000, 1, None));
        let result = acc.finish();
        assert_eq!(result.hourly.get(&7), Some(&1));
        assert_eq!(result.daily.get("2023-11-15"), Some(&1));
    }

    #[test]
    fn test_sender_ownership_applies_without_flag() {
        let mut acc = Accumulator::new(TimeRange::all(), utc(), Ownership::for_self("wxid_me_ab12"));
        let mut mine = record("a", 10, message_types::TEXT, None);
        mine.sender = Some("wxid_me".into());
        acc.fold(&mine);
        let result = acc.finish();
        assert_eq!(result.sent, 1);
    }

    #[test]
    fn test_normalize_sessions_rekeys_numeric_ids() {
        let mut result = AggregateResult::default();
        result.sessions.insert(
            "12".into(),
            SessionTotals {
                total: 2,
                sent: 1,
                received: 1,
                last_time: 5,
            },
        );
        result.id_map.insert("12".into(), "wxid_friend".into());
        result.normalize_sessions();
        assert!(result.sessions.contains_key("wxid_friend"));
        assert!(!result.sessions.contains_key("12"));
    }

    #[test]
    fn test_serde_uses_native_field_names() {
        let mut acc = Accumulator::new(TimeRange::all(), utc(), Ownership::default());
        acc.fold(&record("a", 1_700_000_000, 47, Some(true)));
        let result = acc.finish();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["typeCounts"]["47"], 1);
        assert_eq!(json["firstTime"], 1_700_000_000i64);
        let back: AggregateResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_year_bounds_and_short_format() {
        let (begin, end) = utc().year_bounds(2024).unwrap();
        assert_eq!(begin, 1_704_067_200);
        assert_eq!(end, 1_735_689_599);
        assert_eq!(utc().format_short(1_700_000_000_000), "11/14 22:13");
        let tokyo = CalendarZone::from_offset_minutes(Some(9 * 60));
        assert_eq!(tokyo.year_bounds(2024).unwrap().0, 1_704_067_200 - 9 * 3600);
    }

    fn type_code() -> impl Strategy<Value = i64> {
        prop::sample::select(vec![1i64, 3, 34, 43, 47, 49, 10000, 244813135921])
    }

    proptest! {
        #[test]
        fn prop_totals_are_consistent(
            records in prop::collection::vec(
                (0usize..4, 0i64..2_000_000_000, type_code(), prop::option::of(any::<bool>())),
                0..200,
            ),
            begin in 0i64..1_000_000_000,
        ) {
            let mut acc = Accumulator::new(TimeRange::new(begin, 0), utc(), Ownership::default());
            for (session, ts, local_type, is_send) in &records {
                acc.fold(&record(&format!("s{}", session), *ts, *local_type, *is_send));
            }
            let result = acc.finish();

            prop_assert_eq!(result.total, result.sent + result.received);
            prop_assert_eq!(result.type_counts.values().sum::<u64>(), result.total);
            prop_assert_eq!(result.hourly.values().sum::<u64>(), result.total);
            prop_assert_eq!(result.weekday.values().sum::<u64>(), result.total);
            prop_assert_eq!(result.sessions.values().map(|s| s.total).sum::<u64>(), result.total);
            prop_assert!(result.sessions.values().all(|s| s.total > 0));
        }
    }
}
