//! Statistics of one two-person conversation, as produced by a fast path or a scan.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::record::RawRow;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DualCounts {
    pub total: u64,
    pub words: u64,
    pub image: u64,
    pub voice: u64,
    pub emoji: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopPhrase {
    pub phrase: String,
    pub count: u64,
}

/// Conversations opened by each side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualInitiative {
    pub initiated: u64,
    pub received: u64,
}

/// Reply latency in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DualResponse {
    pub avg: f64,
    pub fastest: f64,
    pub count: u64,
}

/// Longest run of consecutive days with messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DualStreak {
    pub days: u64,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DualStats {
    pub counts: DualCounts,
    /// Pre-counted emoji candidates, read with `EmojiResolver::parse_candidate`.
    pub emojis: Vec<RawRow>,
    pub phrases: Vec<TopPhrase>,
    /// `heatmap[weekday][hour]`, weekday 0 = Sunday.
    pub heatmap: Option<Vec<Vec<u64>>>,
    pub monthly: Option<BTreeMap<String, u64>>,
    pub initiative: Option<DualInitiative>,
    pub response: Option<DualResponse>,
    pub streak: Option<DualStreak>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streak_serializes_camel_case() {
        let streak = DualStreak {
            days: 12,
            start_date: "2024-01-01".into(),
            end_date: "2024-01-12".into(),
        };
        let json = serde_json::to_value(&streak).unwrap();
        assert_eq!(json["startDate"], "2024-01-01");
        assert_eq!(json["endDate"], "2024-01-12");
        assert_eq!(json["days"], 12);
    }

    #[test]
    fn test_counts_tolerate_missing_fields() {
        let counts: DualCounts = serde_json::from_str(r#"{"total": 4}"#).unwrap();
        assert_eq!(counts.total, 4);
        assert_eq!(counts.words, 0);
    }
}
