use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::AggregateResult;
use crate::record::message_types;

/// Rough days-per-month factor used when no daily histogram is available.
const DAYS_PER_ACTIVE_MONTH: u64 = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStatistics {
    pub total_messages: u64,
    pub text_messages: u64,
    pub image_messages: u64,
    pub voice_messages: u64,
    pub video_messages: u64,
    pub emoji_messages: u64,
    pub other_messages: u64,
    pub sent_messages: u64,
    pub received_messages: u64,
    pub first_message_time: Option<i64>,
    pub last_message_time: Option<i64>,
    pub active_days: u64,
    pub message_type_counts: BTreeMap<i64, u64>,
}

impl ChatStatistics {
    pub fn from_aggregate(data: &AggregateResult) -> Self {
        let text = data.count_of(message_types::TEXT) + data.count_of(message_types::LONG_TEXT);
        let image = data.count_of(message_types::IMAGE);
        let voice = data.count_of(message_types::VOICE);
        let video = data.count_of(message_types::VIDEO);
        let emoji = data.count_of(message_types::EMOJI);
        let classified = text + image + voice + video + emoji;

        let active_days = if data.daily.is_empty() {
            data.monthly.len() as u64 * DAYS_PER_ACTIVE_MONTH
        } else {
            data.daily.len() as u64
        };

        Self {
            total_messages: data.total,
            text_messages: text,
            image_messages: image,
            voice_messages: voice,
            video_messages: video,
            emoji_messages: emoji,
            other_messages: data.total.saturating_sub(classified),
            sent_messages: data.sent,
            received_messages: data.received,
            first_message_time: (data.first_time != 0).then_some(data.first_time),
            last_message_time: (data.last_time != 0).then_some(data.last_time),
            active_days,
            message_type_counts: data.type_counts.clone(),
        }
    }
}
