//! Two-person report between the store owner and one friend.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::ControlFlow;
use tracing::{debug, info, warn};

use super::{ApiResponse, ReportContext};
pub use crate::aggregate::{
    DualCounts, DualInitiative, DualResponse, DualStats, DualStreak, TopPhrase,
};
use crate::aggregate::{CalendarZone, TimeRange};
use crate::cursor::{CursorOptions, CursorStream};
use crate::emoji::{needs_fallback, EmojiResolver, TopEmoji, TopEmojis};
use crate::record::{aliases, lookup_text, message_types, MessageRecord, Ownership, RawRow};
use crate::store::MessageStore;

const FIRST_MESSAGES: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DualReportParams {
    /// 0 or negative for all time.
    #[serde(default)]
    pub year: i32,
    pub friend_username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DualReportMessage {
    pub content: String,
    pub is_sent_by_me: bool,
    /// Milliseconds.
    pub create_time: i64,
    pub create_time_str: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DualReportFirstChat {
    pub create_time: i64,
    pub create_time_str: String,
    pub content: String,
    pub is_sent_by_me: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearFirstChat {
    pub create_time: i64,
    pub create_time_str: String,
    pub content: String,
    pub is_sent_by_me: bool,
    pub friend_name: String,
    pub first_three_messages: Vec<DualReportMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DualReportStats {
    pub total_messages: u64,
    pub total_words: u64,
    pub image_count: u64,
    pub voice_count: u64,
    pub emoji_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_top_emoji_md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friend_top_emoji_md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_top_emoji_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friend_top_emoji_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_top_emoji_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friend_top_emoji_count: Option<u64>,
}

impl DualReportStats {
    fn new(counts: &DualCounts, top: TopEmojis) -> Self {
        let (my_md5, my_url, my_count) = split_top(top.mine);
        let (friend_md5, friend_url, friend_count) = split_top(top.theirs);
        Self {
            total_messages: counts.total,
            total_words: counts.words,
            image_count: counts.image,
            voice_count: counts.voice,
            emoji_count: counts.emoji,
            my_top_emoji_md5: my_md5,
            friend_top_emoji_md5: friend_md5,
            my_top_emoji_url: my_url,
            friend_top_emoji_url: friend_url,
            my_top_emoji_count: my_count,
            friend_top_emoji_count: friend_count,
        }
    }
}

fn split_top(top: Option<TopEmoji>) -> (Option<String>, Option<String>, Option<u64>) {
    match top {
        Some(t) => (Some(t.md5), t.url, Some(t.count)),
        None => (None, None, None),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DualReportData {
    pub year: i32,
    pub self_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_avatar_url: Option<String>,
    pub friend_username: String,
    pub friend_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friend_avatar_url: Option<String>,
    pub first_chat: Option<DualReportFirstChat>,
    pub first_chat_messages: Vec<DualReportMessage>,
    pub year_first_chat: Option<YearFirstChat>,
    pub stats: DualReportStats,
    pub top_phrases: Vec<TopPhrase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heatmap: Option<Vec<Vec<u64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly: Option<BTreeMap<String, u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiative: Option<DualInitiative>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<DualResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streak: Option<DualStreak>,
}

struct Participants {
    self_name: String,
    self_avatar_url: Option<String>,
    friend_name: String,
    friend_avatar_url: Option<String>,
}

#[derive(Clone)]
pub struct DualReportService {
    ctx: ReportContext,
}

impl DualReportService {
    pub fn new(ctx: ReportContext) -> Self {
        Self { ctx }
    }

    pub async fn generate_report(&self, params: DualReportParams) -> ApiResponse<DualReportData> {
        ApiResponse::from_result(self.build(params).await)
    }

    async fn build(&self, params: DualReportParams) -> anyhow::Result<DualReportData> {
        let friend = params.friend_username.trim().to_string();
        if friend.is_empty() {
            anyhow::bail!("friend username is required");
        }
        let progress = &self.ctx.progress;
        progress.report("Connecting to message store", 5);
        let identity = self.ctx.ensure_connected().await?;
        let ownership = Ownership::new(Some(identity.clone()));
        let zone = self.ctx.zone;

        let year = params.year.max(0);
        let (begin, end) = if year == 0 {
            (0, 0)
        } else {
            zone.year_bounds(year)
                .ok_or_else(|| anyhow::anyhow!("year {} is out of range", year))?
        };

        progress.report("Loading contact details", 10);
        let participants = self
            .participants(&friend, identity.raw(), identity.cleaned())
            .await;

        progress.report("Loading first messages", 15);
        let store = self.ctx.store.as_ref();
        let first_rows = CursorStream::collect_first(store, &friend, FIRST_MESSAGES, 0, 0).await;
        let first_chat = first_rows.first().map(|row| {
            let message = to_message(&friend, row, &ownership, &zone);
            let sender = lookup_text(row, aliases::SENDER);
            DualReportFirstChat {
                create_time: message.create_time,
                create_time_str: message.create_time_str,
                content: message.content,
                is_sent_by_me: message.is_sent_by_me,
                sender_username: (!sender.is_empty()).then_some(sender),
            }
        });
        let first_chat_messages = to_messages(&friend, &first_rows, &ownership, &zone);

        let mut year_first_chat = None;
        if year != 0 {
            progress.report("Loading first messages of the year", 20);
            let rows = CursorStream::collect_first(store, &friend, FIRST_MESSAGES, begin, end).await;
            let messages = to_messages(&friend, &rows, &ownership, &zone);
            year_first_chat = messages.first().cloned().map(|first| YearFirstChat {
                create_time: first.create_time,
                create_time_str: first.create_time_str,
                content: first.content,
                is_sent_by_me: first.is_sent_by_me,
                friend_name: participants.friend_name.clone(),
                first_three_messages: messages,
            });
        }

        progress.report("Counting conversation statistics", 30);
        let stats = self.stats(&friend, begin, end).await;
        let top = self
            .top_emojis(&friend, &ownership, &stats, begin, end)
            .await;

        let data = DualReportData {
            year,
            self_name: participants.self_name,
            self_avatar_url: participants.self_avatar_url,
            friend_username: friend,
            friend_name: participants.friend_name,
            friend_avatar_url: participants.friend_avatar_url,
            first_chat,
            first_chat_messages,
            year_first_chat,
            stats: DualReportStats::new(&stats.counts, top),
            top_phrases: stats.phrases,
            heatmap: stats.heatmap,
            monthly: stats.monthly,
            initiative: stats.initiative,
            response: stats.response,
            streak: stats.streak,
        };
        progress.report("Dual report ready", 100);
        Ok(data)
    }

    async fn participants(&self, friend: &str, raw_self: &str, cleaned_self: &str) -> Participants {
        let mut ids = vec![friend.to_string(), raw_self.to_string()];
        if cleaned_self != raw_self {
            ids.push(cleaned_self.to_string());
        }
        let identity = &self.ctx.identity;
        let (names, avatars) = futures::join!(
            identity.resolve_display_names(&ids),
            identity.resolve_avatar_urls(&ids)
        );
        let names = names.unwrap_or_else(|e| {
            warn!("Display name lookup failed: {:#}", e);
            HashMap::new()
        });
        let avatars = avatars.unwrap_or_else(|e| {
            warn!("Avatar lookup failed: {:#}", e);
            HashMap::new()
        });

        Participants {
            self_name: names
                .get(raw_self)
                .or_else(|| names.get(cleaned_self))
                .cloned()
                .unwrap_or_else(|| raw_self.to_string()),
            self_avatar_url: avatars
                .get(raw_self)
                .or_else(|| avatars.get(cleaned_self))
                .cloned(),
            friend_name: names.get(friend).cloned().unwrap_or_else(|| friend.to_string()),
            friend_avatar_url: avatars.get(friend).cloned(),
        }
    }

    async fn stats(&self, friend: &str, begin: i64, end: i64) -> DualStats {
        match self.ctx.fast_path.dual_report_stats(friend, begin, end).await {
            Ok(Some(stats)) => {
                debug!("Dual stats for {} answered by the fast path", friend);
                return stats;
            }
            Ok(None) => debug!("No fast dual stats for {}, scanning", friend),
            Err(e) => warn!("Fast dual stats for {} failed, scanning: {:#}", friend, e),
        }
        let options = self.ctx.cache.config().cursor.with_range(begin, end);
        scan_dual_stats(self.ctx.store.as_ref(), options, friend, &self.ctx.zone).await
    }

    async fn top_emojis(
        &self,
        friend: &str,
        ownership: &Ownership,
        stats: &DualStats,
        begin: i64,
        end: i64,
    ) -> TopEmojis {
        let mut top =
            EmojiResolver::resolve_top(stats.emojis.iter().map(EmojiResolver::parse_candidate));
        if needs_fallback(stats.counts.emoji, &top) {
            info!("Scanning {} for missing top emojis", friend);
            let scanned =
                EmojiResolver::scan_top_fallback(self.ctx.store.as_ref(), ownership, friend, begin, end)
                    .await;
            top.fill_missing(scanned);
        }

        for slot in [&mut top.mine, &mut top.theirs] {
            let Some(emoji) = slot.as_mut() else { continue };
            if emoji.url.is_some() {
                continue;
            }
            match self.ctx.identity.resolve_artifact_url(&emoji.md5).await {
                Ok(url) => emoji.url = url,
                Err(e) => warn!("Emoji url lookup for {} failed: {:#}", emoji.md5, e),
            }
        }
        top
    }
}

fn to_message(
    session_id: &str,
    row: &RawRow,
    ownership: &Ownership,
    zone: &CalendarZone,
) -> DualReportMessage {
    let record = MessageRecord::from_row(session_id, row);
    let millis = record.create_time.saturating_mul(1000);
    DualReportMessage {
        content: record.decoded_text(),
        is_sent_by_me: ownership.is_self(&record),
        create_time: millis,
        create_time_str: zone.format_short(millis),
    }
}

fn to_messages(
    session_id: &str,
    rows: &[RawRow],
    ownership: &Ownership,
    zone: &CalendarZone,
) -> Vec<DualReportMessage> {
    rows.iter()
        .map(|row| to_message(session_id, row, ownership, zone))
        .collect()
}

/// Dual statistics from one pass over the conversation. Emoji candidates are left to the
/// emoji scan.
pub async fn scan_dual_stats(
    store: &dyn MessageStore,
    options: CursorOptions,
    session_id: &str,
    zone: &CalendarZone,
) -> DualStats {
    let mut counts = DualCounts::default();
    let mut heatmap = vec![vec![0u64; 24]; 7];
    let mut monthly: BTreeMap<String, u64> = BTreeMap::new();
    let range = TimeRange::new(options.begin, options.end);

    let summary = CursorStream::new(store, options)
        .for_each_row(session_id, |row| {
            let record = MessageRecord::from_row(session_id, row);
            if record.create_time == 0 || !range.contains(record.create_time) {
                return ControlFlow::Continue(());
            }
            let Some(parts) = zone.parts(record.create_time) else {
                return ControlFlow::Continue(());
            };
            counts.total += 1;
            match record.local_type {
                message_types::IMAGE => counts.image += 1,
                message_types::VOICE => counts.voice += 1,
                message_types::EMOJI => counts.emoji += 1,
                code if message_types::is_text(code) => {
                    counts.words += record.decoded_text().chars().count() as u64;
                }
                _ => {}
            }
            heatmap[parts.weekday as usize][parts.hour as usize] += 1;
            *monthly.entry(parts.month).or_default() += 1;
            ControlFlow::Continue(())
        })
        .await;
    debug!(
        "Dual scan of {} folded {} of {} rows",
        session_id, counts.total, summary.rows
    );

    DualStats {
        counts,
        emojis: Vec::new(),
        phrases: Vec::new(),
        heatmap: Some(heatmap),
        monthly: Some(monthly),
        ..DualStats::default()
    }
}
