// crates/chat-analytics/src/reporting/overall.rs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

use super::sessions::{private_sessions, PrivateSessions};
use super::{ApiResponse, ReportContext};
use crate::aggregate::{AggregateOutcome, AggregateResult, ChatStatistics};

pub const DEFAULT_RANKING_LIMIT: usize = 20;
const DIAGNOSTIC_SAMPLE: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRanking {
    pub username: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub message_count: u64,
    pub sent_count: u64,
    pub received_count: u64,
    pub last_message_time: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeDistribution {
    pub hourly_distribution: BTreeMap<u32, u64>,
    /// 1 = Monday through 7 = Sunday.
    pub weekday_distribution: BTreeMap<u32, u64>,
    pub monthly_distribution: BTreeMap<String, u64>,
}

impl TimeDistribution {
    pub fn from_aggregate(data: &AggregateResult) -> Self {
        let hourly_distribution = (0..24)
            .map(|hour| (hour, data.hourly.get(&hour).copied().unwrap_or(0)))
            .collect();
        let weekday_distribution = data
            .weekday
            .iter()
            .map(|(day, count)| (if *day == 0 { 7 } else { *day }, *count))
            .collect();
        Self {
            hourly_distribution,
            weekday_distribution,
            monthly_distribution: data.monthly.clone(),
        }
    }
}

/// Statistics over every private conversation of the store owner.
#[derive(Clone)]
pub struct AnalyticsService {
    ctx: ReportContext,
}

impl AnalyticsService {
    pub fn new(ctx: ReportContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ReportContext {
        &self.ctx
    }

    pub async fn get_overall_statistics(&self, force: bool) -> ApiResponse<ChatStatistics> {
        ApiResponse::from_result(self.overall_statistics(force).await)
    }

    pub async fn get_contact_rankings(&self, limit: usize) -> ApiResponse<Vec<ContactRanking>> {
        ApiResponse::from_result(self.contact_rankings(limit).await)
    }

    pub async fn get_time_distribution(&self) -> ApiResponse<TimeDistribution> {
        ApiResponse::from_result(self.time_distribution().await)
    }

    async fn load_sessions(&self) -> anyhow::Result<PrivateSessions> {
        let identity = self.ctx.ensure_connected().await?;
        let sessions = private_sessions(self.ctx.store.as_ref(), identity.cleaned()).await;
        if sessions.usernames.is_empty() {
            anyhow::bail!("no message sessions found");
        }
        Ok(sessions)
    }

    async fn aggregate(
        &self,
        sessions: &PrivateSessions,
        force: bool,
    ) -> anyhow::Result<AggregateOutcome> {
        let outcome = self
            .ctx
            .cache
            .get_aggregate(&sessions.usernames, 0, 0, force)
            .await?;
        info!(
            "Aggregate over {} sessions answered by {}",
            sessions.usernames.len(),
            outcome.source.as_str()
        );
        Ok(outcome)
    }

    async fn overall_statistics(&self, force: bool) -> anyhow::Result<ChatStatistics> {
        let sessions = self.load_sessions().await?;
        self.ctx.progress.report("Aggregating message statistics", 30);
        let outcome = self.aggregate(&sessions, force).await?;
        self.ctx.progress.report("Preparing statistics", 90);

        if outcome.data.total == 0 {
            self.log_diagnostics(&sessions.usernames).await;
        }
        Ok(ChatStatistics::from_aggregate(&outcome.data))
    }

    async fn log_diagnostics(&self, usernames: &[String]) {
        for session_id in usernames.iter().take(DIAGNOSTIC_SAMPLE) {
            match self.ctx.store.get_message_count(session_id).await {
                Ok(count) => info!("Empty aggregate; session {} holds {} messages", session_id, count),
                Err(e) => warn!("Empty aggregate; counting {} failed: {:#}", session_id, e),
            }
        }
    }

    async fn contact_rankings(&self, limit: usize) -> anyhow::Result<Vec<ContactRanking>> {
        let sessions = self.load_sessions().await?;
        let outcome = self.aggregate(&sessions, false).await?;

        let mut data = Arc::unwrap_or_clone(outcome.data);
        if data.id_map.is_empty() {
            data.id_map = sessions.id_map.clone();
        }
        data.normalize_sessions();

        let usernames: Vec<String> = data.sessions.keys().cloned().collect();
        let (names, avatars) = futures::join!(
            self.ctx.identity.resolve_display_names(&usernames),
            self.ctx.identity.resolve_avatar_urls(&usernames)
        );
        let names = names.unwrap_or_else(|e| {
            warn!("Display name lookup failed: {:#}", e);
            HashMap::new()
        });
        let avatars = avatars.unwrap_or_else(|e| {
            warn!("Avatar lookup failed: {:#}", e);
            HashMap::new()
        });

        let mut rankings: Vec<ContactRanking> = data
            .sessions
            .iter()
            .map(|(username, totals)| ContactRanking {
                username: username.clone(),
                display_name: names.get(username).cloned().unwrap_or_else(|| username.clone()),
                avatar_url: avatars.get(username).cloned(),
                message_count: totals.total,
                sent_count: totals.sent,
                received_count: totals.received,
                last_message_time: (totals.last_time != 0).then_some(totals.last_time),
            })
            .collect();
        rankings.sort_by(|a, b| b.message_count.cmp(&a.message_count));
        rankings.truncate(limit);
        Ok(rankings)
    }

    async fn time_distribution(&self) -> anyhow::Result<TimeDistribution> {
        let sessions = self.load_sessions().await?;
        let outcome = self.aggregate(&sessions, false).await?;
        Ok(TimeDistribution::from_aggregate(&outcome.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporting::test_support::context;
    use crate::store::InMemoryMessageStore;

    const MD5: &str = "0123456789abcdef0123456789abcdef";

    fn three_conversations() -> InMemoryMessageStore {
        let store = InMemoryMessageStore::new();
        store.push_message("alice", InMemoryMessageStore::message_row(100, 1, true, "hello"));
        store.push_message("bob", InMemoryMessageStore::message_row(200, 3, false, ""));
        store.push_message(
            "carol",
            InMemoryMessageStore::message_row(300, 47, true, &format!(r#"md5="{}""#, MD5)),
        );
        store.add_session("room@chatroom");
        store.add_session("filehelper");
        store
    }

    #[tokio::test]
    async fn test_overall_statistics_end_to_end() {
        let store = three_conversations();
        let service = AnalyticsService::new(context(&store));
        let response = service.get_overall_statistics(false).await;
        assert!(response.success, "{:?}", response.error);
        let stats = response.data.unwrap();
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.sent_messages, 2);
        assert_eq!(stats.received_messages, 1);
        assert_eq!(stats.text_messages, 1);
        assert_eq!(stats.image_messages, 1);
        assert_eq!(stats.emoji_messages, 1);
        assert_eq!(stats.other_messages, 0);
        assert_eq!(stats.first_message_time, Some(100));
        assert_eq!(stats.last_message_time, Some(300));
        assert_eq!(stats.active_days, 1);
    }

    #[tokio::test]
    async fn test_no_private_sessions_is_failure() {
        let store = InMemoryMessageStore::new();
        store.add_session("room@chatroom");
        let response = AnalyticsService::new(context(&store))
            .get_overall_statistics(false)
            .await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("no message sessions found"));
    }

    #[tokio::test]
    async fn test_rankings_sorted_and_named() {
        let store = three_conversations();
        store.push_message("bob", InMemoryMessageStore::message_row(400, 1, true, "again"));
        store.set_display_name("bob", "Bob");
        store.set_avatar_url("bob", "https://img/bob");
        let service = AnalyticsService::new(context(&store));

        let rankings = service.get_contact_rankings(2).await.data.unwrap();
        assert_eq!(rankings.len(), 2);
        assert_eq!(rankings[0].username, "bob");
        assert_eq!(rankings[0].display_name, "Bob");
        assert_eq!(rankings[0].avatar_url.as_deref(), Some("https://img/bob"));
        assert_eq!(rankings[0].message_count, 2);
        assert_eq!(rankings[0].last_message_time, Some(400));
        assert_eq!(rankings[1].display_name, rankings[1].username);
    }

    #[tokio::test]
    async fn test_time_distribution_shape() {
        let store = three_conversations();
        let dist = AnalyticsService::new(context(&store))
            .get_time_distribution()
            .await
            .data
            .unwrap();
        assert_eq!(dist.hourly_distribution.len(), 24);
        assert_eq!(dist.hourly_distribution[&0], 3);
        // 1970-01-01 was a Thursday.
        assert_eq!(dist.weekday_distribution.get(&4), Some(&3));
        assert_eq!(dist.monthly_distribution.get("1970-01"), Some(&3));
    }

    #[test]
    fn test_sunday_rekeyed_to_seven() {
        let mut data = AggregateResult::default();
        data.weekday.insert(0, 2);
        data.weekday.insert(1, 1);
        let dist = TimeDistribution::from_aggregate(&data);
        assert_eq!(dist.weekday_distribution.get(&7), Some(&2));
        assert_eq!(dist.weekday_distribution.get(&1), Some(&1));
        assert!(!dist.weekday_distribution.contains_key(&0));
    }

    #[tokio::test]
    async fn test_second_request_served_from_cache() {
        let store = three_conversations();
        let service = AnalyticsService::new(context(&store));
        service.get_overall_statistics(false).await;
        let opens = store.cursor_opens();
        service.get_time_distribution().await;
        assert_eq!(store.cursor_opens(), opens);
        assert_eq!(service.context().cache.stats().cache, 1);
    }
}
