// crates/chat-analytics/src/reporting/group.rs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::ControlFlow;
use tracing::{debug, warn};

use super::sessions::group_sessions;
use super::{ApiResponse, ReportContext};
use crate::aggregate::{Accumulator, AggregateResult, TimeRange};
use crate::cursor::CursorStream;
use crate::record::{
    aliases, lookup_text, message_types, MessageRecord, Ownership, SelfIdentity,
};

pub const DEFAULT_GROUP_RANKING_LIMIT: usize = 20;
pub const OTHER_MEDIA_TYPE: i64 = -1;

const MEDIA_TYPES: &[(i64, &str)] = &[
    (message_types::TEXT, "Text"),
    (message_types::IMAGE, "Image"),
    (message_types::VOICE, "Voice"),
    (message_types::VIDEO, "Video"),
    (message_types::EMOJI, "Sticker"),
    (message_types::LINK, "Link/File"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupChatInfo {
    pub username: String,
    pub display_name: String,
    pub member_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub username: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessageRank {
    pub member: GroupMember,
    pub message_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupActiveHours {
    pub hourly_distribution: BTreeMap<u32, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaTypeCount {
    #[serde(rename = "type")]
    pub type_code: i64,
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMediaStats {
    pub type_counts: Vec<MediaTypeCount>,
    pub total: u64,
}

impl GroupMediaStats {
    pub fn from_type_counts(type_counts: &BTreeMap<i64, u64>) -> Self {
        let mut others = 0;
        let mut counts: Vec<MediaTypeCount> = Vec::new();
        for (code, count) in type_counts {
            match MEDIA_TYPES.iter().find(|(known, _)| known == code) {
                Some((_, name)) if *count > 0 => counts.push(MediaTypeCount {
                    type_code: *code,
                    name: (*name).to_string(),
                    count: *count,
                }),
                Some(_) => {}
                None => others += count,
            }
        }
        if others > 0 {
            counts.push(MediaTypeCount {
                type_code: OTHER_MEDIA_TYPE,
                name: "Other".to_string(),
                count: others,
            });
        }
        counts.sort_by(|a, b| b.count.cmp(&a.count));
        let total = counts.iter().map(|c| c.count).sum();
        Self {
            type_counts: counts,
            total,
        }
    }
}

/// One pass over a group conversation.
#[derive(Debug, Clone, Default)]
pub struct GroupScan {
    pub aggregate: AggregateResult,
    /// Messages per sender in first-seen order.
    pub senders: Vec<(String, u64)>,
}

/// Statistics over group conversations, computed by a cursor scan per request.
#[derive(Clone)]
pub struct GroupAnalyticsService {
    ctx: ReportContext,
}

impl GroupAnalyticsService {
    pub fn new(ctx: ReportContext) -> Self {
        Self { ctx }
    }

    pub async fn get_group_chats(&self) -> ApiResponse<Vec<GroupChatInfo>> {
        ApiResponse::from_result(self.group_chats().await)
    }

    pub async fn get_group_members(&self, chatroom_id: &str) -> ApiResponse<Vec<GroupMember>> {
        ApiResponse::from_result(self.members(chatroom_id).await)
    }

    pub async fn get_group_message_ranking(
        &self,
        chatroom_id: &str,
        limit: usize,
        begin: i64,
        end: i64,
    ) -> ApiResponse<Vec<GroupMessageRank>> {
        ApiResponse::from_result(self.message_ranking(chatroom_id, limit, begin, end).await)
    }

    pub async fn get_group_active_hours(
        &self,
        chatroom_id: &str,
        begin: i64,
        end: i64,
    ) -> ApiResponse<GroupActiveHours> {
        ApiResponse::from_result(self.active_hours(chatroom_id, begin, end).await)
    }

    pub async fn get_group_media_stats(
        &self,
        chatroom_id: &str,
        begin: i64,
        end: i64,
    ) -> ApiResponse<GroupMediaStats> {
        ApiResponse::from_result(self.media_stats(chatroom_id, begin, end).await)
    }

    async fn group_chats(&self) -> anyhow::Result<Vec<GroupChatInfo>> {
        self.ctx.ensure_connected().await?;
        let ids = group_sessions(self.ctx.store.as_ref()).await?;

        let identity = &self.ctx.identity;
        let (names, avatars, members) = futures::join!(
            identity.resolve_display_names(&ids),
            identity.resolve_avatar_urls(&ids),
            identity.resolve_group_member_counts(&ids)
        );
        let names = or_empty(names, "display name");
        let avatars = or_empty(avatars, "avatar");
        let members = or_empty(members, "member count");

        let mut groups: Vec<GroupChatInfo> = ids
            .into_iter()
            .map(|id| GroupChatInfo {
                display_name: names.get(&id).cloned().unwrap_or_else(|| id.clone()),
                member_count: members.get(&id).copied().unwrap_or(0),
                avatar_url: avatars.get(&id).cloned(),
                username: id,
            })
            .collect();
        groups.sort_by(|a, b| b.member_count.cmp(&a.member_count));
        Ok(groups)
    }

    async fn members(&self, chatroom_id: &str) -> anyhow::Result<Vec<GroupMember>> {
        if chatroom_id.trim().is_empty() {
            anyhow::bail!("group id is required");
        }
        self.ctx.ensure_connected().await?;
        let rows = self
            .ctx
            .store
            .list_group_members(chatroom_id)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load group members: {:#}", e))?;

        let members: Vec<(String, Option<String>)> = rows
            .iter()
            .map(|row| {
                let avatar = lookup_text(row, aliases::AVATAR_URL);
                (
                    lookup_text(row, aliases::SESSION_USERNAME),
                    (!avatar.is_empty()).then_some(avatar),
                )
            })
            .filter(|(username, _)| !username.is_empty())
            .collect();
        let usernames: Vec<String> = members.iter().map(|(id, _)| id.clone()).collect();
        let names = or_empty(
            self.ctx.identity.resolve_display_names(&usernames).await,
            "display name",
        );
        debug!("Group {} has {} members", chatroom_id, members.len());

        Ok(members
            .into_iter()
            .map(|(username, avatar_url)| GroupMember {
                display_name: names.get(&username).cloned().unwrap_or_else(|| username.clone()),
                avatar_url,
                username,
            })
            .collect())
    }

    async fn message_ranking(
        &self,
        chatroom_id: &str,
        limit: usize,
        begin: i64,
        end: i64,
    ) -> anyhow::Result<Vec<GroupMessageRank>> {
        let scan = self.scan(chatroom_id, begin, end).await?;
        let mut senders = scan.senders;
        senders.sort_by(|a, b| b.1.cmp(&a.1));
        senders.truncate(limit);

        let usernames: Vec<String> = senders.iter().map(|(id, _)| id.clone()).collect();
        let identity = &self.ctx.identity;
        let (names, avatars) = futures::join!(
            identity.resolve_display_names(&usernames),
            identity.resolve_avatar_urls(&usernames)
        );
        let names = or_empty(names, "display name");
        let avatars = or_empty(avatars, "avatar");

        Ok(senders
            .into_iter()
            .map(|(username, message_count)| GroupMessageRank {
                member: GroupMember {
                    display_name: names.get(&username).cloned().unwrap_or_else(|| username.clone()),
                    avatar_url: avatars.get(&username).cloned(),
                    username,
                },
                message_count,
            })
            .collect())
    }

    async fn active_hours(
        &self,
        chatroom_id: &str,
        begin: i64,
        end: i64,
    ) -> anyhow::Result<GroupActiveHours> {
        let scan = self.scan(chatroom_id, begin, end).await?;
        let hourly_distribution = (0..24)
            .map(|hour| (hour, scan.aggregate.hourly.get(&hour).copied().unwrap_or(0)))
            .collect();
        Ok(GroupActiveHours {
            hourly_distribution,
        })
    }

    async fn media_stats(
        &self,
        chatroom_id: &str,
        begin: i64,
        end: i64,
    ) -> anyhow::Result<GroupMediaStats> {
        let scan = self.scan(chatroom_id, begin, end).await?;
        Ok(GroupMediaStats::from_type_counts(&scan.aggregate.type_counts))
    }

    async fn scan(&self, chatroom_id: &str, begin: i64, end: i64) -> anyhow::Result<GroupScan> {
        if chatroom_id.trim().is_empty() {
            anyhow::bail!("group id is required");
        }
        let identity = self.ctx.ensure_connected().await?;
        Ok(scan_group(&self.ctx, &identity, chatroom_id, begin, end).await)
    }
}

fn or_empty<V>(result: anyhow::Result<HashMap<String, V>>, what: &str) -> HashMap<String, V> {
    result.unwrap_or_else(|e| {
        warn!("Group {} lookup failed: {:#}", what, e);
        HashMap::new()
    })
}

async fn scan_group(
    ctx: &ReportContext,
    identity: &SelfIdentity,
    chatroom_id: &str,
    begin: i64,
    end: i64,
) -> GroupScan {
    let ownership = Ownership::new(Some(identity.clone()));
    let range = TimeRange::new(begin, end);
    let mut accumulator = Accumulator::new(range, ctx.zone, ownership.clone());
    let mut order: Vec<String> = Vec::new();
    let mut tally: HashMap<String, u64> = HashMap::new();

    let options = ctx.cache.config().cursor.with_range(begin, end);
    let summary = CursorStream::new(ctx.store.as_ref(), options)
        .for_each_row(chatroom_id, |row| {
            let record = MessageRecord::from_row(chatroom_id, row);
            if !accumulator.fold(&record) {
                return ControlFlow::Continue(());
            }
            let sender = if ownership.is_self(&record) {
                Some(identity.cleaned().to_string())
            } else {
                record.sender.clone().filter(|s| !s.is_empty())
            };
            if let Some(sender) = sender {
                let count = tally.entry(sender.clone()).or_insert_with(|| {
                    order.push(sender);
                    0
                });
                *count += 1;
            }
            ControlFlow::Continue(())
        })
        .await;
    debug!(
        "Group {} scan read {} rows in {} batches",
        chatroom_id, summary.rows, summary.batches
    );

    let senders = order
        .into_iter()
        .map(|id| {
            let count = tally.get(&id).copied().unwrap_or(0);
            (id, count)
        })
        .collect();
    GroupScan {
        aggregate: accumulator.finish(),
        senders,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{raw_row, FieldValue, RawRow};
    use crate::reporting::test_support::context;
    use crate::store::InMemoryMessageStore;

    const ROOM: &str = "123@chatroom";

    fn group_row(ts: i64, local_type: i64, sender: &str) -> RawRow {
        raw_row([
            ("create_time", FieldValue::Int(ts)),
            ("local_type", FieldValue::Int(local_type)),
            ("sender_username", FieldValue::from(sender)),
            ("message_content", FieldValue::from("x")),
        ])
    }

    fn group_store() -> InMemoryMessageStore {
        let store = InMemoryMessageStore::new();
        store.add_session("alice");
        store.add_session(ROOM);
        store.add_session("456@chatroom");
        store.set_member_count(ROOM, 3);
        store.set_member_count("456@chatroom", 40);
        store.set_display_name(ROOM, "Climbing");
        store.set_display_name("bob", "Bob");

        store.push_message(ROOM, group_row(3600, 1, "bob"));
        store.push_message(ROOM, group_row(3700, 3, "bob"));
        store.push_message(ROOM, group_row(7200, 1, "carol"));
        store.push_message(ROOM, group_row(7300, 10000, ""));
        store.push_message(ROOM, InMemoryMessageStore::message_row(7400, 47, true, "md5=x"));
        store
    }

    #[tokio::test]
    async fn test_group_chats_sorted_by_members() {
        let store = group_store();
        let groups = GroupAnalyticsService::new(context(&store))
            .get_group_chats()
            .await
            .data
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].username, "456@chatroom");
        assert_eq!(groups[0].member_count, 40);
        assert_eq!(groups[1].display_name, "Climbing");
    }

    #[tokio::test]
    async fn test_ranking_counts_senders() {
        let store = group_store();
        let ranking = GroupAnalyticsService::new(context(&store))
            .get_group_message_ranking(ROOM, 2, 0, 0)
            .await
            .data
            .unwrap();
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].member.username, "bob");
        assert_eq!(ranking[0].member.display_name, "Bob");
        assert_eq!(ranking[0].message_count, 2);
        assert_eq!(ranking[1].member.username, "carol");
    }

    #[tokio::test]
    async fn test_own_messages_ranked_under_cleaned_id() {
        let store = group_store();
        let ranking = GroupAnalyticsService::new(context(&store))
            .get_group_message_ranking(ROOM, 10, 0, 0)
            .await
            .data
            .unwrap();
        assert!(ranking
            .iter()
            .any(|rank| rank.member.username == "wxid_me" && rank.message_count == 1));
    }

    #[tokio::test]
    async fn test_active_hours_filled() {
        let store = group_store();
        let hours = GroupAnalyticsService::new(context(&store))
            .get_group_active_hours(ROOM, 0, 0)
            .await
            .data
            .unwrap();
        assert_eq!(hours.hourly_distribution.len(), 24);
        assert_eq!(hours.hourly_distribution[&1], 2);
        assert_eq!(hours.hourly_distribution[&2], 3);
        assert_eq!(hours.hourly_distribution[&0], 0);
    }

    #[tokio::test]
    async fn test_window_limits_scan() {
        let store = group_store();
        let hours = GroupAnalyticsService::new(context(&store))
            .get_group_active_hours(ROOM, 7000, 0)
            .await
            .data
            .unwrap();
        assert_eq!(hours.hourly_distribution[&1], 0);
        assert_eq!(hours.hourly_distribution[&2], 3);
    }

    #[tokio::test]
    async fn test_media_stats_buckets() {
        let store = group_store();
        let media = GroupAnalyticsService::new(context(&store))
            .get_group_media_stats(ROOM, 0, 0)
            .await
            .data
            .unwrap();
        assert_eq!(media.total, 5);
        assert_eq!(media.type_counts[0].type_code, message_types::TEXT);
        assert_eq!(media.type_counts[0].count, 2);
        assert!(media
            .type_counts
            .iter()
            .any(|c| c.type_code == OTHER_MEDIA_TYPE && c.count == 1));
    }

    #[tokio::test]
    async fn test_members_resolve_names_and_keep_avatars() {
        let store = group_store();
        store.add_group_member(ROOM, "bob", Some("https://img/bob"));
        store.add_group_member(ROOM, "carol", None);
        let members = GroupAnalyticsService::new(context(&store))
            .get_group_members(ROOM)
            .await
            .data
            .unwrap();
        assert_eq!(
            members,
            vec![
                GroupMember {
                    username: "bob".into(),
                    display_name: "Bob".into(),
                    avatar_url: Some("https://img/bob".into()),
                },
                GroupMember {
                    username: "carol".into(),
                    display_name: "carol".into(),
                    avatar_url: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_members_of_unknown_group_is_empty() {
        let store = group_store();
        let service = GroupAnalyticsService::new(context(&store));
        let response = service.get_group_members("789@chatroom").await;
        assert!(response.success);
        assert_eq!(response.data, Some(Vec::new()));
        let blank = service.get_group_members("").await;
        assert_eq!(blank.error.as_deref(), Some("group id is required"));
    }

    #[tokio::test]
    async fn test_blank_group_id_is_failure() {
        let store = group_store();
        let response = GroupAnalyticsService::new(context(&store))
            .get_group_media_stats(" ", 0, 0)
            .await;
        assert_eq!(response.error.as_deref(), Some("group id is required"));
    }
}
