//! Session listing and the private-conversation filter.

use std::collections::BTreeMap;
use tracing::warn;

use crate::record::{aliases, lookup, lookup_text, FieldValue, RawRow};
use crate::store::MessageStore;

const GROUP_MARKER: &str = "@chatroom";

/// Built-in accounts and folders that never count as private conversations.
const SYSTEM_PREFIXES: &[&str] = &[
    "weixin",
    "qqmail",
    "fmessage",
    "medianote",
    "floatbottle",
    "newsapp",
    "brandsessionholder",
    "brandservicesessionholder",
    "notifymessage",
    "opencustomerservicemsg",
    "notification_messages",
    "userexperience_alarm",
    "helper_folders",
    "placeholder_foldgroup",
    "@helper_folders",
    "@placeholder_foldgroup",
];

pub fn is_private_session(username: &str, cleaned_self_id: &str) -> bool {
    if username.is_empty() {
        return false;
    }
    if username.to_lowercase() == cleaned_self_id.to_lowercase() {
        return false;
    }
    if username.contains(GROUP_MARKER) || username == "filehelper" || username.starts_with("gh_") {
        return false;
    }
    if SYSTEM_PREFIXES.iter().any(|prefix| username.starts_with(prefix)) {
        return false;
    }
    !(username.contains("@kefu.openim")
        || username.contains("@openim")
        || username.contains("service_"))
}

pub fn is_group_session(username: &str) -> bool {
    username.contains(GROUP_MARKER)
}

/// Private conversations in store order, with a numeric-id to username map for stores that
/// key aggregates by numeric id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivateSessions {
    pub usernames: Vec<String>,
    pub id_map: BTreeMap<String, String>,
}

fn numeric_id(row: &RawRow) -> Option<String> {
    match lookup(row, aliases::SESSION_ID)? {
        FieldValue::Int(v) => Some(v.to_string()),
        FieldValue::Text(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => {
            Some(s.clone())
        }
        _ => None,
    }
}

pub fn split_private(rows: &[RawRow], cleaned_self_id: &str) -> PrivateSessions {
    let mut sessions = PrivateSessions::default();
    for row in rows {
        let username = lookup_text(row, aliases::SESSION_USERNAME);
        if !is_private_session(&username, cleaned_self_id) {
            continue;
        }
        if let Some(id) = numeric_id(row) {
            sessions.id_map.insert(id, username.clone());
        }
        sessions.usernames.push(username);
    }
    sessions
}

async fn session_rows(store: &dyn MessageStore) -> Vec<RawRow> {
    match store.list_sessions().await {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Failed to list sessions: {:#}", e);
            Vec::new()
        }
    }
}

pub async fn private_sessions(store: &dyn MessageStore, cleaned_self_id: &str) -> PrivateSessions {
    split_private(&session_rows(store).await, cleaned_self_id)
}

pub async fn group_sessions(store: &dyn MessageStore) -> anyhow::Result<Vec<String>> {
    let rows = store.list_sessions().await?;
    Ok(rows
        .iter()
        .map(|row| lookup_text(row, aliases::SESSION_USERNAME))
        .filter(|username| is_group_session(username))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::raw_row;

    #[test]
    fn test_private_filter() {
        let me = "wxid_me";
        assert!(is_private_session("wxid_friend", me));
        assert!(is_private_session("alice", me));
        assert!(!is_private_session("", me));
        assert!(!is_private_session("WXID_ME", me));
        assert!(!is_private_session("123@chatroom", me));
        assert!(!is_private_session("filehelper", me));
        assert!(!is_private_session("gh_official", me));
        assert!(!is_private_session("weixin", me));
        assert!(!is_private_session("newsapp_x", me));
        assert!(!is_private_session("@placeholder_foldgroup", me));
        assert!(!is_private_session("abc@openim", me));
        assert!(!is_private_session("my_service_bot", me));
    }

    #[test]
    fn test_split_private_collects_numeric_ids() {
        let rows = vec![
            raw_row([("username", FieldValue::from("alice")), ("id", FieldValue::Int(7))]),
            raw_row([("userName", FieldValue::from("bob")), ("sid", FieldValue::from("x9"))]),
            raw_row([("username", FieldValue::from("room@chatroom")), ("id", FieldValue::Int(8))]),
        ];
        let sessions = split_private(&rows, "wxid_me");
        assert_eq!(sessions.usernames, vec!["alice", "bob"]);
        assert_eq!(sessions.id_map.len(), 1);
        assert_eq!(sessions.id_map["7"], "alice");
    }
}
