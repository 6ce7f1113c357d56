use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::{respond, ApiError, AppState};
use crate::reporting::group::{
    GroupActiveHours, GroupChatInfo, GroupMediaStats, GroupMember, GroupMessageRank,
    DEFAULT_GROUP_RANKING_LIMIT,
};
use crate::reporting::ApiResponse;

#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    pub limit: Option<usize>,
    #[serde(default)]
    pub begin: i64,
    #[serde(default)]
    pub end: i64,
}

pub async fn get_groups(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<GroupChatInfo>>>, ApiError> {
    respond(state.groups.get_group_chats().await)
}

pub async fn get_group_members(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<GroupMember>>>, ApiError> {
    respond(state.groups.get_group_members(&id).await)
}

pub async fn get_group_ranking(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<ApiResponse<Vec<GroupMessageRank>>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_GROUP_RANKING_LIMIT);
    if limit == 0 {
        return Err(ApiError::bad_request("limit must be positive"));
    }
    respond(
        state
            .groups
            .get_group_message_ranking(&id, limit, query.begin, query.end)
            .await,
    )
}

pub async fn get_group_active_hours(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<ApiResponse<GroupActiveHours>>, ApiError> {
    respond(
        state
            .groups
            .get_group_active_hours(&id, query.begin, query.end)
            .await,
    )
}

pub async fn get_group_media(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<ApiResponse<GroupMediaStats>>, ApiError> {
    respond(
        state
            .groups
            .get_group_media_stats(&id, query.begin, query.end)
            .await,
    )
}
