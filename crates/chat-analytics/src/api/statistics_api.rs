use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use tracing::info;

use super::{respond, ApiError, AppState};
use crate::aggregate::ChatStatistics;
use crate::reporting::overall::DEFAULT_RANKING_LIMIT;
use crate::reporting::{
    ApiResponse, ContactRanking, DualReportData, DualReportParams, TimeDistribution,
};

const MAX_RANKING_LIMIT: usize = 1000;

#[derive(Debug, Default, Deserialize)]
pub struct StatisticsQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct RankingQuery {
    pub limit: Option<usize>,
}

pub async fn get_statistics(
    State(state): State<AppState>,
    Query(query): Query<StatisticsQuery>,
) -> Result<Json<ApiResponse<ChatStatistics>>, ApiError> {
    info!("Statistics requested (force: {})", query.force);
    respond(state.analytics.get_overall_statistics(query.force).await)
}

pub async fn get_rankings(
    State(state): State<AppState>,
    Query(query): Query<RankingQuery>,
) -> Result<Json<ApiResponse<Vec<ContactRanking>>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_RANKING_LIMIT);
    if limit == 0 || limit > MAX_RANKING_LIMIT {
        return Err(ApiError::bad_request(format!(
            "limit must be between 1 and {}",
            MAX_RANKING_LIMIT
        )));
    }
    respond(state.analytics.get_contact_rankings(limit).await)
}

pub async fn get_time_distribution(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<TimeDistribution>>, ApiError> {
    respond(state.analytics.get_time_distribution().await)
}

pub async fn post_dual_report(
    State(state): State<AppState>,
    Json(params): Json<DualReportParams>,
) -> Result<Json<ApiResponse<DualReportData>>, ApiError> {
    if params.friend_username.trim().is_empty() {
        return Err(ApiError::bad_request("friendUsername is required"));
    }
    info!(
        "Dual report requested for {} ({})",
        params.friend_username, params.year
    );
    respond(state.dual.generate_report(params).await)
}
