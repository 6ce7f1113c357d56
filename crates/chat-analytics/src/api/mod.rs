//! HTTP handlers over the report services.

pub mod admin_api;
pub mod group_api;
pub mod statistics_api;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::json;

use crate::reporting::{
    AnalyticsService, ApiResponse, DualReportService, GroupAnalyticsService, ReportContext,
};

/// Router state: one instance of each report service over a shared context.
#[derive(Clone)]
pub struct AppState {
    pub analytics: AnalyticsService,
    pub dual: DualReportService,
    pub groups: GroupAnalyticsService,
}

impl AppState {
    pub fn new(ctx: ReportContext) -> Self {
        Self {
            analytics: AnalyticsService::new(ctx.clone()),
            dual: DualReportService::new(ctx.clone()),
            groups: GroupAnalyticsService::new(ctx),
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            Json(json!({
                "success": false,
                "error": self.message,
                "code": self.status.as_u16(),
            })),
        )
            .into_response()
    }
}

/// Failed service responses become a 500 carrying the service's message.
pub fn respond<T: Serialize>(response: ApiResponse<T>) -> Result<Json<ApiResponse<T>>, ApiError> {
    if response.success {
        return Ok(Json(response));
    }
    Err(ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: response
            .error
            .unwrap_or_else(|| "request failed".to_string()),
    })
}
