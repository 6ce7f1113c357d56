//! HTTP server over a SQLite-backed report context.

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::api::{admin_api, group_api, statistics_api, AppState};
use crate::config::Config;
use crate::reporting::ReportContext;
use crate::store::{CachedIdentityResolver, NoFastPath, SqliteMessageStore};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Report context over the SQLite store named by `cfg`, with cached identity lookups.
pub fn open_context(cfg: &Config) -> anyhow::Result<ReportContext> {
    if cfg.db_path.trim().is_empty() {
        anyhow::bail!("ANALYTICS_DB_PATH is not set");
    }
    let store = Arc::new(
        SqliteMessageStore::new(Path::new(&cfg.db_path))
            .with_context(|| format!("failed to open database {}", cfg.db_path))?,
    );
    let identity = Arc::new(CachedIdentityResolver::new(store.clone()));
    Ok(ReportContext::new(
        store,
        Arc::new(NoFastPath),
        identity,
        cfg.cache_config(),
        cfg.credentials(),
    ))
}

pub async fn run_server(cfg: Config) -> anyhow::Result<()> {
    let ctx = open_context(&cfg)?;
    let addr = cfg.api_addr()?;

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, build_router(AppState::new(ctx))).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> axum::Router {
    use axum::{
        routing::{get, post},
        Router,
    };
    use tower_http::{
        cors::{Any, CorsLayer},
        timeout::TimeoutLayer,
        trace::TraceLayer,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/api/statistics", get(statistics_api::get_statistics))
        .route("/api/rankings", get(statistics_api::get_rankings))
        .route("/api/time-distribution", get(statistics_api::get_time_distribution))
        .route("/api/dual-report", post(statistics_api::post_dual_report))
        .route("/api/groups", get(group_api::get_groups))
        .route("/api/groups/:id/members", get(group_api::get_group_members))
        .route("/api/groups/:id/ranking", get(group_api::get_group_ranking))
        .route("/api/groups/:id/active-hours", get(group_api::get_group_active_hours))
        .route("/api/groups/:id/media", get(group_api::get_group_media))
        .route("/metrics", get(admin_api::get_metrics))
        .route("/healthz", get(admin_api::health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}
