// crates/chat-analytics/src/reporting/mod.rs

//! Report services built on the aggregate cache.
//!
//! Every public service method returns an [`ApiResponse`]; internal failures are turned
//! into a labelled error message instead of propagating.

pub mod dual_report;
pub mod group;
pub mod overall;
pub mod sessions;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::aggregate::{AggregateCache, AggregateCacheConfig, CalendarZone};
use crate::progress::ProgressReporter;
use crate::record::{Ownership, SelfIdentity};
use crate::store::{FastAggregator, IdentityResolver, MessageStore, StoreCredentials};

pub use dual_report::{DualReportData, DualReportParams, DualReportService, DualStats};
pub use group::{
    GroupAnalyticsService, GroupChatInfo, GroupMediaStats, GroupMember, GroupMessageRank,
};
pub use overall::{AnalyticsService, ContactRanking, TimeDistribution};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn from_result(result: anyhow::Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => {
                warn!("Report request failed: {:#}", e);
                Self::failure(format!("{:#}", e))
            }
        }
    }
}

/// Collaborators shared by every report service. Cheap to clone.
#[derive(Clone)]
pub struct ReportContext {
    pub store: Arc<dyn MessageStore>,
    pub fast_path: Arc<dyn FastAggregator>,
    pub identity: Arc<dyn IdentityResolver>,
    pub cache: AggregateCache,
    pub credentials: StoreCredentials,
    pub zone: CalendarZone,
    pub progress: ProgressReporter,
}

impl ReportContext {
    pub fn new(
        store: Arc<dyn MessageStore>,
        fast_path: Arc<dyn FastAggregator>,
        identity: Arc<dyn IdentityResolver>,
        cache_config: AggregateCacheConfig,
        credentials: StoreCredentials,
    ) -> Self {
        let zone = cache_config.zone;
        let cache = AggregateCache::new(Arc::clone(&store), Arc::clone(&fast_path), cache_config);
        cache.set_ownership(Ownership::for_self(&credentials.self_id));
        Self {
            store,
            fast_path,
            identity,
            cache,
            credentials,
            zone,
            progress: ProgressReporter::disabled(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.cache.set_progress(progress.clone());
        self.progress = progress;
        self
    }

    /// Validate configuration and open the store. Returns the owner's identity.
    pub async fn ensure_connected(&self) -> anyhow::Result<SelfIdentity> {
        let creds = &self.credentials;
        if creds.self_id.trim().is_empty() {
            anyhow::bail!("self id is not configured");
        }
        if creds.db_path.trim().is_empty() {
            anyhow::bail!("database path is not configured");
        }
        if creds.decrypt_key.is_empty() {
            anyhow::bail!("decrypt key is not configured");
        }
        let identity = SelfIdentity::new(&creds.self_id);
        self.store
            .open(creds)
            .await
            .context("failed to open message store")?;
        debug!("Store open for {}", identity.cleaned());
        Ok(identity)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::store::{InMemoryMessageStore, NoFastPath};

    pub fn credentials() -> StoreCredentials {
        StoreCredentials {
            db_path: "/data/chat.db".into(),
            decrypt_key: "secret".into(),
            self_id: "wxid_me_ab12".into(),
        }
    }

    pub fn context(store: &InMemoryMessageStore) -> ReportContext {
        ReportContext::new(
            Arc::new(store.clone()),
            Arc::new(NoFastPath),
            Arc::new(store.clone()),
            AggregateCacheConfig {
                zone: CalendarZone::from_offset_minutes(Some(0)),
                ..Default::default()
            },
            credentials(),
        )
    }
}
