use async_trait::async_trait;
use moka::sync::Cache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::IdentityResolver;

const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Memoises display names and avatar URLs in front of another resolver.
///
/// Misses are forwarded in one call per request; ids the inner resolver does not know are
/// not cached, so a later insert upstream becomes visible.
pub struct CachedIdentityResolver {
    inner: Arc<dyn IdentityResolver>,
    names: Cache<String, String>,
    avatars: Cache<String, String>,
}

impl CachedIdentityResolver {
    pub fn new(inner: Arc<dyn IdentityResolver>) -> Self {
        Self::with_ttl(inner, DEFAULT_TTL)
    }

    pub fn with_ttl(inner: Arc<dyn IdentityResolver>, ttl: Duration) -> Self {
        Self {
            inner,
            names: Cache::builder().max_capacity(10_000).time_to_live(ttl).build(),
            avatars: Cache::builder().max_capacity(10_000).time_to_live(ttl).build(),
        }
    }
}

fn split_cached(cache: &Cache<String, String>, ids: &[String]) -> (HashMap<String, String>, Vec<String>) {
    let mut hits = HashMap::new();
    let mut misses = Vec::new();
    for id in ids {
        match cache.get(id) {
            Some(value) => {
                hits.insert(id.clone(), value);
            }
            None => misses.push(id.clone()),
        }
    }
    (hits, misses)
}

#[async_trait]
impl IdentityResolver for CachedIdentityResolver {
    async fn resolve_display_names(
        &self,
        ids: &[String],
    ) -> anyhow::Result<HashMap<String, String>> {
        let (mut found, misses) = split_cached(&self.names, ids);
        if !misses.is_empty() {
            debug!("Resolving {} display names upstream", misses.len());
            for (id, name) in self.inner.resolve_display_names(&misses).await? {
                self.names.insert(id.clone(), name.clone());
                found.insert(id, name);
            }
        }
        Ok(found)
    }

    async fn resolve_avatar_urls(&self, ids: &[String]) -> anyhow::Result<HashMap<String, String>> {
        let (mut found, misses) = split_cached(&self.avatars, ids);
        if !misses.is_empty() {
            for (id, url) in self.inner.resolve_avatar_urls(&misses).await? {
                self.avatars.insert(id.clone(), url.clone());
                found.insert(id, url);
            }
        }
        Ok(found)
    }

    async fn resolve_artifact_url(&self, md5: &str) -> anyhow::Result<Option<String>> {
        self.inner.resolve_artifact_url(md5).await
    }

    async fn resolve_group_member_counts(
        &self,
        ids: &[String],
    ) -> anyhow::Result<HashMap<String, u64>> {
        self.inner.resolve_group_member_counts(ids).await
    }
}
