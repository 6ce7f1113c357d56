// crates/chat-analytics/src/config.rs

use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::aggregate::{AggregateCacheConfig, CalendarZone};
use crate::cursor::CursorOptions;
use crate::store::StoreCredentials;

const DEFAULT_CACHE_PATH: &str = "./data/analytics_cache.json";

#[derive(Clone)]
pub struct Config {
    pub self_id: String,
    pub db_path: String,
    pub decrypt_key: String,
    /// `None` disables the snapshot file.
    pub cache_path: Option<PathBuf>,
    pub cursor_batch_size: usize,
    pub cursor_yield_every: usize,
    pub cache_ttl_seconds: u64,
    pub utc_offset_minutes: Option<i32>,
    pub api_host: String,
    pub api_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        load_dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let cache_path = match var("ANALYTICS_CACHE_PATH", DEFAULT_CACHE_PATH).trim() {
            "" | "off" => None,
            path => Some(PathBuf::from(path)),
        };
        let utc_offset_minutes = match lookup("UTC_OFFSET_MINUTES") {
            Some(raw) if !raw.trim().is_empty() => Some(
                raw.trim()
                    .parse()
                    .with_context(|| format!("UTC_OFFSET_MINUTES is not a number: {}", raw))?,
            ),
            _ => None,
        };

        Ok(Self {
            self_id: var("ANALYTICS_SELF_ID", ""),
            db_path: var("ANALYTICS_DB_PATH", ""),
            decrypt_key: var("ANALYTICS_DECRYPT_KEY", ""),
            cache_path,
            cursor_batch_size: var("CURSOR_BATCH_SIZE", "500")
                .parse()
                .context("CURSOR_BATCH_SIZE must be a positive integer")?,
            cursor_yield_every: var("CURSOR_YIELD_EVERY", "10")
                .parse()
                .context("CURSOR_YIELD_EVERY must be an integer")?,
            cache_ttl_seconds: var("CACHE_TTL_SECONDS", "300")
                .parse()
                .context("CACHE_TTL_SECONDS must be an integer")?,
            utc_offset_minutes,
            api_host: var("API_HOST", "127.0.0.1"),
            api_port: var("API_PORT", "8000")
                .parse()
                .context("API_PORT must be a port number")?,
        })
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- Self ID: {}", self.self_id);
        info!("- Database: {}", self.db_path);
        info!(
            "- Decrypt Key: {}",
            if self.decrypt_key.is_empty() { "unset" } else { "set" }
        );
        match &self.cache_path {
            Some(path) => info!("- Snapshot: {}", path.display()),
            None => info!("- Snapshot: disabled"),
        }
        info!(
            "- Cursor: {} rows per batch, yield every {} batches",
            self.cursor_batch_size, self.cursor_yield_every
        );
        info!("- Cache TTL: {}s", self.cache_ttl_seconds);
        match self.utc_offset_minutes {
            Some(minutes) => info!("- Calendar: UTC{:+} minutes", minutes),
            None => info!("- Calendar: local time"),
        }
        info!("- API: {}:{}", self.api_host, self.api_port);
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse()
            .with_context(|| format!("invalid API address {}:{}", self.api_host, self.api_port))
    }

    pub fn zone(&self) -> CalendarZone {
        CalendarZone::from_offset_minutes(self.utc_offset_minutes)
    }

    pub fn cache_config(&self) -> AggregateCacheConfig {
        AggregateCacheConfig {
            ttl: Duration::from_secs(self.cache_ttl_seconds),
            snapshot_path: self.cache_path.clone(),
            cursor: CursorOptions {
                batch_size: self.cursor_batch_size.max(1),
                yield_every: self.cursor_yield_every,
                ..CursorOptions::default()
            },
            zone: self.zone(),
        }
    }

    pub fn credentials(&self) -> StoreCredentials {
        StoreCredentials {
            db_path: self.db_path.clone(),
            decrypt_key: self.decrypt_key.clone(),
            self_id: self.self_id.clone(),
        }
    }
}

#[cfg(feature = "cli")]
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        info!("Loaded environment variables from .env file");
    }
}

#[cfg(not(feature = "cli"))]
fn load_dotenv() {}
