// crates/chat-analytics/src/telemetry.rs

use tracing_subscriber::{fmt, EnvFilter};

/// Crate logs at info, request traces from the HTTP layer, everything else at warn.
pub const DEFAULT_LOG_FILTER: &str = "warn,chat_analytics=info,tower_http=info";

fn filter_from(directives: Option<String>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Install the global subscriber. A valid `RUST_LOG` replaces [`DEFAULT_LOG_FILTER`].
pub fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter_from(std::env::var("RUST_LOG").ok()))
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .compact()
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_scopes_crate() {
        let filter = filter_from(None).to_string();
        assert!(filter.contains("chat_analytics=info"));
        assert!(filter.contains("warn"));
    }

    #[test]
    fn test_env_directives_replace_default() {
        let filter = filter_from(Some("chat_analytics=debug".into())).to_string();
        assert!(filter.contains("chat_analytics=debug"));
        assert!(!filter.contains("tower_http"));
    }

    #[test]
    fn test_blank_env_falls_back() {
        let filter = filter_from(Some("  ".into())).to_string();
        assert!(filter.contains("chat_analytics=info"));
    }
}
