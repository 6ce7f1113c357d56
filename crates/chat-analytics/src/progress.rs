//! Progress side channel for long-running report generation.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub status: String,
    pub progress: u8,
}

/// Cheap to clone; a reporter without a receiver only logs.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<ProgressUpdate>>,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::UnboundedSender<ProgressUpdate>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn report(&self, status: &str, progress: u8) {
        debug!("progress {}%: {}", progress, status);
        if let Some(tx) = &self.tx {
            // Receiver may be gone once the caller stopped listening.
            let _ = tx.send(ProgressUpdate {
                status: status.to_string(),
                progress: progress.min(100),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_updates_delivered_in_order() {
        let (reporter, mut rx) = ProgressReporter::channel();
        reporter.report("loading", 10);
        reporter.report("done", 120);
        assert_eq!(rx.recv().await.unwrap().progress, 10);
        let last = rx.recv().await.unwrap();
        assert_eq!(last.status, "done");
        assert_eq!(last.progress, 100);
    }

    #[test]
    fn test_disabled_reporter_is_silent() {
        ProgressReporter::disabled().report("ignored", 50);
    }
}
