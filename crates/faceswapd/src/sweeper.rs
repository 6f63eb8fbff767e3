use faceswap_core::SharedStorage;
use std::time::Duration;

/// Periodically delete stored files older than `retention`.
///
/// Runs on the blocking pool; the storage directory is scanned with std::fs.
pub fn spawn(storage: SharedStorage, retention: Duration, interval: Duration) {
    tracing::info!(?retention, ?interval, "retention sweep enabled");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let storage = storage.clone();
            match tokio::task::spawn_blocking(move || storage.sweep(retention)).await {
                Ok(Ok(report)) if report.removed > 0 || report.failed > 0 => {
                    tracing::info!(removed = report.removed, failed = report.failed, "sweep finished");
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "sweep failed"),
                Err(e) => tracing::error!(error = %e, "sweep task panicked"),
            }
        }
    });
}
