use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::Engine;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact when at least `threshold` events were appended since the last compaction.
/// Returns whether a compaction ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if threshold == 0 || appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            info!("compacted WAL after {appends} appends ({} live records)", engine.record_count());
            true
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}

/// Background task that periodically compacts a schedule's WAL.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Weekday;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("weekslot_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let engine = Engine::new(test_wal_path("threshold.wal")).unwrap();
        for hour in 0..3u8 {
            let rec = engine
                .create_record(
                    Weekday::Monday,
                    format!("{hour:02}:00").parse().unwrap(),
                    format!("{hour:02}:30").parse().unwrap(),
                    vec![],
                )
                .await
                .unwrap();
            engine.delete_record(rec.id).await.unwrap();
        }

        assert!(!compact_if_due(&engine, 10).await);
        assert_eq!(engine.wal_appends_since_compact().await, 6);

        assert!(compact_if_due(&engine, 6).await);
        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }

    #[tokio::test]
    async fn zero_threshold_disables() {
        let engine = Engine::new(test_wal_path("disabled.wal")).unwrap();
        assert!(!compact_if_due(&engine, 0).await);
    }
}
