use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

/// Background task that compacts a tenant's WAL once enough appends have
/// accumulated since the last compaction. Compaction also prunes
/// cancelled bookings from memory.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => tracing::warn!("compaction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ChangeFeed;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("bookable_test_janitor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compactor_fires_at_threshold() {
        let path = test_wal_path("compactor_fires.wal");
        let engine = Arc::new(Engine::new(path, Arc::new(ChangeFeed::new())).unwrap());

        for i in 0..5 {
            engine
                .create_staff(Ulid::new(), format!("staff{i}@example.com"))
                .await
                .unwrap();
        }
        assert_eq!(engine.wal_appends_since_compact().await, 5);

        // First interval tick completes immediately
        let task = tokio::spawn(run_compactor(engine.clone(), 1));
        tokio::time::sleep(Duration::from_millis(200)).await;
        task.abort();

        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }

    #[tokio::test]
    async fn compactor_idle_below_threshold() {
        let path = test_wal_path("compactor_idle.wal");
        let engine = Arc::new(Engine::new(path, Arc::new(ChangeFeed::new())).unwrap());

        engine
            .create_staff(Ulid::new(), "barber@example.com".into())
            .await
            .unwrap();

        let task = tokio::spawn(run_compactor(engine.clone(), 1000));
        tokio::time::sleep(Duration::from_millis(200)).await;
        task.abort();

        assert_eq!(engine.wal_appends_since_compact().await, 1);
    }
}
