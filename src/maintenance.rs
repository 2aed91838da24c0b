use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::Engine;

/// Background task that rewrites the journal as per-venue snapshots once
/// enough commits have accumulated since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let pending = engine.journal_commits_since_compact().await;
        if pending < threshold {
            continue;
        }
        match engine.compact_journal().await {
            Ok(()) => info!("compacted journal ({pending} commits folded)"),
            Err(e) => warn!("journal compaction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::engine::VenueSpec;
    use crate::model::VenueMode;
    use crate::notify::NotifyHub;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_journal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("venued_test_maintenance");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn pending_counter_resets_after_compaction() {
        let path = test_journal_path("compactor_counter.journal");
        let notify = Arc::new(NotifyHub::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let engine = Arc::new(Engine::new(path, notify, directory).unwrap());

        for _ in 0..3 {
            engine
                .create_venue(VenueSpec {
                    id: Ulid::new(),
                    name: None,
                    mode: VenueMode::Daily,
                    capacity: 10,
                    base_amount: 1_000,
                    buffer_min: None,
                })
                .await
                .unwrap();
        }
        assert_eq!(engine.journal_commits_since_compact().await, 3);

        engine.compact_journal().await.unwrap();
        assert_eq!(engine.journal_commits_since_compact().await, 0);
    }
}
