use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::{ItemBatch, SourceAdapter};
use crate::config::Config;
use crate::db::repository::ChunkRepository;
use crate::error::SyncError;
use crate::models::{GroupedItems, Item, ResourceId, ResourceStats, StagingId};

/// Result of one committed sync: the merged view re-read from the store,
/// plus the adapter's final counters
#[derive(Debug)]
pub struct SyncOutcome {
    pub items: GroupedItems,
    pub stats: ResourceStats,
}

struct Inflight {
    generation: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct OrchestratorState {
    next_generation: u64,
    inflight: HashMap<String, Inflight>,
    progress: HashMap<String, ResourceStats>,
    // One async mutex per resource so same-resource syncs serialize while
    // disjoint resources run concurrently
    locks: HashMap<String, Arc<Mutex<()>>>,
}

/// Runs the staged-commit sync algorithm.
///
/// A sync stages every chunk under the resource's `temp_` key, and only
/// after the adapter finishes and every chunk is durably written does it
/// swap the staged set in: delete the real rows, re-key the staged ones,
/// re-read the merged view. A failed or cancelled sync discards staging
/// and leaves the committed data exactly as it was.
///
/// Starting a sync for a resource that is already syncing cancels the
/// in-flight run first; the new run then waits behind the old one's
/// cleanup on a per-resource mutex, so the staging key is never written
/// by two runs at once.
pub struct SyncOrchestrator {
    chunks: Arc<dyn ChunkRepository>,
    chunk_size: usize,
    state: Mutex<OrchestratorState>,
}

impl SyncOrchestrator {
    pub fn new(chunks: Arc<dyn ChunkRepository>, config: &Config) -> Self {
        Self {
            chunks,
            chunk_size: config.sync.chunk_size,
            state: Mutex::new(OrchestratorState::default()),
        }
    }

    pub async fn sync(
        &self,
        id: &ResourceId,
        adapter: Arc<dyn SourceAdapter>,
    ) -> Result<SyncOutcome, SyncError> {
        let (generation, token, lock) = self.begin(id).await;

        let result = {
            let _serial = lock.lock().await;

            // Superseded while waiting for the previous run to wind down
            if token.is_cancelled() {
                Err(SyncError::Cancelled)
            } else {
                info!("Starting sync for resource {}", id);
                self.run(id, &token, adapter).await
            }
        };

        // The guard and its handle must be gone before `finish` so an idle
        // resource's lock can be reaped
        drop(lock);
        self.finish(id, generation).await;

        match &result {
            Ok(outcome) => info!("Sync for {} committed {} items", id, outcome.stats.total()),
            Err(err) if err.is_cancelled() => info!("Sync for {} cancelled", id),
            Err(err) => warn!("Sync for {} failed: {}", id, err),
        }
        result
    }

    /// Cancel an in-flight sync; non-blocking, no-op when idle
    pub async fn cancel(&self, id: &ResourceId) {
        let state = self.state.lock().await;
        if let Some(inflight) = state.inflight.get(id.as_str()) {
            debug!("Cancelling sync for resource {}", id);
            inflight.token.cancel();
        }
    }

    pub async fn cancel_all(&self) {
        let state = self.state.lock().await;
        for inflight in state.inflight.values() {
            inflight.token.cancel();
        }
    }

    pub async fn is_syncing(&self, id: &ResourceId) -> bool {
        self.state.lock().await.inflight.contains_key(id.as_str())
    }

    /// Live counters for an in-flight sync, fed from adapter batches
    pub async fn progress(&self, id: &ResourceId) -> Option<ResourceStats> {
        self.state.lock().await.progress.get(id.as_str()).copied()
    }

    async fn begin(&self, id: &ResourceId) -> (u64, CancellationToken, Arc<Mutex<()>>) {
        let mut state = self.state.lock().await;
        if let Some(previous) = state.inflight.get(id.as_str()) {
            debug!("Superseding in-flight sync for resource {}", id);
            previous.token.cancel();
        }

        state.next_generation += 1;
        let generation = state.next_generation;
        let token = CancellationToken::new();
        state.inflight.insert(
            id.as_str().to_string(),
            Inflight {
                generation,
                token: token.clone(),
            },
        );
        let lock = state
            .locks
            .entry(id.as_str().to_string())
            .or_default()
            .clone();
        (generation, token, lock)
    }

    async fn finish(&self, id: &ResourceId, generation: u64) {
        let mut state = self.state.lock().await;
        let owns_entry = state
            .inflight
            .get(id.as_str())
            .is_some_and(|i| i.generation == generation);
        if owns_entry {
            state.inflight.remove(id.as_str());
            state.progress.remove(id.as_str());
        }

        // Reap the per-resource lock once nothing holds or waits on it;
        // runs that are still queued keep their own Arc handle alive
        if !state.inflight.contains_key(id.as_str())
            && state
                .locks
                .get(id.as_str())
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            state.locks.remove(id.as_str());
        }
    }

    async fn run(
        &self,
        id: &ResourceId,
        token: &CancellationToken,
        adapter: Arc<dyn SourceAdapter>,
    ) -> Result<SyncOutcome, SyncError> {
        let staging = StagingId::for_resource(id);

        // A crashed or failed earlier run may have left staged rows behind
        self.chunks
            .delete_by_resource(staging.as_str())
            .await
            .map_err(SyncError::storage)?;

        let (tx, mut rx) = mpsc::channel::<ItemBatch>(8);
        let fetch = {
            let token = token.clone();
            tokio::spawn(async move { adapter.fetch(token, tx).await })
        };

        let written = self.stage(id, &staging, &mut rx).await;
        if written.is_err() {
            // Stop the producer; its next send fails once rx drops
            token.cancel();
        }
        let fetched = match fetch.await {
            Ok(result) => result,
            Err(err) => Err(SyncError::Internal(format!("Fetch task failed: {err}"))),
        };

        let result = match written.and(fetched) {
            Ok(stats) => self.commit(id, &staging, stats).await,
            Err(err) => Err(err),
        };

        if result.is_err() {
            // Rollback discards staging only; committed rows are untouched
            if let Err(cleanup) = self.chunks.delete_by_resource(staging.as_str()).await {
                warn!("Failed to discard staged chunks for {}: {}", id, cleanup);
            }
        }
        result
    }

    /// Drain adapter batches into fixed-size staged chunks
    async fn stage(
        &self,
        id: &ResourceId,
        staging: &StagingId,
        rx: &mut mpsc::Receiver<ItemBatch>,
    ) -> Result<(), SyncError> {
        let mut buffer: Vec<Item> = Vec::new();
        let mut chunk_index: i32 = 0;

        while let Some(batch) = rx.recv().await {
            {
                let mut state = self.state.lock().await;
                state
                    .progress
                    .insert(id.as_str().to_string(), batch.progress);
            }

            buffer.extend(batch.items);
            while buffer.len() >= self.chunk_size {
                let chunk: Vec<Item> = buffer.drain(..self.chunk_size).collect();
                self.chunks
                    .put_chunk(staging.as_str(), chunk_index, &chunk)
                    .await
                    .map_err(SyncError::storage)?;
                chunk_index += 1;
            }
        }

        if !buffer.is_empty() {
            self.chunks
                .put_chunk(staging.as_str(), chunk_index, &buffer)
                .await
                .map_err(SyncError::storage)?;
        }
        Ok(())
    }

    /// Swap staging in for the committed rows and re-read the merged view
    async fn commit(
        &self,
        id: &ResourceId,
        staging: &StagingId,
        stats: ResourceStats,
    ) -> Result<SyncOutcome, SyncError> {
        let staged = self
            .chunks
            .count_by_resource(staging.as_str())
            .await
            .map_err(SyncError::storage)?;

        if staged > 0 {
            self.chunks
                .move_resource(staging.as_str(), id.as_str())
                .await
                .map_err(SyncError::storage)?;
        } else {
            // An empty but successful fetch still replaces the old data
            self.chunks
                .delete_by_resource(id.as_str())
                .await
                .map_err(SyncError::storage)?;
        }

        let items = self
            .chunks
            .get_all_by_resource(id.as_str())
            .await
            .map_err(SyncError::storage)?
            .unwrap_or_default();

        Ok(SyncOutcome { items, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::Database;
    use crate::db::repository::ChunkRepositoryImpl;
    use crate::models::{ChannelExtras, ItemExtras};
    use async_trait::async_trait;
    use tempfile::TempDir;

    fn channel(title: &str) -> Item {
        Item {
            title: title.to_string(),
            playback_url: Some(format!("http://example.com/{title}")),
            logo_url: None,
            group: "News".to_string(),
            external_id: title.to_string(),
            extras: ItemExtras::Channels(ChannelExtras::default()),
        }
    }

    enum Ending {
        Finish,
        Fail,
        HangUntilCancelled,
    }

    struct ScriptedAdapter {
        batches: Vec<Vec<Item>>,
        ending: Ending,
    }

    impl ScriptedAdapter {
        fn emitting(batches: Vec<Vec<Item>>) -> Self {
            Self {
                batches,
                ending: Ending::Finish,
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for ScriptedAdapter {
        async fn fetch(
            &self,
            cancel: CancellationToken,
            tx: mpsc::Sender<ItemBatch>,
        ) -> Result<ResourceStats, SyncError> {
            let mut stats = ResourceStats::default();
            for items in &self.batches {
                if cancel.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                for item in items {
                    stats.record(item.category(), 1);
                }
                tx.send(ItemBatch {
                    items: items.clone(),
                    progress: stats,
                })
                .await
                .map_err(|_| SyncError::Cancelled)?;
            }
            match self.ending {
                Ending::Finish => Ok(stats),
                Ending::Fail => Err(SyncError::Network("connection reset".to_string())),
                Ending::HangUntilCancelled => {
                    cancel.cancelled().await;
                    Err(SyncError::Cancelled)
                }
            }
        }
    }

    async fn setup(chunk_size: usize) -> (TempDir, Arc<ChunkRepositoryImpl>, SyncOrchestrator) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::connect(&temp_dir.path().join("test.db"))
            .await
            .unwrap();
        db.migrate().await.unwrap();
        let chunks = Arc::new(ChunkRepositoryImpl::new(db.get_connection()));

        let mut config = Config::default();
        config.sync.chunk_size = chunk_size;
        let orchestrator = SyncOrchestrator::new(chunks.clone(), &config);
        (temp_dir, chunks, orchestrator)
    }

    #[tokio::test]
    async fn test_commit_replaces_and_rereads() {
        let (_dir, chunks, orchestrator) = setup(10).await;
        let id = ResourceId::new("r1");

        let adapter = Arc::new(ScriptedAdapter::emitting(vec![
            vec![channel("One"), channel("Two")],
            vec![channel("Three")],
        ]));
        let outcome = orchestrator.sync(&id, adapter).await.unwrap();

        assert_eq!(outcome.stats.channels, 3);
        assert_eq!(outcome.items.total_items(), 3);
        assert_eq!(outcome.items.total_items(), outcome.stats.total());

        assert_eq!(chunks.count_by_resource("r1").await.unwrap(), 1);
        assert_eq!(chunks.count_by_resource("temp_r1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_chunking_splits_on_fixed_size() {
        let (_dir, chunks, orchestrator) = setup(10).await;
        let id = ResourceId::new("r1");

        let items: Vec<Item> = (0..25).map(|i| channel(&format!("c{i}"))).collect();
        let adapter = Arc::new(ScriptedAdapter::emitting(vec![items]));
        let outcome = orchestrator.sync(&id, adapter).await.unwrap();

        // 25 items at chunk size 10: two full chunks plus a remainder
        assert_eq!(chunks.count_by_resource("r1").await.unwrap(), 3);
        assert_eq!(outcome.items.total_items(), 25);
    }

    #[tokio::test]
    async fn test_failed_sync_keeps_previous_data() {
        let (_dir, chunks, orchestrator) = setup(10).await;
        let id = ResourceId::new("r1");

        let good = Arc::new(ScriptedAdapter::emitting(vec![vec![
            channel("Old1"),
            channel("Old2"),
        ]]));
        orchestrator.sync(&id, good).await.unwrap();

        let bad = Arc::new(ScriptedAdapter {
            batches: vec![vec![channel("New1")]],
            ending: Ending::Fail,
        });
        let err = orchestrator.sync(&id, bad).await.unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));

        // Committed data untouched, staging fully discarded
        let kept = chunks.get_all_by_resource("r1").await.unwrap().unwrap();
        assert_eq!(kept.total_items(), 2);
        assert!(kept.channels["News"].iter().any(|i| i.title == "Old1"));
        assert_eq!(chunks.count_by_resource("temp_r1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_fetch_clears_committed_data() {
        let (_dir, chunks, orchestrator) = setup(10).await;
        let id = ResourceId::new("r1");

        let good = Arc::new(ScriptedAdapter::emitting(vec![vec![channel("Old")]]));
        orchestrator.sync(&id, good).await.unwrap();

        let empty = Arc::new(ScriptedAdapter::emitting(vec![]));
        let outcome = orchestrator.sync(&id, empty).await.unwrap();

        assert!(outcome.items.is_empty());
        assert_eq!(chunks.count_by_resource("r1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_rolls_back_staging() {
        let (_dir, chunks, orchestrator) = setup(10).await;
        let orchestrator = Arc::new(orchestrator);
        let id = ResourceId::new("r1");

        let adapter = Arc::new(ScriptedAdapter {
            batches: vec![vec![channel("Partial")]],
            ending: Ending::HangUntilCancelled,
        });

        let task = {
            let orchestrator = orchestrator.clone();
            let id = id.clone();
            tokio::spawn(async move { orchestrator.sync(&id, adapter).await })
        };

        // Wait until the run is registered, then cancel it
        while !orchestrator.is_syncing(&id).await {
            tokio::task::yield_now().await;
        }
        orchestrator.cancel(&id).await;

        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(chunks.count_by_resource("temp_r1").await.unwrap(), 0);
        assert_eq!(chunks.count_by_resource("r1").await.unwrap(), 0);
        assert!(!orchestrator.is_syncing(&id).await);
    }

    #[tokio::test]
    async fn test_new_sync_supersedes_inflight_one() {
        let (_dir, chunks, orchestrator) = setup(10).await;
        let orchestrator = Arc::new(orchestrator);
        let id = ResourceId::new("r1");

        let hanging = Arc::new(ScriptedAdapter {
            batches: vec![vec![channel("Stale")]],
            ending: Ending::HangUntilCancelled,
        });
        let first = {
            let orchestrator = orchestrator.clone();
            let id = id.clone();
            tokio::spawn(async move { orchestrator.sync(&id, hanging).await })
        };
        while !orchestrator.is_syncing(&id).await {
            tokio::task::yield_now().await;
        }

        let fresh = Arc::new(ScriptedAdapter::emitting(vec![vec![channel("Fresh")]]));
        let outcome = orchestrator.sync(&id, fresh).await.unwrap();
        assert_eq!(outcome.stats.channels, 1);

        // The superseded run observes exactly one terminal state: cancelled
        let superseded = first.await.unwrap().unwrap_err();
        assert!(superseded.is_cancelled());

        let kept = chunks.get_all_by_resource("r1").await.unwrap().unwrap();
        assert_eq!(kept.total_items(), 1);
        assert!(kept.channels["News"].iter().any(|i| i.title == "Fresh"));
    }

    #[tokio::test]
    async fn test_per_resource_lock_is_reaped_when_idle() {
        let (_dir, _chunks, orchestrator) = setup(10).await;
        let id = ResourceId::new("r1");

        let adapter = Arc::new(ScriptedAdapter::emitting(vec![vec![channel("One")]]));
        orchestrator.sync(&id, adapter.clone()).await.unwrap();
        assert!(orchestrator.state.lock().await.locks.is_empty());

        // Each run recreates the lock and reaps it again on the way out
        orchestrator.sync(&id, adapter).await.unwrap();
        assert!(orchestrator.state.lock().await.locks.is_empty());
    }

    #[tokio::test]
    async fn test_progress_clears_after_completion() {
        let (_dir, _chunks, orchestrator) = setup(10).await;
        let id = ResourceId::new("r1");

        assert!(orchestrator.progress(&id).await.is_none());
        let adapter = Arc::new(ScriptedAdapter::emitting(vec![vec![channel("One")]]));
        orchestrator.sync(&id, adapter).await.unwrap();
        assert!(orchestrator.progress(&id).await.is_none());
    }
}
