use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;
use crate::models::{Item, ResourceStats};

/// One bounded slice of adapter output, with running counters attached so
/// status UIs can show live progress while the sync is still writing
#[derive(Debug, Clone)]
pub struct ItemBatch {
    pub items: Vec<Item>,
    pub progress: ResourceStats,
}

/// Pulls raw catalog data from one remote source and emits normalized
/// items in bounded batches.
///
/// `fetch` is one finite pass over the source: it sends batches over `tx`,
/// then returns the final stats once everything has been delivered. The
/// token is checked between network calls and batches; cancellation always
/// surfaces as `SyncError::Cancelled`, never as a generic failure. A
/// closed channel means the consumer gave up, which is treated the same as
/// cancellation.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(
        &self,
        cancel: CancellationToken,
        tx: mpsc::Sender<ItemBatch>,
    ) -> Result<ResourceStats, SyncError>;
}

/// Await a fallible future, aborting it the moment the token fires.
///
/// Dropping the future cancels any in-flight request it carries, so this
/// gives immediate abort semantics for outstanding network calls.
pub(crate) async fn with_cancel<T>(
    cancel: &CancellationToken,
    fut: impl std::future::Future<Output = Result<T, SyncError>>,
) -> Result<T, SyncError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = fut => result,
    }
}

/// Send one batch, mapping a closed channel to cancellation
pub(crate) async fn send_batch(
    tx: &mpsc::Sender<ItemBatch>,
    batch: ItemBatch,
) -> Result<(), SyncError> {
    tx.send(batch).await.map_err(|_| SyncError::Cancelled)
}
