use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use aerial::adapters::{ItemBatch, SourceAdapter};
use aerial::error::SyncError;
use aerial::models::{Item, Resource, ResourceStats};
use aerial::services::AdapterFactory;

/// How a scripted fetch ends after its batches are delivered
pub enum Ending {
    Finish,
    Fail(fn() -> SyncError),
    HangUntilCancelled,
}

/// Adapter that plays back a fixed script instead of hitting the network
pub struct ScriptedAdapter {
    batches: Vec<Vec<Item>>,
    ending: Ending,
}

impl ScriptedAdapter {
    pub fn emitting(batches: Vec<Vec<Item>>) -> Self {
        Self {
            batches,
            ending: Ending::Finish,
        }
    }

    pub fn failing(batches: Vec<Vec<Item>>, err: fn() -> SyncError) -> Self {
        Self {
            batches,
            ending: Ending::Fail(err),
        }
    }

    pub fn hanging(batches: Vec<Vec<Item>>) -> Self {
        Self {
            batches,
            ending: Ending::HangUntilCancelled,
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
        match &self.ending {
            Ending::Finish => Ok(stats),
            Ending::Fail(make_err) => Err(make_err()),
            Ending::HangUntilCancelled => {
                cancel.cancelled().await;
                Err(SyncError::Cancelled)
            }
        }
    }
}

/// Factory handing out scripted adapters keyed by source URL
#[derive(Default)]
pub struct MockAdapterFactory {
    scripts: Mutex<HashMap<String, Arc<dyn SourceAdapter>>>,
}

impl MockAdapterFactory {
    pub fn script(&self, source_url: &str, adapter: ScriptedAdapter) {
        self.scripts
            .lock()
            .expect("scripts lock poisoned")
            .insert(source_url.to_string(), Arc::new(adapter));
    }
}

impl AdapterFactory for MockAdapterFactory {
    fn create(&self, resource: &Resource) -> Result<Arc<dyn SourceAdapter>, SyncError> {
        self.scripts
            .lock()
            .expect("scripts lock poisoned")
            .get(&resource.source_url)
            .cloned()
            .ok_or_else(|| {
                SyncError::Internal(format!("No scripted adapter for {}", resource.source_url))
            })
    }
}
