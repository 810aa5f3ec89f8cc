use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::panel::PanelApi;
use crate::adapters::playlist::extract_credentials;
use crate::adapters::{SourceAdapter, create_adapter};
use crate::config::Config;
use crate::db::entities::ResourceModel;
use crate::db::repository::{ChunkRepository, ResourceRepository};
use crate::error::SyncError;
use crate::models::{
    PanelCredentials, Resource, ResourceId, ResourceKind, ResourceStats, ResourceStatus, StagingId,
};
use crate::services::aggregate::AggregatedCatalog;
use crate::services::sync::SyncOrchestrator;

/// Builds the adapter for a resource; a seam so tests can substitute
/// scripted sources for real network adapters
pub trait AdapterFactory: Send + Sync {
    fn create(&self, resource: &Resource) -> Result<Arc<dyn SourceAdapter>, SyncError>;
}

pub struct DefaultAdapterFactory {
    config: Config,
}

impl DefaultAdapterFactory {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl AdapterFactory for DefaultAdapterFactory {
    fn create(&self, resource: &Resource) -> Result<Arc<dyn SourceAdapter>, SyncError> {
        create_adapter(resource, &self.config)
    }
}

#[derive(Default)]
struct RegistryState {
    resources: Vec<Resource>,
    catalog: AggregatedCatalog,
}

impl RegistryState {
    fn find(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == *id)
    }

    fn find_mut(&mut self, id: &ResourceId) -> Option<&mut Resource> {
        self.resources.iter_mut().find(|r| r.id == *id)
    }

    fn remove(&mut self, id: &ResourceId) {
        self.resources.retain(|r| r.id != *id);
    }

    fn rebuild_catalog(&mut self) {
        self.catalog = AggregatedCatalog::build(self.resources.iter());
    }
}

/// Owns the set of configured resources and their lifecycle.
///
/// All mutations go through here: the registry persists the record, keeps
/// the in-memory snapshot current and rebuilds the aggregation view after
/// every change that can affect membership. Sync execution itself is
/// delegated to the orchestrator.
pub struct ResourceRegistry {
    resources: Arc<dyn ResourceRepository>,
    chunks: Arc<dyn ChunkRepository>,
    orchestrator: Arc<SyncOrchestrator>,
    adapters: Arc<dyn AdapterFactory>,
    config: Config,
    state: RwLock<RegistryState>,
}

impl ResourceRegistry {
    pub fn new(
        resources: Arc<dyn ResourceRepository>,
        chunks: Arc<dyn ChunkRepository>,
        orchestrator: Arc<SyncOrchestrator>,
        adapters: Arc<dyn AdapterFactory>,
        config: Config,
    ) -> Self {
        Self {
            resources,
            chunks,
            orchestrator,
            adapters,
            config,
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Register a new source. Panel credentials are verified against the
    /// panel before anything is persisted; a playlist URL that is really an
    /// Xtream `get.php` link is promoted to a panel resource.
    pub async fn add(
        &self,
        name: &str,
        source_url: &str,
        credentials: Option<PanelCredentials>,
    ) -> Result<Resource, SyncError> {
        let (kind, credentials) = resolve_kind(source_url, credentials);
        if let Some(credentials) = &credentials {
            self.verify_credentials(credentials).await?;
        }

        let resource = Resource {
            id: ResourceId::new(Uuid::new_v4().to_string()),
            name: name.to_string(),
            source_url: source_url.to_string(),
            kind,
            credentials,
            active: true,
            status: ResourceStatus::Pending,
            stats: ResourceStats::default(),
            last_synced_at: None,
            cached_data: None,
        };
        self.persist(&resource).await?;

        let mut state = self.state.write().await;
        state.resources.push(resource.clone());
        state.rebuild_catalog();
        info!("Added {} resource {} ({})", kind.as_str(), name, resource.id);
        Ok(resource)
    }

    /// Delete a resource and everything stored under it
    pub async fn remove(&self, id: &ResourceId) -> Result<(), SyncError> {
        self.orchestrator.cancel(id).await;
        self.purge_chunks(id).await?;
        self.resources
            .delete(id.as_str())
            .await
            .map_err(SyncError::storage)?;

        let mut state = self.state.write().await;
        state.remove(id);
        state.rebuild_catalog();
        info!("Removed resource {}", id);
        Ok(())
    }

    /// Flip a resource's visibility. Deactivation cancels any in-flight
    /// sync and leaves cached data in place; reactivation restores
    /// `synced` when data survived, else `pending`.
    pub async fn toggle_active(&self, id: &ResourceId, active: bool) -> Result<Resource, SyncError> {
        if !active {
            self.orchestrator.cancel(id).await;
        }

        let updated = {
            let mut state = self.state.write().await;
            let resource = state
                .find_mut(id)
                .ok_or_else(|| unknown_resource(id))?;
            resource.active = active;
            resource.status = if active {
                if resource.has_synced() {
                    ResourceStatus::Synced
                } else {
                    ResourceStatus::Pending
                }
            } else {
                ResourceStatus::Disabled
            };
            let updated = resource.clone();
            state.rebuild_catalog();
            updated
        };

        self.persist(&updated).await?;
        Ok(updated)
    }

    /// Edit a resource. Changing the URL, kind or credentials invalidates
    /// cached data and purges its chunks; a rename alone does not.
    pub async fn update(
        &self,
        id: &ResourceId,
        name: &str,
        source_url: &str,
        credentials: Option<PanelCredentials>,
    ) -> Result<Resource, SyncError> {
        let existing = {
            let state = self.state.read().await;
            state.find(id).cloned().ok_or_else(|| unknown_resource(id))?
        };

        let (kind, credentials) = resolve_kind(source_url, credentials);
        let material = existing.source_url != source_url
            || existing.kind != kind
            || existing.credentials != credentials;

        if material {
            if let Some(credentials) = &credentials {
                self.verify_credentials(credentials).await?;
            }
            self.orchestrator.cancel(id).await;
            self.purge_chunks(id).await?;
        }

        let updated = {
            let mut state = self.state.write().await;
            let resource = state
                .find_mut(id)
                .ok_or_else(|| unknown_resource(id))?;
            resource.name = name.to_string();
            resource.source_url = source_url.to_string();
            resource.kind = kind;
            resource.credentials = credentials;
            if material {
                resource.cached_data = None;
                resource.stats = ResourceStats::default();
                resource.last_synced_at = None;
                resource.status = if resource.active {
                    ResourceStatus::Pending
                } else {
                    ResourceStatus::Disabled
                };
            }
            let updated = resource.clone();
            state.rebuild_catalog();
            updated
        };

        self.persist(&updated).await?;
        Ok(updated)
    }

    /// Run a sync for one resource and apply its terminal state
    pub async fn sync(&self, id: &ResourceId) -> Result<ResourceStats, SyncError> {
        let resource = {
            let state = self.state.read().await;
            state.find(id).cloned().ok_or_else(|| unknown_resource(id))?
        };
        if !resource.active {
            return Err(SyncError::Internal(format!(
                "Resource {id} is disabled; activate it before syncing"
            )));
        }

        self.set_status(id, ResourceStatus::Syncing).await?;

        let adapter = match self.adapters.create(&resource) {
            Ok(adapter) => adapter,
            Err(err) => {
                self.apply_terminal_state(id, Err(&err)).await?;
                return Err(err);
            }
        };

        match self.orchestrator.sync(id, adapter).await {
            Ok(outcome) => {
                let stats = outcome.stats;
                self.apply_terminal_state(id, Ok(outcome)).await?;
                Ok(stats)
            }
            Err(err) => {
                self.apply_terminal_state(id, Err(&err)).await?;
                Err(err)
            }
        }
    }

    /// Hydrate state from the database without touching the network.
    ///
    /// Active resources get their persisted chunks read back as cached
    /// data and are marked `synced`; a record stuck in `syncing` from a
    /// crashed run falls back to whatever its committed data supports.
    /// Leftover staging chunks from crashed runs are discarded.
    pub async fn load_cached_on_startup(&self) -> anyhow::Result<()> {
        let models = self.resources.find_all().await?;
        let mut loaded = Vec::with_capacity(models.len());

        for model in models {
            let mut resource = model.to_resource();

            let staging = StagingId::for_resource(&resource.id);
            if let Err(err) = self.chunks.delete_by_resource(staging.as_str()).await {
                warn!("Failed to drop stale staging for {}: {}", resource.id, err);
            }

            if resource.active {
                match self.chunks.get_all_by_resource(resource.id.as_str()).await? {
                    Some(items) => {
                        resource.stats = items.stats();
                        resource.cached_data = Some(items);
                        resource.status = ResourceStatus::Synced;
                    }
                    None => {
                        if matches!(
                            resource.status,
                            ResourceStatus::Syncing | ResourceStatus::Synced
                        ) {
                            resource.status = ResourceStatus::Pending;
                        }
                    }
                }
            } else {
                resource.status = ResourceStatus::Disabled;
            }

            if resource.status.as_str() != model.status {
                self.persist(&resource).await.map_err(anyhow::Error::from)?;
            }
            loaded.push(resource);
        }

        let mut state = self.state.write().await;
        info!("Loaded {} resources from storage", loaded.len());
        state.resources = loaded;
        state.rebuild_catalog();
        Ok(())
    }

    pub async fn get(&self, id: &ResourceId) -> Option<Resource> {
        self.state.read().await.find(id).cloned()
    }

    pub async fn snapshot(&self) -> Vec<Resource> {
        self.state.read().await.resources.clone()
    }

    /// Current merged view over active, synced resources
    pub async fn catalog(&self) -> AggregatedCatalog {
        self.state.read().await.catalog.clone()
    }

    async fn verify_credentials(&self, credentials: &PanelCredentials) -> Result<(), SyncError> {
        PanelApi::new(credentials, &self.config)?.authenticate().await
    }

    async fn purge_chunks(&self, id: &ResourceId) -> Result<(), SyncError> {
        self.chunks
            .delete_by_resource(id.as_str())
            .await
            .map_err(SyncError::storage)?;
        let staging = StagingId::for_resource(id);
        self.chunks
            .delete_by_resource(staging.as_str())
            .await
            .map_err(SyncError::storage)
    }

    async fn set_status(&self, id: &ResourceId, status: ResourceStatus) -> Result<(), SyncError> {
        let updated = {
            let mut state = self.state.write().await;
            let resource = state
                .find_mut(id)
                .ok_or_else(|| unknown_resource(id))?;
            resource.status = status;
            resource.clone()
        };
        self.persist(&updated).await
    }

    /// Map a sync result onto the resource's terminal state. A resource
    /// deactivated mid-sync lands on `disabled` regardless of the result,
    /// and one removed mid-sync is left alone.
    async fn apply_terminal_state(
        &self,
        id: &ResourceId,
        result: Result<crate::services::sync::SyncOutcome, &SyncError>,
    ) -> Result<(), SyncError> {
        // A run cancelled by a superseding sync must not overwrite the
        // status the new run owns; the resource stays `syncing` until the
        // new run reaches its own terminal state
        if matches!(&result, Err(err) if err.is_cancelled())
            && self.orchestrator.is_syncing(id).await
        {
            return Ok(());
        }

        let updated = {
            let mut state = self.state.write().await;
            let Some(resource) = state.find_mut(id) else {
                return Ok(());
            };

            match result {
                Ok(outcome) => {
                    resource.stats = outcome.stats;
                    resource.cached_data = Some(outcome.items);
                    resource.last_synced_at = Some(Utc::now());
                    resource.status = ResourceStatus::Synced;
                }
                Err(err) if err.is_cancelled() => resource.status = ResourceStatus::Cancelled,
                Err(_) => resource.status = ResourceStatus::Error,
            }
            if !resource.active {
                resource.status = ResourceStatus::Disabled;
            }

            let updated = resource.clone();
            state.rebuild_catalog();
            updated
        };
        self.persist(&updated).await
    }

    async fn persist(&self, resource: &Resource) -> Result<(), SyncError> {
        let existing = self
            .resources
            .find_by_id(resource.id.as_str())
            .await
            .map_err(SyncError::storage)?;
        let now = Utc::now().naive_utc();

        let model = ResourceModel {
            id: resource.id.as_str().to_string(),
            name: resource.name.clone(),
            source_url: resource.source_url.clone(),
            kind: resource.kind.as_str().to_string(),
            host: resource.credentials.as_ref().map(|c| c.host.clone()),
            username: resource.credentials.as_ref().map(|c| c.username.clone()),
            password: resource.credentials.as_ref().map(|c| c.password.clone()),
            active: resource.active,
            status: resource.status.as_str().to_string(),
            stats: serde_json::to_value(resource.stats).ok(),
            last_synced_at: resource.last_synced_at.map(|t| t.naive_utc()),
            created_at: existing.as_ref().map(|m| m.created_at).unwrap_or(now),
            updated_at: now,
        };

        let result = if existing.is_some() {
            self.resources.update(model).await.map(|_| ())
        } else {
            self.resources.insert(model).await.map(|_| ())
        };
        result.map_err(SyncError::storage)
    }
}

fn resolve_kind(
    source_url: &str,
    credentials: Option<PanelCredentials>,
) -> (ResourceKind, Option<PanelCredentials>) {
    if let Some(credentials) = credentials {
        return (ResourceKind::Panel, Some(credentials));
    }
    // An M3U link of the get.php form is really a panel in disguise
    if let Some(detected) = extract_credentials(source_url) {
        return (ResourceKind::Panel, Some(detected));
    }
    (ResourceKind::Playlist, None)
}

fn unknown_resource(id: &ResourceId) -> SyncError {
    SyncError::Internal(format!("Unknown resource {id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::Database;
    use crate::db::repository::{ChunkRepositoryImpl, ResourceRepositoryImpl};
    use crate::models::{ChannelExtras, Item, ItemExtras};

    struct NoAdapters;

    impl AdapterFactory for NoAdapters {
        fn create(&self, _resource: &Resource) -> Result<Arc<dyn SourceAdapter>, SyncError> {
            Err(SyncError::Internal("No adapters in this test".to_string()))
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        chunks: Arc<ChunkRepositoryImpl>,
        registry: ResourceRegistry,
    }

    async fn setup() -> Harness {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::connect(&dir.path().join("test.db")).await.unwrap();
        db.migrate().await.unwrap();

        let resources = Arc::new(ResourceRepositoryImpl::new(db.get_connection()));
        let chunks = Arc::new(ChunkRepositoryImpl::new(db.get_connection()));
        let config = Config::default();
        let orchestrator = Arc::new(SyncOrchestrator::new(chunks.clone(), &config));
        let registry = ResourceRegistry::new(
            resources,
            chunks.clone(),
            orchestrator,
            Arc::new(NoAdapters),
            config,
        );
        Harness {
            _dir: dir,
            chunks,
            registry,
        }
    }

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

    #[tokio::test]
    async fn test_add_playlist_starts_pending() {
        let h = setup().await;
        let added = h
            .registry
            .add("My List", "http://example.com/list.m3u", None)
            .await
            .unwrap();

        assert_eq!(added.kind, ResourceKind::Playlist);
        assert_eq!(added.status, ResourceStatus::Pending);
        assert!(added.active);

        let snapshot = h.registry.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "My List");
    }

    #[test]
    fn test_get_php_url_resolves_to_panel() {
        let (kind, credentials) = resolve_kind(
            "http://host.example/get.php?username=alice&password=pw&type=m3u_plus",
            None,
        );
        assert_eq!(kind, ResourceKind::Panel);
        let credentials = credentials.unwrap();
        assert_eq!(credentials.username, "alice");
        assert_eq!(credentials.password, "pw");

        let (kind, credentials) = resolve_kind("http://host.example/list.m3u", None);
        assert_eq!(kind, ResourceKind::Playlist);
        assert!(credentials.is_none());
    }

    #[tokio::test]
    async fn test_toggle_state_machine() {
        let h = setup().await;
        let added = h
            .registry
            .add("List", "http://example.com/list.m3u", None)
            .await
            .unwrap();

        // Never synced: off lands on disabled, back on lands on pending
        let off = h.registry.toggle_active(&added.id, false).await.unwrap();
        assert_eq!(off.status, ResourceStatus::Disabled);
        let on = h.registry.toggle_active(&added.id, true).await.unwrap();
        assert_eq!(on.status, ResourceStatus::Pending);

        // With cached data: reactivation restores synced
        {
            let mut state = h.registry.state.write().await;
            let resource = state.find_mut(&added.id).unwrap();
            resource.cached_data = Some(crate::models::GroupedItems::from_items(vec![channel(
                "One",
            )]));
            resource.status = ResourceStatus::Synced;
            state.rebuild_catalog();
        }
        h.registry.toggle_active(&added.id, false).await.unwrap();
        let back = h.registry.toggle_active(&added.id, true).await.unwrap();
        assert_eq!(back.status, ResourceStatus::Synced);
    }

    #[tokio::test]
    async fn test_toggle_off_keeps_cache_but_hides_from_catalog() {
        let h = setup().await;
        let added = h
            .registry
            .add("List", "http://example.com/list.m3u", None)
            .await
            .unwrap();
        {
            let mut state = h.registry.state.write().await;
            let resource = state.find_mut(&added.id).unwrap();
            resource.cached_data = Some(crate::models::GroupedItems::from_items(vec![channel(
                "One",
            )]));
            resource.status = ResourceStatus::Synced;
            state.rebuild_catalog();
        }
        assert_eq!(h.registry.catalog().await.total_items(), 1);

        let off = h.registry.toggle_active(&added.id, false).await.unwrap();
        assert!(off.cached_data.is_some());
        assert!(h.registry.catalog().await.is_empty());
    }

    #[tokio::test]
    async fn test_rename_keeps_cache_url_change_purges() {
        let h = setup().await;
        let added = h
            .registry
            .add("List", "http://example.com/list.m3u", None)
            .await
            .unwrap();
        h.chunks
            .put_chunk(added.id.as_str(), 0, &[channel("One")])
            .await
            .unwrap();
        {
            let mut state = h.registry.state.write().await;
            let resource = state.find_mut(&added.id).unwrap();
            resource.cached_data = Some(crate::models::GroupedItems::from_items(vec![channel(
                "One",
            )]));
            resource.status = ResourceStatus::Synced;
        }

        let renamed = h
            .registry
            .update(&added.id, "Renamed", "http://example.com/list.m3u", None)
            .await
            .unwrap();
        assert_eq!(renamed.name, "Renamed");
        assert_eq!(renamed.status, ResourceStatus::Synced);
        assert!(renamed.cached_data.is_some());
        assert_eq!(h.chunks.count_by_resource(added.id.as_str()).await.unwrap(), 1);

        let moved = h
            .registry
            .update(&added.id, "Renamed", "http://other.example/list.m3u", None)
            .await
            .unwrap();
        assert_eq!(moved.status, ResourceStatus::Pending);
        assert!(moved.cached_data.is_none());
        assert_eq!(h.chunks.count_by_resource(added.id.as_str()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove_purges_chunks_and_record() {
        let h = setup().await;
        let added = h
            .registry
            .add("List", "http://example.com/list.m3u", None)
            .await
            .unwrap();
        h.chunks
            .put_chunk(added.id.as_str(), 0, &[channel("One")])
            .await
            .unwrap();
        h.chunks
            .put_chunk(&format!("temp_{}", added.id), 0, &[channel("Stale")])
            .await
            .unwrap();

        h.registry.remove(&added.id).await.unwrap();
        assert!(h.registry.snapshot().await.is_empty());
        assert_eq!(h.chunks.count_by_resource(added.id.as_str()).await.unwrap(), 0);
        assert_eq!(
            h.chunks
                .count_by_resource(&format!("temp_{}", added.id))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_startup_restores_cache_without_network() {
        let h = setup().await;
        let added = h
            .registry
            .add("List", "http://example.com/list.m3u", None)
            .await
            .unwrap();
        h.chunks
            .put_chunk(added.id.as_str(), 0, &[channel("One"), channel("Two")])
            .await
            .unwrap();
        // Leftover staging from a crashed run
        h.chunks
            .put_chunk(&format!("temp_{}", added.id), 0, &[channel("Stale")])
            .await
            .unwrap();

        h.registry.load_cached_on_startup().await.unwrap();

        let restored = h.registry.get(&added.id).await.unwrap();
        assert_eq!(restored.status, ResourceStatus::Synced);
        assert_eq!(restored.stats.channels, 2);
        assert!(restored.cached_data.is_some());
        assert_eq!(h.registry.catalog().await.total_items(), 2);
        assert_eq!(
            h.chunks
                .count_by_resource(&format!("temp_{}", added.id))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_startup_normalizes_crashed_syncing_status() {
        let h = setup().await;
        let added = h
            .registry
            .add("List", "http://example.com/list.m3u", None)
            .await
            .unwrap();
        h.registry
            .set_status(&added.id, ResourceStatus::Syncing)
            .await
            .unwrap();

        h.registry.load_cached_on_startup().await.unwrap();
        let restored = h.registry.get(&added.id).await.unwrap();
        assert_eq!(restored.status, ResourceStatus::Pending);
    }

    #[tokio::test]
    async fn test_sync_disabled_resource_is_refused() {
        let h = setup().await;
        let added = h
            .registry
            .add("List", "http://example.com/list.m3u", None)
            .await
            .unwrap();
        h.registry.toggle_active(&added.id, false).await.unwrap();

        let err = h.registry.sync(&added.id).await.unwrap_err();
        assert!(matches!(err, SyncError::Internal(_)));
    }
}
