pub mod mocks;

use std::sync::Arc;
use tempfile::TempDir;

use aerial::config::Config;
use aerial::db::connection::Database;
use aerial::db::repository::{
    ChunkRepositoryImpl, LinkStatusRepositoryImpl, ResourceRepositoryImpl,
};
use aerial::models::{ChannelExtras, Item, ItemExtras, MovieExtras};
use aerial::services::{ResourceRegistry, SyncOrchestrator};

use mocks::MockAdapterFactory;

/// Everything an integration test needs, backed by a temp-dir sqlite file
pub struct TestContext {
    pub chunks: Arc<ChunkRepositoryImpl>,
    pub resources: Arc<ResourceRepositoryImpl>,
    pub links: Arc<LinkStatusRepositoryImpl>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub adapters: Arc<MockAdapterFactory>,
    pub registry: ResourceRegistry,
    _temp_dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = Database::connect(&temp_dir.path().join("test.db"))
            .await
            .expect("Failed to open test database");
        db.migrate().await.expect("Failed to run migrations");

        let resources = Arc::new(ResourceRepositoryImpl::new(db.get_connection()));
        let chunks = Arc::new(ChunkRepositoryImpl::new(db.get_connection()));
        let links = Arc::new(LinkStatusRepositoryImpl::new(db.get_connection()));
        let orchestrator = Arc::new(SyncOrchestrator::new(chunks.clone(), &config));
        let adapters = Arc::new(MockAdapterFactory::default());
        let registry = ResourceRegistry::new(
            resources.clone(),
            chunks.clone(),
            orchestrator.clone(),
            adapters.clone(),
            config,
        );

        Self {
            chunks,
            resources,
            links,
            orchestrator,
            adapters,
            registry,
            _temp_dir: temp_dir,
        }
    }
}

pub fn channel(title: &str, group: &str) -> Item {
    Item {
        title: title.to_string(),
        playback_url: Some(format!("http://example.com/live/{title}.ts")),
        logo_url: None,
        group: group.to_string(),
        external_id: title.to_string(),
        extras: ItemExtras::Channels(ChannelExtras::default()),
    }
}

pub fn movie(title: &str, group: &str) -> Item {
    Item {
        title: title.to_string(),
        playback_url: Some(format!("http://example.com/movie/{title}.mp4")),
        logo_url: None,
        group: group.to_string(),
        external_id: title.to_string(),
        extras: ItemExtras::Movies(MovieExtras::default()),
    }
}
