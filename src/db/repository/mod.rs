pub mod chunk_repository;
pub mod link_status_repository;
pub mod resource_repository;

use anyhow::Result;
use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Base repository trait that all repositories should implement
#[async_trait]
pub trait Repository<T>: Send + Sync {
    /// Find an entity by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<T>>;

    /// Find all entities
    async fn find_all(&self) -> Result<Vec<T>>;

    /// Insert a new entity
    async fn insert(&self, entity: T) -> Result<T>;

    /// Update an existing entity
    async fn update(&self, entity: T) -> Result<T>;

    /// Delete an entity by ID
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Base repository implementation holder
#[derive(Debug)]
pub struct BaseRepository {
    pub db: Arc<DatabaseConnection>,
}

impl BaseRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

// Re-export specific repositories
pub use chunk_repository::{ChunkRepository, ChunkRepositoryImpl};
pub use link_status_repository::{LinkStatusRepository, LinkStatusRepositoryImpl};
pub use resource_repository::{ResourceRepository, ResourceRepositoryImpl};
