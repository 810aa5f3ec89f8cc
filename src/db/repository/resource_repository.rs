use super::{BaseRepository, Repository};
use crate::db::entities::{ResourceActiveModel, ResourceEntity, ResourceModel, resources};
use anyhow::Result;
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;

/// Repository for the resource registry records
#[async_trait]
pub trait ResourceRepository: Repository<ResourceModel> {
    /// Find all resources the user has toggled visible
    async fn find_active(&self) -> Result<Vec<ResourceModel>>;
}

pub struct ResourceRepositoryImpl {
    base: BaseRepository,
}

impl ResourceRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    fn to_active_model(entity: &ResourceModel) -> ResourceActiveModel {
        ResourceActiveModel {
            id: Set(entity.id.clone()),
            name: Set(entity.name.clone()),
            source_url: Set(entity.source_url.clone()),
            kind: Set(entity.kind.clone()),
            host: Set(entity.host.clone()),
            username: Set(entity.username.clone()),
            password: Set(entity.password.clone()),
            active: Set(entity.active),
            status: Set(entity.status.clone()),
            stats: Set(entity.stats.clone()),
            last_synced_at: Set(entity.last_synced_at),
            created_at: Set(entity.created_at),
            updated_at: Set(chrono::Utc::now().naive_utc()),
        }
    }
}

#[async_trait]
impl Repository<ResourceModel> for ResourceRepositoryImpl {
    async fn find_by_id(&self, id: &str) -> Result<Option<ResourceModel>> {
        Ok(ResourceEntity::find_by_id(id)
            .one(self.base.db.as_ref())
            .await?)
    }

    async fn find_all(&self) -> Result<Vec<ResourceModel>> {
        Ok(ResourceEntity::find()
            .order_by_asc(resources::Column::CreatedAt)
            .all(self.base.db.as_ref())
            .await?)
    }

    async fn insert(&self, entity: ResourceModel) -> Result<ResourceModel> {
        let active_model = Self::to_active_model(&entity);
        Ok(active_model.insert(self.base.db.as_ref()).await?)
    }

    async fn update(&self, entity: ResourceModel) -> Result<ResourceModel> {
        let active_model = Self::to_active_model(&entity);
        Ok(active_model.update(self.base.db.as_ref()).await?)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        ResourceEntity::delete_by_id(id)
            .exec(self.base.db.as_ref())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ResourceRepository for ResourceRepositoryImpl {
    async fn find_active(&self) -> Result<Vec<ResourceModel>> {
        Ok(ResourceEntity::find()
            .filter(resources::Column::Active.eq(true))
            .order_by_asc(resources::Column::CreatedAt)
            .all(self.base.db.as_ref())
            .await?)
    }
}
