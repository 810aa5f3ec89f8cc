use super::BaseRepository;
use crate::db::entities::{ContentChunk, ContentChunkActiveModel, content_chunks};
use crate::models::{GroupedItems, Item};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, Order, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;

/// Durable chunked store for catalog items.
///
/// Rows are keyed `(resource_id, chunk_index)`. A resource's full item set
/// is the concatenation of all its chunks, regrouped by category and group;
/// single chunks carry no meaning on their own.
#[async_trait]
pub trait ChunkRepository: Send + Sync {
    /// Upsert one chunk; idempotent for the same key
    async fn put_chunk(&self, resource_id: &str, chunk_index: i32, items: &[Item]) -> Result<()>;

    /// Read and regroup every chunk for a resource.
    ///
    /// Returns `None` when no chunks exist, which distinguishes "never
    /// synced" from "synced with zero items".
    async fn get_all_by_resource(&self, resource_id: &str) -> Result<Option<GroupedItems>>;

    /// Number of chunks stored under a key
    async fn count_by_resource(&self, resource_id: &str) -> Result<u64>;

    /// Re-key every chunk from `source_id` to `target_id`, all-or-nothing.
    /// Existing chunks under `target_id` are replaced.
    async fn move_resource(&self, source_id: &str, target_id: &str) -> Result<()>;

    /// Remove every chunk for a resource; no-op when none exist
    async fn delete_by_resource(&self, resource_id: &str) -> Result<()>;

    /// Wipe the store entirely (full app reset only)
    async fn clear_all(&self) -> Result<()>;
}

pub struct ChunkRepositoryImpl {
    base: BaseRepository,
}

impl ChunkRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

#[async_trait]
impl ChunkRepository for ChunkRepositoryImpl {
    async fn put_chunk(&self, resource_id: &str, chunk_index: i32, items: &[Item]) -> Result<()> {
        let payload = serde_json::to_value(items).context("Failed to serialize chunk items")?;

        let active_model = ContentChunkActiveModel {
            resource_id: Set(resource_id.to_string()),
            chunk_index: Set(chunk_index),
            items: Set(payload),
            written_at: Set(chrono::Utc::now().naive_utc()),
        };

        ContentChunk::insert(active_model)
            .on_conflict(
                OnConflict::columns([
                    content_chunks::Column::ResourceId,
                    content_chunks::Column::ChunkIndex,
                ])
                .update_columns([
                    content_chunks::Column::Items,
                    content_chunks::Column::WrittenAt,
                ])
                .to_owned(),
            )
            .exec(self.base.db.as_ref())
            .await?;

        Ok(())
    }

    async fn get_all_by_resource(&self, resource_id: &str) -> Result<Option<GroupedItems>> {
        let rows = ContentChunk::find()
            .filter(content_chunks::Column::ResourceId.eq(resource_id))
            .order_by(content_chunks::Column::ChunkIndex, Order::Asc)
            .all(self.base.db.as_ref())
            .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut grouped = GroupedItems::default();
        for row in rows {
            let items: Vec<Item> = serde_json::from_value(row.items)
                .with_context(|| format!("Corrupt chunk {}:{}", row.resource_id, row.chunk_index))?;
            for item in items {
                grouped.insert(item);
            }
        }

        Ok(Some(grouped))
    }

    async fn count_by_resource(&self, resource_id: &str) -> Result<u64> {
        use sea_orm::PaginatorTrait;
        Ok(ContentChunk::find()
            .filter(content_chunks::Column::ResourceId.eq(resource_id))
            .count(self.base.db.as_ref())
            .await?)
    }

    async fn move_resource(&self, source_id: &str, target_id: &str) -> Result<()> {
        let txn = self.base.db.begin().await?;

        ContentChunk::delete_many()
            .filter(content_chunks::Column::ResourceId.eq(target_id))
            .exec(&txn)
            .await?;

        ContentChunk::update_many()
            .col_expr(content_chunks::Column::ResourceId, Expr::value(target_id))
            .filter(content_chunks::Column::ResourceId.eq(source_id))
            .exec(&txn)
            .await?;

        txn.commit()
            .await
            .with_context(|| format!("Failed to move chunks {} -> {}", source_id, target_id))?;

        Ok(())
    }

    async fn delete_by_resource(&self, resource_id: &str) -> Result<()> {
        ContentChunk::delete_many()
            .filter(content_chunks::Column::ResourceId.eq(resource_id))
            .exec(self.base.db.as_ref())
            .await?;
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        ContentChunk::delete_many()
            .exec(self.base.db.as_ref())
            .await?;
        Ok(())
    }
}
