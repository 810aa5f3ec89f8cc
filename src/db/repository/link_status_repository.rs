use super::BaseRepository;
use crate::db::entities::{LinkStatus, LinkStatusActiveModel, LinkStatusModel, link_status};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use std::sync::Arc;

/// Persistence for the link-health map; one row per probed URL
#[async_trait]
pub trait LinkStatusRepository: Send + Sync {
    async fn load_all(&self) -> Result<Vec<LinkStatusModel>>;

    async fn upsert(&self, url: &str, status: &str, checked_at: NaiveDateTime) -> Result<()>;
}

pub struct LinkStatusRepositoryImpl {
    base: BaseRepository,
}

impl LinkStatusRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

#[async_trait]
impl LinkStatusRepository for LinkStatusRepositoryImpl {
    async fn load_all(&self) -> Result<Vec<LinkStatusModel>> {
        Ok(LinkStatus::find().all(self.base.db.as_ref()).await?)
    }

    async fn upsert(&self, url: &str, status: &str, checked_at: NaiveDateTime) -> Result<()> {
        let active_model = LinkStatusActiveModel {
            url: Set(url.to_string()),
            status: Set(status.to_string()),
            checked_at: Set(checked_at),
        };

        LinkStatus::insert(active_model)
            .on_conflict(
                OnConflict::column(link_status::Column::Url)
                    .update_columns([link_status::Column::Status, link_status::Column::CheckedAt])
                    .to_owned(),
            )
            .exec(self.base.db.as_ref())
            .await?;

        Ok(())
    }
}
