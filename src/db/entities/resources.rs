use crate::models::{
    PanelCredentials, Resource, ResourceId, ResourceKind, ResourceStats, ResourceStatus,
};
use chrono::{TimeZone, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "resources")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub source_url: String,
    pub kind: String, // 'playlist' or 'panel'
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub active: bool,
    pub status: String,
    pub stats: Option<serde_json::Value>,
    pub last_synced_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

// Chunks are keyed by plain string so the staging keyspace (`temp_<id>`)
// can hold rows with no matching resource; no FK relation on purpose.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn kind(&self) -> Option<ResourceKind> {
        ResourceKind::parse(&self.kind)
    }

    pub fn status(&self) -> Option<ResourceStatus> {
        ResourceStatus::parse(&self.status)
    }

    pub fn credentials(&self) -> Option<PanelCredentials> {
        match (&self.host, &self.username, &self.password) {
            (Some(host), Some(username), Some(password)) => Some(PanelCredentials {
                host: host.clone(),
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    pub fn stats(&self) -> ResourceStats {
        self.stats
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Hydrate the in-memory resource (without cached item data)
    pub fn to_resource(&self) -> Resource {
        let status = self.status().unwrap_or(ResourceStatus::Pending);
        Resource {
            id: ResourceId::new(self.id.clone()),
            name: self.name.clone(),
            source_url: self.source_url.clone(),
            kind: self.kind().unwrap_or(ResourceKind::Playlist),
            credentials: self.credentials(),
            active: self.active,
            status,
            stats: self.stats(),
            last_synced_at: self
                .last_synced_at
                .map(|t| Utc.from_utc_datetime(&t)),
            cached_data: None,
        }
    }
}
