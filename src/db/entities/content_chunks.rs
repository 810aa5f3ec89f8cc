use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One bounded slice of a resource's item list, stored as a JSON array.
///
/// `resource_id` is either a real resource id or a staging id
/// (`temp_<id>`); the two keyspaces never overlap. `chunk_index` is a
/// dense zero-based sequence assigned at write time with no meaning
/// beyond reconstruction order.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "content_chunks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub resource_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub chunk_index: i32,
    pub items: serde_json::Value,
    pub written_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
