mod identifiers;

pub use identifiers::{ResourceId, StagingId};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bucket name for entries whose source did not declare a group
pub const DEFAULT_GROUP: &str = "Uncategorized";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Channels,
    Movies,
    Series,
    Catchup,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Channels,
        Category::Movies,
        Category::Series,
        Category::Catchup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Channels => "channels",
            Category::Movies => "movies",
            Category::Series => "series",
            Category::Catchup => "catchup",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelExtras {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epg_channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catchup_days: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovieExtras {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_extension: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesExtras {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
}

/// Adapter-specific fields, discriminated by category.
///
/// The discriminant doubles as the item's category, so an item can never
/// carry extras that belong to a different content type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum ItemExtras {
    Channels(ChannelExtras),
    Movies(MovieExtras),
    Series(SeriesExtras),
    Catchup(ChannelExtras),
}

impl ItemExtras {
    pub fn category(&self) -> Category {
        match self {
            ItemExtras::Channels(_) => Category::Channels,
            ItemExtras::Movies(_) => Category::Movies,
            ItemExtras::Series(_) => Category::Series,
            ItemExtras::Catchup(_) => Category::Catchup,
        }
    }
}

/// One playable catalog entry. Immutable once produced by an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub title: String,
    /// Absent for series parents, which resolve per-episode on demand
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    pub group: String,
    /// Adapter-specific id used for detail lookups
    pub external_id: String,
    #[serde(flatten)]
    pub extras: ItemExtras,
}

impl Item {
    pub fn category(&self) -> Category {
        self.extras.category()
    }
}

/// Items of one category, bucketed by group name
pub type GroupMap = HashMap<String, Vec<Item>>;

/// One resource's items, grouped `category -> group -> list`.
///
/// This is the shape the chunk store reconstructs from persisted chunks and
/// the shape a resource caches in memory after a successful sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupedItems {
    pub channels: GroupMap,
    pub movies: GroupMap,
    pub series: GroupMap,
    pub catchup: GroupMap,
}

impl GroupedItems {
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Self {
        let mut grouped = Self::default();
        for item in items {
            grouped.insert(item);
        }
        grouped
    }

    pub fn insert(&mut self, item: Item) {
        let group = item.group.clone();
        self.by_category_mut(item.category())
            .entry(group)
            .or_default()
            .push(item);
    }

    pub fn by_category(&self, category: Category) -> &GroupMap {
        match category {
            Category::Channels => &self.channels,
            Category::Movies => &self.movies,
            Category::Series => &self.series,
            Category::Catchup => &self.catchup,
        }
    }

    pub fn by_category_mut(&mut self, category: Category) -> &mut GroupMap {
        match category {
            Category::Channels => &mut self.channels,
            Category::Movies => &mut self.movies,
            Category::Series => &mut self.series,
            Category::Catchup => &mut self.catchup,
        }
    }

    pub fn stats(&self) -> ResourceStats {
        let count = |map: &GroupMap| map.values().map(Vec::len).sum();
        ResourceStats {
            channels: count(&self.channels),
            movies: count(&self.movies),
            series: count(&self.series),
            catchup: count(&self.catchup),
        }
    }

    pub fn total_items(&self) -> usize {
        self.stats().total()
    }

    pub fn is_empty(&self) -> bool {
        self.total_items() == 0
    }
}

/// Per-category item counts reported by an adapter and shown as live
/// progress while a sync runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStats {
    pub channels: usize,
    pub movies: usize,
    pub series: usize,
    pub catchup: usize,
}

impl ResourceStats {
    pub fn total(&self) -> usize {
        self.channels + self.movies + self.series + self.catchup
    }

    pub fn record(&mut self, category: Category, count: usize) {
        match category {
            Category::Channels => self.channels += count,
            Category::Movies => self.movies += count,
            Category::Series => self.series += count,
            Category::Catchup => self.catchup += count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Playlist,
    Panel,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Playlist => "playlist",
            ResourceKind::Panel => "panel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "playlist" => Some(ResourceKind::Playlist),
            "panel" => Some(ResourceKind::Panel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelCredentials {
    pub host: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Pending,
    Syncing,
    Synced,
    Error,
    Cancelled,
    Disabled,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Pending => "pending",
            ResourceStatus::Syncing => "syncing",
            ResourceStatus::Synced => "synced",
            ResourceStatus::Error => "error",
            ResourceStatus::Cancelled => "cancelled",
            ResourceStatus::Disabled => "disabled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ResourceStatus::Pending),
            "syncing" => Some(ResourceStatus::Syncing),
            "synced" => Some(ResourceStatus::Synced),
            "error" => Some(ResourceStatus::Error),
            "cancelled" => Some(ResourceStatus::Cancelled),
            "disabled" => Some(ResourceStatus::Disabled),
            _ => None,
        }
    }

    /// Human-readable state string, the only failure surface shown to users
    pub fn display_label(&self) -> &'static str {
        match self {
            ResourceStatus::Pending => "Not synced yet",
            ResourceStatus::Syncing => "Syncing…",
            ResourceStatus::Synced => "Up to date",
            ResourceStatus::Error => "Sync failed",
            ResourceStatus::Cancelled => "Sync cancelled",
            ResourceStatus::Disabled => "Disabled",
        }
    }
}

/// A configured catalog source and its in-memory state.
///
/// `cached_data` is replaced wholesale by a successful sync and left
/// untouched by a failed or cancelled one; it is never persisted with the
/// rest of the record (the chunk store is its durable form).
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub source_url: String,
    pub kind: ResourceKind,
    pub credentials: Option<PanelCredentials>,
    pub active: bool,
    pub status: ResourceStatus,
    pub stats: ResourceStats,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub cached_data: Option<GroupedItems>,
}

impl Resource {
    pub fn is_syncing(&self) -> bool {
        self.status == ResourceStatus::Syncing
    }

    /// Whether this resource ever completed a sync (cached data survives
    /// deactivation, so a disabled resource can still count as synced)
    pub fn has_synced(&self) -> bool {
        self.last_synced_at.is_some() || self.cached_data.is_some()
    }
}
