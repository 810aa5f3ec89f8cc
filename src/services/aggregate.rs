use std::collections::HashMap;

use crate::models::{Category, Item, Resource, ResourceId};

/// One catalog item tagged with the resource it came from
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedItem {
    pub source_id: ResourceId,
    pub source_name: String,
    pub item: Item,
}

pub type AggregatedGroupMap = HashMap<String, Vec<AggregatedItem>>;

/// Merged view over every active resource's cached data.
///
/// This is a pure function of the registry snapshot: active resources with
/// cached data contribute all of their items, everything else contributes
/// nothing. It is rebuilt wholesale after each mutation rather than patched
/// incrementally, which costs O(total cached items) and only runs on
/// discrete user actions.
#[derive(Debug, Clone, Default)]
pub struct AggregatedCatalog {
    pub channels: AggregatedGroupMap,
    pub movies: AggregatedGroupMap,
    pub series: AggregatedGroupMap,
    pub catchup: AggregatedGroupMap,
}

impl AggregatedCatalog {
    pub fn build<'a>(resources: impl IntoIterator<Item = &'a Resource>) -> Self {
        let mut catalog = Self::default();
        for resource in resources {
            if !resource.active {
                continue;
            }
            let Some(cached) = &resource.cached_data else {
                continue;
            };
            for category in Category::ALL {
                for (group, items) in cached.by_category(category) {
                    let bucket = catalog
                        .by_category_mut(category)
                        .entry(group.clone())
                        .or_default();
                    bucket.extend(items.iter().map(|item| AggregatedItem {
                        source_id: resource.id.clone(),
                        source_name: resource.name.clone(),
                        item: item.clone(),
                    }));
                }
            }
        }
        catalog
    }

    pub fn by_category(&self, category: Category) -> &AggregatedGroupMap {
        match category {
            Category::Channels => &self.channels,
            Category::Movies => &self.movies,
            Category::Series => &self.series,
            Category::Catchup => &self.catchup,
        }
    }

    fn by_category_mut(&mut self, category: Category) -> &mut AggregatedGroupMap {
        match category {
            Category::Channels => &mut self.channels,
            Category::Movies => &mut self.movies,
            Category::Series => &mut self.series,
            Category::Catchup => &mut self.catchup,
        }
    }

    /// Group names of one category, sorted for stable display
    pub fn groups(&self, category: Category) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .by_category(category)
            .keys()
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names
    }

    pub fn total_items(&self) -> usize {
        Category::ALL
            .iter()
            .map(|c| self.by_category(*c).values().map(Vec::len).sum::<usize>())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_items() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ChannelExtras, GroupedItems, ItemExtras, ResourceKind, ResourceStats, ResourceStatus,
    };

    fn channel(title: &str, group: &str) -> Item {
        Item {
            title: title.to_string(),
            playback_url: Some(format!("http://example.com/{title}")),
            logo_url: None,
            group: group.to_string(),
            external_id: title.to_string(),
            extras: ItemExtras::Channels(ChannelExtras::default()),
        }
    }

    fn resource(id: &str, name: &str, active: bool, items: Option<Vec<Item>>) -> Resource {
        Resource {
            id: ResourceId::new(id),
            name: name.to_string(),
            source_url: "http://example.com/list.m3u".to_string(),
            kind: ResourceKind::Playlist,
            credentials: None,
            active,
            status: ResourceStatus::Synced,
            stats: ResourceStats::default(),
            last_synced_at: None,
            cached_data: items.map(GroupedItems::from_items),
        }
    }

    #[test]
    fn test_merges_active_resources_and_tags_source() {
        let a = resource(
            "a",
            "Provider A",
            true,
            Some(vec![
                channel("A1", "News"),
                channel("A2", "News"),
                channel("A3", "Sports"),
            ]),
        );
        let b = resource(
            "b",
            "Provider B",
            true,
            Some(vec![channel("B1", "News"), channel("B2", "News")]),
        );

        let catalog = AggregatedCatalog::build([&a, &b]);
        assert_eq!(catalog.total_items(), 5);
        assert_eq!(catalog.channels["News"].len(), 4);
        assert_eq!(catalog.channels["Sports"].len(), 1);

        let sources: Vec<&str> = catalog.channels["News"]
            .iter()
            .map(|i| i.source_name.as_str())
            .collect();
        assert!(sources.contains(&"Provider A"));
        assert!(sources.contains(&"Provider B"));
    }

    #[test]
    fn test_skips_inactive_and_unsynced_resources() {
        let active = resource("a", "A", true, Some(vec![channel("A1", "News")]));
        let disabled = resource("b", "B", false, Some(vec![channel("B1", "News")]));
        let unsynced = resource("c", "C", true, None);

        let catalog = AggregatedCatalog::build([&active, &disabled, &unsynced]);
        assert_eq!(catalog.total_items(), 1);
        assert_eq!(catalog.channels["News"][0].source_name, "A");
    }

    #[test]
    fn test_group_names_are_sorted() {
        let a = resource(
            "a",
            "A",
            true,
            Some(vec![channel("1", "Zeta"), channel("2", "Alpha")]),
        );
        let catalog = AggregatedCatalog::build([&a]);
        assert_eq!(catalog.groups(Category::Channels), vec!["Alpha", "Zeta"]);
    }
}
