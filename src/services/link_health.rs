use chrono::{Duration, NaiveDateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::db::repository::LinkStatusRepository;

const TTL_HOURS: i64 = 2;

/// Probe verdict for one playback URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkHealth {
    Online,
    Offline,
}

impl LinkHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkHealth::Online => "online",
            LinkHealth::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(LinkHealth::Online),
            "offline" => Some(LinkHealth::Offline),
            _ => None,
        }
    }
}

/// TTL-bounded memo of link probe results.
///
/// The cache is consulted, not written, by whatever probes links: `check`
/// answers from memory when the entry is still fresh, `update` records a
/// new verdict and writes it through to the `link_status` table. Entries
/// older than the TTL are treated as absent so probers re-verify.
pub struct LinkHealthCache {
    repo: Arc<dyn LinkStatusRepository>,
    ttl: Duration,
    entries: RwLock<HashMap<String, (LinkHealth, NaiveDateTime)>>,
}

impl LinkHealthCache {
    pub fn new(repo: Arc<dyn LinkStatusRepository>) -> Self {
        Self {
            repo,
            ttl: Duration::hours(TTL_HOURS),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Warm the in-memory map from the persisted table
    pub async fn load(&self) -> anyhow::Result<()> {
        let rows = self.repo.load_all().await?;
        let mut entries = self.entries.write().await;
        for row in rows {
            match LinkHealth::parse(&row.status) {
                Some(health) => {
                    entries.insert(row.url, (health, row.checked_at));
                }
                None => warn!("Dropping link entry with unknown status: {}", row.status),
            }
        }
        debug!("Loaded {} link health entries", entries.len());
        Ok(())
    }

    /// Fresh cached verdict for a URL, `None` when absent or stale
    pub async fn check(&self, url: &str) -> Option<LinkHealth> {
        let entries = self.entries.read().await;
        let (health, checked_at) = entries.get(url)?;
        let age = Utc::now().naive_utc() - *checked_at;
        if age > self.ttl {
            return None;
        }
        Some(*health)
    }

    /// Record a fresh verdict and persist it
    pub async fn update(&self, url: &str, health: LinkHealth) -> anyhow::Result<()> {
        let now = Utc::now().naive_utc();
        self.repo.upsert(url, health.as_str(), now).await?;
        self.entries
            .write()
            .await
            .insert(url.to_string(), (health, now));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::Database;
    use crate::db::repository::LinkStatusRepositoryImpl;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Arc<LinkStatusRepositoryImpl>, LinkHealthCache) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::connect(&temp_dir.path().join("test.db"))
            .await
            .unwrap();
        db.migrate().await.unwrap();
        let repo = Arc::new(LinkStatusRepositoryImpl::new(db.get_connection()));
        let cache = LinkHealthCache::new(repo.clone());
        (temp_dir, repo, cache)
    }

    #[tokio::test]
    async fn test_update_then_check() {
        let (_dir, _repo, cache) = setup().await;

        assert_eq!(cache.check("http://x/1.ts").await, None);
        cache.update("http://x/1.ts", LinkHealth::Online).await.unwrap();
        assert_eq!(cache.check("http://x/1.ts").await, Some(LinkHealth::Online));

        cache.update("http://x/1.ts", LinkHealth::Offline).await.unwrap();
        assert_eq!(cache.check("http://x/1.ts").await, Some(LinkHealth::Offline));
    }

    #[tokio::test]
    async fn test_stale_entries_read_as_absent() {
        let (_dir, repo, cache) = setup().await;

        let stale = Utc::now().naive_utc() - Duration::hours(3);
        repo.upsert("http://x/old.ts", "online", stale).await.unwrap();
        cache.load().await.unwrap();

        assert_eq!(cache.check("http://x/old.ts").await, None);
    }

    #[tokio::test]
    async fn test_load_restores_persisted_entries() {
        let (_dir, repo, cache) = setup().await;

        repo.upsert("http://x/1.ts", "offline", Utc::now().naive_utc())
            .await
            .unwrap();
        repo.upsert("http://x/2.ts", "bogus", Utc::now().naive_utc())
            .await
            .unwrap();
        cache.load().await.unwrap();

        assert_eq!(cache.check("http://x/1.ts").await, Some(LinkHealth::Offline));
        // Unknown status strings are dropped rather than guessed at
        assert_eq!(cache.check("http://x/2.ts").await, None);
    }
}
