pub mod api;

pub use api::{ApiCategory, ApiSeries, ApiStream, PanelApi};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::traits::{ItemBatch, SourceAdapter, send_batch, with_cancel};
use crate::config::Config;
use crate::error::SyncError;
use crate::models::{
    ChannelExtras, DEFAULT_GROUP, Item, ItemExtras, MovieExtras, PanelCredentials, ResourceStats,
    SeriesExtras,
};

/// Adapter for Xtream-Codes style panels.
///
/// One fetch is: verify the account, pull the three category lists, pull
/// the three stream lists, map everything to items and emit them in
/// batches. Category and stream listings degrade independently so one
/// broken content type does not sink the whole sync.
pub struct PanelAdapter {
    api: PanelApi,
    batch_size: usize,
}

impl PanelAdapter {
    pub fn new(credentials: &PanelCredentials, config: &Config) -> Result<Self, SyncError> {
        Ok(Self {
            api: PanelApi::new(credentials, config)?,
            batch_size: config.sync.batch_size,
        })
    }

    /// Episode-level metadata for a series item's `external_id`
    pub async fn series_info(&self, series_id: i64) -> Result<Value, SyncError> {
        self.api.get_series_info(series_id).await
    }

    /// Extended metadata for a movie item's `external_id`
    pub async fn vod_info(&self, vod_id: i64) -> Result<Value, SyncError> {
        self.api.get_vod_info(vod_id).await
    }

    fn live_item(&self, stream: &ApiStream, groups: &HashMap<String, String>) -> Item {
        Item {
            title: stream.name.clone(),
            playback_url: Some(self.api.live_stream_url(stream.stream_id)),
            logo_url: stream.stream_icon.clone(),
            group: resolve_group(&stream.category_id, groups),
            external_id: stream.stream_id.to_string(),
            extras: ItemExtras::Channels(ChannelExtras {
                epg_channel_id: stream.epg_channel_id.clone(),
                catchup_days: None,
            }),
        }
    }

    /// Archive-enabled live streams are listed a second time under catchup,
    /// carrying the archive window instead of the live EPG-only extras
    fn catchup_item(&self, stream: &ApiStream, groups: &HashMap<String, String>) -> Item {
        let mut item = self.live_item(stream, groups);
        item.extras = ItemExtras::Catchup(ChannelExtras {
            epg_channel_id: stream.epg_channel_id.clone(),
            catchup_days: u32::try_from(stream.tv_archive_duration).ok().filter(|d| *d > 0),
        });
        item
    }

    fn movie_item(&self, stream: &ApiStream, groups: &HashMap<String, String>) -> Item {
        Item {
            title: stream.name.clone(),
            playback_url: Some(
                self.api
                    .movie_url(stream.stream_id, stream.container_extension.as_deref()),
            ),
            logo_url: stream.stream_icon.clone(),
            group: resolve_group(&stream.category_id, groups),
            external_id: stream.stream_id.to_string(),
            extras: ItemExtras::Movies(MovieExtras {
                rating: api::parse_rating(&stream.rating),
                container_extension: stream.container_extension.clone(),
            }),
        }
    }

    fn series_item(&self, series: &ApiSeries, groups: &HashMap<String, String>) -> Item {
        Item {
            title: series.name.clone(),
            playback_url: None,
            logo_url: series.cover.clone(),
            group: resolve_group(&series.category_id, groups),
            external_id: series.series_id.to_string(),
            extras: ItemExtras::Series(SeriesExtras {
                rating: api::parse_rating(&series.rating),
            }),
        }
    }

    async fn emit(
        &self,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<ItemBatch>,
        items: Vec<Item>,
        stats: &mut ResourceStats,
    ) -> Result<(), SyncError> {
        for chunk in items.chunks(self.batch_size) {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            for item in chunk {
                stats.record(item.category(), 1);
            }
            send_batch(
                tx,
                ItemBatch {
                    items: chunk.to_vec(),
                    progress: *stats,
                },
            )
            .await?;
        }
        Ok(())
    }
}

fn category_map(categories: &[ApiCategory]) -> HashMap<String, String> {
    categories
        .iter()
        .map(|c| (c.category_id.clone(), c.category_name.clone()))
        .collect()
}

fn resolve_group(category_id: &Option<String>, groups: &HashMap<String, String>) -> String {
    category_id
        .as_ref()
        .and_then(|id| groups.get(id))
        .cloned()
        .unwrap_or_else(|| DEFAULT_GROUP.to_string())
}

/// Keep going with an empty listing when one content type fails;
/// cancellation is the only error that stops the whole fetch
fn degrade<T: Default>(result: Result<T, SyncError>, what: &str) -> Result<T, SyncError> {
    match result {
        Ok(value) => Ok(value),
        Err(SyncError::Cancelled) => Err(SyncError::Cancelled),
        Err(err) => {
            warn!("Failed to fetch {}: {}", what, err);
            Ok(T::default())
        }
    }
}

#[async_trait]
impl SourceAdapter for PanelAdapter {
    async fn fetch(
        &self,
        cancel: CancellationToken,
        tx: mpsc::Sender<ItemBatch>,
    ) -> Result<ResourceStats, SyncError> {
        with_cancel(&cancel, self.api.authenticate()).await?;

        let (live_cats, vod_cats, series_cats) = tokio::join!(
            with_cancel(&cancel, self.api.get_live_categories()),
            with_cancel(&cancel, self.api.get_vod_categories()),
            with_cancel(&cancel, self.api.get_series_categories()),
        );
        let live_groups = category_map(&degrade(live_cats, "live categories")?);
        let vod_groups = category_map(&degrade(vod_cats, "movie categories")?);
        let series_groups = category_map(&degrade(series_cats, "series categories")?);

        let (live, vod, series) = tokio::join!(
            with_cancel(&cancel, self.api.get_live_streams()),
            with_cancel(&cancel, self.api.get_vod_streams()),
            with_cancel(&cancel, self.api.get_series()),
        );
        let live = degrade(live, "live streams")?;
        let vod = degrade(vod, "movie streams")?;
        let series = degrade(series, "series listing")?;

        let mut stats = ResourceStats::default();

        let mut channels = Vec::with_capacity(live.len());
        let mut catchup = Vec::new();
        for stream in &live {
            channels.push(self.live_item(stream, &live_groups));
            if stream.tv_archive == 1 {
                catchup.push(self.catchup_item(stream, &live_groups));
            }
        }
        self.emit(&cancel, &tx, channels, &mut stats).await?;
        self.emit(&cancel, &tx, catchup, &mut stats).await?;

        let movies = vod
            .iter()
            .map(|s| self.movie_item(s, &vod_groups))
            .collect();
        self.emit(&cancel, &tx, movies, &mut stats).await?;

        let shows = series
            .iter()
            .map(|s| self.series_item(s, &series_groups))
            .collect();
        self.emit(&cancel, &tx, shows, &mut stats).await?;

        info!(
            channels = stats.channels,
            movies = stats.movies,
            series = stats.series,
            catchup = stats.catchup,
            "Panel fetch complete"
        );
        Ok(stats)
    }
}
