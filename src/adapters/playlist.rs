use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::adapters::traits::{ItemBatch, SourceAdapter, send_batch, with_cancel};
use crate::config::Config;
use crate::error::SyncError;
use crate::models::{
    ChannelExtras, DEFAULT_GROUP, Item, ItemExtras, MovieExtras, PanelCredentials, ResourceStats,
    SeriesExtras,
};

/// Streams a remote M3U playlist and parses entries incrementally, so a
/// 100k-line playlist never has to sit in memory as one string
pub struct PlaylistAdapter {
    client: reqwest::Client,
    url: String,
    batch_size: usize,
}

impl PlaylistAdapter {
    pub fn new(url: String, config: &Config) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.network.connect_timeout))
            .timeout(Duration::from_secs(config.network.playlist_timeout))
            .build()?;

        Ok(Self {
            client,
            url,
            batch_size: config.sync.batch_size,
        })
    }
}

#[async_trait]
impl SourceAdapter for PlaylistAdapter {
    async fn fetch(
        &self,
        cancel: CancellationToken,
        tx: mpsc::Sender<ItemBatch>,
    ) -> Result<ResourceStats, SyncError> {
        let response = with_cancel(&cancel, async {
            Ok(self.client.get(&self.url).send().await?)
        })
        .await?;

        if !response.status().is_success() {
            return Err(SyncError::Network(format!(
                "Playlist download failed: HTTP {}",
                response.status()
            )));
        }

        let mut stream = response.bytes_stream();
        let mut parser = M3uStreamParser::default();
        let mut pending: Vec<Item> = Vec::new();
        let mut stats = ResourceStats::default();
        let mut parsed = 0usize;

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                chunk = stream.next() => chunk,
            };

            let bytes = match chunk {
                Some(bytes) => bytes?,
                None => break,
            };

            parser.feed(&bytes, &mut pending);

            while pending.len() >= self.batch_size {
                let rest = pending.split_off(self.batch_size);
                let batch = std::mem::replace(&mut pending, rest);
                parsed += batch.len();
                for item in &batch {
                    stats.record(item.category(), 1);
                }
                send_batch(
                    &tx,
                    ItemBatch {
                        items: batch,
                        progress: stats,
                    },
                )
                .await?;

                // Keep the event loop responsive during very large parses
                tokio::task::yield_now().await;

                if cancel.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
            }
        }

        parser.finish(&mut pending);

        if !pending.is_empty() {
            parsed += pending.len();
            for item in &pending {
                stats.record(item.category(), 1);
            }
            send_batch(
                &tx,
                ItemBatch {
                    items: pending,
                    progress: stats,
                },
            )
            .await?;
        }

        if parsed == 0 && !parser.saw_header {
            return Err(SyncError::Parse("Not an M3U playlist".to_string()));
        }

        debug!("Parsed {} playlist entries from {}", parsed, self.url);
        Ok(stats)
    }
}

/// Line-oriented incremental M3U parser. `feed` accepts arbitrary byte
/// windows; partial trailing lines are buffered as raw bytes until the
/// next window, so a multi-byte character split across two windows still
/// decodes intact.
#[derive(Default)]
struct M3uStreamParser {
    buf: Vec<u8>,
    pending_name: Option<String>,
    pending_attrs: HashMap<String, String>,
    saw_header: bool,
}

impl M3uStreamParser {
    fn feed(&mut self, bytes: &[u8], out: &mut Vec<Item>) {
        self.buf.extend_from_slice(bytes);

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..pos]);
            self.handle_line(line.trim_end_matches('\r').trim(), out);
        }
    }

    fn finish(&mut self, out: &mut Vec<Item>) {
        if !self.buf.is_empty() {
            let bytes = std::mem::take(&mut self.buf);
            let line = String::from_utf8_lossy(&bytes);
            self.handle_line(line.trim(), out);
        }
    }

    fn handle_line(&mut self, line: &str, out: &mut Vec<Item>) {
        if line.starts_with("#EXTM3U") {
            self.saw_header = true;
        } else if let Some(info) = line.strip_prefix("#EXTINF:") {
            self.pending_attrs = parse_attributes(info);
            // Display name sits after the last comma
            self.pending_name = info
                .rfind(',')
                .map(|pos| info[pos + 1..].trim().to_string())
                .filter(|name| !name.is_empty());
        } else if !line.is_empty() && !line.starts_with('#') {
            if let Some(name) = self.pending_name.take() {
                let attrs = std::mem::take(&mut self.pending_attrs);
                out.push(build_item(name, line, &attrs));
            }
        }
    }
}

/// Extract `key="value"` and unquoted `key=value` attributes from an
/// EXTINF info line
fn parse_attributes(info: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let bytes = info.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        // Find the next key=
        let rest = &info[i..];
        let Some(eq) = rest.find('=') else { break };
        let key_start = rest[..eq]
            .rfind(|c: char| c.is_whitespace() || c == ',')
            .map(|p| p + 1)
            .unwrap_or(0);
        let key = rest[key_start..eq].trim().to_string();

        let value_start = i + eq + 1;
        if value_start >= info.len() {
            break;
        }

        if info.as_bytes()[value_start] == b'"' {
            let value_rest = &info[value_start + 1..];
            let Some(end) = value_rest.find('"') else { break };
            if !key.is_empty() {
                attrs.insert(key, value_rest[..end].to_string());
            }
            i = value_start + 1 + end + 1;
        } else {
            let value_rest = &info[value_start..];
            let end = value_rest
                .find(|c: char| c.is_whitespace() || c == ',')
                .unwrap_or(value_rest.len());
            if !key.is_empty() {
                attrs.insert(key, value_rest[..end].to_string());
            }
            i = value_start + end;
        }
    }

    attrs
}

fn build_item(name: String, url: &str, attrs: &HashMap<String, String>) -> Item {
    let group = attrs
        .get("group-title")
        .filter(|g| !g.is_empty())
        .cloned()
        .unwrap_or_else(|| DEFAULT_GROUP.to_string());
    let logo_url = attrs.get("tvg-logo").filter(|l| !l.is_empty()).cloned();
    let (stem, extension) = url_stem(url);

    let extras = if attrs.contains_key("catchup") {
        ItemExtras::Catchup(ChannelExtras {
            epg_channel_id: attrs.get("tvg-id").filter(|v| !v.is_empty()).cloned(),
            catchup_days: attrs.get("catchup-days").and_then(|s| s.parse().ok()),
        })
    } else if url.contains("/movie/") {
        ItemExtras::Movies(MovieExtras {
            rating: None,
            container_extension: extension,
        })
    } else if url.contains("/series/") {
        ItemExtras::Series(SeriesExtras { rating: None })
    } else {
        ItemExtras::Channels(ChannelExtras {
            epg_channel_id: attrs.get("tvg-id").filter(|v| !v.is_empty()).cloned(),
            catchup_days: None,
        })
    };

    Item {
        title: name,
        playback_url: Some(url.to_string()),
        logo_url,
        group,
        external_id: stem.unwrap_or_else(|| url.to_string()),
        extras,
    }
}

/// Last path segment of a URL, split into stem and extension
fn url_stem(url: &str) -> (Option<String>, Option<String>) {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let Some(segment) = path.rsplit('/').next().filter(|s| !s.is_empty()) else {
        return (None, None);
    };
    match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            (Some(stem.to_string()), Some(ext.to_string()))
        }
        _ => (Some(segment.to_string()), None),
    }
}

/// Detect Xtream-style credentials embedded in a `get.php` playlist URL.
/// Used as a convenience hint when converting a playlist resource into a
/// panel account; never required for playlist syncs.
pub fn extract_credentials(raw_url: &str) -> Option<PanelCredentials> {
    let parsed = url::Url::parse(raw_url).ok()?;
    if !parsed.path().ends_with("get.php") {
        return None;
    }

    let mut username = None;
    let mut password = None;
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "username" => username = Some(value.to_string()),
            "password" => password = Some(value.to_string()),
            _ => {}
        }
    }

    let host = format!(
        "{}://{}",
        parsed.scheme(),
        parsed.host_str().map(|h| match parsed.port() {
            Some(port) => format!("{h}:{port}"),
            None => h.to_string(),
        })?
    );

    Some(PanelCredentials {
        host,
        username: username.filter(|u| !u.is_empty())?,
        password: password.filter(|p| !p.is_empty())?,
    })
}
