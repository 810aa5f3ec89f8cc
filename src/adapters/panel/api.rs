use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::Config;
use crate::error::SyncError;
use crate::models::PanelCredentials;

/// Minimal Xtream-Codes `player_api.php` client.
///
/// Credentials ride in the query string; every action is a GET returning
/// JSON. Playback URLs are constructed, not discovered.
#[derive(Clone)]
pub struct PanelApi {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiCategory {
    pub category_id: String,
    pub category_name: String,
    #[serde(default)]
    pub parent_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiStream {
    pub stream_id: i64,
    pub name: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub epg_channel_id: Option<String>,
    #[serde(default)]
    pub stream_icon: Option<String>,
    #[serde(default)]
    pub container_extension: Option<String>,
    #[serde(default)]
    pub rating: Option<Value>,
    #[serde(default)]
    pub tv_archive: i64,
    #[serde(default)]
    pub tv_archive_duration: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSeries {
    pub series_id: i64,
    pub name: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub rating: Option<Value>,
}

/// Panels return ratings as numbers, numeric strings or empty strings
pub fn parse_rating(value: &Option<Value>) -> Option<f32> {
    match value {
        Some(Value::Number(n)) => n.as_f64().map(|f| f as f32),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

impl PanelApi {
    pub fn new(credentials: &PanelCredentials, config: &Config) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.network.connect_timeout))
            .timeout(Duration::from_secs(config.network.request_timeout))
            .build()?;

        Ok(Self {
            client,
            base_url: credentials.host.trim_end_matches('/').to_string(),
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        })
    }

    fn account_url(&self) -> String {
        format!(
            "{}/player_api.php?username={}&password={}",
            self.base_url, self.username, self.password
        )
    }

    fn action_url(&self, action: &str) -> String {
        format!("{}&action={}", self.account_url(), action)
    }

    fn action_url_with_param(&self, action: &str, name: &str, value: &str) -> String {
        format!("{}&{}={}", self.action_url(action), name, value)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, SyncError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(SyncError::Authentication(format!(
                "Panel returned HTTP {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(SyncError::Network(format!("Panel returned HTTP {}", status)));
        }

        Ok(response.json::<T>().await?)
    }

    /// Check the account before anything is persisted or synced
    pub async fn authenticate(&self) -> Result<(), SyncError> {
        let info: Value = self.get_json(&self.account_url()).await?;
        let authorized = info
            .get("user_info")
            .and_then(|u| u.get("auth"))
            .and_then(Value::as_i64)
            .unwrap_or(0);

        if authorized != 1 {
            return Err(SyncError::Authentication(
                "Panel rejected the credentials".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn get_live_categories(&self) -> Result<Vec<ApiCategory>, SyncError> {
        self.get_json(&self.action_url("get_live_categories")).await
    }

    pub async fn get_vod_categories(&self) -> Result<Vec<ApiCategory>, SyncError> {
        self.get_json(&self.action_url("get_vod_categories")).await
    }

    pub async fn get_series_categories(&self) -> Result<Vec<ApiCategory>, SyncError> {
        self.get_json(&self.action_url("get_series_categories"))
            .await
    }

    pub async fn get_live_streams(&self) -> Result<Vec<ApiStream>, SyncError> {
        self.get_json(&self.action_url("get_live_streams")).await
    }

    pub async fn get_vod_streams(&self) -> Result<Vec<ApiStream>, SyncError> {
        self.get_json(&self.action_url("get_vod_streams")).await
    }

    pub async fn get_series(&self) -> Result<Vec<ApiSeries>, SyncError> {
        self.get_json(&self.action_url("get_series")).await
    }

    /// Extended metadata for one series: plot, cast, episode list
    pub async fn get_series_info(&self, series_id: i64) -> Result<Value, SyncError> {
        self.get_json(&self.action_url_with_param(
            "get_series_info",
            "series_id",
            &series_id.to_string(),
        ))
        .await
    }

    /// Extended metadata for one movie
    pub async fn get_vod_info(&self, vod_id: i64) -> Result<Value, SyncError> {
        self.get_json(&self.action_url_with_param("get_vod_info", "vod_id", &vod_id.to_string()))
            .await
    }

    pub fn live_stream_url(&self, stream_id: i64) -> String {
        format!(
            "{}/live/{}/{}/{}.ts",
            self.base_url, self.username, self.password, stream_id
        )
    }

    pub fn movie_url(&self, stream_id: i64, extension: Option<&str>) -> String {
        format!(
            "{}/movie/{}/{}/{}.{}",
            self.base_url,
            self.username,
            self.password,
            stream_id,
            extension.unwrap_or("mp4")
        )
    }
}
