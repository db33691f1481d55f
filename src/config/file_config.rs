use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Connection settings (can override CLI)
    pub server_url: Option<String>,
    pub session_token: Option<String>,
    pub request_timeout_sec: Option<u64>,

    // Feature configs
    pub sync: Option<SyncConfig>,
    pub filters: Option<FiltersConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub auto_fetch: Option<bool>,
    pub fetch_delay_ms: Option<u64>,
    /// 0 disables polling.
    pub poll_interval_sec: Option<u64>,
    pub enable_realtime: Option<bool>,
    pub realtime_delay_ms: Option<u64>,
    /// Whether unread pushes outside the active filter still bump the counters.
    pub count_off_filter_pushes: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct FiltersConfig {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    pub read: Option<bool>,
    pub notification_type: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
