mod file_config;

pub use file_config::{FileConfig, FiltersConfig, SyncConfig};

use crate::cache::OffFilterPushPolicy;
use crate::engine::{EngineConfig, DEFAULT_REALTIME_DELAY};
use crate::notifications::{NotificationFilters, NotificationType, DEFAULT_PAGE_LIMIT};
use anyhow::{bail, Context, Result};
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT_SEC: u64 = 30;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub server_url: Option<String>,
    pub session_token: Option<String>,
    pub request_timeout_sec: u64,
    pub poll_interval_sec: u64,
    pub fetch_delay_ms: u64,
    pub realtime_delay_ms: u64,
    pub no_auto_fetch: bool,
    pub no_realtime: bool,
    pub limit: usize,
    pub unread_only: bool,
    pub notification_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_url: String,
    pub session_token: Option<String>,
    pub request_timeout_sec: u64,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let server_url = file
            .server_url
            .or_else(|| cli.server_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("server_url must be specified via --server-url or in config file")
            })?;
        if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
            bail!("server_url must be an http or https URL: {}", server_url);
        }

        let session_token = file.session_token.or_else(|| cli.session_token.clone());

        let request_timeout_sec = file
            .request_timeout_sec
            .unwrap_or(cli.request_timeout_sec);
        if request_timeout_sec == 0 {
            bail!("request_timeout_sec must be greater than 0");
        }

        // Filters - merge file config with CLI
        let filters_file = file.filters.unwrap_or_default();
        let limit = filters_file.limit.unwrap_or(cli.limit);
        if limit == 0 {
            bail!("limit must be greater than 0");
        }
        let read = filters_file
            .read
            .or(if cli.unread_only { Some(false) } else { None });
        let notification_type = filters_file
            .notification_type
            .or_else(|| cli.notification_type.clone())
            .map(|tag| parse_notification_type(&tag))
            .transpose()?;
        let initial_filters = NotificationFilters {
            skip: filters_file.skip.unwrap_or(0),
            limit,
            read,
            notification_type,
        };

        // Sync settings
        let sync_file = file.sync.unwrap_or_default();
        let poll_interval_sec = sync_file.poll_interval_sec.unwrap_or(cli.poll_interval_sec);
        let off_filter_push_policy = match sync_file.count_off_filter_pushes {
            Some(false) => OffFilterPushPolicy::Ignore,
            _ => OffFilterPushPolicy::CountInAggregates,
        };
        let engine = EngineConfig {
            initial_filters,
            poll_interval: (poll_interval_sec > 0).then(|| Duration::from_secs(poll_interval_sec)),
            auto_fetch: sync_file.auto_fetch.unwrap_or(!cli.no_auto_fetch),
            fetch_delay: Duration::from_millis(sync_file.fetch_delay_ms.unwrap_or(cli.fetch_delay_ms)),
            enable_realtime: sync_file.enable_realtime.unwrap_or(!cli.no_realtime),
            realtime_delay: Duration::from_millis(
                sync_file.realtime_delay_ms.unwrap_or(cli.realtime_delay_ms),
            ),
            off_filter_push_policy,
        };

        Ok(Self {
            server_url,
            session_token,
            request_timeout_sec,
            engine,
        })
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            session_token: None,
            request_timeout_sec: DEFAULT_REQUEST_TIMEOUT_SEC,
            poll_interval_sec: 0,
            fetch_delay_ms: 0,
            realtime_delay_ms: DEFAULT_REALTIME_DELAY.as_millis() as u64,
            no_auto_fetch: false,
            no_realtime: false,
            limit: DEFAULT_PAGE_LIMIT,
            unread_only: false,
            notification_type: None,
        }
    }
}

fn parse_notification_type(tag: &str) -> Result<NotificationType> {
    let parsed: NotificationType = serde_json::from_value(serde_json::Value::String(tag.to_string()))
        .with_context(|| format!("Invalid notification type: {}", tag))?;
    if parsed == NotificationType::Other && tag != NotificationType::Other.as_str() {
        bail!("Unknown notification type: {}", tag);
    }
    Ok(parsed)
}
