use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use notification_sync::config::{AppConfig, CliConfig, FileConfig, DEFAULT_REQUEST_TIMEOUT_SEC};
use notification_sync::engine::DEFAULT_REALTIME_DELAY;
use notification_sync::notifications::DEFAULT_PAGE_LIMIT;
use notification_sync::{HttpQueryClient, NotificationCache, SyncEngine, WebSocketChannel};

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Its values override the command line.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Base URL of the server (e.g., "http://localhost:3001").
    #[clap(long)]
    pub server_url: Option<String>,

    /// Session token used to authenticate against the server.
    #[clap(long)]
    pub session_token: Option<String>,

    /// Timeout in seconds for query requests.
    #[clap(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SEC)]
    pub request_timeout_sec: u64,

    /// Interval in seconds between polling fetches. 0 disables polling.
    #[clap(long, default_value_t = 0)]
    pub poll_interval_sec: u64,

    /// Delay in milliseconds before the initial fetch.
    #[clap(long, default_value_t = 0)]
    pub fetch_delay_ms: u64,

    /// Delay in milliseconds before connecting the realtime channel.
    #[clap(long, default_value_t = DEFAULT_REALTIME_DELAY.as_millis() as u64)]
    pub realtime_delay_ms: u64,

    /// Do not fetch on startup.
    #[clap(long)]
    pub no_auto_fetch: bool,

    /// Do not connect the realtime channel.
    #[clap(long)]
    pub no_realtime: bool,

    /// Page size of the notification list.
    #[clap(long, default_value_t = DEFAULT_PAGE_LIMIT)]
    pub limit: usize,

    /// Only sync unread notifications.
    #[clap(long)]
    pub unread_only: bool,

    /// Only sync notifications of this type (e.g., "download_completed").
    #[clap(long)]
    pub notification_type: Option<String>,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            server_url: self.server_url.clone(),
            session_token: self.session_token.clone(),
            request_timeout_sec: self.request_timeout_sec,
            poll_interval_sec: self.poll_interval_sec,
            fetch_delay_ms: self.fetch_delay_ms,
            realtime_delay_ms: self.realtime_delay_ms,
            no_auto_fetch: self.no_auto_fetch,
            no_realtime: self.no_realtime,
            limit: self.limit,
            unread_only: self.unread_only,
            notification_type: self.notification_type.clone(),
        }
    }
}

fn log_state(cache: &NotificationCache) {
    if let Some(error) = cache.error() {
        warn!("Notification sync error: {}", error);
    }
    info!(
        "{} notifications shown, total {}, unread {}{}",
        cache.notifications().len(),
        cache.total(),
        cache.unread_count(),
        if cache.loading() { " (loading)" } else { "" }
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!("Syncing notifications from {}", config.server_url);
    let query = Arc::new(HttpQueryClient::new(
        &config.server_url,
        config.session_token.as_deref(),
        config.request_timeout_sec,
    )?);
    let channel = Arc::new(WebSocketChannel::new(
        &config.server_url,
        config.session_token.clone(),
    ));

    let engine = SyncEngine::start(config.engine, query, channel);
    let mut state = engine.subscribe();
    let mut connection = engine.subscribe_connection();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, stopping");
                break;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                log_state(&state.borrow_and_update());
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                info!("Realtime channel is {}", *connection.borrow_and_update());
            }
        }
    }

    engine.shutdown().await;
    Ok(())
}
