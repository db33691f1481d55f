//! HTTP client for the notification REST API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use std::time::Duration;

use super::trait_def::QueryClient;
use crate::notifications::{NotificationFilters, NotificationPage};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session_token";

/// HTTP client for the `/v1/user/notifications` endpoints.
pub struct HttpQueryClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpQueryClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the server (e.g., "http://localhost:3001")
    /// * `session_token` - Session token sent as the `session_token` cookie
    /// * `timeout_sec` - Request timeout in seconds
    pub fn new(base_url: &str, session_token: Option<&str>, timeout_sec: u64) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = session_token {
            let cookie = HeaderValue::from_str(&format!("{}={}", SESSION_COOKIE, token))
                .context("Session token is not a valid header value")?;
            headers.insert(COOKIE, cookie);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        // Ensure base_url doesn't have trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }

    /// Get the base URL of the server.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn notifications_url(&self) -> String {
        format!("{}/v1/user/notifications", self.base_url)
    }

    /// URL of a single notification. The id is percent-encoded into one path segment.
    fn notification_url(&self, id: &str) -> String {
        format!("{}/{}", self.notifications_url(), urlencoding::encode(id))
    }

    async fn expect_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if body.is_empty() {
            anyhow::bail!("Failed to {}: status {}", what, status);
        }
        anyhow::bail!("Failed to {}: status {}: {}", what, status, body)
    }
}

#[async_trait]
impl QueryClient for HttpQueryClient {
    async fn list(&self, filters: &NotificationFilters) -> Result<NotificationPage> {
        let response = self
            .client
            .get(self.notifications_url())
            .query(filters)
            .send()
            .await
            .context("Failed to connect to notification service")?;

        Self::expect_success(response, "list notifications")
            .await?
            .json()
            .await
            .context("Failed to parse notification list response")
    }

    async fn mark_as_read(&self, id: &str) -> Result<()> {
        let url = format!("{}/read", self.notification_url(id));
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .context("Failed to connect to notification service")?;

        Self::expect_success(response, &format!("mark notification {} as read", id)).await?;
        Ok(())
    }

    async fn mark_all_as_read(&self) -> Result<()> {
        let url = format!("{}/read_all", self.notifications_url());
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .context("Failed to connect to notification service")?;

        Self::expect_success(response, "mark all notifications as read").await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let url = self.notification_url(id);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .context("Failed to connect to notification service")?;

        Self::expect_success(response, &format!("delete notification {}", id)).await?;
        Ok(())
    }
}
