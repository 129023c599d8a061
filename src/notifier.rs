//! Webhook delivery of spot notifications.
//!
//! Each notification is a single POST of `{"content": "..."}`, the body
//! shape Discord webhooks accept. There are no retries: a failed delivery is
//! logged and dropped.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

/// Default timeout for a single webhook request.
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest response body echoed into the logs on failure.
const MAX_LOGGED_BODY: usize = 300;

/// Configuration for the [`Notifier`].
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Webhook endpoint receiving the POST.
    pub webhook_url: String,

    /// Log messages instead of sending them.
    pub dry_run: bool,

    /// Timeout for the whole request.
    pub timeout: Duration,
}

impl NotifierConfig {
    /// Configuration that only logs; useful without live credentials.
    pub fn dry_run() -> Self {
        Self {
            webhook_url: String::new(),
            dry_run: true,
            timeout: DEFAULT_WEBHOOK_TIMEOUT,
        }
    }
}

/// Reasons a delivery did not succeed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("status {status}, body={body:?}")]
    Status { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

/// Posts notifications to the configured webhook.
#[derive(Debug, Clone)]
pub struct Notifier {
    config: NotifierConfig,
    client: Client,
}

impl Notifier {
    /// Build a notifier with its own HTTP client.
    pub fn new(config: NotifierConfig) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    /// Deliver one message, returning whether it was accepted.
    ///
    /// Failures are logged here; callers only need the outcome.
    pub async fn deliver(&self, message: &str) -> bool {
        if self.config.dry_run {
            info!("[DRY_RUN] Would post to webhook:\n{}", message);
            return true;
        }

        match self.post(message).await {
            Ok(status) => {
                info!("Webhook sent (status {})", status.as_u16());
                true
            }
            Err(DeliveryError::Status { status, body }) => {
                error!(
                    "Webhook failed (status {}, body={:?})",
                    status.as_u16(),
                    body
                );
                false
            }
            Err(e) => {
                error!("Webhook exception: {}", e);
                false
            }
        }
    }

    async fn post(&self, message: &str) -> Result<StatusCode, DeliveryError> {
        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&WebhookPayload { content: message })
            .send()
            .await?;

        let status = response.status();
        // 2xx includes 202 Accepted and Discord's usual 204 No Content
        if status.is_success() {
            return Ok(status);
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_LOGGED_BODY {
            let cut = (0..=MAX_LOGGED_BODY)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            body.truncate(cut);
        }
        Err(DeliveryError::Status { status, body })
    }
}
