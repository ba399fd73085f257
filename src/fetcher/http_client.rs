use crate::config::FetcherConfig;
use anyhow::{Context, Result};
use rand::RngExt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

pub struct HttpClient {
    inner: reqwest::Client,
    config: FetcherConfig,
}

#[derive(Debug, Error)]
enum AttemptError {
    #[error("request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),
}

impl AttemptError {
    /// Transport failures and throttling responses are worth retrying;
    /// other HTTP errors are not.
    fn retryable(&self) -> bool {
        match self {
            AttemptError::Transport(_) => true,
            AttemptError::Status(status) => status.as_u16() == 429 || status.as_u16() == 503,
        }
    }
}

impl HttpClient {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Accept cookies so session-based endpoints work
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    /// Fetch a URL as text with rate-limiting and retry on transient failures.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.polite_delay().await;

        let strategy = ExponentialBackoff::from_millis(self.config.request_delay_ms.max(1))
            .max_delay(Duration::from_secs(30))
            .map(jitter)
            .take(self.config.max_retries as usize);

        RetryIf::spawn(strategy, || self.attempt_get(url), AttemptError::retryable)
            .await
            .with_context(|| format!("All retries exhausted for {}", url))
    }

    async fn attempt_get(&self, url: &str) -> Result<String, AttemptError> {
        debug!("GET {}", url);

        let resp = self.inner.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            if status.as_u16() == 429 || status.as_u16() == 503 {
                warn!("Rate limited ({}) on {}", status, url);
            }
            return Err(AttemptError::Status(status));
        }

        Ok(resp.text().await?)
    }

    /// Sleep for the configured delay + random jitter.
    async fn polite_delay(&self) {
        let jitter_ms = rand::rng().random_range(0..=self.config.jitter_ms);
        let total = Duration::from_millis(self.config.request_delay_ms + jitter_ms);
        sleep(total).await;
    }
}
