//! Outbound delivery of the changed-row subset. The pipeline decides *what*
//! changed; a notifier only decides *how* to deliver it.

use crate::config::NotifierConfig;
use crate::models::UnifiedRow;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;
use url::Url;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Invoked only with the change detector's output, never the full series.
    async fn notify(&self, symbol: &str, changed: &[UnifiedRow]) -> Result<()>;
}

/// Build the notifier the config asks for: webhook when a URL is set,
/// log-only otherwise.
pub fn from_config(config: &NotifierConfig) -> Result<Box<dyn Notifier>> {
    match &config.webhook_url {
        Some(url) => Ok(Box::new(WebhookNotifier::new(url, config.timeout_secs)?)),
        None => Ok(Box::new(LogNotifier)),
    }
}

// ── Log notifier ──────────────────────────────────────────────────────────────

/// Default delivery: one log line per changed row.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, symbol: &str, changed: &[UnifiedRow]) -> Result<()> {
        for row in changed {
            info!(
                "{} {}: net {:+.2}, total {}, close {}",
                symbol,
                row.date,
                row.net_increase,
                row.total_holding
                    .map(|t| format!("{:.4}", t))
                    .unwrap_or_else(|| "—".into()),
                row.close
                    .map(|c| format!("{:.2}", c))
                    .unwrap_or_else(|| "—".into()),
            );
        }
        Ok(())
    }
}

// ── Webhook notifier ──────────────────────────────────────────────────────────

/// POSTs the changed subset as JSON to a configured endpoint.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build webhook client")?;
        let url = Url::parse(url).with_context(|| format!("Bad webhook URL {:?}", url))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, symbol: &str, changed: &[UnifiedRow]) -> Result<()> {
        if changed.is_empty() {
            return Ok(());
        }

        let body = serde_json::json!({
            "symbol": symbol,
            "changed_rows": changed,
        });

        let resp = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .context("Webhook request failed")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("Webhook returned HTTP {}", status);
        }

        info!("Webhook delivered {} changed rows for {}", changed.len(), symbol);
        Ok(())
    }
}
