use crate::engine::{JoinPolicy, Materiality};
use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub fetcher: FetcherConfig,
    pub engine: EngineConfig,
    pub storage: StorageConfig,
    pub notifier: NotifierConfig,
}

/// Feed client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetcherConfig {
    #[serde(default = "default_holdings_url")]
    pub holdings_url: String,

    #[serde(default = "default_kline_url")]
    pub kline_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Reconciliation engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Inclusive window start; None = from the beginning of the feeds.
    #[serde(default)]
    pub window_start: Option<NaiveDate>,

    /// Inclusive window end; None = through today.
    #[serde(default)]
    pub window_end: Option<NaiveDate>,

    #[serde(default)]
    pub join: JoinPolicy,

    /// Divisor for net_increase display units (ten-thousands of shares).
    #[serde(default = "default_net_increase_scale")]
    pub net_increase_scale: f64,

    /// Divisor for total_holding display units (hundred-millions of shares).
    #[serde(default = "default_total_holding_scale")]
    pub total_holding_scale: f64,

    #[serde(default)]
    pub materiality: Materiality,

    /// Absolute net_increase difference (display units) above which a
    /// previously-seen date counts as changed.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Notifier configuration — no webhook URL means log-only delivery.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_holdings_url() -> String {
    "https://datacenter-web.eastmoney.com/api/data/v1/get".to_string()
}
fn default_kline_url() -> String {
    "https://push2his.eastmoney.com/api/qt/stock/kline/get".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_request_delay_ms() -> u64 {
    1000
}
fn default_jitter_ms() -> u64 {
    400
}
fn default_max_retries() -> u32 {
    3
}
fn default_user_agent() -> String {
    "southbound-etl/0.1 (personal research tracker)".to_string()
}
fn default_symbol() -> String {
    "02015".to_string()
}
fn default_net_increase_scale() -> f64 {
    10_000.0
}
fn default_total_holding_scale() -> f64 {
    100_000_000.0
}
fn default_tolerance() -> f64 {
    0.001
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/southbound.duckdb")
}
fn default_true() -> bool {
    true
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("SBT").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|_| AppConfig::default());
        Ok(app_cfg)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fetcher: FetcherConfig {
                holdings_url: default_holdings_url(),
                kline_url: default_kline_url(),
                timeout_secs: default_timeout_secs(),
                request_delay_ms: default_request_delay_ms(),
                jitter_ms: default_jitter_ms(),
                max_retries: default_max_retries(),
                user_agent: default_user_agent(),
            },
            engine: EngineConfig {
                symbol: default_symbol(),
                window_start: None,
                window_end: None,
                join: JoinPolicy::default(),
                net_increase_scale: default_net_increase_scale(),
                total_holding_scale: default_total_holding_scale(),
                materiality: Materiality::default(),
                tolerance: default_tolerance(),
            },
            storage: StorageConfig {
                db_path: default_db_path(),
                run_migrations: true,
            },
            notifier: NotifierConfig {
                webhook_url: None,
                timeout_secs: default_timeout_secs(),
            },
        }
    }
}
