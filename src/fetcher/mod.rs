pub mod http_client;
pub mod parsers;

use crate::config::FetcherConfig;
use crate::engine::Window;
use crate::models::{RawHoldingRecord, RawPriceRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use self::http_client::HttpClient;
use self::parsers::{parse_holdings, parse_klines};

// ── Feed trait ────────────────────────────────────────────────────────────────

/// Swappable feed abstraction: holdings published on Connect trading days,
/// prices on HK trading days. No internal retry beyond the HTTP client's
/// transport-level retry — a failure here aborts the run.
#[async_trait]
pub trait DataFeed: Send + Sync {
    async fn fetch_holdings(&self, symbol: &str, window: &Window)
        -> Result<Vec<RawHoldingRecord>>;
    async fn fetch_prices(&self, symbol: &str, window: &Window) -> Result<Vec<RawPriceRecord>>;
}

// ── eastmoney feed ────────────────────────────────────────────────────────────

/// Rows per holdings page; the datacenter API caps page size around here.
const HOLDINGS_PAGE_SIZE: usize = 500;

pub struct EastMoneyFeed {
    client: HttpClient,
    holdings_url: String,
    kline_url: String,
}

impl EastMoneyFeed {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
            holdings_url: config.holdings_url.trim_end_matches('/').to_string(),
            kline_url: config.kline_url.trim_end_matches('/').to_string(),
        })
    }

    /// One page of Southbound holding detail for an HK security.
    fn holdings_query(&self, symbol: &str, page: u32) -> Result<Url> {
        let filter = format!("(SECURITY_CODE=\"{}\")(MUTUAL_TYPE=\"003\")", symbol);
        let page_size = HOLDINGS_PAGE_SIZE.to_string();
        let page_number = page.to_string();
        Url::parse_with_params(
            &self.holdings_url,
            &[
                ("reportName", "RPT_MUTUAL_HOLD_DET"),
                ("columns", "ALL"),
                ("filter", filter.as_str()),
                ("sortColumns", "HOLD_DATE"),
                ("sortTypes", "1"),
                ("pageSize", page_size.as_str()),
                ("pageNumber", page_number.as_str()),
            ],
        )
        .context("Bad holdings URL")
    }

    /// Daily kline for an HK security. secid market prefix 116 = HKEX.
    fn kline_query(&self, symbol: &str, window: &Window) -> Result<Url> {
        let beg = window
            .start
            .map(|d| d.format("%Y%m%d").to_string())
            .unwrap_or_else(|| "0".to_string());
        let end = window
            .end
            .map(|d| d.format("%Y%m%d").to_string())
            .unwrap_or_else(|| "20500101".to_string());

        let secid = format!("116.{}", symbol);
        Url::parse_with_params(
            &self.kline_url,
            &[
                ("secid", secid.as_str()),
                ("klt", "101"),
                ("fqt", "0"),
                ("fields1", "f1,f2,f3,f4,f5,f6"),
                ("fields2", "f51,f52,f53,f54,f55"),
                ("beg", beg.as_str()),
                ("end", end.as_str()),
            ],
        )
        .context("Bad kline URL")
    }
}

#[async_trait]
impl DataFeed for EastMoneyFeed {
    async fn fetch_holdings(
        &self,
        symbol: &str,
        window: &Window,
    ) -> Result<Vec<RawHoldingRecord>> {
        let mut all_records = Vec::new();
        let mut page = 1u32;

        loop {
            let url = self.holdings_query(symbol, page)?;
            debug!("Fetching holdings page {} ({})", page, url);

            let body = self
                .client
                .get_text(url.as_str())
                .await
                .with_context(|| format!("Failed to fetch holdings page {} for {}", page, symbol))?;

            let records = parse_holdings(&body)
                .with_context(|| format!("Failed to parse holdings payload for {}", symbol))?;

            let n = records.len();
            all_records.extend(records);

            // A short page is the last one.
            if n < HOLDINGS_PAGE_SIZE {
                break;
            }

            page += 1;

            if page > 40 {
                warn!("Reached holdings page limit (40), stopping");
                break;
            }
        }

        // The datacenter API has no date filter worth trusting; clamp here.
        all_records.sort_by_key(|r| r.holding_date);
        all_records.retain(|r| window.contains(r.holding_date));
        info!("{}: {} holdings records", symbol, all_records.len());
        Ok(all_records)
    }

    async fn fetch_prices(&self, symbol: &str, window: &Window) -> Result<Vec<RawPriceRecord>> {
        let url = self.kline_query(symbol, window)?;
        debug!("Fetching klines: {}", url);

        let body = self
            .client
            .get_text(url.as_str())
            .await
            .with_context(|| format!("Failed to fetch klines for {}", symbol))?;

        let mut records = parse_klines(&body)
            .with_context(|| format!("Failed to parse kline payload for {}", symbol))?;

        records.retain(|r| window.contains(r.trade_date));
        info!("{}: {} price records", symbol, records.len());
        Ok(records)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, NaiveDate};
    use httpmock::MockServer;

    fn test_config(server: &MockServer) -> FetcherConfig {
        FetcherConfig {
            holdings_url: server.url("/api/data/v1/get"),
            kline_url: server.url("/api/qt/stock/kline/get"),
            timeout_secs: 5,
            request_delay_ms: 0,
            jitter_ms: 0,
            max_retries: 0,
            user_agent: "southbound-etl/test".to_string(),
        }
    }

    /// One holdings page: `rows` consecutive dates starting at `start`.
    fn holdings_page(start: NaiveDate, rows: usize) -> String {
        let data: Vec<String> = (0..rows)
            .map(|i| {
                let date = start + Days::new(i as u64);
                format!(
                    r#"{{"HOLD_DATE": "{} 00:00:00", "HOLD_SHARES": {}.0}}"#,
                    date.format("%Y-%m-%d"),
                    1_000_000 + i
                )
            })
            .collect();
        format!(
            r#"{{"success": true, "message": "ok", "result": {{"data": [{}]}}}}"#,
            data.join(",")
        )
    }

    #[tokio::test]
    async fn test_holdings_pagination_assembles_all_pages() {
        let server = MockServer::start_async().await;
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();

        // A full page means there may be more; the short page ends it.
        let full = server
            .mock_async(|when, then| {
                when.query_param("pageNumber", "1");
                then.status(200).body(holdings_page(start, HOLDINGS_PAGE_SIZE));
            })
            .await;
        let short = server
            .mock_async(|when, then| {
                when.query_param("pageNumber", "2");
                then.status(200).body(holdings_page(
                    start + Days::new(HOLDINGS_PAGE_SIZE as u64),
                    1,
                ));
            })
            .await;

        let feed = EastMoneyFeed::new(&test_config(&server)).unwrap();
        let records = feed
            .fetch_holdings("02015", &Window::default())
            .await
            .unwrap();

        full.assert_async().await;
        short.assert_async().await;
        assert_eq!(records.len(), HOLDINGS_PAGE_SIZE + 1);
        assert!(records
            .windows(2)
            .all(|w| w[0].holding_date < w[1].holding_date));
    }

    #[tokio::test]
    async fn test_short_first_page_stops_pagination() {
        let server = MockServer::start_async().await;
        let start = NaiveDate::from_ymd_opt(2025, 10, 24).unwrap();

        let page = server
            .mock_async(|when, then| {
                when.query_param("pageNumber", "1");
                then.status(200).body(holdings_page(start, 2));
            })
            .await;

        let feed = EastMoneyFeed::new(&test_config(&server)).unwrap();
        let records = feed
            .fetch_holdings("02015", &Window::default())
            .await
            .unwrap();

        page.assert_hits_async(1).await;
        assert_eq!(records.len(), 2);
    }
}
