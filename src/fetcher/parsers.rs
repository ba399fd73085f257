//! Payload parsing for the two eastmoney endpoints. A payload that is not
//! valid JSON is a fetch error; an individual malformed row is warned about
//! and skipped.

use crate::models::{RawHoldingRecord, RawPriceRecord};
use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::warn;

// ── Holdings (datacenter-web API) ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct HoldingsResponse {
    result: Option<HoldingsResult>,
    #[serde(default)]
    success: bool,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HoldingsResult {
    #[serde(default)]
    data: Vec<HoldingPayload>,
}

/// `HOLD_SHARES` is the absolute Connect share count for `HOLD_DATE`.
#[derive(Debug, Deserialize)]
struct HoldingPayload {
    #[serde(rename = "HOLD_DATE")]
    hold_date: Option<String>,
    #[serde(rename = "HOLD_SHARES")]
    hold_shares: Option<f64>,
}

pub fn parse_holdings(body: &str) -> Result<Vec<RawHoldingRecord>> {
    let resp: HoldingsResponse =
        serde_json::from_str(body).context("Holdings payload is not valid JSON")?;

    if !resp.success {
        bail!(
            "Holdings API reported failure: {}",
            resp.message.as_deref().unwrap_or("no message")
        );
    }

    // A null result means no rows for the filter, not an error.
    let Some(result) = resp.result else {
        return Ok(vec![]);
    };

    let mut records = Vec::with_capacity(result.data.len());
    for payload in &result.data {
        let Some(date) = payload.hold_date.as_deref().and_then(parse_date) else {
            warn!("Skipping holdings row with bad date: {:?}", payload.hold_date);
            continue;
        };
        let Some(shares) = payload.hold_shares else {
            warn!("Skipping holdings row for {} with no share count", date);
            continue;
        };

        records.push(RawHoldingRecord {
            holding_date: date,
            quantity: shares.round() as i64,
        });
    }

    records.sort_by_key(|r| r.holding_date);
    Ok(records)
}

// ── Prices (kline API) ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct KlineResponse {
    data: Option<KlineData>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    #[serde(default)]
    klines: Vec<String>,
}

pub fn parse_klines(body: &str) -> Result<Vec<RawPriceRecord>> {
    let resp: KlineResponse =
        serde_json::from_str(body).context("Kline payload is not valid JSON")?;

    let Some(data) = resp.data else {
        return Ok(vec![]);
    };

    let mut records = Vec::with_capacity(data.klines.len());
    for line in &data.klines {
        match parse_kline_row(line) {
            Some(rec) => records.push(rec),
            None => warn!("Skipping malformed kline row: {:?}", line),
        }
    }

    records.sort_by_key(|r| r.trade_date);
    Ok(records)
}

/// One kline row: `date,open,close,high,low[,volume,…]` — comma-separated.
pub fn parse_kline_row(line: &str) -> Option<RawPriceRecord> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 5 {
        return None;
    }

    let trade_date = parse_date(fields[0])?;

    Some(RawPriceRecord {
        trade_date,
        open: parse_price(fields[1]),
        close: parse_price(fields[2]),
        high: parse_price(fields[3]),
        low: parse_price(fields[4]),
    })
}

// ── Field parsers ─────────────────────────────────────────────────────────────

/// Parse price: strip everything except digits, dot, minus.
/// "1,234.56" → 1234.56 | "-" → None
pub fn parse_price(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || s == "N/A" || s == "-" || s == "—" {
        return None;
    }
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse().ok()
}

/// Parse dates: "2025-10-24" or "2025-10-24 00:00:00" (datacenter timestamps)
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }

    None
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, day).unwrap()
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2025-10-24"), Some(d(24)));
        assert_eq!(parse_date("2025-10-24 00:00:00"), Some(d(24)));
        assert_eq!(parse_date("24/10/2025"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("91.05"), Some(91.05));
        assert_eq!(parse_price("1,234.56"), Some(1234.56));
        assert_eq!(parse_price("-2.5"), Some(-2.5));
        assert_eq!(parse_price("-"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn test_parse_kline_row() {
        let rec = parse_kline_row("2025-10-24,91.05,92.30,93.00,90.10,12345,999").unwrap();
        assert_eq!(rec.trade_date, d(24));
        assert_eq!(rec.open, Some(91.05));
        assert_eq!(rec.close, Some(92.30));
        assert_eq!(rec.high, Some(93.00));
        assert_eq!(rec.low, Some(90.10));

        // Too few fields
        assert!(parse_kline_row("2025-10-24,91.05").is_none());
        // Garbage date
        assert!(parse_kline_row("soon,91.05,92.30,93.00,90.10").is_none());
    }

    #[test]
    fn test_parse_holdings_payload() {
        let body = r#"{
            "success": true,
            "message": "ok",
            "result": { "data": [
                {"HOLD_DATE": "2025-10-27 00:00:00", "HOLD_SHARES": 1050000.0},
                {"HOLD_DATE": "2025-10-24 00:00:00", "HOLD_SHARES": 1000000.0},
                {"HOLD_DATE": null, "HOLD_SHARES": 5.0}
            ]}
        }"#;

        let records = parse_holdings(body).unwrap();
        assert_eq!(records.len(), 2);
        // Sorted ascending regardless of payload order
        assert_eq!(records[0].holding_date, d(24));
        assert_eq!(records[0].quantity, 1_000_000);
        assert_eq!(records[1].holding_date, d(27));
    }

    #[test]
    fn test_parse_holdings_null_result_is_empty() {
        let body = r#"{"success": true, "message": "ok", "result": null}"#;
        assert!(parse_holdings(body).unwrap().is_empty());
    }

    #[test]
    fn test_parse_holdings_failure_flag() {
        let body = r#"{"success": false, "message": "param error", "result": null}"#;
        assert!(parse_holdings(body).is_err());
    }

    #[test]
    fn test_parse_klines_skips_bad_rows() {
        let body = r#"{"data": {"klines": [
            "2025-10-24,91.05,92.30,93.00,90.10",
            "not a row",
            "2025-10-27,92.00,92.50,93.10,91.80"
        ]}}"#;
        let records = parse_klines(body).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_parse_klines_not_json_is_error() {
        assert!(parse_klines("<html>blocked</html>").is_err());
    }
}
