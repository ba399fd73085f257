use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ── Raw feed records ──────────────────────────────────────────────────────────

/// One row of the Southbound holdings feed (published on Connect trading days).
/// `quantity` is the absolute share count held through the Connect channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHoldingRecord {
    pub holding_date: NaiveDate,
    pub quantity: i64,
}

/// One row of the HK daily price feed (published on HK trading days).
/// Any OHLC field may be missing upstream; missing prices stay missing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPriceRecord {
    pub trade_date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
}

// ── Reconciled rows ───────────────────────────────────────────────────────────

/// Merged-but-underived row: one calendar date with whatever each feed
/// supplied for it. Output of the calendar reconciler, input to derivation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialRow {
    pub date: NaiveDate,
    pub holding_quantity: Option<i64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
}

/// Final per-date record of the unified series.
///
/// `holding_quantity` is the forward-filled share count (null only before
/// the first holdings record). `net_increase` is the day-over-day change in
/// ten-thousands of shares, zero where the difference is undefined.
/// `total_holding` is the filled quantity in hundred-millions of shares.
/// Prices are carried verbatim from the price feed — never filled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnifiedRow {
    pub date: NaiveDate,
    pub holding_quantity: Option<i64>,
    pub net_increase: f64,
    pub total_holding: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub pct_change: Option<f64>,
}
