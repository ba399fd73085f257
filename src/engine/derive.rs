//! Gap-fill and derivation: forward-fills the holdings quantity across
//! calendar gaps and computes the per-day metrics. Prices are never filled —
//! a day the exchange published nothing stays empty.

use crate::config::EngineConfig;
use crate::models::{PartialRow, UnifiedRow};

/// Single linear pass over the reconciled rows (sorted ascending by date).
///
/// - `holding_quantity`: forward-filled; a run of nulls before the first
///   holdings record stays null (no backward fill).
/// - `net_increase`: first difference of the filled quantity, divided by
///   `net_increase_scale`; zero at the first row and wherever either side
///   of the difference is null.
/// - `total_holding`: filled quantity divided by `total_holding_scale`;
///   null while the quantity is null.
/// - `pct_change`: close-over-previous-close percentage, 2 decimals; null
///   when either close is missing or the previous close is zero; zero at
///   the first row when a close exists.
pub fn derive(rows: Vec<PartialRow>, cfg: &EngineConfig) -> Vec<UnifiedRow> {
    let mut out = Vec::with_capacity(rows.len());
    let mut last_holding: Option<i64> = None;
    let mut prev_close: Option<f64> = None;

    for (i, row) in rows.into_iter().enumerate() {
        let prev_holding = last_holding;
        let filled = row.holding_quantity.or(last_holding);

        let net_increase = if i == 0 {
            0.0
        } else {
            match (filled, prev_holding) {
                (Some(cur), Some(prev)) => (cur - prev) as f64 / cfg.net_increase_scale,
                _ => 0.0,
            }
        };

        let total_holding = filled.map(|q| q as f64 / cfg.total_holding_scale);

        let pct_change = if i == 0 {
            row.close.map(|_| 0.0)
        } else {
            match (row.close, prev_close) {
                (Some(cur), Some(prev)) if prev != 0.0 => {
                    Some(round2((cur - prev) / prev * 100.0))
                }
                _ => None,
            }
        };

        out.push(UnifiedRow {
            date: row.date,
            holding_quantity: filled,
            net_increase,
            total_holding,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            pct_change,
        });

        last_holding = filled;
        prev_close = row.close;
    }

    out
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// ── Tests ─────────────────────────────────────────────────────────────────────
