//! Calendar reconciler: merges the holdings calendar and the price calendar
//! into one date axis. The join key is the date itself — no tolerance, no
//! fuzzy matching.

use super::Window;
use crate::error::{EngineError, Feed};
use crate::models::{PartialRow, RawHoldingRecord, RawPriceRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How the two calendars are joined.
///
/// `Union` keeps every date either feed publishes (outer join).
/// `PriceAnchored` keeps only dates on the price calendar, so a holdings
/// record on a day the local exchange was closed is dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPolicy {
    #[default]
    Union,
    PriceAnchored,
}

/// Merge both feeds into one date-sorted sequence of partial rows.
///
/// Each feed may supply at most one record per date; a second record for
/// the same date is rejected with [`EngineError::DuplicateKey`] naming the
/// offending feed. An empty window or empty inputs yield an empty output.
pub fn reconcile(
    holdings: &[RawHoldingRecord],
    prices: &[RawPriceRecord],
    window: &Window,
    join: JoinPolicy,
) -> Result<Vec<PartialRow>, EngineError> {
    window.validate()?;

    check_unique(
        holdings
            .iter()
            .map(|h| h.holding_date)
            .filter(|d| window.contains(*d)),
        Feed::Holdings,
    )?;
    check_unique(
        prices
            .iter()
            .map(|p| p.trade_date)
            .filter(|d| window.contains(*d)),
        Feed::Prices,
    )?;

    let mut rows: BTreeMap<NaiveDate, PartialRow> = prices
        .iter()
        .filter(|p| window.contains(p.trade_date))
        .map(|p| {
            (
                p.trade_date,
                PartialRow {
                    date: p.trade_date,
                    holding_quantity: None,
                    open: p.open,
                    high: p.high,
                    low: p.low,
                    close: p.close,
                },
            )
        })
        .collect();

    for h in holdings.iter().filter(|h| window.contains(h.holding_date)) {
        match join {
            JoinPolicy::Union => {
                rows.entry(h.holding_date)
                    .or_insert_with(|| PartialRow {
                        date: h.holding_date,
                        ..Default::default()
                    })
                    .holding_quantity = Some(h.quantity);
            }
            JoinPolicy::PriceAnchored => {
                if let Some(row) = rows.get_mut(&h.holding_date) {
                    row.holding_quantity = Some(h.quantity);
                }
            }
        }
    }

    // BTreeMap iteration is already ascending by date.
    Ok(rows.into_values().collect())
}

fn check_unique(
    dates: impl Iterator<Item = NaiveDate>,
    feed: Feed,
) -> Result<(), EngineError> {
    let mut seen = BTreeSet::new();
    for date in dates {
        if !seen.insert(date) {
            return Err(EngineError::DuplicateKey { feed, date });
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
