//! Change detector: compares the freshly computed series against the prior
//! snapshot and keeps only the rows a downstream consumer should react to.
//! Pure comparison — persisting and notifying are the caller's business.

use crate::models::UnifiedRow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which fields make a previously-seen date count as changed.
///
/// `NetIncrease` mirrors the historical behavior: only a moved net-increase
/// is material, so a retroactive price correction alone is not re-reported.
/// `AnyField` widens the comparison to every derived and price field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Materiality {
    #[default]
    NetIncrease,
    AnyField,
}

#[derive(Debug, Clone, Copy)]
pub struct ChangePolicy {
    pub materiality: Materiality,
    pub tolerance: f64,
}

impl Default for ChangePolicy {
    fn default() -> Self {
        Self {
            materiality: Materiality::NetIncrease,
            tolerance: 0.001,
        }
    }
}

/// Rows that are new dates or materially revised existing dates, in the
/// ascending date order of `new_rows`. With no prior snapshot every row is
/// changed (bootstrap).
pub fn diff(
    new_rows: &[UnifiedRow],
    prior: Option<&[UnifiedRow]>,
    policy: &ChangePolicy,
) -> Vec<UnifiedRow> {
    let Some(prior) = prior else {
        return new_rows.to_vec();
    };

    let by_date: HashMap<NaiveDate, &UnifiedRow> = prior.iter().map(|r| (r.date, r)).collect();

    new_rows
        .iter()
        .filter(|row| match by_date.get(&row.date) {
            None => true,
            Some(old) => materially_differs(row, old, policy),
        })
        .cloned()
        .collect()
}

fn materially_differs(new: &UnifiedRow, old: &UnifiedRow, policy: &ChangePolicy) -> bool {
    let tol = policy.tolerance;
    let net_moved = (new.net_increase - old.net_increase).abs() > tol;

    match policy.materiality {
        Materiality::NetIncrease => net_moved,
        Materiality::AnyField => {
            net_moved
                || opt_differs(new.total_holding, old.total_holding, tol)
                || opt_differs(new.open, old.open, tol)
                || opt_differs(new.high, old.high, tol)
                || opt_differs(new.low, old.low, tol)
                || opt_differs(new.close, old.close, tol)
                || opt_differs(new.pct_change, old.pct_change, tol)
        }
    }
}

fn opt_differs(a: Option<f64>, b: Option<f64>, tol: f64) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() > tol,
        (None, None) => false,
        _ => true,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
