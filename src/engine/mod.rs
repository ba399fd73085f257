//! The reconciliation engine: calendar merge, gap-fill/derivation, and
//! change detection. Every function here is pure — feeds in, rows out —
//! so each stage is testable without any collaborator.

pub mod derive;
pub mod diff;
pub mod reconcile;

pub use derive::derive;
pub use diff::{diff, ChangePolicy, Materiality};
pub use reconcile::{reconcile, JoinPolicy};

use crate::error::EngineError;
use chrono::NaiveDate;

/// Inclusive date window. An open bound means "no limit on that side".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl Window {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// Reject `start > end` before any fetch happens.
    pub fn validate(&self) -> Result<(), EngineError> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(EngineError::InvalidRange { start, end });
            }
        }
        Ok(())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }
}
