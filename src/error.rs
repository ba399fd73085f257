use chrono::NaiveDate;
use thiserror::Error;

/// Which upstream feed a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    Holdings,
    Prices,
}

impl std::fmt::Display for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feed::Holdings => write!(f, "holdings"),
            Feed::Prices => write!(f, "prices"),
        }
    }
}

/// Failures inside the reconciliation engine itself.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Window bounds are malformed; checked before any fetch.
    #[error("invalid window: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    /// A feed supplied more than one record for the same date. The engine
    /// rejects rather than picking a winner, so a broken upstream is loud.
    #[error("{feed} feed supplied more than one record for {date}")]
    DuplicateKey { feed: Feed, date: NaiveDate },
}

/// Run-level failure, split by stage so the caller can tell a fetch failure
/// from a persistence failure — a failed save can be retried without
/// re-fetching, and the prior snapshot stays authoritative either way.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to set up collaborators")]
    Setup(#[source] anyhow::Error),

    #[error("{feed} feed fetch failed")]
    Fetch {
        feed: Feed,
        #[source]
        source: anyhow::Error,
    },

    #[error("reconciliation failed")]
    Engine(#[from] EngineError),

    /// Reading the prior snapshot failed — nothing was computed or written.
    #[error("snapshot load failed")]
    Load(#[source] anyhow::Error),

    /// The run's computation succeeded but the write did not; the prior
    /// snapshot is still authoritative and the write alone can be retried.
    #[error("snapshot persist failed")]
    Persist(#[source] anyhow::Error),
}
