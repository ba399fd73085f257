use crate::models::UnifiedRow;
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use duckdb::{params, Connection};
use std::path::Path;
use tracing::info;

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS snapshot_rows (
    symbol           VARCHAR  NOT NULL,
    date             DATE     NOT NULL,
    holding_quantity BIGINT,
    -- Display units: ten-thousands of shares
    net_increase     DOUBLE   NOT NULL,
    -- Display units: hundred-millions of shares
    total_holding    DOUBLE,
    open             DOUBLE,
    high             DOUBLE,
    low              DOUBLE,
    close            DOUBLE,
    pct_change       DOUBLE,
    computed_at      TIMESTAMP NOT NULL,
    PRIMARY KEY (symbol, date)
);

CREATE TABLE IF NOT EXISTS etl_runs (
    id              INTEGER PRIMARY KEY,
    started_at      TIMESTAMP NOT NULL,
    finished_at     TIMESTAMP,
    status          VARCHAR NOT NULL DEFAULT 'running',
    rows_total      INTEGER DEFAULT 0,
    rows_changed    INTEGER DEFAULT 0,
    error_msg       VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_snapshot_date ON snapshot_rows (date);
"#;

// ── Store interface ───────────────────────────────────────────────────────────

/// What the pipeline needs from persistence: read the prior snapshot once,
/// replace it wholesale, and keep the run log. The DuckDB store below is
/// the production implementation.
pub trait SnapshotBackend {
    fn load(&self, symbol: &str) -> Result<Option<Vec<UnifiedRow>>>;
    fn replace(&self, symbol: &str, rows: &[UnifiedRow]) -> Result<usize>;
    fn begin_run(&self) -> Result<i64>;
    fn finish_run(
        &self,
        run_id: i64,
        rows_total: usize,
        rows_changed: usize,
        error: Option<&str>,
    ) -> Result<()>;
}

// ── Snapshot store ────────────────────────────────────────────────────────────

/// Persisted unified series. The snapshot path is an explicit constructor
/// argument — there is no ambient default location.
pub struct SnapshotStore {
    conn: Connection,
}

impl SnapshotStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL).context("DDL failed")?;
        self.conn.execute_batch(INDEXES).context("Index creation failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Snapshot ──────────────────────────────────────────────────────────────

    /// Load the prior snapshot for a symbol, ascending by date.
    /// None when nothing has been persisted yet (first run).
    pub fn load(&self, symbol: &str) -> Result<Option<Vec<UnifiedRow>>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT date, holding_quantity, net_increase, total_holding,
                      open, high, low, close, pct_change
               FROM snapshot_rows WHERE symbol = ? ORDER BY date"#,
        )?;

        let rows: Vec<UnifiedRow> = stmt
            .query_map(params![symbol], |r| {
                Ok(UnifiedRow {
                    date: r.get(0)?,
                    holding_quantity: r.get(1)?,
                    net_increase: r.get(2)?,
                    total_holding: r.get(3)?,
                    open: r.get(4)?,
                    high: r.get(5)?,
                    low: r.get(6)?,
                    close: r.get(7)?,
                    pct_change: r.get(8)?,
                })
            })?
            .collect::<Result<_, _>>()
            .context("Failed to read snapshot rows")?;

        Ok(if rows.is_empty() { None } else { Some(rows) })
    }

    /// Replace the persisted snapshot wholesale. One transaction: either the
    /// new series lands completely or the prior snapshot survives untouched.
    pub fn replace(&self, symbol: &str, rows: &[UnifiedRow]) -> Result<usize> {
        let now = Utc::now().naive_utc();

        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM snapshot_rows WHERE symbol = ?", params![symbol])?;

        let sql = r#"
            INSERT INTO snapshot_rows
                (symbol, date, holding_quantity, net_increase, total_holding,
                 open, high, low, close, pct_change, computed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        for row in rows {
            tx.execute(sql, params![
                symbol, row.date,
                row.holding_quantity, row.net_increase, row.total_holding,
                row.open, row.high, row.low, row.close, row.pct_change,
                now,
            ])
            .with_context(|| format!("insert snapshot row {} {}", symbol, row.date))?;
        }

        tx.commit()?;
        Ok(rows.len())
    }

    // ── Stats ─────────────────────────────────────────────────────────────────

    pub fn row_count(&self, symbol: &str) -> Result<i64> {
        let mut s = self
            .conn
            .prepare("SELECT COUNT(*) FROM snapshot_rows WHERE symbol = ?")?;
        Ok(s.query_row(params![symbol], |r| r.get(0))?)
    }

    pub fn date_range(&self, symbol: &str) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
        let mut s = self
            .conn
            .prepare("SELECT MIN(date), MAX(date) FROM snapshot_rows WHERE symbol = ?")?;
        Ok(s.query_row(params![symbol], |r| Ok((r.get(0)?, r.get(1)?)))?)
    }

    // ── Run log ───────────────────────────────────────────────────────────────

    pub fn begin_run(&self) -> Result<i64> {
        let next_id: i64 = self
            .conn
            .query_row("SELECT COALESCE(MAX(id), 0) + 1 FROM etl_runs", [], |r| r.get(0))?;
        self.conn.execute(
            "INSERT INTO etl_runs (id, started_at, status) VALUES (?, ?, 'running')",
            params![next_id, Utc::now().naive_utc()],
        )?;
        Ok(next_id)
    }

    pub fn finish_run(
        &self,
        run_id: i64,
        rows_total: usize,
        rows_changed: usize,
        error: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            r#"UPDATE etl_runs SET
               finished_at = ?, status = ?,
               rows_total = ?, rows_changed = ?, error_msg = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if error.is_none() { "success" } else { "error" },
                rows_total as i64, rows_changed as i64, error, run_id,
            ],
        )?;
        Ok(())
    }
}

impl SnapshotBackend for SnapshotStore {
    fn load(&self, symbol: &str) -> Result<Option<Vec<UnifiedRow>>> {
        SnapshotStore::load(self, symbol)
    }

    fn replace(&self, symbol: &str, rows: &[UnifiedRow]) -> Result<usize> {
        SnapshotStore::replace(self, symbol, rows)
    }

    fn begin_run(&self) -> Result<i64> {
        SnapshotStore::begin_run(self)
    }

    fn finish_run(
        &self,
        run_id: i64,
        rows_total: usize,
        rows_changed: usize,
        error: Option<&str>,
    ) -> Result<()> {
        SnapshotStore::finish_run(self, run_id, rows_total, rows_changed, error)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
