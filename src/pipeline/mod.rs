//! Pipeline orchestrator: feeds → reconcile → derive → diff → persist → notify.
//!
//! Each run is a full recomputation over the configured window, not an
//! incremental append. The snapshot replace is transactional, so a failed
//! run leaves the prior snapshot authoritative, and re-running on identical
//! upstream data writes an identical snapshot with an empty change set.

use crate::config::AppConfig;
use crate::engine::{derive, diff, reconcile, ChangePolicy, Window};
use crate::error::{Feed, RunError};
use crate::fetcher::{DataFeed, EastMoneyFeed};
use crate::notifier::{self, Notifier};
use crate::storage::{SnapshotBackend, SnapshotStore};
use tracing::{info, warn};

pub struct Pipeline {
    config: AppConfig,
}

#[derive(Debug)]
pub struct RunStats {
    pub rows_total: usize,
    pub rows_changed: usize,
    pub notified: bool,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Daily mode (default / cron use): build the production collaborators
    /// and run once to completion.
    pub async fn run(&self) -> Result<RunStats, RunError> {
        let store = SnapshotStore::open(&self.config.storage.db_path).map_err(RunError::Setup)?;
        if self.config.storage.run_migrations {
            store.run_migrations().map_err(RunError::Setup)?;
        }

        let feed = EastMoneyFeed::new(&self.config.fetcher).map_err(RunError::Setup)?;
        let notifier = notifier::from_config(&self.config.notifier).map_err(RunError::Setup)?;

        self.run_with(&feed, &store, notifier.as_ref()).await
    }

    /// Run against explicit collaborators.
    pub async fn run_with(
        &self,
        feed: &dyn DataFeed,
        store: &dyn SnapshotBackend,
        notifier: &dyn Notifier,
    ) -> Result<RunStats, RunError> {
        let cfg = &self.config.engine;
        let window = Window::new(cfg.window_start, cfg.window_end);

        // Malformed bounds abort before any fetch.
        window.validate()?;

        // A broken run log shouldn't stop the run itself.
        let run_id = match store.begin_run() {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Could not record run start: {:#}", e);
                None
            }
        };

        info!("=== Step 1: Fetching feeds for {} ===", cfg.symbol);
        let holdings = feed
            .fetch_holdings(&cfg.symbol, &window)
            .await
            .map_err(|e| RunError::Fetch { feed: Feed::Holdings, source: e })?;
        let prices = feed
            .fetch_prices(&cfg.symbol, &window)
            .await
            .map_err(|e| RunError::Fetch { feed: Feed::Prices, source: e })?;

        info!("=== Step 2: Reconciling calendars ===");
        let partial = reconcile(&holdings, &prices, &window, cfg.join)?;
        let rows = derive(partial, cfg);

        info!("=== Step 3: Detecting changes ===");
        // The prior snapshot is read exactly once per run.
        let prior = store.load(&cfg.symbol).map_err(RunError::Load)?;
        let policy = ChangePolicy {
            materiality: cfg.materiality,
            tolerance: cfg.tolerance,
        };
        let changed = diff(&rows, prior.as_deref(), &policy);
        info!("{} rows, {} changed", rows.len(), changed.len());

        info!("=== Step 4: Persisting snapshot ===");
        store.replace(&cfg.symbol, &rows).map_err(RunError::Persist)?;

        // Delivery failure is reported in the stats but does not fail the
        // run — the snapshot is already correct on disk.
        let mut notified = false;
        if changed.is_empty() {
            info!("No material changes — skipping notification");
        } else {
            match notifier.notify(&cfg.symbol, &changed).await {
                Ok(()) => notified = true,
                Err(e) => warn!("Notification failed: {:#}", e),
            }
        }

        let stats = RunStats {
            rows_total: rows.len(),
            rows_changed: changed.len(),
            notified,
        };

        if let Some(id) = run_id {
            store
                .finish_run(id, stats.rows_total, stats.rows_changed, None)
                .ok();
        }

        info!(
            "=== Done: {} rows | {} changed | notified: {} ===",
            stats.rows_total, stats.rows_changed, stats.notified
        );

        Ok(stats)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawHoldingRecord, RawPriceRecord, UnifiedRow};
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, day).unwrap()
    }

    struct MockFeed {
        holdings: Vec<RawHoldingRecord>,
        prices: Vec<RawPriceRecord>,
    }

    #[async_trait]
    impl DataFeed for MockFeed {
        async fn fetch_holdings(
            &self,
            _symbol: &str,
            window: &Window,
        ) -> Result<Vec<RawHoldingRecord>> {
            Ok(self
                .holdings
                .iter()
                .filter(|h| window.contains(h.holding_date))
                .cloned()
                .collect())
        }

        async fn fetch_prices(
            &self,
            _symbol: &str,
            window: &Window,
        ) -> Result<Vec<RawPriceRecord>> {
            Ok(self
                .prices
                .iter()
                .filter(|p| window.contains(p.trade_date))
                .cloned()
                .collect())
        }
    }

    struct FailingFeed;

    #[async_trait]
    impl DataFeed for FailingFeed {
        async fn fetch_holdings(
            &self,
            _symbol: &str,
            _window: &Window,
        ) -> Result<Vec<RawHoldingRecord>> {
            anyhow::bail!("connection reset")
        }

        async fn fetch_prices(
            &self,
            _symbol: &str,
            _window: &Window,
        ) -> Result<Vec<RawPriceRecord>> {
            anyhow::bail!("connection reset")
        }
    }

    #[derive(Default)]
    struct CollectingNotifier {
        deliveries: Mutex<Vec<Vec<UnifiedRow>>>,
    }

    #[async_trait]
    impl Notifier for CollectingNotifier {
        async fn notify(&self, _symbol: &str, changed: &[UnifiedRow]) -> Result<()> {
            self.deliveries.lock().unwrap().push(changed.to_vec());
            Ok(())
        }
    }

    fn feed() -> MockFeed {
        MockFeed {
            holdings: vec![
                RawHoldingRecord { holding_date: d(24), quantity: 1_000_000 },
                RawHoldingRecord { holding_date: d(27), quantity: 1_050_000 },
            ],
            prices: vec![
                RawPriceRecord {
                    trade_date: d(24),
                    open: Some(89.5),
                    high: Some(91.0),
                    low: Some(89.0),
                    close: Some(90.0),
                },
                RawPriceRecord {
                    trade_date: d(27),
                    open: Some(90.5),
                    high: Some(92.5),
                    low: Some(90.0),
                    close: Some(92.0),
                },
                RawPriceRecord {
                    trade_date: d(28),
                    open: Some(92.0),
                    high: Some(92.2),
                    low: Some(91.0),
                    close: Some(91.5),
                },
            ],
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(AppConfig::default())
    }

    fn store() -> SnapshotStore {
        let s = SnapshotStore::open_in_memory().unwrap();
        s.run_migrations().unwrap();
        s
    }

    #[tokio::test]
    async fn test_bootstrap_run_flags_everything() {
        let store = store();
        let notifier = CollectingNotifier::default();

        let stats = pipeline().run_with(&feed(), &store, &notifier).await.unwrap();
        assert_eq!(stats.rows_total, 3);
        assert_eq!(stats.rows_changed, 3);
        assert!(stats.notified);

        let deliveries = notifier.deliveries.lock().unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].len(), 3);

        // 10-27: +50,000 shares → 5.0 in ten-thousands.
        assert_eq!(deliveries[0][1].net_increase, 5.0);
        // 10-28 forward-fills 10-27's quantity.
        assert_eq!(deliveries[0][2].holding_quantity, Some(1_050_000));
        assert_eq!(deliveries[0][2].net_increase, 0.0);
    }

    #[tokio::test]
    async fn test_second_identical_run_is_idempotent() {
        let store = store();
        let notifier = CollectingNotifier::default();
        let p = pipeline();

        let first = p.run_with(&feed(), &store, &notifier).await.unwrap();
        let snapshot_after_first = store.load("02015").unwrap().unwrap();

        let second = p.run_with(&feed(), &store, &notifier).await.unwrap();
        assert_eq!(first.rows_total, second.rows_total);
        assert_eq!(second.rows_changed, 0);
        assert!(!second.notified);

        // Same data in, same snapshot out.
        assert_eq!(store.load("02015").unwrap().unwrap(), snapshot_after_first);
        assert_eq!(notifier.deliveries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retroactive_correction_flags_only_moved_row() {
        let store = store();
        let notifier = CollectingNotifier::default();
        let p = pipeline();

        p.run_with(&feed(), &store, &notifier).await.unwrap();

        // Upstream corrects 10-27's quantity. 10-28's diff against the
        // corrected fill is still 0, so only 10-27 moves.
        let mut corrected = feed();
        corrected.holdings[1].quantity = 1_060_000;

        let stats = p.run_with(&corrected, &store, &notifier).await.unwrap();
        assert_eq!(stats.rows_changed, 1);

        let deliveries = notifier.deliveries.lock().unwrap();
        let last = deliveries.last().unwrap();
        assert_eq!(last[0].date, d(27));
        assert_eq!(last[0].net_increase, 6.0);
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_prior_snapshot() {
        let store = store();
        let notifier = CollectingNotifier::default();
        let p = pipeline();

        p.run_with(&feed(), &store, &notifier).await.unwrap();
        let before = store.load("02015").unwrap().unwrap();

        let err = p.run_with(&FailingFeed, &store, &notifier).await.unwrap_err();
        assert!(matches!(err, RunError::Fetch { feed: Feed::Holdings, .. }));

        assert_eq!(store.load("02015").unwrap().unwrap(), before);
    }

    /// Reads and the run log work; every write fails.
    struct WriteFailingStore {
        inner: SnapshotStore,
    }

    impl SnapshotBackend for WriteFailingStore {
        fn load(&self, symbol: &str) -> Result<Option<Vec<UnifiedRow>>> {
            self.inner.load(symbol)
        }

        fn replace(&self, _symbol: &str, _rows: &[UnifiedRow]) -> Result<usize> {
            anyhow::bail!("disk full")
        }

        fn begin_run(&self) -> Result<i64> {
            self.inner.begin_run()
        }

        fn finish_run(
            &self,
            run_id: i64,
            rows_total: usize,
            rows_changed: usize,
            error: Option<&str>,
        ) -> Result<()> {
            self.inner.finish_run(run_id, rows_total, rows_changed, error)
        }
    }

    #[tokio::test]
    async fn test_persist_failure_is_distinct_and_keeps_prior_snapshot() {
        let notifier = CollectingNotifier::default();
        let p = pipeline();

        // Seed a prior snapshot, then make every subsequent write fail.
        let inner = store();
        p.run_with(&feed(), &inner, &notifier).await.unwrap();
        let before = inner.load("02015").unwrap().unwrap();
        let failing = WriteFailingStore { inner };

        let mut corrected = feed();
        corrected.holdings[1].quantity = 1_060_000;

        // Computation succeeded, the write did not: the caller gets Persist
        // (retry the write without re-fetching), the prior snapshot stays
        // authoritative, and nothing is delivered.
        let err = p.run_with(&corrected, &failing, &notifier).await.unwrap_err();
        assert!(matches!(err, RunError::Persist(_)));
        assert_eq!(failing.inner.load("02015").unwrap().unwrap(), before);
        assert_eq!(notifier.deliveries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unmigrated_store_fails_on_load_not_persist() {
        // No migrations: the snapshot table is missing, so reading the
        // prior snapshot is the first storage call that can fail.
        let store = SnapshotStore::open_in_memory().unwrap();
        let notifier = CollectingNotifier::default();

        let err = pipeline().run_with(&feed(), &store, &notifier).await.unwrap_err();
        assert!(matches!(err, RunError::Load(_)));
    }

    #[tokio::test]
    async fn test_invalid_window_aborts_before_fetch() {
        let store = store();
        let notifier = CollectingNotifier::default();

        let mut config = AppConfig::default();
        config.engine.window_start = Some(d(28));
        config.engine.window_end = Some(d(24));
        let p = Pipeline::new(config);

        // FailingFeed would blow up any fetch; the window check fires first.
        let err = p.run_with(&FailingFeed, &store, &notifier).await.unwrap_err();
        assert!(matches!(err, RunError::Engine(_)));
    }

    #[tokio::test]
    async fn test_window_bounds_the_series() {
        let store = store();
        let notifier = CollectingNotifier::default();

        let mut config = AppConfig::default();
        config.engine.window_start = Some(d(27));
        config.engine.window_end = Some(d(28));
        let p = Pipeline::new(config);

        let stats = p.run_with(&feed(), &store, &notifier).await.unwrap();
        assert_eq!(stats.rows_total, 2);

        let rows = store.load("02015").unwrap().unwrap();
        assert_eq!(rows[0].date, d(27));
        // 10-24 is outside the window, so 10-27 is the series' first row.
        assert_eq!(rows[0].net_increase, 0.0);
    }
}
