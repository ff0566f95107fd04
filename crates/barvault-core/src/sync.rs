//! Incremental fetch-validate-merge cycles across a set of symbols.
//!
//! A cycle fans out over symbols on a bounded pool of tokio tasks. Each symbol runs
//! strictly sequentially through its own state machine and a failure is confined to
//! that symbol. Cancellation is observed before a symbol is dispatched; a dispatched
//! symbol always runs to completion (or to its fetch timeout).

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use time::{Date, OffsetDateTime};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::domain::{iso_date, Bar, Symbol};
use crate::fetch::{BarFetcher, FetchError, FetchRequest};
use crate::store::BarStore;
use crate::throttling::FetchThrottle;
use crate::validation::{BarValidator, RawBarRow};
use crate::StoreError;

/// Per-symbol progress within one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Fetching,
    Validating,
    Merging,
    /// Terminal for the current cycle; the symbol is picked up again next cycle.
    Failed,
}

impl SyncState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Validating => "validating",
            Self::Merging => "merging",
            Self::Failed => "failed",
        }
    }

    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Fetching)
                | (Self::Idle, Self::Failed)
                | (Self::Fetching, Self::Validating)
                | (Self::Fetching, Self::Failed)
                | (Self::Validating, Self::Merging)
                | (Self::Merging, Self::Idle)
                | (Self::Merging, Self::Failed)
        )
    }
}

impl Display for SyncState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a symbol's cycle broke down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Fetch,
    Store,
    Worker,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolFailure {
    pub symbol: Symbol,
    pub stage: FailureStage,
    pub message: String,
}

/// Outcome of one symbol within one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolReport {
    pub symbol: Symbol,
    pub final_state: SyncState,
    pub rows_inserted: usize,
    pub rows_rejected: usize,
    pub rejected_by_kind: BTreeMap<String, usize>,
    pub failure: Option<SymbolFailure>,
}

impl SymbolReport {
    fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            final_state: SyncState::Idle,
            rows_inserted: 0,
            rows_rejected: 0,
            rejected_by_kind: BTreeMap::new(),
            failure: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Statistics emitted at the end of every cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleStats {
    #[serde(with = "iso_date")]
    pub as_of: Date,
    pub symbols_attempted: usize,
    pub symbols_succeeded: usize,
    pub symbols_failed: usize,
    pub symbols_cancelled: usize,
    pub rows_inserted: usize,
    pub rows_rejected: usize,
    pub rejected_by_kind: BTreeMap<String, usize>,
    pub failures: Vec<SymbolFailure>,
}

impl CycleStats {
    fn new(as_of: Date) -> Self {
        Self {
            as_of,
            symbols_attempted: 0,
            symbols_succeeded: 0,
            symbols_failed: 0,
            symbols_cancelled: 0,
            rows_inserted: 0,
            rows_rejected: 0,
            rejected_by_kind: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    fn record(&mut self, report: SymbolReport) {
        self.symbols_attempted += 1;
        self.rows_inserted += report.rows_inserted;
        self.rows_rejected += report.rows_rejected;
        for (kind, count) in report.rejected_by_kind {
            *self.rejected_by_kind.entry(kind).or_default() += count;
        }
        match report.failure {
            None => self.symbols_succeeded += 1,
            Some(failure) => {
                self.symbols_failed += 1;
                self.failures.push(failure);
            }
        }
    }
}

/// Cooperative cancellation shared between a caller and running cycles.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`CancelToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Drives sync cycles against one store and one fetch capability.
#[derive(Clone)]
pub struct SyncCoordinator {
    store: Arc<dyn BarStore>,
    fetcher: Arc<dyn BarFetcher>,
    throttle: FetchThrottle,
    config: Arc<SyncConfig>,
}

impl SyncCoordinator {
    pub fn new(store: Arc<dyn BarStore>, fetcher: Arc<dyn BarFetcher>, config: SyncConfig) -> Self {
        let throttle = FetchThrottle::from_config(&config);
        Self {
            store,
            fetcher,
            throttle,
            config: Arc::new(config),
        }
    }

    /// Replaces the throttle, e.g. to share one budget between coordinators.
    pub fn with_throttle(mut self, throttle: FetchThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn run_cycle(&self, symbols: &[Symbol], cancel: &CancelToken) -> CycleStats {
        let as_of = OffsetDateTime::now_utc().date();
        self.run_cycle_as_of(symbols, as_of, cancel).await
    }

    /// Runs one cycle treating `as_of` as today.
    pub async fn run_cycle_as_of(
        &self,
        symbols: &[Symbol],
        as_of: Date,
        cancel: &CancelToken,
    ) -> CycleStats {
        info!(symbols = symbols.len(), %as_of, "sync cycle started");
        let workers = Arc::new(Semaphore::new(self.config.worker_count()));
        let mut stats = CycleStats::new(as_of);
        let mut running: Vec<(Symbol, JoinHandle<SymbolReport>)> = Vec::new();

        for (index, symbol) in symbols.iter().enumerate() {
            if cancel.is_cancelled() {
                stats.symbols_cancelled = symbols.len() - index;
                break;
            }

            let permit = tokio::select! {
                permit = Arc::clone(&workers).acquire_owned() => permit,
                _ = cancel.cancelled() => {
                    stats.symbols_cancelled = symbols.len() - index;
                    break;
                }
            };
            let Ok(permit) = permit else {
                stats.symbols_cancelled = symbols.len() - index;
                break;
            };

            let worker = self.clone();
            let owned = symbol.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                worker.sync_symbol(owned, as_of).await
            });
            running.push((symbol.clone(), handle));
        }

        for (symbol, handle) in running {
            let report = match handle.await {
                Ok(report) => report,
                Err(err) => {
                    warn!(%symbol, error = %err, "sync worker aborted");
                    let mut report = SymbolReport::new(symbol.clone());
                    report.final_state = SyncState::Failed;
                    report.failure = Some(SymbolFailure {
                        symbol,
                        stage: FailureStage::Worker,
                        message: err.to_string(),
                    });
                    report
                }
            };
            stats.record(report);
        }

        info!(
            attempted = stats.symbols_attempted,
            succeeded = stats.symbols_succeeded,
            failed = stats.symbols_failed,
            cancelled = stats.symbols_cancelled,
            rows_inserted = stats.rows_inserted,
            rows_rejected = stats.rows_rejected,
            "sync cycle finished"
        );
        stats
    }

    async fn sync_symbol(&self, symbol: Symbol, as_of: Date) -> SymbolReport {
        let mut run = SymbolRun::new(symbol);

        let last_date = match self.blocking_last_date(run.symbol()).await {
            Ok(last_date) => last_date,
            Err(err) => return run.fail(FailureStage::Store, err.to_string()),
        };

        let start = match last_date {
            Some(last) => match last.next_day() {
                Some(next) => next,
                None => return run.finish_up_to_date(),
            },
            None => as_of
                .checked_sub(time::Duration::days(self.config.history_days()))
                .unwrap_or(Date::MIN),
        };
        if start > as_of {
            return run.finish_up_to_date();
        }

        run.advance(SyncState::Fetching);
        let rows = match self.fetch_window(run.symbol(), start, as_of).await {
            Ok(rows) => rows,
            Err(err) => return run.fail(FailureStage::Fetch, err.to_string()),
        };

        run.advance(SyncState::Validating);
        let validator = BarValidator::new(as_of);
        let mut accepted = Vec::with_capacity(rows.len());
        for row in &rows {
            match validator.validate(run.symbol(), row) {
                Ok(bar) => accepted.push(bar),
                Err(reason) => {
                    warn!(
                        symbol = %run.symbol(),
                        kind = reason.kind(),
                        detail = %reason,
                        "rejected raw bar"
                    );
                    run.reject(reason.kind());
                }
            }
        }

        run.advance(SyncState::Merging);
        if !accepted.is_empty() {
            match self.blocking_upsert(run.symbol(), accepted).await {
                Ok(written) => run.report.rows_inserted = written,
                Err(err) => return run.fail(FailureStage::Store, err.to_string()),
            }
        }

        run.advance(SyncState::Idle);
        info!(
            symbol = %run.symbol(),
            rows_inserted = run.report.rows_inserted,
            rows_rejected = run.report.rows_rejected,
            "symbol synced"
        );
        run.report
    }

    async fn fetch_window(
        &self,
        symbol: &Symbol,
        start: Date,
        end: Date,
    ) -> Result<Vec<RawBarRow>, FetchError> {
        let request = FetchRequest::new(symbol.clone(), start, end)?;
        self.throttle.acquire().await;
        debug!(%symbol, %start, %end, "fetching bars");

        let timeout = self.config.fetch_timeout;
        match tokio::time::timeout(timeout, self.fetcher.fetch(request)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::timeout(format!(
                "fetch for {symbol} exceeded {}ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn blocking_last_date(&self, symbol: &Symbol) -> Result<Option<Date>, StoreError> {
        let store = Arc::clone(&self.store);
        let symbol = symbol.clone();
        tokio::task::spawn_blocking(move || store.last_date(&symbol))
            .await
            .map_err(|err| StoreError::TaskFailed(err.to_string()))?
    }

    async fn blocking_upsert(
        &self,
        symbol: &Symbol,
        bars: Vec<Bar>,
    ) -> Result<usize, StoreError> {
        let store = Arc::clone(&self.store);
        let symbol = symbol.clone();
        tokio::task::spawn_blocking(move || store.upsert_many(&symbol, &bars))
            .await
            .map_err(|err| StoreError::TaskFailed(err.to_string()))?
    }
}

struct SymbolRun {
    state: SyncState,
    report: SymbolReport,
}

impl SymbolRun {
    fn new(symbol: Symbol) -> Self {
        Self {
            state: SyncState::Idle,
            report: SymbolReport::new(symbol),
        }
    }

    fn symbol(&self) -> &Symbol {
        &self.report.symbol
    }

    fn advance(&mut self, next: SyncState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal sync transition {} -> {}",
            self.state,
            next
        );
        debug!(symbol = %self.report.symbol, from = %self.state, to = %next, "sync state");
        self.state = next;
        self.report.final_state = next;
    }

    fn reject(&mut self, kind: &'static str) {
        self.report.rows_rejected += 1;
        *self.report.rejected_by_kind.entry(kind.to_owned()).or_default() += 1;
    }

    fn fail(mut self, stage: FailureStage, message: String) -> SymbolReport {
        warn!(
            symbol = %self.report.symbol,
            state = %self.state,
            error = %message,
            "symbol sync failed"
        );
        self.advance(SyncState::Failed);
        self.report.failure = Some(SymbolFailure {
            symbol: self.report.symbol.clone(),
            stage,
            message,
        });
        self.report
    }

    fn finish_up_to_date(self) -> SymbolReport {
        debug!(symbol = %self.report.symbol, "already up to date");
        self.report
    }
}

/// Repeats sync cycles on a fixed wall-clock interval until cancelled.
pub struct SyncScheduler {
    coordinator: SyncCoordinator,
    symbols: Vec<Symbol>,
    interval: Duration,
}

impl SyncScheduler {
    pub fn new(coordinator: SyncCoordinator, symbols: Vec<Symbol>) -> Self {
        let interval = coordinator.config().cycle_interval;
        Self {
            coordinator,
            symbols,
            interval,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Runs the first cycle immediately, then one per interval.
    ///
    /// Stops when `cancel` fires or after `max_cycles` cycles, whichever comes first.
    pub async fn run(&self, cancel: &CancelToken, max_cycles: Option<usize>) -> Vec<CycleStats> {
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut history = Vec::new();

        loop {
            if max_cycles.is_some_and(|max| history.len() >= max) {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if cancel.is_cancelled() {
                break;
            }
            history.push(self.coordinator.run_cycle(&self.symbols, cancel).await);
        }

        info!(cycles = history.len(), "sync scheduler stopped");
        history
    }
}
