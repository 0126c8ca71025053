//! Trade execution protocol.
//!
//! One `tokio::sync::Mutex` guards the cached ledger row; holding it is the
//! right to commit. A trade:
//!
//! 1. waits at most `lock_timeout` for the lock,
//! 2. prices and applies the trade to the row read under the lock,
//! 3. hands the owned guard to a spawned task that commits state + record
//!    through the store and only then updates the cache.
//!
//! Because the guard moves into the commit task, dropping the caller's future
//! after step 3 starts cannot abandon a half-applied commit: the task runs to
//! completion and the lock is released when it finishes.
//!
//! Readers never touch the lock. Every committed row is published on a
//! `watch` channel; `quote` and `spot` price against the latest published
//! row, which is a hint and may be one trade behind.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use amm_pricing::{PricingCurve, Quote, Side, SpotQuote};
use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};

use crate::{GenesisState, LedgerState, LedgerStore, StoreError, TradeError, TradeRecord};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(2_000);

#[derive(Clone, Copy, Debug)]
pub struct ExecutorSettings {
    /// Bounded wait for the trade lock before failing with `Timeout`.
    pub lock_timeout: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// Inbound trade request.
#[derive(Clone, Debug, PartialEq)]
pub struct TradeRequest {
    pub side: Side,
    pub qty_base: f64,
    pub counterparty: String,
    /// Buy: the most the user will pay. Sell: the least they will accept.
    pub limit_quote: Option<f64>,
}

impl TradeRequest {
    pub fn new(side: Side, qty_base: f64, counterparty: impl Into<String>) -> Self {
        Self {
            side,
            qty_base,
            counterparty: counterparty.into(),
            limit_quote: None,
        }
    }

    pub fn buy(qty_base: f64, counterparty: impl Into<String>) -> Self {
        Self::new(Side::Buy, qty_base, counterparty)
    }

    pub fn sell(qty_base: f64, counterparty: impl Into<String>) -> Self {
        Self::new(Side::Sell, qty_base, counterparty)
    }

    pub fn with_limit(mut self, limit_quote: f64) -> Self {
        self.limit_quote = Some(limit_quote);
        self
    }

    fn validate(&self) -> Result<(), TradeError> {
        if self.counterparty.trim().is_empty() {
            return Err(TradeError::InvalidCounterparty);
        }
        if let Some(limit_quote) = self.limit_quote {
            if !limit_quote.is_finite() || limit_quote <= 0.0 {
                return Err(TradeError::InvalidLimit { limit_quote });
            }
        }
        Ok(())
    }

    fn check_slippage(&self, total_quote: f64) -> Result<(), TradeError> {
        let Some(limit_quote) = self.limit_quote else {
            return Ok(());
        };
        let violated = match self.side {
            Side::Buy => total_quote > limit_quote,
            Side::Sell => total_quote < limit_quote,
        };
        if violated {
            return Err(TradeError::SlippageExceeded {
                side: self.side,
                total_quote,
                limit_quote,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TradeExecutor
// ---------------------------------------------------------------------------

pub struct TradeExecutor<S: LedgerStore> {
    store: Arc<S>,
    curve: PricingCurve,
    pricing_version: String,
    settings: ExecutorSettings,
    ledger: Arc<Mutex<LedgerState>>,
    published: Arc<watch::Sender<LedgerState>>,
    in_flight: Arc<AtomicBool>,
    commit_failures: Arc<AtomicU64>,
}

impl<S: LedgerStore> TradeExecutor<S> {
    /// Initialise (or reopen) the store at `genesis` and load the current row.
    pub async fn open(
        store: Arc<S>,
        curve: PricingCurve,
        genesis: &GenesisState,
        genesis_at: DateTime<Utc>,
        settings: ExecutorSettings,
    ) -> anyhow::Result<Self> {
        genesis.validate(&curve)?;
        let genesis_row = LedgerState::from_genesis(genesis, genesis_at);
        let current = store
            .initialize(&genesis_row)
            .await
            .context("initialize ledger store")?;

        let limit = curve.params().max_abs_inventory;
        if current.inventory.unsigned_abs() > limit.unsigned_abs() {
            anyhow::bail!(
                "stored inventory {} is outside the configured risk limit ±{limit}",
                current.inventory
            );
        }

        info!(
            last_trade_id = current.last_trade_id,
            inventory = current.inventory,
            quote_reserves = current.quote_reserves,
            circulating_supply = current.circulating_supply,
            "ledger opened"
        );

        let (tx, _rx) = watch::channel(current.clone());
        Ok(Self {
            store,
            pricing_version: curve.pricing_version(),
            curve,
            settings,
            ledger: Arc::new(Mutex::new(current)),
            published: Arc::new(tx),
            in_flight: Arc::new(AtomicBool::new(false)),
            commit_failures: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn curve(&self) -> &PricingCurve {
        &self.curve
    }

    pub fn pricing_version(&self) -> &str {
        &self.pricing_version
    }

    /// Latest committed row. Lock-free; may lag an in-progress commit.
    pub fn snapshot(&self) -> LedgerState {
        self.published.borrow().clone()
    }

    /// Number of commits the store refused or failed since open.
    pub fn commit_failures(&self) -> u64 {
        self.commit_failures.load(Ordering::Relaxed)
    }

    /// Price a trade against the latest snapshot without executing it.
    /// Surfaces the same rejections execution would at this snapshot.
    pub fn quote(&self, side: Side, qty_base: f64) -> Result<Quote, TradeError> {
        let snap = self.snapshot();
        snap.transition(&self.curve, side, qty_base, snap.updated_at)
            .map(|t| t.quote)
    }

    pub fn spot(&self) -> SpotQuote {
        let snap = self.snapshot();
        self.curve.spot_quote(
            &snap.curve_point(),
            snap.quote_reserves,
            snap.circulating_supply,
        )
    }

    /// Execute one trade. Never retried; a failed attempt changes nothing.
    pub async fn execute_trade(&self, req: TradeRequest) -> Result<TradeRecord, TradeError> {
        let started = Instant::now();
        let result = self.execute_locked(&req).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(rec) => info!(
                side = %req.side,
                qty_base = req.qty_base,
                counterparty = %req.counterparty,
                outcome = "filled",
                trade_id = rec.trade_id,
                total_quote = rec.total_quote,
                inventory_after = rec.inventory_after,
                elapsed_ms,
                "trade"
            ),
            Err(e @ TradeError::CommitFailure { .. }) => error!(
                side = %req.side,
                qty_base = req.qty_base,
                counterparty = %req.counterparty,
                outcome = "failed",
                error_kind = e.kind(),
                commit_failures = self.commit_failures(),
                elapsed_ms,
                "trade: {e}"
            ),
            Err(e) => warn!(
                side = %req.side,
                qty_base = req.qty_base,
                counterparty = %req.counterparty,
                outcome = outcome_label(e),
                error_kind = e.kind(),
                elapsed_ms,
                "trade: {e}"
            ),
        }
        result
    }

    async fn execute_locked(&self, req: &TradeRequest) -> Result<TradeRecord, TradeError> {
        req.validate()?;

        let lock = Arc::clone(&self.ledger).lock_owned();
        let guard = tokio::time::timeout(self.settings.lock_timeout, lock)
            .await
            .map_err(|_| TradeError::Timeout {
                waited_ms: self.settings.lock_timeout.as_millis() as u64,
            })?;

        // The commit task holds the guard for the whole commit, so this can
        // only trip if that invariant is broken.
        if self.in_flight.load(Ordering::Acquire) {
            return Err(TradeError::StaleOrConcurrentModification {
                expected_trade_id: guard.last_trade_id,
                found_trade_id: guard.last_trade_id + 1,
            });
        }

        let transition = guard.transition(&self.curve, req.side, req.qty_base, Utc::now())?;
        req.check_slippage(transition.quote.total_quote)?;
        let record = transition.record(req.counterparty.trim(), &self.pricing_version);

        let task = CommitTask {
            store: Arc::clone(&self.store),
            published: Arc::clone(&self.published),
            in_flight: Arc::clone(&self.in_flight),
            commit_failures: Arc::clone(&self.commit_failures),
        };
        match tokio::spawn(task.run(guard, transition.next, record)).await {
            Ok(result) => result,
            // The task died mid-commit (a store panic). Its guard and
            // in-flight marker were released while unwinding.
            Err(e) => {
                self.commit_failures.fetch_add(1, Ordering::Relaxed);
                let mut cached = self.ledger.lock().await;
                resync(self.store.as_ref(), &self.published, &mut cached).await;
                Err(TradeError::CommitFailure {
                    reason: format!("commit task aborted: {e}"),
                })
            }
        }
    }
}

fn outcome_label(e: &TradeError) -> &'static str {
    if e.is_rejection() {
        "rejected"
    } else {
        "failed"
    }
}

// ---------------------------------------------------------------------------
// Commit task
// ---------------------------------------------------------------------------

struct CommitTask<S: LedgerStore> {
    store: Arc<S>,
    published: Arc<watch::Sender<LedgerState>>,
    in_flight: Arc<AtomicBool>,
    commit_failures: Arc<AtomicU64>,
}

impl<S: LedgerStore> CommitTask<S> {
    async fn run(
        self,
        mut guard: OwnedMutexGuard<LedgerState>,
        next: LedgerState,
        record: TradeRecord,
    ) -> Result<TradeRecord, TradeError> {
        let _in_flight = InFlight::enter(&self.in_flight);
        let expected = guard.last_trade_id;

        match self.store.commit(expected, &next, &record).await {
            Ok(()) => {
                *guard = next.clone();
                self.published.send_replace(next);
                Ok(record)
            }
            Err(StoreError::Conflict { expected, found }) => {
                self.commit_failures.fetch_add(1, Ordering::Relaxed);
                resync(self.store.as_ref(), &self.published, &mut guard).await;
                Err(TradeError::StaleOrConcurrentModification {
                    expected_trade_id: expected,
                    found_trade_id: found,
                })
            }
            Err(e) => {
                self.commit_failures.fetch_add(1, Ordering::Relaxed);
                resync(self.store.as_ref(), &self.published, &mut guard).await;
                Err(TradeError::CommitFailure {
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// Marks a commit in progress; cleared on drop, including while unwinding,
/// before the trade lock is released.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn enter(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::Release);
        Self(Arc::clone(flag))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Re-read the row after a failed commit so the cache tracks the store.
async fn resync<S: LedgerStore>(
    store: &S,
    published: &watch::Sender<LedgerState>,
    cached: &mut LedgerState,
) {
    match store.load_state().await {
        Ok(stored) if stored != *cached => {
            warn!(
                cached_trade_id = cached.last_trade_id,
                stored_trade_id = stored.last_trade_id,
                "ledger cache resynced from store"
            );
            *cached = stored.clone();
            published.send_replace(stored);
        }
        Ok(_) => {}
        Err(e) => warn!("ledger resync after failed commit: {e}"),
    }
}
