//! In-memory `LedgerStore`.
//!
//! Holds the row and the log behind one `std::sync::Mutex`, so a commit is a
//! single critical section. Test hooks inject commit failures and latency.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::store::check_genesis;
use crate::{LedgerState, LedgerStore, StoreError, TradeRecord};

#[derive(Debug)]
struct Inner {
    genesis: LedgerState,
    state: LedgerState,
    trades: Vec<TradeRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Option<Inner>>,
    fail_next: AtomicU32,
    commit_delay_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` commits fail with a backend error and apply nothing.
    pub fn fail_next_commits(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Sleep this long inside every commit before applying it.
    pub fn set_commit_delay(&self, delay: Duration) {
        self.commit_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn trade_count(&self) -> usize {
        self.with_inner(|i| i.trades.len()).unwrap_or(0)
    }

    fn with_inner<T>(&self, f: impl FnOnce(&Inner) -> T) -> Result<T, StoreError> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store mutex poisoned".to_string()))?;
        guard.as_ref().map(f).ok_or(StoreError::NotInitialized)
    }

    fn take_injected_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn initialize(&self, genesis: &LedgerState) -> Result<LedgerState, StoreError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store mutex poisoned".to_string()))?;
        match guard.as_ref() {
            Some(inner) => {
                check_genesis(&inner.genesis, genesis)?;
                Ok(inner.state.clone())
            }
            None => {
                *guard = Some(Inner {
                    genesis: genesis.clone(),
                    state: genesis.clone(),
                    trades: Vec::new(),
                });
                Ok(genesis.clone())
            }
        }
    }

    async fn load_genesis(&self) -> Result<LedgerState, StoreError> {
        self.with_inner(|i| i.genesis.clone())
    }

    async fn load_state(&self) -> Result<LedgerState, StoreError> {
        self.with_inner(|i| i.state.clone())
    }

    async fn load_trades(&self) -> Result<Vec<TradeRecord>, StoreError> {
        self.with_inner(|i| i.trades.clone())
    }

    async fn commit(
        &self,
        expected_last_trade_id: u64,
        next: &LedgerState,
        record: &TradeRecord,
    ) -> Result<(), StoreError> {
        let delay = self.commit_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.take_injected_failure() {
            return Err(StoreError::Backend("injected commit failure".to_string()));
        }

        let mut guard = self
            .inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store mutex poisoned".to_string()))?;
        let inner = guard.as_mut().ok_or(StoreError::NotInitialized)?;

        let found = inner.state.last_trade_id;
        if found != expected_last_trade_id || record.trade_id != found + 1 {
            return Err(StoreError::Conflict {
                expected: expected_last_trade_id,
                found,
            });
        }

        inner.state = next.clone();
        inner.trades.push(record.clone());
        Ok(())
    }
}
