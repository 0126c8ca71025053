use async_trait::async_trait;

use crate::{LedgerState, TradeRecord};

/// Persistence seam for the ledger row and the trade log.
///
/// Implementations must make `commit` atomic: after it returns, either both
/// the new state and the record are durable, or neither is. `commit` must
/// refuse to apply when the stored `last_trade_id` differs from
/// `expected_last_trade_id`.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Persist `genesis` if the store is empty and return the current state.
    /// An already-initialised store must carry the same genesis economics.
    async fn initialize(&self, genesis: &LedgerState) -> Result<LedgerState, StoreError>;

    async fn load_genesis(&self) -> Result<LedgerState, StoreError>;

    async fn load_state(&self) -> Result<LedgerState, StoreError>;

    /// All records in `trade_id` order.
    async fn load_trades(&self) -> Result<Vec<TradeRecord>, StoreError>;

    async fn commit(
        &self,
        expected_last_trade_id: u64,
        next: &LedgerState,
        record: &TradeRecord,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotInitialized,
    /// Stored genesis differs from the one the caller opened with.
    GenesisMismatch { reason: String },
    /// Optimistic check failed: someone else committed first.
    Conflict { expected: u64, found: u64 },
    /// Anything the backend reports (IO, SQL, serialisation).
    Backend(String),
}

impl StoreError {
    pub fn backend(e: impl std::fmt::Display) -> Self {
        Self::Backend(e.to_string())
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "ledger store not initialized"),
            Self::GenesisMismatch { reason } => write!(f, "genesis mismatch: {reason}"),
            Self::Conflict { expected, found } => write!(
                f,
                "commit conflict: expected last_trade_id {expected}, found {found}"
            ),
            Self::Backend(msg) => write!(f, "store backend error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Shared by store `initialize` impls: compare a stored genesis with the requested one.
pub fn check_genesis(stored: &LedgerState, requested: &LedgerState) -> Result<(), StoreError> {
    if stored.same_economics(requested) {
        return Ok(());
    }
    Err(StoreError::GenesisMismatch {
        reason: format!(
            "stored inventory={} price={} spread={} reserves={} supply={}, requested inventory={} price={} spread={} reserves={} supply={}",
            stored.inventory,
            stored.base_unit_price,
            stored.half_spread,
            stored.quote_reserves,
            stored.circulating_supply,
            requested.inventory,
            requested.base_unit_price,
            requested.half_spread,
            requested.quote_reserves,
            requested.circulating_supply,
        ),
    })
}
