//! amm-ledger
//!
//! Dealer ledger and trade execution.
//! - `LedgerState` is the single authoritative row (inventory, price params, reserves, supply)
//! - `TradeRecord` is the append-only log entry; state is the fold of the log from genesis
//! - `LedgerState::transition` is the one pure state-transition function, shared by
//!   execution and replay
//! - `TradeExecutor` serialises commits behind one bounded-wait lock and commits
//!   state + record atomically through a `LedgerStore`
//!
//! Persistence backends implement [`LedgerStore`]; this crate ships the in-memory one.

mod error;
mod executor;
mod memory;
mod record;
mod state;
mod store;

pub use error::TradeError;
pub use executor::{ExecutorSettings, TradeExecutor, TradeRequest};
pub use memory::MemoryStore;
pub use record::TradeRecord;
pub use state::{GenesisError, GenesisState, LedgerState, Transition};
pub use store::{check_genesis, LedgerStore, StoreError};

pub use amm_pricing::{CurveParams, PricingCurve, Quote, Side, SpotQuote};
