//! amm-reconcile
//!
//! Replay reconciliation for the dealer ledger.
//!
//! - The trade log folded from genesis through the same transition function
//!   the executor uses must reproduce every logged snapshot and the live row
//! - Any divergence marks the report `Drift`; the check is advisory and never
//!   mutates the ledger
//! - Reasons and diffs are sorted, so two runs over the same inputs produce
//!   identical reports
//!
//! Deterministic, pure logic. No IO.

mod engine;
mod types;

pub use engine::{is_clean_replay, reconcile};
pub use types::*;
