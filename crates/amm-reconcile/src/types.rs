use amm_ledger::LedgerState;

pub const DEFAULT_REL_TOLERANCE: f64 = 1e-9;

/// What the operator should take from the report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileAction {
    Clean,
    Drift,
}

/// Fault classes. Stable ordering enforced by the engine.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReconcileReason {
    /// `trade_id` skipped or repeated.
    TradeIdSequence,
    /// `created_at` went backwards.
    TimestampRegression,
    /// `inventory_before` does not continue from the replayed inventory.
    InventoryChainBreak,
    /// Recomputed consideration differs from the logged one.
    PriceDrift,
    /// Logged post-trade snapshot differs from the recomputed one.
    SnapshotMismatch,
    /// The current curve refuses a logged trade.
    ReplayRejected,
    /// A record was priced under different curve parameters.
    PricingVersionChanged,
    /// Replay end state differs from the live row.
    LiveStateMismatch,
}

/// Evidence of one divergence. Values are rendered as strings so the
/// whole report stays `Ord` and prints exactly.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReconcileDiff {
    TradeIdGap {
        expected: u64,
        found: u64,
    },
    TimestampRegression {
        trade_id: u64,
        previous: String,
        found: String,
    },
    InventoryChain {
        trade_id: u64,
        replayed: i64,
        logged: i64,
    },
    FieldMismatch {
        trade_id: u64,
        field: String,
        replayed: String,
        logged: String,
    },
    ReplayRejected {
        trade_id: u64,
        error_kind: String,
        detail: String,
    },
    PricingVersion {
        trade_id: u64,
        logged: String,
        current: String,
    },
    LiveStateMismatch {
        field: String,
        replayed: String,
        live: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReconcileReport {
    pub action: ReconcileAction,
    pub reasons: Vec<ReconcileReason>,
    pub diffs: Vec<ReconcileDiff>,
    pub trades_replayed: usize,
    /// Fold of the log from genesis. After a faulty record the fold continues
    /// from that record's logged snapshot, so one fault is reported once.
    pub replayed: LedgerState,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.action == ReconcileAction::Clean
    }
}
