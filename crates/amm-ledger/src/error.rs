use amm_pricing::{CurveError, Side};

/// Every way a trade attempt can fail.
///
/// A failed attempt has no effect on the ledger row or the trade log. None of
/// these are retried by the executor: the price of a retry depends on the
/// inventory at retry time, so retry policy belongs to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeError {
    /// `qty_base` is non-positive, non-finite, or below one inventory unit.
    InvalidQuantity { qty_base: f64 },
    /// Counterparty id is empty.
    InvalidCounterparty,
    /// Slippage limit is non-positive or non-finite.
    InvalidLimit { limit_quote: f64 },
    /// `|inventory_after|` would exceed the configured bound.
    RiskLimitExceeded { inventory_after: i64, limit: i64 },
    /// The curve produced a consideration that is not finite and positive.
    NonPositivePrice { total_quote: f64 },
    /// Paying out `required` would drive quote reserves negative.
    InsufficientReserves { required: f64, available: f64 },
    /// Retiring `required` base units would drive circulating supply negative.
    InsufficientSupply { required: f64, available: f64 },
    /// Executed consideration is worse for the user than their limit.
    SlippageExceeded {
        side: Side,
        total_quote: f64,
        limit_quote: f64,
    },
    /// The trade lock was not acquired within the bounded wait.
    Timeout { waited_ms: u64 },
    /// The store's view of the last trade disagrees with the executor's.
    StaleOrConcurrentModification { expected_trade_id: u64, found_trade_id: u64 },
    /// The atomic write of state + record did not succeed; nothing was applied.
    CommitFailure { reason: String },
}

impl TradeError {
    /// Stable code for logs and alerting.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidQuantity { .. } => "INVALID_QUANTITY",
            Self::InvalidCounterparty => "INVALID_COUNTERPARTY",
            Self::InvalidLimit { .. } => "INVALID_LIMIT",
            Self::RiskLimitExceeded { .. } => "RISK_LIMIT_EXCEEDED",
            Self::NonPositivePrice { .. } => "NON_POSITIVE_PRICE",
            Self::InsufficientReserves { .. } => "INSUFFICIENT_RESERVES",
            Self::InsufficientSupply { .. } => "INSUFFICIENT_SUPPLY",
            Self::SlippageExceeded { .. } => "SLIPPAGE_EXCEEDED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::StaleOrConcurrentModification { .. } => "STALE_OR_CONCURRENT_MODIFICATION",
            Self::CommitFailure { .. } => "COMMIT_FAILURE",
        }
    }

    /// Rejections decided by trade economics or input, as opposed to
    /// infrastructure failures (lock, store).
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            Self::Timeout { .. }
                | Self::StaleOrConcurrentModification { .. }
                | Self::CommitFailure { .. }
        )
    }
}

impl std::fmt::Display for TradeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidQuantity { qty_base } => write!(f, "invalid quantity: {qty_base}"),
            Self::InvalidCounterparty => write!(f, "counterparty must not be empty"),
            Self::InvalidLimit { limit_quote } => {
                write!(f, "slippage limit must be finite and > 0, got {limit_quote}")
            }
            Self::RiskLimitExceeded {
                inventory_after,
                limit,
            } => write!(
                f,
                "risk limit exceeded: inventory_after={inventory_after} limit=±{limit}"
            ),
            Self::NonPositivePrice { total_quote } => {
                write!(f, "non-positive consideration: {total_quote}")
            }
            Self::InsufficientReserves {
                required,
                available,
            } => write!(
                f,
                "insufficient quote reserves: required {required}, available {available}"
            ),
            Self::InsufficientSupply {
                required,
                available,
            } => write!(
                f,
                "insufficient circulating supply: required {required}, available {available}"
            ),
            Self::SlippageExceeded {
                side,
                total_quote,
                limit_quote,
            } => match side {
                Side::Buy => write!(f, "fill cost {total_quote} exceeds max {limit_quote}"),
                Side::Sell => write!(f, "fill proceeds {total_quote} below minimum {limit_quote}"),
            },
            Self::Timeout { waited_ms } => {
                write!(f, "trade lock not acquired within {waited_ms}ms")
            }
            Self::StaleOrConcurrentModification {
                expected_trade_id,
                found_trade_id,
            } => write!(
                f,
                "ledger modified concurrently: expected last trade {expected_trade_id}, found {found_trade_id}"
            ),
            Self::CommitFailure { reason } => write!(f, "commit failed (rolled back): {reason}"),
        }
    }
}

impl std::error::Error for TradeError {}

impl From<CurveError> for TradeError {
    fn from(e: CurveError) -> Self {
        match e {
            CurveError::InvalidQuantity { qty_base } => Self::InvalidQuantity { qty_base },
            CurveError::RiskLimitExceeded {
                inventory_after,
                limit,
            } => Self::RiskLimitExceeded {
                inventory_after,
                limit,
            },
            CurveError::NonPositivePrice { total_quote } => Self::NonPositivePrice { total_quote },
        }
    }
}
