use amm_pricing::Side;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One executed trade. Append-only: never mutated or deleted once committed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Strictly increasing from 1, assigned at commit.
    pub trade_id: u64,
    pub side: Side,
    pub counterparty: String,
    pub qty_base: f64,
    pub total_quote: f64,
    pub avg_price: f64,
    pub inventory_before: i64,
    pub inventory_after: i64,
    pub quote_reserves_after: f64,
    pub circulating_supply_after: f64,
    pub created_at: DateTime<Utc>,
    /// Fingerprint of the curve parameters this trade was priced under.
    pub pricing_version: String,
}
