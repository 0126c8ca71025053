//! The singleton ledger row and its one transition function.
//!
//! `LedgerState::transition` is used both by the executor (to compute the row
//! it is about to commit) and by reconciliation (to replay the log). There is
//! no second code path that mutates economics.
//!
//! Deterministic, pure logic. No IO, no clock reads, no randomness.

use amm_pricing::{CurvePoint, PricingCurve, Quote, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TradeError, TradeRecord};

// ---------------------------------------------------------------------------
// Genesis
// ---------------------------------------------------------------------------

/// Fixed starting point of the ledger. Comes from configuration and is
/// persisted once by the store; every later state is a fold from here.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenesisState {
    #[serde(default)]
    pub inventory: i64,
    pub base_unit_price: f64,
    pub half_spread: f64,
    #[serde(default)]
    pub quote_reserves: f64,
    #[serde(default)]
    pub circulating_supply: f64,
}

/// Rejected genesis values.
#[derive(Debug, Clone, PartialEq)]
pub struct GenesisError {
    pub reason: String,
}

impl std::fmt::Display for GenesisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid genesis: {}", self.reason)
    }
}

impl std::error::Error for GenesisError {}

impl GenesisState {
    pub fn validate(&self, curve: &PricingCurve) -> Result<(), GenesisError> {
        let err = |reason: String| Err(GenesisError { reason });

        if !self.base_unit_price.is_finite() || self.base_unit_price <= 0.0 {
            return err(format!(
                "base_unit_price must be finite and > 0, got {}",
                self.base_unit_price
            ));
        }
        if !self.half_spread.is_finite() || !(0.0..1.0).contains(&self.half_spread) {
            return err(format!(
                "half_spread must be in [0, 1), got {}",
                self.half_spread
            ));
        }
        if !self.quote_reserves.is_finite() || self.quote_reserves < 0.0 {
            return err(format!(
                "quote_reserves must be finite and >= 0, got {}",
                self.quote_reserves
            ));
        }
        if !self.circulating_supply.is_finite() || self.circulating_supply < 0.0 {
            return err(format!(
                "circulating_supply must be finite and >= 0, got {}",
                self.circulating_supply
            ));
        }
        let limit = curve.params().max_abs_inventory;
        if self.inventory.unsigned_abs() > limit.unsigned_abs() {
            return err(format!(
                "inventory {} outside risk limit ±{limit}",
                self.inventory
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LedgerState
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerState {
    pub inventory: i64,
    pub base_unit_price: f64,
    pub half_spread: f64,
    pub quote_reserves: f64,
    pub circulating_supply: f64,
    pub updated_at: DateTime<Utc>,
    /// Id of the last committed trade; `0` at genesis.
    pub last_trade_id: u64,
}

/// Outcome of applying one trade to a state, before it is committed.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub quote: Quote,
    pub next: LedgerState,
}

impl LedgerState {
    pub fn from_genesis(genesis: &GenesisState, at: DateTime<Utc>) -> Self {
        Self {
            inventory: genesis.inventory,
            base_unit_price: genesis.base_unit_price,
            half_spread: genesis.half_spread,
            quote_reserves: genesis.quote_reserves,
            circulating_supply: genesis.circulating_supply,
            updated_at: at,
            last_trade_id: 0,
        }
    }

    pub fn curve_point(&self) -> CurvePoint {
        CurvePoint {
            inventory: self.inventory,
            base_unit_price: self.base_unit_price,
            half_spread: self.half_spread,
        }
    }

    /// True when every economic field matches. Ignores `updated_at` and
    /// `last_trade_id`.
    pub fn same_economics(&self, other: &Self) -> bool {
        self.inventory == other.inventory
            && self.base_unit_price == other.base_unit_price
            && self.half_spread == other.half_spread
            && self.quote_reserves == other.quote_reserves
            && self.circulating_supply == other.circulating_supply
    }

    /// Price and apply one trade.
    ///
    /// A buy pays `total_quote` into reserves and issues `qty_base` into
    /// circulation; a sell pays `total_quote` out of reserves and retires
    /// `qty_base`. Fails without side effects if either balance would go
    /// negative. `now` is clamped so `updated_at` never moves backwards.
    pub fn transition(
        &self,
        curve: &PricingCurve,
        side: Side,
        qty_base: f64,
        now: DateTime<Utc>,
    ) -> Result<Transition, TradeError> {
        let quote = curve.quote(&self.curve_point(), side, qty_base)?;

        let (quote_reserves, circulating_supply) = match side {
            Side::Buy => (
                self.quote_reserves + quote.total_quote,
                self.circulating_supply + qty_base,
            ),
            Side::Sell => {
                let reserves = self.quote_reserves - quote.total_quote;
                if reserves < 0.0 {
                    return Err(TradeError::InsufficientReserves {
                        required: quote.total_quote,
                        available: self.quote_reserves,
                    });
                }
                let supply = self.circulating_supply - qty_base;
                if supply < 0.0 {
                    return Err(TradeError::InsufficientSupply {
                        required: qty_base,
                        available: self.circulating_supply,
                    });
                }
                (reserves, supply)
            }
        };

        let next = LedgerState {
            inventory: quote.inventory_after,
            base_unit_price: self.base_unit_price,
            half_spread: self.half_spread,
            quote_reserves,
            circulating_supply,
            updated_at: now.max(self.updated_at),
            last_trade_id: self.last_trade_id + 1,
        };

        Ok(Transition { quote, next })
    }

    /// Move to the post-trade snapshot a record carries, without repricing.
    /// Used when loading a persisted log whose integrity is checked elsewhere.
    pub fn advance(&self, record: &TradeRecord) -> Self {
        Self {
            inventory: record.inventory_after,
            base_unit_price: self.base_unit_price,
            half_spread: self.half_spread,
            quote_reserves: record.quote_reserves_after,
            circulating_supply: record.circulating_supply_after,
            updated_at: record.created_at,
            last_trade_id: record.trade_id,
        }
    }
}

impl Transition {
    /// The log entry this transition commits alongside `next`.
    pub fn record(&self, counterparty: &str, pricing_version: &str) -> TradeRecord {
        TradeRecord {
            trade_id: self.next.last_trade_id,
            side: self.quote.side,
            counterparty: counterparty.to_string(),
            qty_base: self.quote.qty_base,
            total_quote: self.quote.total_quote,
            avg_price: self.quote.avg_price,
            inventory_before: self.quote.inventory_before,
            inventory_after: self.quote.inventory_after,
            quote_reserves_after: self.next.quote_reserves,
            circulating_supply_after: self.next.circulating_supply,
            created_at: self.next.updated_at,
            pricing_version: pricing_version.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
