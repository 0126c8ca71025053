use serde::{Deserialize, Serialize};

/// Trade direction from the user's perspective.
///
/// - `Buy`: the user buys base token from the dealer; dealer inventory falls.
/// - `Sell`: the user sells base token to the dealer; dealer inventory rises.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        }
    }

    /// Sign of the inventory change this side causes: `+1` for a sell, `-1` for a buy.
    pub fn inventory_sign(&self) -> i64 {
        match self {
            Side::Buy => -1,
            Side::Sell => 1,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide curve configuration. Not part of the ledger row.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurveParams {
    /// Curvature coefficient `k`: fractional price impact per base unit of inventory.
    pub k: f64,
    /// Base-token quantity represented by one integer inventory unit.
    pub unit_granularity: f64,
    /// Maximum `|inventory|` (in inventory units) a trade may leave behind.
    pub max_abs_inventory: i64,
}

impl CurveParams {
    /// Flat curve (`k = 0`), whole-unit inventory.
    pub fn flat(max_abs_inventory: i64) -> Self {
        Self {
            k: 0.0,
            unit_granularity: 1.0,
            max_abs_inventory,
        }
    }
}

/// The slice of ledger state the curve reads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurvePoint {
    pub inventory: i64,
    pub base_unit_price: f64,
    pub half_spread: f64,
}

/// Result of pricing one trade against a [`CurvePoint`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quote {
    pub side: Side,
    pub qty_base: f64,
    /// Quote-currency consideration after spread.
    pub total_quote: f64,
    /// `total_quote / qty_base`.
    pub avg_price: f64,
    pub inventory_before: i64,
    pub inventory_after: i64,
}
