//! Volume-integrated linear price curve.
//!
//! # Model
//!
//! Instantaneous mid price at inventory position `x` (in base units):
//!
//! ```text
//! P(x) = b * (1 + k * x)
//! ```
//!
//! A trade sweeps inventory from `x0` to `x1` (`x0 + q` on a sell, `x0 - q`
//! on a buy). The mid consideration is the definite integral of `P` over that
//! range, which for a linear `P` is exactly
//!
//! ```text
//! b * [ q + k * (x1² - x0²) / 2 ]  =  b * q * (1 + k * (x0 + x1) / 2)
//! ```
//!
//! The right-hand (midpoint) form is what we evaluate: it never subtracts two
//! nearly-equal squares, so small trades at large `|x0|` keep full precision.
//!
//! The half-spread is applied last: sells receive `mid * (1 - h)`, buys pay
//! `mid * (1 + h)`.

use sha2::{Digest, Sha256};

use crate::{CurveParams, CurvePoint, Quote, Side};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced while pricing a single trade.
#[derive(Debug, Clone, PartialEq)]
pub enum CurveError {
    /// Quantity is non-positive, non-finite, or smaller than half an inventory unit.
    InvalidQuantity { qty_base: f64 },
    /// Resulting `|inventory|` would exceed the configured bound.
    RiskLimitExceeded { inventory_after: i64, limit: i64 },
    /// The integrated consideration is not a finite positive number.
    NonPositivePrice { total_quote: f64 },
}

impl std::fmt::Display for CurveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidQuantity { qty_base } => {
                write!(f, "invalid quantity: {qty_base} (must be finite and >= one inventory unit)")
            }
            Self::RiskLimitExceeded {
                inventory_after,
                limit,
            } => write!(
                f,
                "risk limit exceeded: |inventory_after| = {} > {limit}",
                inventory_after.unsigned_abs()
            ),
            Self::NonPositivePrice { total_quote } => {
                write!(f, "curve produced non-positive consideration: {total_quote}")
            }
        }
    }
}

impl std::error::Error for CurveError {}

/// Rejection of a [`CurveParams`] set at construction time.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveParamsError {
    pub reason: String,
}

impl std::fmt::Display for CurveParamsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid curve params: {}", self.reason)
    }
}

impl std::error::Error for CurveParamsError {}

fn params_err(reason: impl Into<String>) -> CurveParamsError {
    CurveParamsError {
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// PricingCurve
// ---------------------------------------------------------------------------

/// Validated pricing curve. Cheap to copy; holds no ledger state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PricingCurve {
    params: CurveParams,
}

impl PricingCurve {
    /// Validate and wrap curve parameters.
    ///
    /// Besides basic range checks this rejects any `k` for which the mid price
    /// could reach zero or go negative anywhere a trade is allowed to sweep
    /// (one unit of slack past the risk limit covers rounding of the endpoint).
    pub fn new(params: CurveParams) -> Result<Self, CurveParamsError> {
        if !params.k.is_finite() {
            return Err(params_err("k must be finite"));
        }
        if !params.unit_granularity.is_finite() || params.unit_granularity <= 0.0 {
            return Err(params_err("unit_granularity must be finite and > 0"));
        }
        if params.max_abs_inventory <= 0 {
            return Err(params_err("max_abs_inventory must be > 0"));
        }

        let reach = (params.max_abs_inventory as f64 + 1.0) * params.unit_granularity;
        if 1.0 - params.k.abs() * reach <= 0.0 {
            return Err(params_err(format!(
                "k={} drives the mid price to <= 0 within the risk limit (reach {reach} base units)",
                params.k
            )));
        }

        Ok(Self { params })
    }

    pub fn params(&self) -> &CurveParams {
        &self.params
    }

    /// Stable fingerprint of everything that affects the price of a trade.
    ///
    /// Stamped on every trade record so a replay under different parameters
    /// is attributable to a curve change rather than to ledger corruption.
    pub fn pricing_version(&self) -> String {
        let canonical = format!(
            "k={:?};unit_granularity={:?}",
            self.params.k, self.params.unit_granularity
        );
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Instantaneous mid price at inventory position `x_base` (base units).
    pub fn mid_price_at(&self, base_unit_price: f64, x_base: f64) -> f64 {
        base_unit_price * (1.0 + self.params.k * x_base)
    }

    /// Integral of `P` from `x0` to `x1`, as an unsigned consideration.
    pub fn integrate_mid(&self, base_unit_price: f64, x0: f64, x1: f64) -> f64 {
        let q = (x1 - x0).abs();
        base_unit_price * q * (1.0 + self.params.k * (x0 + x1) * 0.5)
    }

    /// Signed inventory-unit change caused by trading `qty_base` on `side`.
    pub fn inventory_delta(&self, side: Side, qty_base: f64) -> Result<i64, CurveError> {
        if !qty_base.is_finite() || qty_base <= 0.0 {
            return Err(CurveError::InvalidQuantity { qty_base });
        }
        let units = (qty_base / self.params.unit_granularity).round();
        if units < 1.0 {
            return Err(CurveError::InvalidQuantity { qty_base });
        }
        // Anything this large is far past any sane risk limit.
        if units >= i64::MAX as f64 {
            return Err(CurveError::RiskLimitExceeded {
                inventory_after: i64::MAX,
                limit: self.params.max_abs_inventory,
            });
        }
        Ok(side.inventory_sign() * units as i64)
    }

    /// Price `qty_base` on `side` starting from `point`.
    pub fn quote(&self, point: &CurvePoint, side: Side, qty_base: f64) -> Result<Quote, CurveError> {
        let delta = self.inventory_delta(side, qty_base)?;
        let limit = self.params.max_abs_inventory;

        let inventory_after = point
            .inventory
            .checked_add(delta)
            .ok_or(CurveError::RiskLimitExceeded {
                inventory_after: if delta > 0 { i64::MAX } else { i64::MIN },
                limit,
            })?;
        if inventory_after.unsigned_abs() > limit.unsigned_abs() {
            return Err(CurveError::RiskLimitExceeded {
                inventory_after,
                limit,
            });
        }

        let x0 = point.inventory as f64 * self.params.unit_granularity;
        let x1 = match side {
            Side::Sell => x0 + qty_base,
            Side::Buy => x0 - qty_base,
        };

        let mid = self.integrate_mid(point.base_unit_price, x0, x1);
        let total_quote = match side {
            Side::Sell => mid * (1.0 - point.half_spread),
            Side::Buy => mid * (1.0 + point.half_spread),
        };
        if !total_quote.is_finite() || total_quote <= 0.0 {
            return Err(CurveError::NonPositivePrice { total_quote });
        }

        Ok(Quote {
            side,
            qty_base,
            total_quote,
            avg_price: total_quote / qty_base,
            inventory_before: point.inventory,
            inventory_after,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
