//! amm-pricing
//!
//! Pricing curve for the dealer AMM.
//! - Linear instantaneous price `P(x) = base_unit_price * (1 + k * x)`
//! - Fills are volume-integrated over the inventory range a trade sweeps
//! - Half-spread applied multiplicatively on top of the integrated mid
//! - Indicative spot quotes and the public liquidation floor
//!
//! Deterministic, pure logic. No IO, no time, no shared state.

mod curve;
mod spot;
mod types;

pub use curve::{CurveError, CurveParamsError, PricingCurve};
pub use spot::{floor_price, SpotQuote};
pub use types::{CurveParams, CurvePoint, Quote, Side};
