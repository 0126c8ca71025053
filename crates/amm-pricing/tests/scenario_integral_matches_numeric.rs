//! Scenario: closed-form fill price matches numerical integration of P(x)
//!
//! # Invariants under test
//!
//! 1. For any inventory `x0`, quantity `q` and side, `quote().total_quote`
//!    equals a composite-Simpson integration of `P(x)` over `[x0, x0 ± q]`
//!    (spread applied afterwards) within 1e-9 relative.
//! 2. The result is independent of how the quantity is split: pricing `q`
//!    in one trade equals pricing `q/2` twice (before spread).
//! 3. Tiny trades at large `|x0|` keep full precision (no cancellation).
//!
//! All tests are pure; seeded RNG, no IO.

use amm_pricing::{CurveParams, CurvePoint, PricingCurve, Side};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const REL_TOL: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Composite Simpson's rule over `[a, b]` with `n` (even) sub-intervals.
fn simpson<F: Fn(f64) -> f64>(f: F, a: f64, b: f64, n: usize) -> f64 {
    assert!(n % 2 == 0);
    let h = (b - a) / n as f64;
    let mut acc = f(a) + f(b);
    for i in 1..n {
        let x = a + h * i as f64;
        acc += if i % 2 == 1 { 4.0 * f(x) } else { 2.0 * f(x) };
    }
    acc * h / 3.0
}

fn numeric_total(curve: &PricingCurve, point: &CurvePoint, side: Side, qty: f64) -> f64 {
    let g = curve.params().unit_granularity;
    let x0 = point.inventory as f64 * g;
    let (lo, hi) = match side {
        Side::Sell => (x0, x0 + qty),
        Side::Buy => (x0 - qty, x0),
    };
    let mid = simpson(|x| curve.mid_price_at(point.base_unit_price, x), lo, hi, 2_000);
    match side {
        Side::Sell => mid * (1.0 - point.half_spread),
        Side::Buy => mid * (1.0 + point.half_spread),
    }
}

fn rel_err(a: f64, b: f64) -> f64 {
    (a - b).abs() / a.abs().max(b.abs())
}

// ---------------------------------------------------------------------------
// 1. Random grid against Simpson
// ---------------------------------------------------------------------------

#[test]
fn closed_form_matches_simpson_on_random_trades() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x5eed_a11);

    for _ in 0..500 {
        let k: f64 = rng.gen_range(-1e-6..1e-6);
        let curve = PricingCurve::new(CurveParams {
            k,
            unit_granularity: 1.0,
            max_abs_inventory: 100_000,
        })
        .unwrap();

        let point = CurvePoint {
            inventory: rng.gen_range(-50_000..=50_000),
            base_unit_price: rng.gen_range(0.0001..5.0),
            half_spread: rng.gen_range(0.0..0.05),
        };
        let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
        let qty: f64 = rng.gen_range(1.0..40_000.0);

        let quote = curve.quote(&point, side, qty).unwrap();
        let numeric = numeric_total(&curve, &point, side, qty);

        assert!(
            rel_err(quote.total_quote, numeric) <= REL_TOL,
            "k={k} x0={} side={side} qty={qty}: closed={} numeric={numeric}",
            point.inventory,
            quote.total_quote
        );
        assert!((quote.avg_price * qty - quote.total_quote).abs() <= 1e-12 * quote.total_quote);
    }
}

// ---------------------------------------------------------------------------
// 2. Path independence of the mid integral
// ---------------------------------------------------------------------------

#[test]
fn splitting_a_trade_does_not_change_mid_consideration() {
    let curve = PricingCurve::new(CurveParams {
        k: 5e-7,
        unit_granularity: 1.0,
        max_abs_inventory: 200_000,
    })
    .unwrap();

    let whole = curve.integrate_mid(1.5, 10_000.0, 30_000.0);
    let halves = curve.integrate_mid(1.5, 10_000.0, 20_000.0)
        + curve.integrate_mid(1.5, 20_000.0, 30_000.0);
    assert!(rel_err(whole, halves) <= 1e-12);
}

// ---------------------------------------------------------------------------
// 3. Small trade far from zero
// ---------------------------------------------------------------------------

#[test]
fn unit_trade_at_large_inventory_is_precise() {
    let curve = PricingCurve::new(CurveParams {
        k: 1e-6,
        unit_granularity: 1.0,
        max_abs_inventory: 100_000,
    })
    .unwrap();
    let point = CurvePoint {
        inventory: 99_000,
        base_unit_price: 0.0002,
        half_spread: 0.0,
    };

    let q = curve.quote(&point, Side::Sell, 1.0).unwrap();
    // Exact: b * (1 + k * 99_000.5)
    let exact = 0.0002 * (1.0 + 1e-6 * 99_000.5);
    assert!(rel_err(q.total_quote, exact) <= 1e-14);
}

// ---------------------------------------------------------------------------
// 4. Granularity scales the inventory axis
// ---------------------------------------------------------------------------

#[test]
fn granularity_maps_quantity_onto_inventory_units() {
    let curve = PricingCurve::new(CurveParams {
        k: 0.0,
        unit_granularity: 0.5,
        max_abs_inventory: 1_000,
    })
    .unwrap();
    let point = CurvePoint {
        inventory: 10,
        base_unit_price: 1.0,
        half_spread: 0.0,
    };

    let q = curve.quote(&point, Side::Sell, 2.0).unwrap();
    assert_eq!(q.inventory_after, 14);
    let q = curve.quote(&point, Side::Buy, 2.2).unwrap();
    assert_eq!(q.inventory_after, 6, "2.2 / 0.5 = 4.4 rounds to 4 units");
}
