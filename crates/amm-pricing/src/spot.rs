use crate::{CurvePoint, PricingCurve};

/// Indicative prices at the current inventory position.
///
/// Spot prices are display values only: any real fill is volume-integrated
/// and moves away from spot as size grows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpotQuote {
    pub mid: f64,
    pub buy: f64,
    pub sell: f64,
    /// Public liquidation floor, see [`floor_price`].
    pub floor: f64,
}

impl PricingCurve {
    pub fn spot_quote(
        &self,
        point: &CurvePoint,
        quote_reserves: f64,
        circulating_supply: f64,
    ) -> SpotQuote {
        let x = point.inventory as f64 * self.params().unit_granularity;
        let mid = self.mid_price_at(point.base_unit_price, x);
        SpotQuote {
            mid,
            buy: mid * (1.0 + point.half_spread),
            sell: mid * (1.0 - point.half_spread),
            floor: floor_price(quote_reserves, circulating_supply),
        }
    }
}

/// Liquidation floor: quote reserves per outstanding base unit.
/// Zero when nothing is in circulation.
pub fn floor_price(quote_reserves: f64, circulating_supply: f64) -> f64 {
    if circulating_supply <= 0.0 {
        return 0.0;
    }
    quote_reserves / circulating_supply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CurveParams;

    #[test]
    fn spot_brackets_mid_by_half_spread() {
        let curve = PricingCurve::new(CurveParams {
            k: 1e-6,
            unit_granularity: 1.0,
            max_abs_inventory: 10_000,
        })
        .unwrap();
        let point = CurvePoint {
            inventory: 5_000,
            base_unit_price: 2.0,
            half_spread: 0.01,
        };
        let s = curve.spot_quote(&point, 100.0, 400.0);
        assert!((s.mid - 2.01).abs() < 1e-12);
        assert!(s.buy > s.mid && s.sell < s.mid);
        assert!((s.floor - 0.25).abs() < 1e-12);
    }

    #[test]
    fn floor_is_zero_without_supply() {
        assert_eq!(floor_price(10.0, 0.0), 0.0);
    }
}
