use std::time::Duration;

use amm_ledger::{ExecutorSettings, GenesisState};
use amm_pricing::{CurveParams, PricingCurve};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{load_layered_yaml, LoadedConfig};

/// Typed dealer configuration. Every section rejects unknown keys so a typo
/// fails loudly instead of silently falling back to a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DealerConfig {
    pub genesis: GenesisState,
    #[serde(default)]
    pub curve: CurveSection,
    pub risk: RiskSection,
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub reconcile: ReconcileSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CurveSection {
    /// Curvature: fractional mid-price change per base unit of inventory.
    #[serde(default)]
    pub k: f64,
    #[serde(default = "default_unit_granularity")]
    pub unit_granularity: f64,
}

impl Default for CurveSection {
    fn default() -> Self {
        Self {
            k: 0.0,
            unit_granularity: default_unit_granularity(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskSection {
    /// Bound on `|inventory|`, in inventory units.
    pub max_abs_inventory: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionSection {
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileSection {
    /// Relative tolerance when comparing replayed reals with stored ones.
    #[serde(default = "default_rel_tolerance")]
    pub rel_tolerance: f64,
}

impl Default for ReconcileSection {
    fn default() -> Self {
        Self {
            rel_tolerance: default_rel_tolerance(),
        }
    }
}

fn default_unit_granularity() -> f64 {
    1.0
}

fn default_lock_timeout_ms() -> u64 {
    2_000
}

fn default_rel_tolerance() -> f64 {
    1e-9
}

impl DealerConfig {
    /// Deserialize and validate the merged JSON of a loaded config.
    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        let cfg: DealerConfig = serde_json::from_value(loaded.config_json.clone())
            .context("config does not match the dealer schema")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let curve = self.curve()?;
        self.genesis.validate(&curve)?;

        if self.execution.lock_timeout_ms == 0 {
            bail!("execution.lock_timeout_ms must be > 0");
        }
        let tol = self.reconcile.rel_tolerance;
        if !tol.is_finite() || tol < 0.0 {
            bail!("reconcile.rel_tolerance must be finite and >= 0, got {tol}");
        }
        Ok(())
    }

    pub fn curve_params(&self) -> CurveParams {
        CurveParams {
            k: self.curve.k,
            unit_granularity: self.curve.unit_granularity,
            max_abs_inventory: self.risk.max_abs_inventory,
        }
    }

    /// Validated curve. Fails for any `k` that could price at or below zero
    /// inside the risk limit.
    pub fn curve(&self) -> Result<PricingCurve> {
        Ok(PricingCurve::new(self.curve_params())?)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.execution.lock_timeout_ms)
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            lock_timeout: self.lock_timeout(),
        }
    }
}

/// Load, merge and validate YAML layers in one step.
pub fn load_dealer_config(paths: &[&str]) -> Result<(LoadedConfig, DealerConfig)> {
    let loaded = load_layered_yaml(paths)?;
    let cfg = DealerConfig::from_loaded(&loaded)?;
    Ok((loaded, cfg))
}
