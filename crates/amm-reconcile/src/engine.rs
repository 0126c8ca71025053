use amm_ledger::{LedgerState, TradeRecord};
use amm_pricing::PricingCurve;

use crate::{ReconcileAction, ReconcileDiff, ReconcileReason, ReconcileReport};

fn push_reason_once(reasons: &mut Vec<ReconcileReason>, r: ReconcileReason) {
    if !reasons.contains(&r) {
        reasons.push(r);
    }
}

/// Relative closeness. Exact equality always passes, including 0 == 0.
fn close(a: f64, b: f64, rel_tol: f64) -> bool {
    a == b || (a - b).abs() <= rel_tol * a.abs().max(b.abs())
}

fn real(v: f64) -> String {
    format!("{v:?}")
}

struct Check<'a> {
    trade_id: u64,
    rel_tol: f64,
    diffs: &'a mut Vec<ReconcileDiff>,
    reasons: &'a mut Vec<ReconcileReason>,
    faulty: bool,
}

impl Check<'_> {
    fn real(&mut self, field: &str, replayed: f64, logged: f64, reason: ReconcileReason) {
        if !close(replayed, logged, self.rel_tol) {
            self.diffs.push(ReconcileDiff::FieldMismatch {
                trade_id: self.trade_id,
                field: field.to_string(),
                replayed: real(replayed),
                logged: real(logged),
            });
            push_reason_once(self.reasons, reason);
            self.faulty = true;
        }
    }

    fn int(&mut self, field: &str, replayed: i64, logged: i64) {
        if replayed != logged {
            self.diffs.push(ReconcileDiff::FieldMismatch {
                trade_id: self.trade_id,
                field: field.to_string(),
                replayed: replayed.to_string(),
                logged: logged.to_string(),
            });
            push_reason_once(self.reasons, ReconcileReason::SnapshotMismatch);
            self.faulty = true;
        }
    }
}

/// Replay `trades` from `genesis` under `curve` and compare against every
/// logged snapshot and finally against `live`.
///
/// Checks per record, in log order:
/// - `trade_id` continues the sequence
/// - `created_at` does not go backwards
/// - `pricing_version` matches the current curve
/// - `inventory_before` continues from the replayed inventory
/// - repricing succeeds and reproduces `total_quote`, `avg_price` and the
///   `*_after` snapshot within `rel_tol`
pub fn reconcile(
    curve: &PricingCurve,
    genesis: &LedgerState,
    trades: &[TradeRecord],
    live: &LedgerState,
    rel_tol: f64,
) -> ReconcileReport {
    let mut reasons: Vec<ReconcileReason> = Vec::new();
    let mut diffs: Vec<ReconcileDiff> = Vec::new();
    let current_version = curve.pricing_version();

    let mut state = genesis.clone();
    for rec in trades {
        let mut check = Check {
            trade_id: rec.trade_id,
            rel_tol,
            diffs: &mut diffs,
            reasons: &mut reasons,
            faulty: false,
        };

        // 1) Sequence
        let expected_id = state.last_trade_id + 1;
        if rec.trade_id != expected_id {
            check.diffs.push(ReconcileDiff::TradeIdGap {
                expected: expected_id,
                found: rec.trade_id,
            });
            push_reason_once(check.reasons, ReconcileReason::TradeIdSequence);
            check.faulty = true;
        }

        // 2) Time
        if rec.created_at < state.updated_at {
            check.diffs.push(ReconcileDiff::TimestampRegression {
                trade_id: rec.trade_id,
                previous: state.updated_at.to_rfc3339(),
                found: rec.created_at.to_rfc3339(),
            });
            push_reason_once(check.reasons, ReconcileReason::TimestampRegression);
            check.faulty = true;
        }

        // 3) Curve identity. Reported; repricing below decides whether to resync.
        if rec.pricing_version != current_version {
            check.diffs.push(ReconcileDiff::PricingVersion {
                trade_id: rec.trade_id,
                logged: rec.pricing_version.clone(),
                current: current_version.clone(),
            });
            push_reason_once(check.reasons, ReconcileReason::PricingVersionChanged);
        }

        // 4) Inventory chain
        if rec.inventory_before != state.inventory {
            check.diffs.push(ReconcileDiff::InventoryChain {
                trade_id: rec.trade_id,
                replayed: state.inventory,
                logged: rec.inventory_before,
            });
            push_reason_once(check.reasons, ReconcileReason::InventoryChainBreak);
            check.faulty = true;
        }

        // 5) Reprice and compare snapshots
        let next = match state.transition(curve, rec.side, rec.qty_base, rec.created_at) {
            Ok(t) => {
                let drift = ReconcileReason::PriceDrift;
                check.real("total_quote", t.quote.total_quote, rec.total_quote, drift.clone());
                check.real("avg_price", t.quote.avg_price, rec.avg_price, drift);
                check.int("inventory_after", t.next.inventory, rec.inventory_after);
                check.real(
                    "quote_reserves_after",
                    t.next.quote_reserves,
                    rec.quote_reserves_after,
                    ReconcileReason::SnapshotMismatch,
                );
                check.real(
                    "circulating_supply_after",
                    t.next.circulating_supply,
                    rec.circulating_supply_after,
                    ReconcileReason::SnapshotMismatch,
                );
                Some(t.next)
            }
            Err(e) => {
                check.diffs.push(ReconcileDiff::ReplayRejected {
                    trade_id: rec.trade_id,
                    error_kind: e.kind().to_string(),
                    detail: e.to_string(),
                });
                push_reason_once(check.reasons, ReconcileReason::ReplayRejected);
                check.faulty = true;
                None
            }
        };

        // Continue from the logged snapshot after any fault.
        state = match next {
            Some(next) if !check.faulty => next,
            _ => state.advance(rec),
        };
    }

    // 6) Live row
    compare_live(&state, live, rel_tol, &mut diffs, &mut reasons);

    reasons.sort();
    diffs.sort();

    ReconcileReport {
        action: if reasons.is_empty() {
            ReconcileAction::Clean
        } else {
            ReconcileAction::Drift
        },
        reasons,
        diffs,
        trades_replayed: trades.len(),
        replayed: state,
    }
}

fn compare_live(
    replayed: &LedgerState,
    live: &LedgerState,
    rel_tol: f64,
    diffs: &mut Vec<ReconcileDiff>,
    reasons: &mut Vec<ReconcileReason>,
) {
    let mut mismatch = |field: &str, r: String, l: String| {
        diffs.push(ReconcileDiff::LiveStateMismatch {
            field: field.to_string(),
            replayed: r,
            live: l,
        });
        push_reason_once(reasons, ReconcileReason::LiveStateMismatch);
    };

    if replayed.inventory != live.inventory {
        mismatch("inventory", replayed.inventory.to_string(), live.inventory.to_string());
    }
    if replayed.last_trade_id != live.last_trade_id {
        mismatch(
            "last_trade_id",
            replayed.last_trade_id.to_string(),
            live.last_trade_id.to_string(),
        );
    }
    if replayed.base_unit_price != live.base_unit_price {
        mismatch("base_unit_price", real(replayed.base_unit_price), real(live.base_unit_price));
    }
    if replayed.half_spread != live.half_spread {
        mismatch("half_spread", real(replayed.half_spread), real(live.half_spread));
    }
    if !close(replayed.quote_reserves, live.quote_reserves, rel_tol) {
        mismatch("quote_reserves", real(replayed.quote_reserves), real(live.quote_reserves));
    }
    if !close(replayed.circulating_supply, live.circulating_supply, rel_tol) {
        mismatch(
            "circulating_supply",
            real(replayed.circulating_supply),
            real(live.circulating_supply),
        );
    }
}

/// True when the log replays cleanly onto `live`.
pub fn is_clean_replay(
    curve: &PricingCurve,
    genesis: &LedgerState,
    trades: &[TradeRecord],
    live: &LedgerState,
    rel_tol: f64,
) -> bool {
    reconcile(curve, genesis, trades, live, rel_tol).is_clean()
}
