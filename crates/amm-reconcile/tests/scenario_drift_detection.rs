//! Scenario: every class of log/row divergence is reported
//!
//! GREEN when:
//! - An edited `total_quote` yields exactly one PriceDrift diff, at that trade.
//! - An edited reserve snapshot yields SnapshotMismatch starting at that trade.
//! - A missing or duplicated record yields TradeIdSequence (and the
//!   inventory chain break it causes).
//! - A backdated record yields TimestampRegression.
//! - Replaying under a different curvature yields PricingVersionChanged and PriceDrift.
//! - Replaying under a tighter risk limit yields ReplayRejected.
//! - A live row that disagrees with the fold yields LiveStateMismatch only.

use std::sync::Arc;

use amm_ledger::{
    CurveParams, ExecutorSettings, GenesisState, LedgerState, LedgerStore, MemoryStore,
    PricingCurve, TradeExecutor, TradeRecord, TradeRequest,
};
use amm_reconcile::{reconcile, ReconcileAction, ReconcileDiff, ReconcileReason};

const TOL: f64 = 1e-9;

fn curve_with(k: f64, max_abs_inventory: i64) -> PricingCurve {
    PricingCurve::new(CurveParams {
        k,
        unit_granularity: 1.0,
        max_abs_inventory,
    })
    .unwrap()
}

fn curve() -> PricingCurve {
    curve_with(1e-6, 100_000)
}

struct Ledger {
    genesis: LedgerState,
    trades: Vec<TradeRecord>,
    live: LedgerState,
}

/// Six buys of 1000 each: inventory walks 0 → -6000.
async fn ledger() -> Ledger {
    let ex = TradeExecutor::open(
        Arc::new(MemoryStore::new()),
        curve(),
        &GenesisState {
            inventory: 0,
            base_unit_price: 1.0,
            half_spread: 0.002,
            quote_reserves: 0.0,
            circulating_supply: 0.0,
        },
        chrono::Utc::now(),
        ExecutorSettings::default(),
    )
    .await
    .unwrap();
    for _ in 0..6 {
        ex.execute_trade(TradeRequest::buy(1_000.0, "u")).await.unwrap();
    }
    let store = ex.store();
    Ledger {
        genesis: store.load_genesis().await.unwrap(),
        trades: store.load_trades().await.unwrap(),
        live: store.load_state().await.unwrap(),
    }
}

#[tokio::test]
async fn edited_price_is_a_single_drift() {
    let mut l = ledger().await;
    l.trades[2].total_quote *= 1.01;

    let r = reconcile(&curve(), &l.genesis, &l.trades, &l.live, TOL);
    assert_eq!(r.action, ReconcileAction::Drift);
    assert_eq!(r.reasons, vec![ReconcileReason::PriceDrift]);
    assert_eq!(r.diffs.len(), 1);
    assert!(matches!(
        &r.diffs[0],
        ReconcileDiff::FieldMismatch { trade_id: 3, field, .. } if field == "total_quote"
    ));
}

#[tokio::test]
async fn edited_reserve_snapshot_is_a_snapshot_mismatch() {
    let mut l = ledger().await;
    l.trades[2].quote_reserves_after += 5.0;

    let r = reconcile(&curve(), &l.genesis, &l.trades, &l.live, TOL);
    assert_eq!(r.reasons, vec![ReconcileReason::SnapshotMismatch]);
    let first = r
        .diffs
        .iter()
        .filter_map(|d| match d {
            ReconcileDiff::FieldMismatch { trade_id, field, .. } if field == "quote_reserves_after" => {
                Some(*trade_id)
            }
            _ => None,
        })
        .min();
    assert_eq!(first, Some(3));
}

#[tokio::test]
async fn missing_record_breaks_sequence_and_chain() {
    let mut l = ledger().await;
    l.trades.remove(2);

    let r = reconcile(&curve(), &l.genesis, &l.trades, &l.live, TOL);
    assert!(r.reasons.contains(&ReconcileReason::TradeIdSequence));
    assert!(r.reasons.contains(&ReconcileReason::InventoryChainBreak));
    assert!(r.diffs.contains(&ReconcileDiff::TradeIdGap {
        expected: 3,
        found: 4
    }));
    assert!(r.diffs.contains(&ReconcileDiff::InventoryChain {
        trade_id: 4,
        replayed: -2_000,
        logged: -3_000
    }));
    // Resync to logged snapshots keeps the end state aligned with live.
    assert!(!r.reasons.contains(&ReconcileReason::LiveStateMismatch));
}

#[tokio::test]
async fn duplicated_record_breaks_sequence() {
    let mut l = ledger().await;
    let dup = l.trades[1].clone();
    l.trades.insert(2, dup);

    let r = reconcile(&curve(), &l.genesis, &l.trades, &l.live, TOL);
    assert!(r.diffs.contains(&ReconcileDiff::TradeIdGap {
        expected: 3,
        found: 2
    }));
    assert!(r.reasons.contains(&ReconcileReason::InventoryChainBreak));
}

#[tokio::test]
async fn backdated_record_is_a_timestamp_regression() {
    let mut l = ledger().await;
    l.trades[3].created_at = l.trades[2].created_at - chrono::Duration::seconds(10);

    let r = reconcile(&curve(), &l.genesis, &l.trades, &l.live, TOL);
    assert!(r.reasons.contains(&ReconcileReason::TimestampRegression));
    assert!(r.diffs.iter().any(|d| matches!(
        d,
        ReconcileDiff::TimestampRegression { trade_id: 4, .. }
    )));
}

#[tokio::test]
async fn curvature_change_is_attributed() {
    let l = ledger().await;
    let changed = curve_with(2e-6, 100_000);

    let r = reconcile(&changed, &l.genesis, &l.trades, &l.live, TOL);
    assert!(r.reasons.contains(&ReconcileReason::PricingVersionChanged));
    assert!(r.reasons.contains(&ReconcileReason::PriceDrift));
    let versions = r
        .diffs
        .iter()
        .filter(|d| matches!(d, ReconcileDiff::PricingVersion { .. }))
        .count();
    assert_eq!(versions, 6);
}

#[tokio::test]
async fn tighter_risk_limit_rejects_replay() {
    let l = ledger().await;
    let tight = curve_with(1e-6, 4_500);

    let r = reconcile(&tight, &l.genesis, &l.trades, &l.live, TOL);
    assert_eq!(r.reasons, vec![ReconcileReason::ReplayRejected]);
    let rejected: Vec<u64> = r
        .diffs
        .iter()
        .filter_map(|d| match d {
            ReconcileDiff::ReplayRejected {
                trade_id,
                error_kind,
                ..
            } if error_kind == "RISK_LIMIT_EXCEEDED" => Some(*trade_id),
            _ => None,
        })
        .collect();
    assert_eq!(rejected, vec![5, 6]);
}

#[tokio::test]
async fn live_row_drift_is_reported_alone() {
    let l = ledger().await;
    let mut live = l.live.clone();
    live.circulating_supply += 1.0;

    let r = reconcile(&curve(), &l.genesis, &l.trades, &live, TOL);
    assert_eq!(r.reasons, vec![ReconcileReason::LiveStateMismatch]);
    assert!(matches!(
        &r.diffs[..],
        [ReconcileDiff::LiveStateMismatch { field, .. }] if field == "circulating_supply"
    ));
}
