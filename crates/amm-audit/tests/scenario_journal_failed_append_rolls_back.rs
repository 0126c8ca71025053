//! Scenario: a failed journal append leaves nothing behind
//!
//! GREEN when:
//! - A torn write surfaces as `CommitFailure`, the file still verifies with
//!   the same line count, and the next trade takes the same `trade_id`.
//! - A sync failure after a full write removes the line again: the refused
//!   trade is not on disk when the journal is reopened.
//! - When the truncation itself fails, the store refuses every later write,
//!   and reopening reports the torn line instead of folding past it.

use std::sync::Arc;

use amm_audit::{verify_journal, AppendFault, JournalError, JournalStore, VerifyResult};
use amm_ledger::{
    ExecutorSettings, GenesisState, LedgerStore, TradeError, TradeExecutor, TradeRequest,
};
use amm_pricing::{CurveParams, PricingCurve};
use chrono::Utc;

fn genesis() -> GenesisState {
    GenesisState {
        inventory: 0,
        base_unit_price: 0.0002,
        half_spread: 0.00125,
        quote_reserves: 10.0,
        circulating_supply: 100_000.0,
    }
}

fn curve() -> PricingCurve {
    PricingCurve::new(CurveParams::flat(1_000_000)).unwrap()
}

async fn open(store: Arc<JournalStore>) -> TradeExecutor<JournalStore> {
    TradeExecutor::open(store, curve(), &genesis(), Utc::now(), ExecutorSettings::default())
        .await
        .unwrap()
}

fn lines(path: &std::path::Path) -> usize {
    match verify_journal(path).unwrap() {
        VerifyResult::Valid { lines } => lines,
        broken => panic!("journal must verify: {broken:?}"),
    }
}

#[tokio::test]
async fn torn_write_is_truncated_and_the_id_is_reused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");
    let store = Arc::new(JournalStore::open(&path).unwrap());
    let ex = open(Arc::clone(&store)).await;

    for _ in 0..3 {
        ex.execute_trade(TradeRequest::buy(10.0, "u")).await.unwrap();
    }
    let len_before = std::fs::metadata(&path).unwrap().len();
    let before = ex.snapshot();

    store
        .inject_append_fault(AppendFault::TornWrite { keep: 40 })
        .unwrap();
    let err = ex
        .execute_trade(TradeRequest::buy(10.0, "u"))
        .await
        .unwrap_err();
    assert!(matches!(err, TradeError::CommitFailure { .. }), "{err}");

    assert_eq!(std::fs::metadata(&path).unwrap().len(), len_before);
    assert_eq!(lines(&path), 4);
    assert_eq!(ex.snapshot(), before);
    assert_eq!(store.load_trades().await.unwrap().len(), 3);

    let rec = ex.execute_trade(TradeRequest::buy(10.0, "u")).await.unwrap();
    assert_eq!(rec.trade_id, 4);
    assert_eq!(lines(&path), 5);

    let reopened = JournalStore::open(&path).unwrap();
    assert_eq!(reopened.load_trades().await.unwrap().len(), 4);
    assert_eq!(reopened.load_state().await.unwrap(), ex.snapshot());
}

#[tokio::test]
async fn sync_failure_does_not_leave_the_refused_trade_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");
    let store = Arc::new(JournalStore::open(&path).unwrap());
    let ex = open(Arc::clone(&store)).await;
    ex.execute_trade(TradeRequest::sell(500.0, "s")).await.unwrap();

    store.inject_append_fault(AppendFault::SyncFailure).unwrap();
    let err = ex
        .execute_trade(TradeRequest::sell(700.0, "refused"))
        .await
        .unwrap_err();
    assert!(matches!(err, TradeError::CommitFailure { .. }), "{err}");

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(!content.contains("refused"));
    assert_eq!(lines(&path), 2);

    let reopened = JournalStore::open(&path).unwrap();
    let trades = reopened.load_trades().await.unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].counterparty, "s");
}

#[tokio::test]
async fn unrecovered_append_poisons_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");
    let store = Arc::new(JournalStore::open(&path).unwrap());
    let ex = open(Arc::clone(&store)).await;
    ex.execute_trade(TradeRequest::buy(10.0, "u")).await.unwrap();

    store
        .inject_append_fault(AppendFault::TornWriteNoRollback { keep: 25 })
        .unwrap();
    let err = ex
        .execute_trade(TradeRequest::buy(10.0, "u"))
        .await
        .unwrap_err();
    assert!(matches!(err, TradeError::CommitFailure { .. }), "{err}");
    assert!(store.poisoned().unwrap().is_some());

    // Later writes are refused rather than appended after the torn bytes.
    let err = ex
        .execute_trade(TradeRequest::buy(10.0, "u"))
        .await
        .unwrap_err();
    match err {
        TradeError::CommitFailure { reason } => assert!(reason.contains("refuses writes"), "{reason}"),
        other => panic!("expected CommitFailure, got {other}"),
    }
    assert_eq!(ex.commit_failures(), 2);

    match JournalStore::open(&path) {
        Err(JournalError::Corrupt { line, .. }) => assert_eq!(line, 3),
        other => panic!("expected a corrupt journal, got {other:?}"),
    }
}
