//! Scenario: trades through the CLI land in the journal and reconcile clean
//!
//! GREEN when:
//! - `amm trade --journal` commits contiguous trade ids with the expected
//!   inventory movement.
//! - `amm reconcile` on that journal reports `action=Clean`.
//! - `amm journal verify` accepts the chain (genesis + one line per trade).
//! - Trades without a store and trades outside the slippage bound fail.

use assert_cmd::Command;
use predicates::prelude::*;

const DEALER_YAML: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/dealer.yaml");

fn amm() -> Command {
    let mut cmd = Command::cargo_bin("amm").expect("amm binary");
    cmd.env_remove("AMM_DATABASE_URL");
    cmd
}

#[test]
fn trades_reconcile_clean_and_verify() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let journal = dir.path().join("ledger.jsonl");
    let journal_s = journal.to_string_lossy().to_string();

    amm()
        .args(["trade", "--config", DEALER_YAML, "--journal", &journal_s])
        .args(["--side", "sell", "--qty", "1000", "--counterparty", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("trade_id=1"))
        .stdout(predicate::str::contains("inventory_before=0 inventory_after=1000"));

    amm()
        .args(["trade", "--config", DEALER_YAML, "--journal", &journal_s])
        .args(["--side", "buy", "--qty", "400", "--counterparty", "bob"])
        .assert()
        .success()
        .stdout(predicate::str::contains("trade_id=2"))
        .stdout(predicate::str::contains("inventory_before=1000 inventory_after=600"));

    amm()
        .args(["spot", "--config", DEALER_YAML, "--journal", &journal_s])
        .assert()
        .success()
        .stdout(predicate::str::contains("inventory=600"));

    amm()
        .args(["reconcile", "--config", DEALER_YAML, "--journal", &journal_s])
        .assert()
        .success()
        .stdout(predicate::str::contains("trades_replayed=2"))
        .stdout(predicate::str::contains("action=Clean"));

    amm()
        .args(["journal", "verify", &journal_s])
        .assert()
        .success()
        .stdout(predicate::str::contains("journal_valid=true lines=3"));

    Ok(())
}

#[test]
fn trade_without_store_is_refused() {
    amm()
        .args(["trade", "--config", DEALER_YAML])
        .args(["--side", "buy", "--qty", "10", "--counterparty", "alice"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("requires a store"));
}

#[test]
fn slippage_bound_rejects_and_writes_nothing() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let journal = dir.path().join("ledger.jsonl");
    let journal_s = journal.to_string_lossy().to_string();

    // Sell 1000 at 0.0002 less 0.125% spread receives ~0.19975; demand 0.2.
    amm()
        .args(["trade", "--config", DEALER_YAML, "--journal", &journal_s])
        .args(["--side", "sell", "--qty", "1000", "--counterparty", "alice"])
        .args(["--limit", "0.2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("TRADE_REJECTED kind=SLIPPAGE_EXCEEDED"));

    // Only the genesis line was written when the executor opened.
    amm()
        .args(["journal", "verify", &journal_s])
        .assert()
        .success()
        .stdout(predicate::str::contains("journal_valid=true lines=1"));
    Ok(())
}

#[test]
fn quote_at_genesis_needs_no_store() {
    amm()
        .args(["quote", "--config", DEALER_YAML, "--side", "buy", "--qty", "1000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("inventory_before=0 inventory_after=-1000"))
        .stdout(predicate::str::contains("pricing_version="));
}
