//! Ledger commands. Each handler is generic over the store so the journal,
//! Postgres and in-memory backends share one code path.

use std::sync::Arc;

use amm_config::DealerConfig;
use amm_ledger::{LedgerStore, Side, TradeExecutor, TradeRequest};
use anyhow::{bail, Context, Result};
use chrono::Utc;

async fn open_executor<S: LedgerStore>(
    store: Arc<S>,
    cfg: &DealerConfig,
) -> Result<TradeExecutor<S>> {
    TradeExecutor::open(
        store,
        cfg.curve()?,
        &cfg.genesis,
        Utc::now(),
        cfg.executor_settings(),
    )
    .await
}

pub async fn quote<S: LedgerStore>(
    store: Arc<S>,
    cfg: &DealerConfig,
    side: Side,
    qty: f64,
) -> Result<()> {
    let ex = open_executor(store, cfg).await?;
    let q = match ex.quote(side, qty) {
        Ok(q) => q,
        Err(e) => bail!("QUOTE_REJECTED kind={} {}", e.kind(), e),
    };
    println!("side={} qty_base={}", q.side, q.qty_base);
    println!("total_quote={}", q.total_quote);
    println!("avg_price={}", q.avg_price);
    println!(
        "inventory_before={} inventory_after={}",
        q.inventory_before, q.inventory_after
    );
    println!("pricing_version={}", ex.pricing_version());
    Ok(())
}

pub async fn spot<S: LedgerStore>(store: Arc<S>, cfg: &DealerConfig) -> Result<()> {
    let ex = open_executor(store, cfg).await?;
    let state = ex.snapshot();
    let s = ex.spot();
    println!("inventory={}", state.inventory);
    println!("mid={}", s.mid);
    println!("buy={}", s.buy);
    println!("sell={}", s.sell);
    println!("floor={}", s.floor);
    Ok(())
}

pub async fn trade<S: LedgerStore>(
    store: Arc<S>,
    cfg: &DealerConfig,
    req: TradeRequest,
) -> Result<()> {
    let ex = open_executor(store, cfg).await?;
    let rec = match ex.execute_trade(req).await {
        Ok(rec) => rec,
        Err(e) if e.is_rejection() => bail!("TRADE_REJECTED kind={} {}", e.kind(), e),
        Err(e) => bail!("TRADE_FAILED kind={} {}", e.kind(), e),
    };
    println!("trade_id={}", rec.trade_id);
    println!("side={} qty_base={}", rec.side, rec.qty_base);
    println!("total_quote={}", rec.total_quote);
    println!("avg_price={}", rec.avg_price);
    println!(
        "inventory_before={} inventory_after={}",
        rec.inventory_before, rec.inventory_after
    );
    println!("quote_reserves_after={}", rec.quote_reserves_after);
    println!("circulating_supply_after={}", rec.circulating_supply_after);
    println!("created_at={}", rec.created_at.to_rfc3339());
    Ok(())
}

/// Read-only: loads the stored genesis, log and live row and replays them.
pub async fn reconcile<S: LedgerStore>(store: Arc<S>, cfg: &DealerConfig) -> Result<()> {
    let curve = cfg.curve()?;
    let genesis = store.load_genesis().await.context("load genesis")?;
    let trades = store.load_trades().await.context("load trades")?;
    let live = store.load_state().await.context("load live state")?;

    let report = amm_reconcile::reconcile(
        &curve,
        &genesis,
        &trades,
        &live,
        cfg.reconcile.rel_tolerance,
    );

    println!("trades_replayed={}", report.trades_replayed);
    println!("action={:?}", report.action);
    for reason in &report.reasons {
        println!("reason={reason:?}");
    }
    for diff in &report.diffs {
        println!("diff={diff:?}");
    }

    if !report.is_clean() {
        bail!(
            "RECONCILE_DRIFT reasons={:?} diffs={}",
            report.reasons,
            report.diffs.len()
        );
    }
    Ok(())
}
