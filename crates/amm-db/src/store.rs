//! `LedgerStore` over Postgres.
//!
//! `commit` is one transaction: lock the row `FOR UPDATE`, check
//! `last_trade_id`, insert the trade, update the row. Any error rolls the
//! whole transaction back when it is dropped.

use amm_ledger::{check_genesis, LedgerState, LedgerStore, StoreError, TradeRecord};
use amm_pricing::Side;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(ctx: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |e| StoreError::Backend(format!("{ctx}: {e}"))
}

fn to_i64(v: u64, what: &str) -> Result<i64, StoreError> {
    i64::try_from(v).map_err(|_| StoreError::Backend(format!("{what} {v} exceeds bigint")))
}

fn to_u64(v: i64, what: &str) -> Result<u64, StoreError> {
    u64::try_from(v).map_err(|_| StoreError::Backend(format!("{what} {v} is negative")))
}

const STATE_COLUMNS: &str = "inventory, base_unit_price, half_spread, quote_reserves, \
     circulating_supply, updated_at, last_trade_id";

fn state_from_row(row: &PgRow) -> Result<LedgerState, StoreError> {
    let get = |e: sqlx::Error| StoreError::Backend(format!("decode amm_ledger_state: {e}"));
    Ok(LedgerState {
        inventory: row.try_get("inventory").map_err(get)?,
        base_unit_price: row.try_get("base_unit_price").map_err(get)?,
        half_spread: row.try_get("half_spread").map_err(get)?,
        quote_reserves: row.try_get("quote_reserves").map_err(get)?,
        circulating_supply: row.try_get("circulating_supply").map_err(get)?,
        updated_at: row.try_get("updated_at").map_err(get)?,
        last_trade_id: to_u64(row.try_get("last_trade_id").map_err(get)?, "last_trade_id")?,
    })
}

fn genesis_from_row(row: &PgRow) -> Result<LedgerState, StoreError> {
    let get = |e: sqlx::Error| StoreError::Backend(format!("decode genesis: {e}"));
    Ok(LedgerState {
        inventory: row.try_get("genesis_inventory").map_err(get)?,
        base_unit_price: row.try_get("base_unit_price").map_err(get)?,
        half_spread: row.try_get("half_spread").map_err(get)?,
        quote_reserves: row.try_get("genesis_quote_reserves").map_err(get)?,
        circulating_supply: row.try_get("genesis_circulating_supply").map_err(get)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("genesis_at").map_err(get)?,
        last_trade_id: 0,
    })
}

fn trade_from_row(row: &PgRow) -> Result<TradeRecord, StoreError> {
    let get = |e: sqlx::Error| StoreError::Backend(format!("decode amm_trades: {e}"));
    let side: String = row.try_get("side").map_err(get)?;
    let side = Side::parse(&side)
        .ok_or_else(|| StoreError::Backend(format!("unknown side {side:?} in amm_trades")))?;
    Ok(TradeRecord {
        trade_id: to_u64(row.try_get("trade_id").map_err(get)?, "trade_id")?,
        side,
        counterparty: row.try_get("counterparty").map_err(get)?,
        qty_base: row.try_get("qty_base").map_err(get)?,
        total_quote: row.try_get("total_quote").map_err(get)?,
        avg_price: row.try_get("avg_price").map_err(get)?,
        inventory_before: row.try_get("inventory_before").map_err(get)?,
        inventory_after: row.try_get("inventory_after").map_err(get)?,
        quote_reserves_after: row.try_get("quote_reserves_after").map_err(get)?,
        circulating_supply_after: row.try_get("circulating_supply_after").map_err(get)?,
        created_at: row.try_get("created_at").map_err(get)?,
        pricing_version: row.try_get("pricing_version").map_err(get)?,
    })
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn initialize(&self, genesis: &LedgerState) -> Result<LedgerState, StoreError> {
        // First writer wins; everyone else compares against what it wrote.
        sqlx::query(
            r#"
            insert into amm_ledger_state (
              id, inventory, base_unit_price, half_spread, quote_reserves,
              circulating_supply, updated_at, last_trade_id,
              genesis_inventory, genesis_quote_reserves, genesis_circulating_supply, genesis_at
            ) values (
              true, $1, $2, $3, $4, $5, $6, 0, $1, $4, $5, $6
            )
            on conflict (id) do nothing
            "#,
        )
        .bind(genesis.inventory)
        .bind(genesis.base_unit_price)
        .bind(genesis.half_spread)
        .bind(genesis.quote_reserves)
        .bind(genesis.circulating_supply)
        .bind(genesis.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err("initialize amm_ledger_state"))?;

        let stored = self.load_genesis().await?;
        check_genesis(&stored, genesis)?;
        self.load_state().await
    }

    async fn load_genesis(&self) -> Result<LedgerState, StoreError> {
        let row = sqlx::query(
            r#"
            select base_unit_price, half_spread, genesis_inventory,
                   genesis_quote_reserves, genesis_circulating_supply, genesis_at
            from amm_ledger_state
            where id
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("load genesis"))?
        .ok_or(StoreError::NotInitialized)?;
        genesis_from_row(&row)
    }

    async fn load_state(&self) -> Result<LedgerState, StoreError> {
        let row = sqlx::query(&format!("select {STATE_COLUMNS} from amm_ledger_state where id"))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("load amm_ledger_state"))?
            .ok_or(StoreError::NotInitialized)?;
        state_from_row(&row)
    }

    async fn load_trades(&self) -> Result<Vec<TradeRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            select trade_id, side, counterparty, qty_base, total_quote, avg_price,
                   inventory_before, inventory_after, quote_reserves_after,
                   circulating_supply_after, created_at, pricing_version
            from amm_trades
            order by trade_id asc
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("load amm_trades"))?;
        rows.iter().map(trade_from_row).collect()
    }

    async fn commit(
        &self,
        expected_last_trade_id: u64,
        next: &LedgerState,
        record: &TradeRecord,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err("begin"))?;

        let (found,): (i64,) = sqlx::query_as::<_, (i64,)>(
            "select last_trade_id from amm_ledger_state where id for update",
        )
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err("lock amm_ledger_state"))?
        .ok_or(StoreError::NotInitialized)?;

        let found = to_u64(found, "last_trade_id")?;
        if found != expected_last_trade_id || record.trade_id != found + 1 {
            return Err(StoreError::Conflict {
                expected: expected_last_trade_id,
                found,
            });
        }

        sqlx::query(
            r#"
            insert into amm_trades (
              trade_id, side, counterparty, qty_base, total_quote, avg_price,
              inventory_before, inventory_after, quote_reserves_after,
              circulating_supply_after, created_at, pricing_version
            ) values (
              $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12
            )
            "#,
        )
        .bind(to_i64(record.trade_id, "trade_id")?)
        .bind(record.side.as_str())
        .bind(&record.counterparty)
        .bind(record.qty_base)
        .bind(record.total_quote)
        .bind(record.avg_price)
        .bind(record.inventory_before)
        .bind(record.inventory_after)
        .bind(record.quote_reserves_after)
        .bind(record.circulating_supply_after)
        .bind(record.created_at)
        .bind(&record.pricing_version)
        .execute(&mut *tx)
        .await
        .map_err(db_err("insert amm_trades"))?;

        sqlx::query(
            r#"
            update amm_ledger_state
            set inventory = $1,
                quote_reserves = $2,
                circulating_supply = $3,
                updated_at = $4,
                last_trade_id = $5
            where id
            "#,
        )
        .bind(next.inventory)
        .bind(next.quote_reserves)
        .bind(next.circulating_supply)
        .bind(next.updated_at)
        .bind(to_i64(next.last_trade_id, "last_trade_id")?)
        .execute(&mut *tx)
        .await
        .map_err(db_err("update amm_ledger_state"))?;

        tx.commit().await.map_err(db_err("commit"))?;
        debug!(trade_id = record.trade_id, "pg commit");
        Ok(())
    }
}
