//! amm-db
//!
//! Postgres persistence for the dealer ledger: the singleton
//! `amm_ledger_state` row and the append-only `amm_trades` log, committed
//! together in one transaction.

mod store;

pub use store::PgLedgerStore;

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub const ENV_DB_URL: &str = "AMM_DATABASE_URL";

/// Connect to Postgres using AMM_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_ledger_table: bool,
    /// `None` until the ledger row has been initialised.
    pub last_trade_id: Option<i64>,
}

/// Connectivity, schema presence and ledger position.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = 'public' and table_name = 'amm_ledger_state'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    let last_trade_id = if exists {
        sqlx::query_as::<_, (i64,)>("select last_trade_id from amm_ledger_state where id")
            .fetch_optional(pool)
            .await
            .context("status ledger query failed")?
            .map(|(id,)| id)
    } else {
        None
    };

    Ok(DbStatus {
        ok: one == 1,
        has_ledger_table: exists,
        last_trade_id,
    })
}
