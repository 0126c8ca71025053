use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use amm_ledger::{Side, TradeRequest};

#[macro_use]
mod commands;

use commands::{ledger, StoreArgs};

#[derive(Parser)]
#[command(name = "amm")]
#[command(about = "Dealer AMM ledger CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// Layered config paths in merge order (base -> env -> overrides)
    #[arg(long = "config", required = true)]
    config_paths: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Price a trade against the current ledger without executing it
    Quote {
        #[command(flatten)]
        config: ConfigArgs,
        #[command(flatten)]
        store: StoreArgs,

        /// buy | sell (user perspective)
        #[arg(long, value_parser = parse_side)]
        side: Side,

        /// Base-token quantity
        #[arg(long)]
        qty: f64,
    },

    /// Indicative mid/buy/sell and liquidation floor at the current inventory
    Spot {
        #[command(flatten)]
        config: ConfigArgs,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Execute one trade and commit it to the store
    Trade {
        #[command(flatten)]
        config: ConfigArgs,
        #[command(flatten)]
        store: StoreArgs,

        #[arg(long, value_parser = parse_side)]
        side: Side,

        #[arg(long)]
        qty: f64,

        /// Counterparty identifier recorded on the trade
        #[arg(long)]
        counterparty: String,

        /// Slippage bound: max quote paid on a buy, min quote received on a sell
        #[arg(long)]
        limit: Option<f64>,
    },

    /// Replay the trade log from genesis and compare with the live ledger
    Reconcile {
        #[command(flatten)]
        config: ConfigArgs,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Journal utilities
    Journal {
        #[command(subcommand)]
        cmd: JournalCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum JournalCmd {
    /// Check the hash chain of a journal file
    Verify {
        /// Journal path
        path: String,
    },
}

fn parse_side(s: &str) -> Result<Side, String> {
    Side::parse(s).ok_or_else(|| format!("invalid side '{s}'. expected one of: buy | sell"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the key=value results; logs go to stderr.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev-time convenience; absence is not an error.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = amm_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = amm_db::status(&pool).await?;
                    println!(
                        "db_ok={} has_ledger_table={} last_trade_id={}",
                        s.ok,
                        s.has_ledger_table,
                        s.last_trade_id
                            .map(|id| id.to_string())
                            .unwrap_or_else(|| "NONE".to_string())
                    );
                }
                DbCmd::Migrate => {
                    amm_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = amm_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Quote {
            config,
            store,
            side,
            qty,
        } => {
            let cfg = commands::load_config(&config.config_paths)?;
            store.require_existing_journal("quote")?;
            with_store!(store, |s| ledger::quote(s, &cfg, side, qty).await)?;
        }

        Commands::Spot { config, store } => {
            let cfg = commands::load_config(&config.config_paths)?;
            store.require_existing_journal("spot")?;
            with_store!(store, |s| ledger::spot(s, &cfg).await)?;
        }

        Commands::Trade {
            config,
            store,
            side,
            qty,
            counterparty,
            limit,
        } => {
            let cfg = commands::load_config(&config.config_paths)?;
            store.require_persistent("trade")?;
            let mut req = TradeRequest::new(side, qty, counterparty);
            if let Some(limit) = limit {
                req = req.with_limit(limit);
            }
            with_store!(store, |s| ledger::trade(s, &cfg, req).await)?;
        }

        Commands::Reconcile { config, store } => {
            let cfg = commands::load_config(&config.config_paths)?;
            store.require_persistent("reconcile")?;
            with_store!(store, |s| ledger::reconcile(s, &cfg).await)?;
        }

        Commands::Journal { cmd } => match cmd {
            JournalCmd::Verify { path } => commands::verify_journal(&path)?,
        },
    }

    Ok(())
}
