//! Command handler modules for amm-cli.
//!
//! Store selection and config loading are shared here. Ledger commands live
//! in [`ledger`].

pub mod ledger;

use std::path::PathBuf;

use amm_audit::VerifyResult;
use amm_config::DealerConfig;
use anyhow::{bail, Result};
use clap::Args;

// ---------------------------------------------------------------------------
// Store selection
// ---------------------------------------------------------------------------

/// Where the ledger lives. Without either flag, commands run against an
/// in-memory ledger opened at the configured genesis.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Hash-chained JSONL journal (created on first trade)
    #[arg(long, conflicts_with = "db")]
    pub journal: Option<PathBuf>,

    /// Postgres store via AMM_DATABASE_URL
    #[arg(long, default_value_t = false)]
    pub db: bool,
}

pub enum Backend {
    Genesis,
    Journal(PathBuf),
    Postgres,
}

impl StoreArgs {
    pub fn backend(&self) -> Backend {
        match (&self.journal, self.db) {
            (Some(p), _) => Backend::Journal(p.clone()),
            (None, true) => Backend::Postgres,
            (None, false) => Backend::Genesis,
        }
    }

    pub fn require_persistent(&self, cmd: &str) -> Result<()> {
        if let Backend::Genesis = self.backend() {
            bail!("{cmd} requires a store: pass --journal PATH or --db");
        }
        Ok(())
    }

    /// Read-only commands must not create a journal: opening one that has no
    /// genesis line yet would write it.
    pub fn require_existing_journal(&self, cmd: &str) -> Result<()> {
        if let Backend::Journal(path) = self.backend() {
            let len = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            if len == 0 {
                bail!(
                    "{cmd} is read-only: journal {} does not exist yet; run a trade first or omit --journal",
                    path.display()
                );
            }
        }
        Ok(())
    }
}

/// Bind an `Arc<impl LedgerStore>` for the selected backend and evaluate
/// `$body` with it.
macro_rules! with_store {
    ($args:expr, |$store:ident| $body:expr) => {
        match $args.backend() {
            $crate::commands::Backend::Genesis => {
                let $store = std::sync::Arc::new(amm_ledger::MemoryStore::new());
                $body
            }
            $crate::commands::Backend::Journal(path) => {
                let $store = std::sync::Arc::new(amm_audit::JournalStore::open(&path)?);
                $body
            }
            $crate::commands::Backend::Postgres => {
                let pool = amm_db::connect_from_env().await?;
                let $store = std::sync::Arc::new(amm_db::PgLedgerStore::new(pool));
                $body
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

pub fn load_config(paths: &[String]) -> Result<DealerConfig> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let (loaded, cfg) = amm_config::load_dealer_config(&path_refs)?;
    tracing::debug!(config_hash = %loaded.config_hash, "dealer config loaded");
    Ok(cfg)
}

pub fn verify_journal(path: &str) -> Result<()> {
    match amm_audit::verify_journal(path)? {
        VerifyResult::Valid { lines } => {
            println!("journal_valid=true lines={lines}");
            Ok(())
        }
        VerifyResult::Broken { line, reason } => {
            println!("journal_valid=false line={line}");
            bail!("JOURNAL_BROKEN line={line}: {reason}")
        }
    }
}
