//! `LedgerStore` over the hash-chained journal file.
//!
//! On open the whole file is verified and folded into memory. A commit is a
//! single `write_all` of one line followed by `sync_data`; the in-memory fold
//! only advances after both return. If either fails, the file is truncated
//! back to its length before the append, so a refused commit leaves no bytes
//! behind. If that truncation fails too, the store is poisoned and refuses
//! every later write until it is reopened (reopen then reports the torn line).
//!
//! File IO runs on the blocking pool (`spawn_blocking`), never on an async
//! worker.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use amm_ledger::{check_genesis, LedgerState, LedgerStore, StoreError, TradeRecord};
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::{canonical_json_line, verify_journal_str, JournalEntry, VerifyResult, EVENT_GENESIS, EVENT_TRADE};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum JournalError {
    Io { path: PathBuf, reason: String },
    /// Chain, shape or payload problem at a 1-based line.
    Corrupt { line: usize, reason: String },
}

impl std::fmt::Display for JournalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, reason } => write!(f, "journal io error at {}: {reason}", path.display()),
            Self::Corrupt { line, reason } => write!(f, "journal corrupt at line {line}: {reason}"),
        }
    }
}

impl std::error::Error for JournalError {}

/// One-shot failure for the next append, for failure drills and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendFault {
    /// Write only the first `keep` bytes of the line, then fail.
    TornWrite { keep: usize },
    /// Write the whole line, then fail as if `sync_data` had.
    SyncFailure,
    /// Torn write whose truncation also fails.
    TornWriteNoRollback { keep: usize },
}

fn injected(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("injected {what}"))
}

// ---------------------------------------------------------------------------
// JournalStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Folded {
    genesis: Option<LedgerState>,
    state: Option<LedgerState>,
    trades: Vec<TradeRecord>,
    last_hash: Option<String>,
    fault: Option<AppendFault>,
    /// Set when a failed append could not be undone.
    poisoned: Option<String>,
}

#[derive(Debug)]
struct Journal {
    path: PathBuf,
    folded: Mutex<Folded>,
}

#[derive(Debug)]
pub struct JournalStore {
    inner: Arc<Journal>,
}

impl JournalStore {
    /// Open (or prepare to create) the journal at `path`, verifying and
    /// folding any existing content.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |e: io::Error| JournalError::Io {
            path: path.clone(),
            reason: e.to_string(),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let folded = if path.exists() {
            let content = fs::read_to_string(&path).map_err(io_err)?;
            fold_journal(&content)?
        } else {
            Folded::default()
        };

        info!(
            path = %path.display(),
            trades = folded.trades.len(),
            "journal opened"
        );

        Ok(Self {
            inner: Arc::new(Journal {
                path,
                folded: Mutex::new(folded),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Make the next append fail as described by `fault`.
    pub fn inject_append_fault(&self, fault: AppendFault) -> Result<(), StoreError> {
        self.inner.lock()?.fault = Some(fault);
        Ok(())
    }

    /// Why the store refuses writes, if it does.
    pub fn poisoned(&self) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock()?.poisoned.clone())
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Journal) -> Result<T, StoreError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| StoreError::Backend(format!("journal io task: {e}")))?
    }
}

impl Journal {
    fn lock(&self) -> Result<MutexGuard<'_, Folded>, StoreError> {
        self.folded
            .lock()
            .map_err(|_| StoreError::Backend("journal mutex poisoned".to_string()))
    }

    /// Append one line, or leave the file exactly as it was.
    fn append(&self, folded: &mut Folded, entry: &JournalEntry) -> Result<(), StoreError> {
        if let Some(reason) = &folded.poisoned {
            return Err(StoreError::Backend(format!(
                "journal refuses writes after an unrecovered append failure: {reason}"
            )));
        }

        let mut line = canonical_json_line(entry).map_err(StoreError::backend)?;
        line.push('\n');

        let mut f: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::Backend(format!("open journal {:?}: {e}", self.path)))?;
        let prev_len = f
            .metadata()
            .map_err(|e| StoreError::Backend(format!("stat journal {:?}: {e}", self.path)))?
            .len();

        let fault = folded.fault.take();
        let Err(write_err) = write_line(&mut f, line.as_bytes(), fault) else {
            return Ok(());
        };

        let rollback = match fault {
            Some(AppendFault::TornWriteNoRollback { .. }) => Err(injected("rollback failure")),
            _ => f.set_len(prev_len).and_then(|()| f.sync_data()),
        };
        match rollback {
            Ok(()) => {
                warn!(
                    path = %self.path.display(),
                    seq = entry.seq,
                    prev_len,
                    "journal append failed, truncated back: {write_err}"
                );
                Err(StoreError::Backend(format!(
                    "journal append failed: {write_err}"
                )))
            }
            Err(rollback_err) => {
                let reason = format!(
                    "append of seq {} failed ({write_err}) and truncation to {prev_len} bytes failed ({rollback_err})",
                    entry.seq
                );
                error!(path = %self.path.display(), "journal poisoned: {reason}");
                folded.poisoned = Some(reason.clone());
                Err(StoreError::Backend(reason))
            }
        }
    }
}

fn write_line(f: &mut File, bytes: &[u8], fault: Option<AppendFault>) -> io::Result<()> {
    match fault {
        Some(AppendFault::TornWrite { keep }) | Some(AppendFault::TornWriteNoRollback { keep }) => {
            f.write_all(&bytes[..keep.min(bytes.len())])?;
            Err(injected("torn write"))
        }
        Some(AppendFault::SyncFailure) => {
            f.write_all(bytes)?;
            Err(injected("sync failure"))
        }
        None => {
            f.write_all(bytes)?;
            f.sync_data()
        }
    }
}

fn fold_journal(content: &str) -> Result<Folded, JournalError> {
    if let VerifyResult::Broken { line, reason } = verify_journal_str(content) {
        return Err(JournalError::Corrupt { line, reason });
    }

    let mut folded = Folded::default();
    for (i, raw) in content.lines().enumerate() {
        if raw.trim().is_empty() {
            continue;
        }
        let line = i + 1;
        let corrupt = |reason: String| JournalError::Corrupt { line, reason };

        let entry: JournalEntry =
            serde_json::from_str(raw.trim()).map_err(|e| corrupt(e.to_string()))?;

        match (entry.event_type.as_str(), folded.state.as_ref()) {
            (EVENT_GENESIS, None) => {
                let g: LedgerState = serde_json::from_value(entry.payload)
                    .map_err(|e| corrupt(format!("genesis payload: {e}")))?;
                folded.genesis = Some(g.clone());
                folded.state = Some(g);
            }
            (EVENT_TRADE, Some(state)) => {
                let rec: TradeRecord = serde_json::from_value(entry.payload)
                    .map_err(|e| corrupt(format!("trade payload: {e}")))?;
                if rec.trade_id != entry.seq || rec.trade_id != state.last_trade_id + 1 {
                    return Err(corrupt(format!(
                        "trade_id {} does not follow {}",
                        rec.trade_id, state.last_trade_id
                    )));
                }
                folded.state = Some(state.advance(&rec));
                folded.trades.push(rec);
            }
            (other, _) => return Err(corrupt(format!("unexpected {other} entry"))),
        }
        folded.last_hash = entry.hash_self;
    }
    Ok(folded)
}

#[async_trait]
impl LedgerStore for JournalStore {
    async fn initialize(&self, genesis: &LedgerState) -> Result<LedgerState, StoreError> {
        let genesis = genesis.clone();
        self.blocking(move |j| {
            let mut folded = j.lock()?;
            if let (Some(stored), Some(state)) = (folded.genesis.as_ref(), folded.state.as_ref()) {
                check_genesis(stored, &genesis)?;
                return Ok(state.clone());
            }

            let payload = serde_json::to_value(&genesis).map_err(StoreError::backend)?;
            let entry = JournalEntry::chained(0, EVENT_GENESIS, payload, None)
                .map_err(StoreError::backend)?;
            j.append(&mut folded, &entry)?;

            folded.genesis = Some(genesis.clone());
            folded.state = Some(genesis.clone());
            folded.last_hash = entry.hash_self;
            Ok(genesis)
        })
        .await
    }

    async fn load_genesis(&self) -> Result<LedgerState, StoreError> {
        self.inner.lock()?.genesis.clone().ok_or(StoreError::NotInitialized)
    }

    async fn load_state(&self) -> Result<LedgerState, StoreError> {
        self.inner.lock()?.state.clone().ok_or(StoreError::NotInitialized)
    }

    async fn load_trades(&self) -> Result<Vec<TradeRecord>, StoreError> {
        Ok(self.inner.lock()?.trades.clone())
    }

    async fn commit(
        &self,
        expected_last_trade_id: u64,
        next: &LedgerState,
        record: &TradeRecord,
    ) -> Result<(), StoreError> {
        let next = next.clone();
        let record = record.clone();
        self.blocking(move |j| {
            let mut folded = j.lock()?;
            let found = folded
                .state
                .as_ref()
                .ok_or(StoreError::NotInitialized)?
                .last_trade_id;
            if found != expected_last_trade_id || record.trade_id != found + 1 {
                return Err(StoreError::Conflict {
                    expected: expected_last_trade_id,
                    found,
                });
            }

            let payload = serde_json::to_value(&record).map_err(StoreError::backend)?;
            let entry = JournalEntry::chained(
                record.trade_id,
                EVENT_TRADE,
                payload,
                folded.last_hash.clone(),
            )
            .map_err(StoreError::backend)?;
            j.append(&mut folded, &entry)?;

            folded.state = Some(next);
            folded.trades.push(record);
            folded.last_hash = entry.hash_self;
            Ok(())
        })
        .await
    }
}
