//! amm-audit
//!
//! Durable trade journal. One JSON line per entry, keys sorted, SHA-256 hash
//! chain (`hash_prev` links to the previous line's `hash_self`).
//!
//! Line 1 is always the GENESIS entry; every later line is a TRADE entry.
//! The ledger row is never stored separately: it is the fold of the journal,
//! so appending the TRADE line is the whole commit.

mod store;

pub use store::{AppendFault, JournalError, JournalStore};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

pub const EVENT_GENESIS: &str = "GENESIS";
pub const EVENT_TRADE: &str = "TRADE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// 0 for genesis, then equal to the trade id.
    pub seq: u64,
    pub event_type: String,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

impl JournalEntry {
    /// Build a chained entry: fills `hash_prev` and `hash_self`.
    pub fn chained(
        seq: u64,
        event_type: &str,
        payload: Value,
        hash_prev: Option<String>,
    ) -> Result<Self> {
        let mut entry = Self {
            seq,
            event_type: event_type.to_string(),
            payload,
            hash_prev,
            hash_self: None,
        };
        entry.hash_self = Some(compute_entry_hash(&entry)?);
        Ok(entry)
    }
}

/// Canonicalize by sorting keys recursively and emitting compact JSON.
pub fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize journal entry failed")?;
    serde_json::to_string(&sort_keys(&raw)).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Hash of the canonical entry with `hash_self` cleared.
pub fn compute_entry_hash(entry: &JournalEntry) -> Result<String> {
    let mut clone = entry.clone();
    clone.hash_self = None;

    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Result of hash chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}

pub fn verify_journal(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read journal {:?}", path.as_ref()))?;
    Ok(verify_journal_str(&content))
}

/// Verify chain links, per-line hashes and journal shape (genesis first,
/// contiguous `seq`). Unparseable lines are reported as breaks.
pub fn verify_journal_str(content: &str) -> VerifyResult {
    let mut prev_hash: Option<String> = None;
    let mut lines = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let line_no = i + 1;
        let broken = |reason: String| VerifyResult::Broken {
            line: line_no,
            reason,
        };

        let entry: JournalEntry = match serde_json::from_str(trimmed) {
            Ok(e) => e,
            Err(e) => return broken(format!("unparseable entry: {e}")),
        };

        let expected_type = if lines == 0 { EVENT_GENESIS } else { EVENT_TRADE };
        if entry.event_type != expected_type {
            return broken(format!(
                "expected {expected_type} entry, got {}",
                entry.event_type
            ));
        }
        if entry.seq != lines as u64 {
            return broken(format!("seq gap: expected {lines}, got {}", entry.seq));
        }

        if entry.hash_prev != prev_hash {
            return broken(format!(
                "hash_prev mismatch: expected {:?}, got {:?}",
                prev_hash, entry.hash_prev
            ));
        }

        let Some(claimed) = entry.hash_self.as_deref() else {
            return broken("missing hash_self".to_string());
        };
        match compute_entry_hash(&entry) {
            Ok(recomputed) if recomputed == claimed => {}
            Ok(recomputed) => {
                return broken(format!(
                    "hash_self mismatch: claimed {claimed}, recomputed {recomputed}"
                ))
            }
            Err(e) => return broken(format!("rehash failed: {e}")),
        }

        prev_hash = entry.hash_self;
        lines += 1;
    }

    VerifyResult::Valid { lines }
}
