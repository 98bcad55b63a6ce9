//! Append-only transaction journal with a verifiable hash chain.
//!
//! Every verification attempt — success or failure — lands here exactly
//! once. Entries are chained: each carries the hash of its predecessor,
//! with `"genesis"` as the first link, so truncation and in-place edits
//! are detectable after the fact with [`verify_chain`].
//!
//! Journal writes are best-effort from the orchestrator's point of view: a
//! failed append must never turn a verified purchase into a failure. The
//! orchestrator swallows append errors and reports them through
//! observability only.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::records::{LogRecord, TransactionLogEntry};

/// Previous-hash marker of the first chain entry.
const GENESIS: &str = "genesis";

/// Append-only journal of verification attempts.
///
/// With a path, entries are appended to a JSONL file and reloaded on open,
/// resuming the chain; without one, the journal is memory-only.
pub struct TransactionJournal {
    path: Option<PathBuf>,
    entries: Mutex<Vec<TransactionLogEntry>>,
}

impl TransactionJournal {
    /// Create a memory-only journal.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Open a file-backed journal, resuming an existing chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or decoded.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let entries = if path.exists() {
            read_journal(&path)?
        } else {
            Vec::new()
        };

        info!(path = %path.display(), entries = entries.len(), "transaction journal opened");
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    /// Append one verification attempt and return its sequence number.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be persisted. Callers on the
    /// purchase decision path must swallow this — see module docs.
    pub fn append(&self, record: LogRecord) -> Result<u64, StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;

        let (sequence_number, previous_hash) = match entries.last() {
            Some(last) => (last.sequence_number + 1, last.entry_hash.clone()),
            None => (1, GENESIS.to_string()),
        };

        let mut entry = TransactionLogEntry {
            sequence_number,
            record,
            previous_hash,
            entry_hash: String::new(),
            created_at: chrono::Utc::now().timestamp(),
        };
        entry.entry_hash = entry.compute_hash();

        if let Some(ref path) = self.path {
            let line = serde_json::to_string(&entry)?;
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{line}")?;
        }

        debug!(
            sequence = entry.sequence_number,
            transaction_id = %entry.record.transaction_id,
            status = ?entry.record.status,
            "journal entry appended"
        );
        entries.push(entry);
        Ok(sequence_number)
    }

    /// Snapshot of all entries in sequence order.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal lock is poisoned.
    pub fn entries(&self) -> Result<Vec<TransactionLogEntry>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.clone())
    }

    /// Number of entries in the journal.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal lock is poisoned.
    pub fn len(&self) -> Result<usize, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.len())
    }

    /// Whether the journal has no entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Verify the in-memory chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal lock is poisoned.
    pub fn verify(&self) -> Result<ChainReport, StoreError> {
        Ok(verify_chain(&self.entries()?))
    }
}

/// Result of walking a journal chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainReport {
    /// Whether the whole chain is intact.
    pub valid: bool,
    /// Total entries examined.
    pub total_entries: u64,
    /// First sequence number where tampering was detected, if any.
    pub first_tampered_sequence: Option<u64>,
    /// Human-readable descriptions of every problem found.
    pub errors: Vec<String>,
}

/// Read a JSONL journal file into entries.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a line cannot be decoded.
pub fn read_journal(path: impl AsRef<Path>) -> Result<Vec<TransactionLogEntry>, StoreError> {
    let path = path.as_ref();
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut entries = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: TransactionLogEntry =
            serde_json::from_str(&line).map_err(|e| StoreError::Corrupt {
                location: format!("{}:{}", path.display(), i + 1),
                message: e.to_string(),
            })?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Verify a chain of journal entries, in sequence order.
///
/// Checks genesis, sequence continuity, previous-hash links, and each
/// entry's stored hash. Never panics; an empty chain is valid.
#[must_use]
pub fn verify_chain(entries: &[TransactionLogEntry]) -> ChainReport {
    let mut errors: Vec<String> = Vec::new();
    let mut first_tampered: Option<u64> = None;

    if let Some(first) = entries.first() {
        if first.previous_hash != GENESIS {
            errors.push(format!(
                "invalid genesis: first entry has previous_hash='{}'",
                first.previous_hash
            ));
            first_tampered = Some(first.sequence_number);
        }
    }

    let mut previous: Option<&TransactionLogEntry> = None;
    for entry in entries {
        if let Some(prev) = previous {
            if entry.sequence_number != prev.sequence_number + 1 {
                errors.push(format!(
                    "sequence gap: expected {}, got {}",
                    prev.sequence_number + 1,
                    entry.sequence_number
                ));
                if first_tampered.is_none() {
                    first_tampered = Some(entry.sequence_number);
                }
            }
            if entry.previous_hash != prev.entry_hash {
                errors.push(format!("chain break at sequence {}", entry.sequence_number));
                if first_tampered.is_none() {
                    first_tampered = Some(entry.sequence_number);
                }
            }
        }

        if !entry.verify_hash() {
            errors.push(format!("hash mismatch at sequence {}", entry.sequence_number));
            if first_tampered.is_none() {
                first_tampered = Some(entry.sequence_number);
            }
        }

        previous = Some(entry);
    }

    let valid = errors.is_empty();
    if !valid {
        warn!(
            entries = entries.len(),
            errors = errors.len(),
            "journal chain verification failed"
        );
    }

    ChainReport {
        valid,
        total_entries: entries.len() as u64,
        first_tampered_sequence: first_tampered,
        errors,
    }
}
