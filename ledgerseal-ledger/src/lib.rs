// File: ledgerseal-ledger/src/lib.rs
//! Integrity ledger capability: a durable key -> value map that is only ever
//! appended to or overwritten, never pruned.
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt ledger journal {path} at line {line}: {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("ledger entry encoding failed: {0}")]
    Encode(#[source] serde_json::Error),
}

pub trait Ledger: Send + Sync {
    /// Durable overwrite; writing the same value twice leaves the same state.
    fn put(&self, key: &str, value: &str) -> Result<(), LedgerError>;
    /// `None` when `key` was never written.
    fn get(&self, key: &str) -> Result<Option<String>, LedgerError>;
}

impl<T: Ledger + ?Sized> Ledger for &T {
    fn put(&self, key: &str, value: &str) -> Result<(), LedgerError> { (**self).put(key, value) }
    fn get(&self, key: &str) -> Result<Option<String>, LedgerError> { (**self).get(key) }
}

impl<T: Ledger + ?Sized> Ledger for Arc<T> {
    fn put(&self, key: &str, value: &str) -> Result<(), LedgerError> { (**self).put(key, value) }
    fn get(&self, key: &str) -> Result<Option<String>, LedgerError> { (**self).get(key) }
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: RwLock<BTreeMap<String, String>>,
    writes: AtomicUsize,
}

impl MemoryLedger {
    pub fn new() -> Self { Self::default() }
    /// Number of `put` calls served, including no-op overwrites.
    pub fn writes(&self) -> usize { self.writes.load(Ordering::Relaxed) }
    pub fn len(&self) -> usize { self.entries.read().len() }
    pub fn is_empty(&self) -> bool { self.entries.read().is_empty() }
}

impl Ledger for MemoryLedger {
    fn put(&self, key: &str, value: &str) -> Result<(), LedgerError> {
        self.entries.write().insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
    fn get(&self, key: &str) -> Result<Option<String>, LedgerError> {
        Ok(self.entries.read().get(key).cloned())
    }
}

#[derive(Serialize, Deserialize)]
struct JournalEntry {
    key: String,
    value: String,
}

struct Journal {
    file: File,
    state: BTreeMap<String, String>,
    appended: usize,
    // last line on disk lacks its newline
    open_tail: bool,
}

/// Ledger persisted as an append-only JSON-lines journal. Replaying the
/// journal in order (last write wins) yields the current state.
///
/// A final line cut short by a crash mid-append is dropped on open and the
/// file is truncated back to the last complete entry. Any other unparsable
/// line is [`LedgerError::Corrupt`]; fix or delete that line by hand and
/// reopen.
pub struct FileLedger {
    path: PathBuf,
    journal: Mutex<Journal>,
}

impl FileLedger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| LedgerError::Io { path: path.clone(), source };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = OpenOptions::new().create(true).read(true).append(true).open(&path).map_err(io_err)?;
        let mut text = String::new();
        (&file).read_to_string(&mut text).map_err(io_err)?;

        let mut state = BTreeMap::new();
        let mut replayed = 0usize;
        let mut offset = 0usize;
        let mut open_tail = false;
        for (i, line) in text.split_inclusive('\n').enumerate() {
            let terminated = line.ends_with('\n');
            let body = line.trim();
            if !body.is_empty() {
                match serde_json::from_str::<JournalEntry>(body) {
                    Ok(entry) => {
                        state.insert(entry.key, entry.value);
                        replayed += 1;
                        open_tail = !terminated;
                    }
                    Err(_) if !terminated => {
                        tracing::warn!(path = %path.display(), line = i + 1, "dropping torn final journal line");
                        file.set_len(offset as u64).map_err(io_err)?;
                        break;
                    }
                    Err(source) => return Err(LedgerError::Corrupt { path: path.clone(), line: i + 1, source }),
                }
            }
            offset += line.len();
        }
        tracing::debug!(path = %path.display(), entries = replayed, keys = state.len(), "replayed ledger journal");
        Ok(Self { path, journal: Mutex::new(Journal { file, state, appended: 0, open_tail }) })
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Journal lines written through this handle.
    pub fn appended(&self) -> usize { self.journal.lock().appended }

    pub fn keys(&self) -> Vec<String> { self.journal.lock().state.keys().cloned().collect() }
}

impl Ledger for FileLedger {
    fn put(&self, key: &str, value: &str) -> Result<(), LedgerError> {
        let mut journal = self.journal.lock();
        if journal.state.get(key).map(String::as_str) == Some(value) {
            tracing::debug!(key, "ledger value unchanged, not appending");
            return Ok(());
        }
        let entry = JournalEntry { key: key.to_string(), value: value.to_string() };
        let mut line = Vec::new();
        if journal.open_tail {
            line.push(b'\n');
        }
        serde_json::to_writer(&mut line, &entry).map_err(LedgerError::Encode)?;
        line.push(b'\n');
        let io_err = |source| LedgerError::Io { path: self.path.clone(), source };
        journal.file.write_all(&line).map_err(io_err)?;
        journal.file.sync_data().map_err(io_err)?;
        journal.state.insert(entry.key, entry.value);
        journal.appended += 1;
        journal.open_tail = false;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, LedgerError> {
        Ok(self.journal.lock().state.get(key).cloned())
    }
}
