//! JSON-file-based storage backend.
//!
//! Stores each collection in a separate JSON file under a configurable
//! directory (default: `$XDG_DATA_HOME/pharma-ledger/`).

use alloc::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{COLLECTIONS, Record, remove_by_key, upsert_by_key};
use crate::error::{LedgerError, Result};

/// Application name used for the XDG data directory.
const APP_NAME: &str = "pharma-ledger";

/// File holding every named counter.
const SEQUENCES_FILE: &str = "sequences.json";
/// Sentinel file used for cross-process file locking.
const LOCK_FILE: &str = "storage.lock";

/// Named counters, persisted as a JSON object.
type Sequences = BTreeMap<String, u64>;

/// File-backed storage that persists records as JSON files.
///
/// Each collection is stored in a separate `.json` file. A
/// `sequences.json` file holds the piece and invoice counters.
///
/// # Concurrency
///
/// Thread safety within a single process is provided by an in-process
/// [`Mutex`]. Cross-process safety is achieved via an advisory file lock
/// on `storage.lock` (using [`std::fs::File::lock`] /
/// [`std::fs::File::lock_shared`]).
///
/// Read operations acquire a shared lock (allowing concurrent readers),
/// while write operations and counter increments acquire an exclusive
/// lock, so two writers never receive the same sequence value.
///
/// # File layout
///
/// ```text
/// <dir>/
///   storage.lock          (cross-process lock sentinel)
///   sequences.json
///   journals.json
///   ledger_entries.json
///   bank_accounts.json
///   bank_transactions.json
///   reconciliations.json
///   tax_rates.json
///   invoices.json
///   sales.json
///   receptions.json
/// ```
#[derive(Debug)]
pub struct FileStorage {
    /// Root directory containing all JSON files.
    dir: PathBuf,
    /// Mutex serializing concurrent in-process access.
    lock: Mutex<()>,
    /// Sentinel file for cross-process advisory locking.
    lock_file: fs::File,
}

impl FileStorage {
    /// Creates a new file storage rooted at the given directory.
    ///
    /// Creates the directory (and parents) if it does not exist. Also
    /// opens (or creates) the `storage.lock` sentinel file used for
    /// cross-process advisory locking.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the lock
    /// file cannot be opened.
    #[inline]
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).map_err(storage_io_error)?;
        let lock_file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))
            .map_err(storage_io_error)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
            lock_file,
        })
    }

    /// Returns the default XDG-compliant data directory for this application.
    ///
    /// On Linux: `$XDG_DATA_HOME/pharma-ledger/` (typically
    /// `~/.local/share/pharma-ledger/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the platform data directory cannot be determined.
    #[inline]
    pub fn default_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|data_path| data_path.join(APP_NAME))
            .ok_or_else(|| {
                LedgerError::Storage("could not determine platform data directory".into())
            })
    }

    // ── Private helpers ─────────────────────────────────────────────

    /// Returns the full path for a given file name.
    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Returns the file name backing a collection.
    fn collection_file(collection: &str) -> String {
        format!("{collection}.json")
    }

    /// Acquires an in-process mutex guard and a shared (read) file lock,
    /// executes `op`, then releases the file lock.
    fn with_shared_lock<R, F: FnOnce() -> Result<R>>(&self, op: F) -> Result<R> {
        let _guard: MutexGuard<'_, ()> = self.lock.lock().map_err(|err| lock_poison_error(&err))?;
        self.lock_file.lock_shared().map_err(storage_io_error)?;
        let result = op();
        // Only surface the unlock error when the operation succeeded;
        // otherwise the original error is more useful.
        if let Err(err) = self.lock_file.unlock()
            && result.is_ok()
        {
            return Err(storage_io_error(err));
        }
        result
    }

    /// Acquires an in-process mutex guard and an exclusive (write) file
    /// lock, executes `op`, then releases the file lock.
    fn with_exclusive_lock<R, F: FnOnce() -> Result<R>>(&self, op: F) -> Result<R> {
        let _guard: MutexGuard<'_, ()> = self.lock.lock().map_err(|err| lock_poison_error(&err))?;
        self.lock_file.lock().map_err(storage_io_error)?;
        let result = op();
        if let Err(err) = self.lock_file.unlock()
            && result.is_ok()
        {
            return Err(storage_io_error(err));
        }
        result
    }

    /// Reads and deserializes a JSON file. Returns the default value if
    /// the file does not exist.
    fn read_json<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        match fs::read_to_string(self.path(name)) {
            Ok(contents) => serde_json::from_str(&contents).map_err(LedgerError::from),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(T::default()),
            Err(err) => Err(storage_io_error(err)),
        }
    }

    /// Atomically writes a serialized JSON file (write-to-tmp then rename).
    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.path(name);
        let tmp_path = self.path(&format!("{name}.tmp"));
        let json = serde_json::to_string_pretty(value).map_err(LedgerError::from)?;
        fs::write(&tmp_path, json).map_err(storage_io_error)?;
        fs::rename(&tmp_path, &path).map_err(storage_io_error)?;
        Ok(())
    }

    /// Reads one collection (with lock).
    fn read_all<T: Record>(&self) -> Result<Vec<T>> {
        let name = Self::collection_file(T::COLLECTION);
        self.with_shared_lock(|| self.read_json(&name))
    }

    /// Merges new items into a collection file by key (insert-or-replace).
    fn upsert_all<T: Record>(&self, items: Vec<T>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let name = Self::collection_file(T::COLLECTION);
        self.with_exclusive_lock(|| {
            let mut existing: Vec<T> = self.read_json(&name)?;
            upsert_by_key(&mut existing, items);
            self.write_json(&name, &existing)
        })
    }

    /// Removes items from a collection file by key.
    fn remove_all<T: Record>(&self, ids: &[T::Key]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let name = Self::collection_file(T::COLLECTION);
        self.with_exclusive_lock(|| {
            let mut existing: Vec<T> = self.read_json(&name)?;
            remove_by_key(&mut existing, ids);
            self.write_json(&name, &existing)
        })
    }

    /// Increments the named counter under the exclusive lock.
    fn allocate(&self, counter: &str) -> Result<u64> {
        self.with_exclusive_lock(|| {
            let mut sequences: Sequences = self.read_json(SEQUENCES_FILE)?;
            let value = sequences.entry(counter.to_owned()).or_insert(0);
            *value = value.saturating_add(1);
            let allocated = *value;
            self.write_json(SEQUENCES_FILE, &sequences)?;
            Ok(allocated)
        })
    }

    /// Deletes all collection files and the counters.
    ///
    /// The `storage.lock` sentinel is preserved.
    fn clear_all(&self) -> Result<()> {
        self.with_exclusive_lock(|| {
            let files = COLLECTIONS
                .iter()
                .copied()
                .map(Self::collection_file)
                .chain(core::iter::once(SEQUENCES_FILE.to_owned()));
            for name in files {
                match fs::remove_file(self.path(&name)) {
                    Ok(()) => {}
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(storage_io_error(err)),
                }
            }
            Ok(())
        })
    }
}

// ── Free-standing helpers ───────────────────────────────────────────────

/// Wraps an I/O error into a [`LedgerError::Storage`].
fn storage_io_error(err: io::Error) -> LedgerError {
    LedgerError::Storage(Box::new(err))
}

/// Wraps a mutex poison error into a [`LedgerError::Storage`].
fn lock_poison_error<T>(err: &std::sync::PoisonError<T>) -> LedgerError {
    LedgerError::Storage(err.to_string().into())
}

#[cfg(feature = "blocking")]
forward_storage!(blocking: FileStorage);

#[cfg(feature = "async")]
forward_storage!(async_ready: FileStorage);
