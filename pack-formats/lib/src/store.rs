//! Durable storage for the version to pack formats mapping.
//!
//! The mapping lives in a single pretty-printed JSON file. Writes go to a
//! temporary file in the same directory which is then renamed over the
//! target, so the file on disk is always either the previous complete
//! version or the new complete version.
//!
//! The store is shared between the scheduler (the only writer of entries)
//! and the lifecycle hooks (which only ever flush), so state sits behind a
//! mutex and the dirty/flushing flags are atomics.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::types::{Mapping, PackFormats};

/// What a call to [`MappingStore::flush`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The mapping was written and the dirty flag cleared.
    Written,
    /// Nothing changed since the last flush.
    Clean,
    /// Another flush was already running; this request was dropped.
    InProgress,
}

/// Owner of the mapping and its on-disk file.
#[derive(Debug)]
pub struct MappingStore {
    path: PathBuf,
    state: Mutex<Mapping>,
    dirty: AtomicBool,
    flushing: AtomicBool,
}

impl MappingStore {
    /// Creates an empty, clean store bound to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self::with_mapping(path, Mapping::new())
    }

    fn with_mapping(path: impl Into<PathBuf>, mapping: Mapping) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(mapping),
            dirty: AtomicBool::new(false),
            flushing: AtomicBool::new(false),
        }
    }

    /// Loads the mapping stored at `path`.
    ///
    /// A missing file yields an empty store.
    ///
    /// ## Errors
    ///
    /// - [`StoreError::Read`] if the file exists but cannot be read
    /// - [`StoreError::Corrupt`] if the content is not a mapping document
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No existing mapping at {}, starting empty", path.display());
                return Ok(Self::empty(path));
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        let mapping: Mapping = match serde_json::from_str(&content) {
            Ok(mapping) => mapping,
            Err(source) => return Err(StoreError::Corrupt { path, source }),
        };

        info!("Loaded {} known versions from {}", mapping.len(), path.display());
        Ok(Self::with_mapping(path, mapping))
    }

    /// Path of the mapping file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Mapping> {
        // A panic elsewhere must not stop us from persisting completed work.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn has(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<PackFormats> {
        self.lock().get(key).copied()
    }

    /// Records `value` under `key` unless the key is already present.
    ///
    /// Existing entries are never overwritten. Returns `true` when the entry
    /// was added, in which case the store becomes dirty.
    pub fn put(&self, key: impl Into<String>, value: PackFormats) -> bool {
        let mut mapping = self.lock();
        let key = key.into();
        if mapping.contains_key(&key) {
            return false;
        }
        mapping.insert(key, value);
        self.dirty.store(true, Ordering::Release);
        true
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether the in-memory mapping has changes not yet on disk.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Copy of the current mapping.
    pub fn snapshot(&self) -> Mapping {
        self.lock().clone()
    }

    /// Atomically persists the mapping if it is dirty.
    ///
    /// At most one flush runs at a time: a call made while another flush is
    /// in progress returns [`FlushOutcome::InProgress`] without waiting.
    ///
    /// ## Errors
    ///
    /// Returns an error if serializing, writing or renaming fails. The
    /// previous file is left untouched and the store stays dirty.
    pub fn flush(&self) -> Result<FlushOutcome, StoreError> {
        self.flush_with(|store| Some(store.lock()))
    }

    /// Like [`flush`](Self::flush) but gives up instead of blocking when the
    /// mapping is locked. Used from panic hooks, where the panicking thread
    /// may itself hold the lock.
    pub fn try_flush(&self) -> Result<FlushOutcome, StoreError> {
        self.flush_with(|store| match store.state.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        })
    }

    fn flush_with<'a>(
        &'a self,
        acquire: impl FnOnce(&'a Self) -> Option<MutexGuard<'a, Mapping>>,
    ) -> Result<FlushOutcome, StoreError> {
        if !self.is_dirty() {
            return Ok(FlushOutcome::Clean);
        }
        if self.flushing.swap(true, Ordering::AcqRel) {
            debug!("Flush already in progress, ignoring request");
            return Ok(FlushOutcome::InProgress);
        }

        let result = match acquire(self) {
            Some(mapping) => self.write(&mapping),
            None => Ok(FlushOutcome::InProgress),
        };

        self.flushing.store(false, Ordering::Release);
        result
    }

    /// Writes `mapping` to a sibling temp file and renames it into place.
    ///
    /// Called with the mapping lock held, so no entry can be added between
    /// serializing and clearing the dirty flag.
    fn write(&self, mapping: &Mapping) -> Result<FlushOutcome, StoreError> {
        if !self.is_dirty() {
            return Ok(FlushOutcome::Clean);
        }

        let json = serde_json::to_string_pretty(mapping)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        self.dirty.store(false, Ordering::Release);
        debug!("Flushed {} versions to {}", mapping.len(), self.path.display());
        Ok(FlushOutcome::Written)
    }
}
