//! Database instance cache
//!
//! Maps a database name to the engine instance serving it. The cache holds
//! only a `Weak` reference: an instance stays open exactly as long as some
//! handle, session or transaction holds an `Arc` to it. A dead entry is
//! discovered on the next access and the database is reopened.
//!
//! Every operation that opens, shuts down, deletes or exports a database
//! runs under the one cache lock, so two engine instances never open the
//! same storage directory and nothing is deleted under a live instance.

use crate::error::{CacheError, CacheResult};
use crate::export::{self, ExportInfo};
use graphd_core::{GraphError, GraphResult};
use graphd_engine::GraphDatabase;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Attempts at opening a database whose previous instance is still dropping
const REOPEN_ATTEMPTS: u32 = 10;
const REOPEN_INITIAL_BACKOFF: Duration = Duration::from_millis(5);
const REOPEN_MAX_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Default)]
struct CacheEntry {
    instance: Weak<GraphDatabase>,
    /// Strong reference held for preloaded databases until `shutdown`
    pinned: Option<Arc<GraphDatabase>>,
}

impl CacheEntry {
    fn live(&self) -> Option<Arc<GraphDatabase>> {
        self.instance.upgrade().filter(|db| !db.is_shutdown())
    }
}

/// Check that `name` maps to a directory directly under the data directory
pub fn validate_name(name: &str) -> CacheResult<()> {
    if name.trim().is_empty() {
        return Err(CacheError::EmptyName);
    }
    if name.starts_with('.') || name.contains(['/', '\\']) || name.contains('\0') {
        return Err(CacheError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Name-keyed cache of open databases
pub struct DatabaseCache {
    data_dir: PathBuf,
    export_dir: PathBuf,
    compression_level: i32,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl DatabaseCache {
    /// Cache over the databases stored under `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>, export_dir: impl Into<PathBuf>, compression_level: i32) -> Self {
        Self {
            data_dir: data_dir.into(),
            export_dir: export_dir.into(),
            compression_level,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Directory holding one subdirectory per database
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory receiving export archives
    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    /// Storage location of `name`
    pub fn database_path(&self, name: &str) -> CacheResult<PathBuf> {
        validate_name(name)?;
        Ok(self.data_dir.join(name))
    }

    /// Return the live instance for `name`, opening (or creating) it if
    /// none is cached.
    pub fn open_or_create(&self, name: &str) -> CacheResult<Arc<GraphDatabase>> {
        let path = self.database_path(name)?;
        let mut entries = self.entries.lock();
        Self::open_locked(&mut entries, name, &path)
    }

    fn open_locked(
        entries: &mut HashMap<String, CacheEntry>,
        name: &str,
        path: &Path,
    ) -> CacheResult<Arc<GraphDatabase>> {
        let mut stale = false;
        if let Some(entry) = entries.get(name) {
            if let Some(db) = entry.live() {
                return Ok(db);
            }
            debug!(target: "graphd::cache", name, "Dropping stale cache entry");
            entries.remove(name);
            stale = true;
        }

        let db = Self::open_engine(name, path, stale).map_err(|source| CacheError::Open {
            name: name.to_string(),
            source,
        })?;
        entries.insert(
            name.to_string(),
            CacheEntry {
                instance: Arc::downgrade(&db),
                pinned: None,
            },
        );
        info!(target: "graphd::cache", name, path = ?path, "Database opened");
        Ok(db)
    }

    /// Open the engine at `path`.
    ///
    /// A stale entry means the previous instance may still be dropping on
    /// another thread with the directory lock in hand, so `DatabaseLocked`
    /// is retried with a short backoff before giving up.
    fn open_engine(name: &str, path: &Path, stale: bool) -> GraphResult<Arc<GraphDatabase>> {
        let mut backoff = REOPEN_INITIAL_BACKOFF;
        let mut attempt = 1;
        loop {
            match GraphDatabase::open(path) {
                Err(GraphError::DatabaseLocked(_)) if stale && attempt < REOPEN_ATTEMPTS => {
                    debug!(target: "graphd::cache", name, attempt, "Previous instance still releasing lock");
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(REOPEN_MAX_BACKOFF);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Open `name` and keep it open until [`shutdown`](Self::shutdown)
    pub fn preload(&self, name: &str) -> CacheResult<()> {
        let path = self.database_path(name)?;
        let mut entries = self.entries.lock();
        let db = Self::open_locked(&mut entries, name, &path)?;
        if let Some(entry) = entries.get_mut(name) {
            entry.pinned = Some(db);
        }
        Ok(())
    }

    /// Whether storage for `name` exists, open or not
    pub fn exists(&self, name: &str) -> bool {
        match self.database_path(name) {
            Ok(path) => path.is_dir(),
            Err(_) => false,
        }
    }

    /// Whether a live instance is cached for `name`
    pub fn is_open(&self, name: &str) -> bool {
        self.entries
            .lock()
            .get(name)
            .map_or(false, |entry| entry.live().is_some())
    }

    /// Shut down and forget the instance cached for `name`. Idempotent.
    pub fn shutdown(&self, name: &str) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.remove(name) {
            if let Some(db) = entry.instance.upgrade() {
                db.shutdown();
                info!(target: "graphd::cache", name, "Database shut down");
            }
        }
    }

    /// Shut down every cached instance
    pub fn shutdown_all(&self) {
        let mut entries = self.entries.lock();
        for (name, entry) in entries.drain() {
            if let Some(db) = entry.instance.upgrade() {
                db.shutdown();
                debug!(target: "graphd::cache", name = %name, "Database shut down");
            }
        }
    }

    /// Delete the storage of `name`.
    ///
    /// Returns `Ok(false)` without touching anything if a live instance is
    /// cached or there is no storage to delete.
    pub fn delete(&self, name: &str) -> CacheResult<bool> {
        let path = self.database_path(name)?;
        let mut entries = self.entries.lock();
        if entries.get(name).map_or(false, |e| e.live().is_some()) {
            warn!(target: "graphd::cache", name, "Refusing to delete open database");
            return Ok(false);
        }
        entries.remove(name);

        if !path.is_dir() {
            debug!(target: "graphd::cache", name, "Nothing to delete");
            return Ok(false);
        }
        fs::remove_dir_all(&path)?;
        info!(target: "graphd::cache", name, "Database deleted");
        Ok(true)
    }

    /// Archive the storage of `name` into the export directory.
    ///
    /// Returns `Ok(None)` without writing anything if a live instance is
    /// cached.
    pub fn export(&self, name: &str) -> CacheResult<Option<ExportInfo>> {
        let path = self.database_path(name)?;
        let mut entries = self.entries.lock();
        if entries.get(name).map_or(false, |e| e.live().is_some()) {
            warn!(target: "graphd::cache", name, "Refusing to export open database");
            return Ok(None);
        }
        entries.remove(name);

        let info = export::export_database(name, &path, &self.export_dir, self.compression_level)?;
        info!(
            target: "graphd::cache",
            name,
            path = ?info.path,
            files = info.file_count,
            bytes = info.archive_size_bytes,
            "Database exported"
        );
        Ok(Some(info))
    }

    /// Names of all databases on disk, sorted
    pub fn list(&self) -> CacheResult<Vec<String>> {
        if !self.data_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if validate_name(&name).is_ok() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Names with a live cached instance
    pub fn open_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, entry)| entry.live().is_some())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Run `f` while holding the cache lock.
    ///
    /// No database can be opened, shut down, deleted or exported while `f`
    /// runs.
    pub fn with_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _entries = self.entries.lock();
        f()
    }
}
