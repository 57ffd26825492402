//! # Filter Cache Stores
//!
//! Flat key-value storage for resolved filter lists.
//!
//! A store also reports modification times, both for its own entries and
//! for the source a controller was declared in, so the resolver can tell
//! when an entry has gone stale.
//!
//! Writes may race; the last write wins.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::SystemTime;

/// Storage backend for the filter cache
pub trait CacheStore: Send + Sync {
    /// Whether an entry exists for `key`
    fn exists(&self, key: &str) -> bool;

    /// Raw entry bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is missing or unreadable.
    fn read_raw(&self, key: &str) -> Result<Vec<u8>>;

    /// Store raw entry bytes, replacing any previous entry
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be written.
    fn write_raw(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// When the entry for `key` was written
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is missing.
    fn last_modified(&self, key: &str) -> Result<SystemTime>;

    /// When the source at `location` was last modified
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be inspected.
    fn source_modified(&self, location: &Path) -> Result<SystemTime>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Filesystem store: one file per entry under a directory
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Stable FNV-1a 64 hash rendered as 16 hex digits.
///
/// Used for cache keys and generated route names, so it must not change
/// between releases.
#[must_use]
pub fn stable_hash(input: &str) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in input.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    format!("{hash:016x}")
}

impl FileCacheStore {
    /// Create a store rooted at `dir`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory entries are stored in
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for a cache key
    fn key_to_path(&self, key: &str) -> PathBuf {
        let safe_key: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();

        self.dir.join(format!("{safe_key}.json"))
    }
}

impl CacheStore for FileCacheStore {
    fn exists(&self, key: &str) -> bool {
        self.key_to_path(key).is_file()
    }

    fn read_raw(&self, key: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.key_to_path(key))?)
    }

    fn write_raw(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.key_to_path(key);
        let tmp = path.with_extension(format!(
            "tmp{}-{}",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        // Rename so readers never see a half-written entry.
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            Error::Io(e)
        })
    }

    fn last_modified(&self, key: &str) -> Result<SystemTime> {
        Ok(fs::metadata(self.key_to_path(key))?.modified()?)
    }

    fn source_modified(&self, location: &Path) -> Result<SystemTime> {
        Ok(fs::metadata(location)?.modified()?)
    }

    fn name(&self) -> &'static str {
        "filesystem"
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    bytes: Vec<u8>,
    written: SystemTime,
}

/// In-process store; source times are set explicitly with [`MemoryCacheStore::touch`]
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    sources: RwLock<HashMap<PathBuf, SystemTime>>,
}

impl MemoryCacheStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the source at `location` was modified at `at`
    pub fn touch(&self, location: impl Into<PathBuf>, at: SystemTime) {
        let mut sources = self.sources.write().unwrap_or_else(|e| e.into_inner());
        sources.insert(location.into(), at);
    }

    /// Number of cached entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn missing(key: &str) -> Error {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no cache entry for {key}"),
        ))
    }
}

impl CacheStore for MemoryCacheStore {
    fn exists(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    fn read_raw(&self, key: &str) -> Result<Vec<u8>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .map(|e| e.bytes.clone())
            .ok_or_else(|| Self::missing(key))
    }

    fn write_raw(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key.to_string(),
            MemoryEntry {
                bytes: bytes.to_vec(),
                written: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn last_modified(&self, key: &str) -> Result<SystemTime> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .map(|e| e.written)
            .ok_or_else(|| Self::missing(key))
    }

    fn source_modified(&self, location: &Path) -> Result<SystemTime> {
        let sources = self.sources.read().unwrap_or_else(|e| e.into_inner());
        sources.get(location).copied().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("unknown source {}", location.display()),
            ))
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
