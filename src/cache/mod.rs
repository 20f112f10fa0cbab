//! File-backed cache of fetched account data
//!
//! Layout under the cache root:
//!
//! ```text
//! <root>/<account>/<league>/tabs/<index>.json
//! <root>/<account>/<league>/characters/<name>.json
//! <root>/<account>/<league>/jewels/<name>.json
//! <root>/state.json
//! ```
//!
//! Every write goes to a temporary file in the target directory and is then
//! renamed over the destination, so readers never observe a partial file.

pub mod state;

pub use state::{AccountState, LeagueState, SavedState};

use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem failure
    #[error("IO error: {0}")]
    IoError(String),

    /// Value could not be serialized
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Cached file is not valid JSON of the expected shape
    #[error("corrupt cache file {path}: {reason}")]
    DeserializationError {
        /// File that failed to parse
        path: PathBuf,
        /// Parser message
        reason: String,
    },
}

/// Kind and id of one cached document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheEntry {
    /// Stash tab by index
    Tab(u32),
    /// Character items by character name
    Character(String),
    /// Passive tree jewels by character name
    Jewels(String),
}

impl CacheEntry {
    fn dir(&self) -> &'static str {
        match self {
            CacheEntry::Tab(_) => "tabs",
            CacheEntry::Character(_) => "characters",
            CacheEntry::Jewels(_) => "jewels",
        }
    }

    fn file_name(&self) -> String {
        match self {
            CacheEntry::Tab(index) => format!("{index}.json"),
            CacheEntry::Character(name) | CacheEntry::Jewels(name) => {
                format!("{}.json", sanitize_component(name))
            }
        }
    }
}

/// JSON document cache rooted at one directory
#[derive(Debug, Clone)]
pub struct StashCache {
    root: PathBuf,
}

impl StashCache {
    /// Create a cache rooted at `root`; nothing is created until the first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the saved application state
    pub fn state_path(&self) -> PathBuf {
        self.root.join("state.json")
    }

    /// File holding `entry` for an account and league
    pub fn entry_path(&self, account: &str, league: &str, entry: &CacheEntry) -> PathBuf {
        self.root
            .join(sanitize_component(account))
            .join(sanitize_component(league))
            .join(entry.dir())
            .join(entry.file_name())
    }

    /// Whether `entry` has been cached
    pub fn contains(&self, account: &str, league: &str, entry: &CacheEntry) -> bool {
        self.entry_path(account, league, entry).is_file()
    }

    /// Store a document, replacing any previous copy
    pub fn store(
        &self,
        account: &str,
        league: &str,
        entry: &CacheEntry,
        document: &Value,
    ) -> Result<PathBuf, CacheError> {
        let path = self.entry_path(account, league, entry);
        let json = serde_json::to_vec(document)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;
        write_atomic(&path, &json)?;
        debug!(path = %path.display(), "Cached document");
        Ok(path)
    }

    /// Load a cached document, `None` when it was never stored
    pub fn load(
        &self,
        account: &str,
        league: &str,
        entry: &CacheEntry,
    ) -> Result<Option<Value>, CacheError> {
        let path = self.entry_path(account, league, entry);
        if !path.is_file() {
            return Ok(None);
        }
        let contents = std::fs::read(&path).map_err(|e| CacheError::IoError(e.to_string()))?;
        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|e| CacheError::DeserializationError {
                path,
                reason: e.to_string(),
            })
    }
}

/// Replace anything that could escape or confuse the directory layout
pub fn sanitize_component(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim().is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Write `contents` to `path` through a temporary file in the same directory.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| CacheError::IoError(e.to_string()))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| CacheError::IoError(format!("Failed to create temp file: {e}")))?;
    temp_file
        .write_all(contents)
        .map_err(|e| CacheError::IoError(format!("Failed to write to temp file: {e}")))?;
    temp_file
        .flush()
        .map_err(|e| CacheError::IoError(format!("Failed to flush temp file: {e}")))?;
    temp_file
        .persist(path)
        .map_err(|e| CacheError::IoError(format!("Failed to persist temp file: {e}")))?;
    Ok(())
}
