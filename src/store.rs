//! Persistence for bot decision sets.
//!
//! Each store holds one set of IP address strings. The on-disk format is
//! internal to this implementation (a sorted JSON string array); it only has
//! to round-trip between one run's shutdown and the next run's startup.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

/// Load and save one set of IP addresses.
pub trait DecisionStore: Send + Sync {
    /// Load the persisted set. Missing or unreadable data degrades to an
    /// empty set; this never fails the caller.
    fn load(&self) -> HashSet<String>;

    /// Persist the set.
    fn save(&self, ips: &HashSet<String>) -> anyhow::Result<()>;
}

/// File-backed store, one JSON array of strings per file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Create a store backed by the given path. The file does not have to
    /// exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path this store reads and writes.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl DecisionStore for JsonFileStore {
    fn load(&self) -> HashSet<String> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashSet::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read decision cache, starting empty");
                return HashSet::new();
            }
        };

        match serde_json::from_str::<Vec<String>>(&content) {
            Ok(ips) => ips.into_iter().collect(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt decision cache, starting empty");
                HashSet::new()
            }
        }
    }

    fn save(&self, ips: &HashSet<String>) -> anyhow::Result<()> {
        let mut sorted: Vec<&String> = ips.iter().collect();
        sorted.sort();
        let json = serde_json::to_string(&sorted)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}
