//! Line-oriented persistence of a feed's known identifiers.
//!
//! File layout: line 1 is the decimal `last_seen` Unix timestamp, every
//! following line is one identifier. Order is irrelevant and duplicates are
//! harmless. A missing file means "no prior state".

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read state file '{}': {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("Invalid timestamp {line:?} in state file '{}'", path.display())]
    BadTimestamp { path: PathBuf, line: String },

    #[error("Failed to write state file '{}': {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// What a feed remembers between runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    /// Newest published time confirmed as already seen.
    pub last_seen: f64,
    pub known: HashSet<String>,
}

/// Owner of one feed's state file.
#[derive(Debug, Clone)]
pub struct DedupStore {
    path: PathBuf,
}

impl DedupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the state file.
    ///
    /// - Missing file → `Ok(None)`
    /// - File without any non-blank line → `Ok(None)`
    /// - Unparseable first line → `Err(StoreError::BadTimestamp)`
    pub fn load(&self) -> Result<Option<StoreState>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut lines = content.lines().map(str::trim_end).filter(|l| !l.is_empty());
        let Some(first) = lines.next() else {
            return Ok(None);
        };
        let last_seen = first
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|t| t.is_finite())
            .ok_or_else(|| StoreError::BadTimestamp {
                path: self.path.clone(),
                line: first.to_owned(),
            })?;

        Ok(Some(StoreState {
            last_seen,
            known: lines.map(str::to_owned).collect(),
        }))
    }

    /// Writes the state file via write-to-temp-then-rename.
    ///
    /// A reader sees either the previous file or the new one, never a mix.
    /// The parent directory is created on demand.
    pub fn save(&self, state: &StoreState) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let mut ids: Vec<&str> = state.known.iter().map(String::as_str).collect();
        ids.sort_unstable();
        let mut content = format!("{}\n", state.last_seen);
        for id in ids {
            content.push_str(id);
            content.push('\n');
        }

        // Unpredictable temp name in the same directory so the rename stays on one filesystem
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state".to_owned());
        let temp_path = self
            .path
            .with_file_name(format!(".{}.tmp.{:016x}", file_name, suffix));

        let result = (|| {
            let mut temp_file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            temp_file.write_all(content.as_bytes())?;
            temp_file.sync_all()?;
            drop(temp_file);

            // On Windows, rename fails if destination exists
            #[cfg(windows)]
            if self.path.exists() {
                fs::remove_file(&self.path)?;
            }

            fs::rename(&temp_path, &self.path)
        })();

        result.map_err(|source| {
            let _ = fs::remove_file(&temp_path);
            write_err(source)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn state(last_seen: f64, ids: &[&str]) -> StoreState {
        StoreState {
            last_seen,
            known: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = DedupStore::new(dir.path().join("absent"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DedupStore::new(dir.path().join("feed"));
        let saved = state(1_704_067_200.5, &["a", "b c", "https://x/1#2024"]);

        store.save(&saved).unwrap();
        assert_eq!(store.load().unwrap(), Some(saved));
    }

    #[test]
    fn test_save_creates_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = DedupStore::new(dir.path().join("nested/state/feed"));
        store.save(&state(1.0, &["a"])).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DedupStore::new(dir.path().join("feed"));
        store.save(&state(1.0, &["a"])).unwrap();
        store.save(&state(2.0, &["a", "b"])).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = DedupStore::new(dir.path().join("feed"));
        store.save(&state(150.0, &["b", "a"])).unwrap();
        let content = fs::read_to_string(store.path()).unwrap();
        assert_eq!(content, "150\na\nb\n");
    }

    #[test]
    fn test_blank_lines_and_duplicates_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed");
        fs::write(&path, "\n100.25\n\na\na\nb  \n").unwrap();

        let loaded = DedupStore::new(&path).load().unwrap().unwrap();
        assert_eq!(loaded, state(100.25, &["a", "b"]));
    }

    #[test]
    fn test_empty_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed");
        fs::write(&path, "\n\n").unwrap();
        assert_eq!(DedupStore::new(&path).load().unwrap(), None);
    }

    #[test]
    fn test_timestamp_only_is_empty_known_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed");
        fs::write(&path, "42\n").unwrap();
        assert_eq!(DedupStore::new(&path).load().unwrap(), Some(state(42.0, &[])));
    }

    #[test]
    fn test_bad_timestamp_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed");
        fs::write(&path, "not-a-number\na\n").unwrap();
        let err = DedupStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::BadTimestamp { .. }));
    }

    proptest! {
        #[test]
        fn round_trip_preserves_timestamp_bits(last_seen in 0.0f64..1e12, ids in proptest::collection::hash_set("[a-z0-9:/#.]{1,20}", 0..10)) {
            let dir = tempfile::tempdir().unwrap();
            let store = DedupStore::new(dir.path().join("feed"));
            let saved = StoreState { last_seen, known: ids };
            store.save(&saved).unwrap();
            let loaded = store.load().unwrap().unwrap();
            prop_assert_eq!(loaded.last_seen.to_bits(), saved.last_seen.to_bits());
            prop_assert_eq!(loaded.known, saved.known);
        }
    }
}
