//! Per-reference alignment store
//!
//! Each reference image owns one JSON file, `<reference>-alignments.json`,
//! mapping target identities to their transforms. Readers tolerate a
//! missing or malformed file; writers replace the whole file atomically.
//! Read-modify-write cycles go through [`AlignmentCache::update`], which
//! holds a per-file lock so concurrent writers cannot drop each other's
//! entries.

pub mod record;

pub use record::AlignmentRecord;

use crate::{AlignError, Result};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const CACHE_SUFFIX: &str = "-alignments.json";

lazy_static! {
    static ref FILE_LOCKS: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>> = Mutex::new(HashMap::new());
}

/// Lock shared by every cache handle pointing at `path`.
fn lock_for(path: &Path) -> Arc<Mutex<()>> {
    let mut locks = FILE_LOCKS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    locks.entry(path.to_path_buf()).or_default().clone()
}

/// Create `path` holding an empty record unless some file is already there.
/// Returns whether this call created it.
fn create_empty(path: &Path) -> Result<bool> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(AlignError::cache(path, e)),
    };
    file.write_all(b"{}").map_err(|e| AlignError::cache(path, e))?;
    Ok(true)
}

#[derive(Debug, Clone)]
pub struct AlignmentCache {
    directory: PathBuf,
}

impl AlignmentCache {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Backing file for `reference`.
    pub fn path_for(&self, reference: &str) -> PathBuf {
        self.directory.join(format!("{}{}", reference, CACHE_SUFFIX))
    }

    /// Read the record of `reference`, creating an empty file when none
    /// exists. Creation never replaces a file that appeared in the meantime,
    /// so a concurrent [`update`](Self::update) is not lost. Malformed
    /// content yields an empty record.
    pub fn load(&self, reference: &str) -> Result<AlignmentRecord> {
        let path = self.path_for(reference);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if create_empty(&path)? {
                    tracing::debug!(path = %path.display(), "Created empty alignment store");
                }
                return Ok(AlignmentRecord::new());
            }
            Err(e) => return Err(AlignError::cache(&path, e)),
        };

        match AlignmentRecord::parse_lenient(&text) {
            Some((record, dropped)) => {
                if !dropped.is_empty() {
                    tracing::warn!(
                        path = %path.display(),
                        dropped = ?dropped,
                        "Ignoring invalid alignment entries"
                    );
                }
                tracing::debug!(path = %path.display(), entries = record.len(), "Loaded alignment store");
                Ok(record)
            }
            None => {
                tracing::warn!(
                    path = %path.display(),
                    "Alignment store is not a JSON object; treating it as empty"
                );
                Ok(AlignmentRecord::new())
            }
        }
    }

    /// Replace the stored record of `reference`.
    ///
    /// The content is written to a sibling temporary file and renamed over
    /// the target so a crash never leaves a half-written store.
    pub fn store(&self, reference: &str, record: &AlignmentRecord) -> Result<()> {
        let path = self.path_for(reference);
        let content = serde_json::to_string_pretty(record).map_err(|e| AlignError::cache(&path, e))?;

        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, content).map_err(|e| AlignError::cache(&path, e))?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(AlignError::cache(&path, e));
        }

        tracing::debug!(path = %path.display(), entries = record.len(), "Stored alignment store");
        Ok(())
    }

    /// Load, mutate and store the record of `reference` as one unit of
    /// work. No other `update` on the same file runs in between.
    pub fn update<R, F>(&self, reference: &str, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut AlignmentRecord) -> R,
    {
        let lock = lock_for(&self.path_for(reference));
        let _held = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut record = self.load(reference)?;
        let result = mutate(&mut record);
        self.store(reference, &record)?;
        Ok(result)
    }

    /// Delete the store of `reference`. Returns whether a file existed.
    pub fn invalidate(&self, reference: &str) -> Result<bool> {
        let path = self.path_for(reference);
        let lock = lock_for(&path);
        let _held = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Alignment store removed");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AlignError::cache(&path, e)),
        }
    }
}
