//! Flat JSON annotation store.
//!
//! The whole record list is read into memory and written back in one piece.
//! Writes go to a sibling temp file that is renamed over the target, so a
//! crash mid-write leaves the previous file intact.

use std::path::{Path, PathBuf};

use marginalia_shared::{AnnotationRecord, MarginaliaError, Result};
use tracing::{debug, info, warn};

/// How a lenient load went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// The file parsed as a record list.
    Loaded,
    /// No file at the path yet.
    Missing,
    /// The file exists but could not be read or parsed.
    Corrupt,
}

/// Records plus how they were obtained.
#[derive(Debug, Clone)]
pub struct LoadedStore {
    pub records: Vec<AnnotationRecord>,
    pub state: StoreState,
}

/// Read and parse the store, failing on any error.
pub fn load_records(path: &Path) -> Result<Vec<AnnotationRecord>> {
    let content = std::fs::read_to_string(path).map_err(|e| MarginaliaError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| MarginaliaError::parse(format!("{}: {e}", path.display())))
}

/// Read the store, degrading a missing or unparseable file to an empty set.
pub fn load_records_lenient(path: &Path) -> LoadedStore {
    if !path.exists() {
        info!(path = %path.display(), "no annotation store yet, starting empty");
        return LoadedStore {
            records: Vec::new(),
            state: StoreState::Missing,
        };
    }

    match load_records(path) {
        Ok(records) => {
            debug!(path = %path.display(), count = records.len(), "loaded annotation store");
            LoadedStore {
                records,
                state: StoreState::Loaded,
            }
        }
        Err(e) => {
            info!(path = %path.display(), error = %e, "annotation store unreadable, starting empty");
            LoadedStore {
                records: Vec::new(),
                state: StoreState::Corrupt,
            }
        }
    }
}

/// Write the full record list as pretty JSON, atomically.
pub fn save_records(path: &Path, records: &[AnnotationRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| MarginaliaError::io(parent, e))?;
    }

    let json = serde_json::to_string_pretty(records)
        .map_err(|e| MarginaliaError::parse(format!("failed to serialize records: {e}")))?;

    let tmp = sibling_with_suffix(path, "tmp");
    std::fs::write(&tmp, json).map_err(|e| MarginaliaError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| MarginaliaError::io(path, e))?;

    debug!(path = %path.display(), count = records.len(), "saved annotation store");
    Ok(())
}

/// Copy an unparseable store aside before it gets overwritten.
pub fn backup_corrupt(path: &Path) -> Result<PathBuf> {
    let backup = sibling_with_suffix(path, "corrupt");
    std::fs::copy(path, &backup).map_err(|e| MarginaliaError::io(&backup, e))?;
    warn!(path = %path.display(), backup = %backup.display(), "kept a copy of the unreadable store");
    Ok(backup)
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "annotations.json".into());
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}
