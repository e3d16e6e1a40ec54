use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use crate::index::PageId;

/// The on-disk form of the index: one JSON object with exactly these four
/// fields. Each posting is the list of token positions of a word on a page;
/// its length is the occurrence count. serde_json writes the integer page-id
/// keys as strings and reads them back as integers.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub word_index: HashMap<String, HashMap<PageId, Vec<u32>>>,
    pub page_index: HashMap<PageId, HashMap<String, Vec<u32>>>,
    pub url_to_id: HashMap<String, PageId>,
    pub id_to_url: HashMap<PageId, String>,
}

/// What was found at the index file path.
pub enum SnapshotFile {
    /// No file: a valid empty starting state, not an error.
    Missing,
    /// A file that does not deserialize into the four-field schema. The
    /// caller must reset rather than half-load.
    Corrupt,
    Snapshot(IndexSnapshot),
}

/// Overwrite the index file with `snapshot`. I/O failures propagate.
pub fn save_snapshot(path: &Path, snapshot: &IndexSnapshot) -> Result<()> {
    let json = serde_json::to_string(snapshot)?;
    fs::write(path, json)?;
    Ok(())
}

/// Read the index file. Only OS-level I/O errors are `Err`; a missing or
/// malformed file is reported through [`SnapshotFile`].
pub fn load_snapshot(path: &Path) -> Result<SnapshotFile> {
    if !path.exists() {
        return Ok(SnapshotFile::Missing);
    }
    let contents = fs::read_to_string(path)?;
    Ok(match serde_json::from_str(&contents) {
        Ok(snapshot) => SnapshotFile::Snapshot(snapshot),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "index file does not match the expected schema");
            SnapshotFile::Corrupt
        }
    })
}

/// Delete the index file; deleting a nonexistent file is a no-op.
pub fn delete_snapshot(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
