//! Checkpoint file format and atomic save/load.
//!
//! The on-disk document carries a schema version, a write timestamp, and
//! the full list of tracked file states. Entries keep their `deleted` flag
//! and `last_seen` timestamp, so dead-time sweeping and resurrection
//! detection survive a restart.
//!
//! # Atomic writes
//!
//! 1. Write to `<path>.tmp`
//! 2. fsync the temp file
//! 3. Rename over `<path>`
//! 4. fsync the parent directory
//!
//! Readers always see either the old or the new checkpoint.

use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::fsync::{fsync_dir, fsync_file};
use crate::registrar::FileState;

/// Current checkpoint schema version. Increment on breaking changes.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors that can occur during checkpoint operations.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Schema version mismatch.
    #[error("checkpoint schema mismatch: expected {expected}, got {got}")]
    SchemaMismatch { expected: u32, got: u32 },
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// The checkpoint document as persisted to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedCheckpoint {
    /// Schema version for forward-compatible migrations.
    pub schema_version: u32,

    /// When this checkpoint was written (ISO 8601).
    pub written_at: DateTime<Utc>,

    /// All tracked file states, ordered by source path.
    pub files: Vec<FileState>,
}

impl PersistedCheckpoint {
    /// Wraps a registrar snapshot for persistence, stamped now.
    pub fn new(files: Vec<FileState>) -> Self {
        PersistedCheckpoint {
            schema_version: SCHEMA_VERSION,
            written_at: Utc::now(),
            files,
        }
    }
}

/// Probes that a checkpoint path can be opened read-write-or-create.
///
/// Used by the configuration loader to fail fast at startup. May leave an
/// empty file behind if none existed.
pub fn probe_writable(path: &Path) -> io::Result<()> {
    std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map(|_| ())
}

/// Saves a checkpoint atomically.
///
/// # Errors
///
/// Returns an error if any IO operation fails; the previous checkpoint is
/// left intact in that case.
pub fn save_checkpoint_atomic(path: &Path, checkpoint: &PersistedCheckpoint) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io::Write;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    let bytes = serde_json::to_vec_pretty(checkpoint)?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(&bytes)?;
        fsync_file(&file)?;
    }

    std::fs::rename(&tmp_path, path)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fsync_dir(parent)?;
    }

    Ok(())
}

/// Loads a checkpoint from disk.
///
/// # Errors
///
/// Returns an error if the file is unreadable, the JSON is malformed, or
/// the schema version is incompatible.
pub fn load_checkpoint(path: &Path) -> Result<PersistedCheckpoint> {
    let bytes = std::fs::read(path)?;
    let checkpoint: PersistedCheckpoint = serde_json::from_slice(&bytes)?;

    if checkpoint.schema_version != SCHEMA_VERSION {
        return Err(CheckpointError::SchemaMismatch {
            expected: SCHEMA_VERSION,
            got: checkpoint.schema_version,
        });
    }

    Ok(checkpoint)
}

/// Attempts to load a checkpoint, returning `None` for a missing or empty
/// file (a fresh agent, or only the writability probe has run).
///
/// Other errors (malformed JSON, schema mismatch) are propagated: a
/// corrupt checkpoint should be surfaced to the operator, not silently
/// treated as empty.
pub fn try_load_checkpoint(path: &Path) -> Result<Option<PersistedCheckpoint>> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() == 0 => return Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        _ => {}
    }
    match load_checkpoint(path) {
        Ok(checkpoint) => Ok(Some(checkpoint)),
        Err(CheckpointError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
