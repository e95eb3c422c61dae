//! The file state store: per-identity offsets, paths, and liveness.
//!
//! One [`FileState`] entry exists per tracked [`FileIdentity`]. Entries are
//! created by `NewFile`, advanced by `BytesRead` and confirmed batches,
//! re-pathed by `Renamed`, tombstoned by `Deleted`, and removed only by
//! [`FileStateStore::sweep`] once the file has been gone longer than its
//! group's dead time. Keeping tombstones around is what lets a file that
//! reappears before dead time resume from its old offset instead of being
//! re-shipped from the start.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::RegistrarEvent;
use crate::identity::FileIdentity;

/// Tracked state for one physical file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileState {
    /// Stable identity; immutable for the entry's lifetime.
    pub identity: FileIdentity,

    /// Last observed path. Updated on rename.
    pub source: String,

    /// Bytes confirmed forwarded. Set by events, never summed.
    pub offset: u64,

    /// Updated on every event referencing this identity. Drives sweeping.
    pub last_seen: DateTime<Utc>,

    /// True once the file has vanished from disk. The entry is retained
    /// until dead time elapses, enabling resurrection detection.
    pub deleted: bool,
}

impl FileState {
    fn new(identity: FileIdentity, source: String, offset: u64, now: DateTime<Utc>) -> Self {
        FileState {
            identity,
            source,
            offset,
            last_seen: now,
            deleted: false,
        }
    }
}

/// In-memory table of tracked files, keyed by identity.
///
/// This is the pure, single-threaded core: it knows nothing about channels,
/// clocks, or disks. The [`Registrar`](super::Registrar) wraps it for
/// concurrent use and the checkpoint module persists its snapshots.
#[derive(Debug, Default)]
pub struct FileStateStore {
    files: HashMap<FileIdentity, FileState>,
}

impl FileStateStore {
    pub fn new() -> Self {
        FileStateStore {
            files: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, identity: &FileIdentity) -> Option<&FileState> {
        self.files.get(identity)
    }

    /// Applies one event at the given time.
    ///
    /// Events for identities the store has never seen (other than
    /// `NewFile`) indicate a producer bug; they are logged and dropped so
    /// one bad event never poisons the rest of the table.
    pub fn apply(&mut self, event: RegistrarEvent, now: DateTime<Utc>) {
        match event {
            RegistrarEvent::NewFile {
                source,
                identity,
                offset,
            } => {
                if let Some(state) = self.files.get_mut(&identity) {
                    // Checkpoint match or a rename seen as a fresh
                    // discovery: same physical file, so resume from the
                    // stored offset rather than creating a duplicate.
                    tracing::debug!(
                        %identity,
                        old_source = %state.source,
                        new_source = %source,
                        offset = state.offset,
                        "rediscovered tracked file, resuming"
                    );
                    state.source = source;
                    state.deleted = false;
                    state.last_seen = now;
                } else {
                    tracing::info!(%identity, %source, offset, "tracking new file");
                    self.files
                        .insert(identity.clone(), FileState::new(identity, source, offset, now));
                }
            }

            RegistrarEvent::BytesRead { identity, offset } => {
                match self.files.get_mut(&identity) {
                    Some(state) => {
                        state.offset = offset;
                        state.last_seen = now;
                    }
                    None => {
                        tracing::warn!(%identity, offset, "bytes-read for untracked file, dropping");
                    }
                }
            }

            RegistrarEvent::Renamed { identity, source } => {
                match self.files.get_mut(&identity) {
                    Some(state) => {
                        tracing::debug!(%identity, old = %state.source, new = %source, "file renamed");
                        state.source = source;
                        state.last_seen = now;
                    }
                    None => {
                        tracing::warn!(%identity, %source, "rename for untracked file, dropping");
                    }
                }
            }

            RegistrarEvent::Deleted { identity } => match self.files.get_mut(&identity) {
                Some(state) => {
                    tracing::debug!(%identity, source = %state.source, "file deleted");
                    state.deleted = true;
                    state.last_seen = now;
                }
                None => {
                    tracing::warn!(%identity, "delete for untracked file, dropping");
                }
            },

            RegistrarEvent::Batch(batch) => {
                // The caller only applies a batch after the collector has
                // confirmed delivery. Events are in delivery order, so the
                // last offset per identity wins.
                for line in batch.events() {
                    match self.files.get_mut(&line.identity) {
                        Some(state) => {
                            state.offset = line.offset;
                            state.last_seen = now;
                        }
                        None => {
                            tracing::warn!(
                                identity = %line.identity,
                                source = %line.source,
                                "confirmed line for untracked file, dropping"
                            );
                        }
                    }
                }
            }
        }
    }

    /// Copies out all entries, ordered by source path (ties broken by
    /// identity) for stable checkpoint output.
    pub fn snapshot(&self) -> Vec<FileState> {
        let mut entries: Vec<FileState> = self.files.values().cloned().collect();
        entries.sort_by(|a, b| {
            a.source
                .cmp(&b.source)
                .then_with(|| a.identity.to_string().cmp(&b.identity.to_string()))
        });
        entries
    }

    /// Seeds the store from checkpoint entries at startup.
    ///
    /// Entries whose identity matches nothing currently on disk are kept:
    /// the file may reappear before its dead time elapses, and `sweep` is
    /// the only thing allowed to discard state.
    pub fn seed(&mut self, entries: Vec<FileState>) {
        for entry in entries {
            self.files.insert(entry.identity.clone(), entry);
        }
    }

    /// Removes tombstoned entries whose dead time has elapsed.
    ///
    /// `dead_time_for` maps an entry to its file group's dead time. Live
    /// (non-deleted) entries are never removed regardless of age.
    pub fn sweep(&mut self, now: DateTime<Utc>, dead_time_for: impl Fn(&FileState) -> Duration) {
        self.files.retain(|identity, state| {
            if !state.deleted {
                return true;
            }
            let dead_time = match chrono::Duration::from_std(dead_time_for(state)) {
                Ok(d) => d,
                // A dead time too large for chrono means "never expire".
                Err(_) => return true,
            };
            let expired = now - state.last_seen > dead_time;
            if expired {
                tracing::info!(%identity, source = %state.source, "dead time elapsed, dropping state");
            }
            !expired
        });
    }
}
