//! Checkpoint persistence for the registrar.
//!
//! The checkpoint (historically "sincedb") is a JSON document mapping each
//! tracked file identity to its last observed path, confirmed offset, and
//! liveness. It is read once at startup to seed the registrar and written
//! atomically on a fixed interval and at shutdown.
//!
//! # Crash safety
//!
//! Writes use write-to-temp-then-rename with fsync on both the file and the
//! containing directory, so a process that dies mid-write leaves either the
//! old checkpoint or the new one, never a torn file. A crash between
//! interval writes loses at most one interval's worth of offset progress,
//! which at-least-once delivery turns into re-forwarding, never loss.

pub mod fsync;
pub mod persister;
pub mod snapshot;

pub use fsync::{fsync_dir, fsync_file};
pub use persister::run_persister;
pub use snapshot::{
    CheckpointError, PersistedCheckpoint, SCHEMA_VERSION, load_checkpoint, probe_writable,
    save_checkpoint_atomic, try_load_checkpoint,
};
