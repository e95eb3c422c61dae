//! The periodic persister task.
//!
//! Runs independently of the registrar loop on a fixed interval: each tick
//! takes a point-in-time snapshot (a short read-lock copy) and writes it
//! atomically, keeping serialization and disk I/O off the registrar's
//! critical path. A slow write delays the next tick rather than skipping
//! it.
//!
//! A failed interval write is logged and retried on the next tick — the
//! previous checkpoint on disk is still intact and merely stale, which
//! at-least-once delivery tolerates. On shutdown a final persist runs
//! before the task returns, so offsets confirmed up to the last applied
//! event survive the restart.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::snapshot::{PersistedCheckpoint, save_checkpoint_atomic};
use crate::registrar::Registrar;

/// Runs the persister until shutdown, then performs a final persist.
pub async fn run_persister(
    registrar: Registrar,
    path: PathBuf,
    interval: Duration,
    shutdown: CancellationToken,
) {
    info!(path = %path.display(), interval_secs = interval.as_secs_f64(), "persister started");

    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of a tokio interval fires immediately; consume it so
    // the first real persist happens one interval after startup.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = persist(&registrar, &path) {
                    error!(path = %path.display(), error = %e, "checkpoint write failed, will retry next interval");
                }
            }
        }
    }

    match persist(&registrar, &path) {
        Ok(()) => info!(path = %path.display(), "final checkpoint written"),
        Err(e) => error!(path = %path.display(), error = %e, "final checkpoint write failed"),
    }
}

/// Snapshots the registrar and writes the checkpoint atomically.
fn persist(registrar: &Registrar, path: &Path) -> super::snapshot::Result<()> {
    let files = registrar.snapshot();
    debug!(entries = files.len(), "writing checkpoint");
    save_checkpoint_atomic(path, &PersistedCheckpoint::new(files))
}
