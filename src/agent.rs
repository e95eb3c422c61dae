//! Agent wiring: tasks, channels, and shutdown ordering.
//!
//! The agent owns three long-running pieces:
//!
//! - the registrar event loop, draining the producer channel;
//! - the periodic persister, checkpointing registrar snapshots;
//! - the tombstone sweeper, running on the discovery poll cadence.
//!
//! Discovery and harvesting are external collaborators: they receive a
//! [`RegistrarHandle`] and the validated [`Config`] and feed events in.
//!
//! # Shutdown ordering
//!
//! Shutdown cancels the event loop first and waits for it to drain queued
//! events, and only then cancels the persister, whose final write therefore
//! captures every applied event. Producers see [`RegistrarStopped`] from the
//! handle once the loop is gone and abandon in-flight work; offsets for
//! unconfirmed ranges were never advanced, so those ranges are simply
//! re-forwarded on the next start.
//!
//! [`RegistrarStopped`]: crate::registrar::RegistrarStopped

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::checkpoint::{self, CheckpointError};
use crate::config::Config;
use crate::registrar::{FileState, Registrar, RegistrarHandle, event_channel};

/// Fallback dead time when no file groups are configured.
const FALLBACK_DEAD_TIME: Duration = Duration::from_secs(24 * 3600);

/// A running agent core.
pub struct Agent {
    registrar: Registrar,
    handle: RegistrarHandle,
    events_shutdown: CancellationToken,
    persist_shutdown: CancellationToken,
    registrar_task: JoinHandle<()>,
    persister_task: JoinHandle<()>,
    sweeper_task: JoinHandle<()>,
}

impl Agent {
    /// Seeds the registrar from the checkpoint and starts the core tasks.
    ///
    /// # Errors
    ///
    /// Fails if an existing checkpoint is unreadable or has an
    /// incompatible schema. A missing or empty checkpoint is a fresh
    /// start, not an error.
    pub fn start(config: &Config) -> Result<Agent, CheckpointError> {
        let registrar = Registrar::new();

        match checkpoint::try_load_checkpoint(&config.sincedb_path)? {
            Some(persisted) => {
                info!(
                    path = %config.sincedb_path.display(),
                    entries = persisted.files.len(),
                    "resuming from checkpoint"
                );
                registrar.seed(persisted.files);
            }
            None => {
                info!(path = %config.sincedb_path.display(), "no checkpoint, starting fresh");
            }
        }

        let (handle, rx) = event_channel();
        let events_shutdown = CancellationToken::new();
        let persist_shutdown = CancellationToken::new();

        let registrar_task = {
            let registrar = registrar.clone();
            let shutdown = events_shutdown.clone();
            tokio::spawn(async move { registrar.run(rx, shutdown).await })
        };

        let persister_task = tokio::spawn(checkpoint::run_persister(
            registrar.clone(),
            config.sincedb_path.clone(),
            config.persist_interval,
            persist_shutdown.clone(),
        ));

        let sweeper_task = {
            let registrar = registrar.clone();
            let shutdown = events_shutdown.clone();
            let poll_interval = config.poll_interval;
            let dead_time = sweep_dead_time(config);
            tokio::spawn(async move {
                run_sweeper(registrar, poll_interval, dead_time, shutdown).await
            })
        };

        Ok(Agent {
            registrar,
            handle,
            events_shutdown,
            persist_shutdown,
            registrar_task,
            persister_task,
            sweeper_task,
        })
    }

    /// The producer boundary for discovery and harvesting.
    pub fn handle(&self) -> RegistrarHandle {
        self.handle.clone()
    }

    /// Read access to registrar snapshots (used by discovery to match
    /// checkpoint entries against fresh sightings).
    pub fn registrar(&self) -> Registrar {
        self.registrar.clone()
    }

    /// Stops the agent: drains the event loop, then writes the final
    /// checkpoint.
    pub async fn shutdown(self) {
        info!("agent shutting down");

        // Stop accepting events and drain what is queued.
        drop(self.handle);
        self.events_shutdown.cancel();
        if self.registrar_task.await.is_err() {
            warn!("registrar task panicked during shutdown");
        }
        if self.sweeper_task.await.is_err() {
            warn!("sweeper task panicked during shutdown");
        }

        // The store is now quiescent; the final persist captures it all.
        self.persist_shutdown.cancel();
        if self.persister_task.await.is_err() {
            warn!("persister task panicked during shutdown");
        }

        info!("agent stopped");
    }
}

/// Picks the dead time the sweeper applies to every tombstone.
///
/// Group membership of a file is discovery's knowledge, not the store's,
/// so the sweeper uses the most conservative (largest) configured dead
/// time: state is never purged before *any* group would allow it. A file
/// in a shorter-dead-time group lingers a little longer, which only costs
/// memory, never correctness.
fn sweep_dead_time(config: &Config) -> Duration {
    config
        .files
        .iter()
        .map(|group| group.dead_time)
        .max()
        .unwrap_or(FALLBACK_DEAD_TIME)
}

/// Sweeps expired tombstones on the discovery poll cadence.
async fn run_sweeper(
    registrar: Registrar,
    poll_interval: Duration,
    dead_time: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                registrar.sweep(|_state: &FileState| dead_time);
            }
        }
    }
}
