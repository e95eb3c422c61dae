//! The registrar: event-sourced ownership of per-file read offsets.
//!
//! Producers (discovery and per-file harvesting tasks) run concurrently but
//! never mutate file state themselves. They send [`RegistrarEvent`]s through
//! a [`RegistrarHandle`]; a single registrar loop drains the channel and
//! applies events in order. This serializes all state mutation without
//! serializing I/O.
//!
//! The periodic persister reads point-in-time snapshots concurrently. The
//! store sits behind a readers-writer lock held only for the duration of a
//! single apply or the snapshot copy itself, so a slow checkpoint write
//! never blocks event application.

pub mod event;
pub mod state;

pub use event::{EventBatch, LineEvent, RegistrarEvent};
pub use state::{FileState, FileStateStore};

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default bound for the registrar event channel.
///
/// Applying an event is cheap (a map update under a short lock), so the
/// bound exists only to surface a stalled registrar as backpressure on
/// producers instead of unbounded memory growth.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Thread-safe owner of the [`FileStateStore`].
///
/// Cloning is cheap; all clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct Registrar {
    store: Arc<RwLock<FileStateStore>>,
}

impl Registrar {
    pub fn new() -> Self {
        Registrar {
            store: Arc::new(RwLock::new(FileStateStore::new())),
        }
    }

    /// Seeds the store from checkpoint entries at startup, so harvesting
    /// resumes mid-file instead of re-reading from the start.
    pub fn seed(&self, entries: Vec<FileState>) {
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        store.seed(entries);
    }

    /// Applies one event under a short exclusive lock.
    ///
    /// This is the thread-safe entry point all producers funnel into.
    /// Stamped with the current time; see [`FileStateStore::apply`] for the
    /// per-variant semantics.
    pub fn apply(&self, event: RegistrarEvent) {
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        store.apply(event, Utc::now());
    }

    /// Copies out a consistent point-in-time snapshot.
    ///
    /// Holds the read lock only for the copy; serialization and disk I/O
    /// happen off the critical path.
    pub fn snapshot(&self) -> Vec<FileState> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        store.snapshot()
    }

    /// Sweeps expired tombstones. See [`FileStateStore::sweep`].
    pub fn sweep(&self, dead_time_for: impl Fn(&FileState) -> std::time::Duration) {
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        store.sweep(Utc::now(), dead_time_for);
    }

    /// Runs the event loop: drains the channel, applying events in order,
    /// until the channel closes or shutdown is signalled.
    ///
    /// On shutdown, events already queued are still applied (they describe
    /// work that already happened; dropping them would lose offsets that
    /// the final checkpoint should carry).
    pub async fn run(&self, mut rx: mpsc::Receiver<RegistrarEvent>, shutdown: CancellationToken) {
        info!("registrar event loop started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("shutdown signalled, draining queued events");
                    while let Ok(event) = rx.try_recv() {
                        self.apply(event);
                    }
                    break;
                }
                event = rx.recv() => {
                    match event {
                        Some(event) => self.apply(event),
                        None => {
                            info!("event channel closed");
                            break;
                        }
                    }
                }
            }
        }
        info!("registrar event loop stopped");
    }
}

/// Producer-side handle to the registrar event channel.
///
/// This is the discovery/harvesting → registrar boundary: producers send
/// fully-formed events and never see the store.
#[derive(Debug, Clone)]
pub struct RegistrarHandle {
    tx: mpsc::Sender<RegistrarEvent>,
}

impl RegistrarHandle {
    /// Sends an event, waiting if the registrar is backlogged.
    ///
    /// Returns `Err` only if the registrar loop has stopped; producers
    /// should treat that as shutdown.
    pub async fn send(&self, event: RegistrarEvent) -> Result<(), RegistrarStopped> {
        self.tx.send(event).await.map_err(|_| RegistrarStopped)
    }
}

/// The registrar loop is no longer running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("registrar has stopped; event not applied")]
pub struct RegistrarStopped;

/// Creates the bounded event channel connecting producers to the registrar
/// loop.
pub fn event_channel() -> (RegistrarHandle, mpsc::Receiver<RegistrarEvent>) {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    (RegistrarHandle { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::FileIdentity;

    fn identity(inode: u64) -> FileIdentity {
        FileIdentity::Inode {
            device: 1,
            inode,
        }
    }

    #[test]
    fn apply_and_snapshot_share_state_across_clones() {
        let registrar = Registrar::new();
        let clone = registrar.clone();

        registrar.apply(RegistrarEvent::NewFile {
            source: "/var/log/app.log".to_string(),
            identity: identity(1),
            offset: 0,
        });

        let snapshot = clone.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].source, "/var/log/app.log");
    }

    #[tokio::test]
    async fn run_applies_events_in_order() {
        let registrar = Registrar::new();
        let (handle, rx) = event_channel();
        let shutdown = CancellationToken::new();

        let loop_registrar = registrar.clone();
        let loop_shutdown = shutdown.clone();
        let task = tokio::spawn(async move { loop_registrar.run(rx, loop_shutdown).await });

        handle
            .send(RegistrarEvent::NewFile {
                source: "/var/log/app.log".to_string(),
                identity: identity(1),
                offset: 0,
            })
            .await
            .unwrap();
        for offset in [10, 20, 30] {
            handle
                .send(RegistrarEvent::BytesRead {
                    identity: identity(1),
                    offset,
                })
                .await
                .unwrap();
        }

        // Closing the channel ends the loop once it has drained.
        drop(handle);
        task.await.unwrap();

        let snapshot = registrar.snapshot();
        assert_eq!(snapshot[0].offset, 30);
    }

    #[tokio::test]
    async fn shutdown_drains_queued_events() {
        let registrar = Registrar::new();
        let (handle, rx) = event_channel();
        let shutdown = CancellationToken::new();

        handle
            .send(RegistrarEvent::NewFile {
                source: "/var/log/app.log".to_string(),
                identity: identity(1),
                offset: 0,
            })
            .await
            .unwrap();
        handle
            .send(RegistrarEvent::BytesRead {
                identity: identity(1),
                offset: 99,
            })
            .await
            .unwrap();

        // Cancel before the loop even starts: queued events must still land.
        shutdown.cancel();
        registrar.run(rx, shutdown).await;

        assert_eq!(registrar.snapshot()[0].offset, 99);
    }

    #[tokio::test]
    async fn send_after_stop_reports_stopped() {
        let (handle, rx) = event_channel();
        drop(rx);

        let result = handle
            .send(RegistrarEvent::Deleted { identity: identity(1) })
            .await;
        assert_eq!(result, Err(RegistrarStopped));
    }
}
