//! The registrar → network collector boundary.
//!
//! The transport that encrypts, batches, and delivers events to the remote
//! collector lives behind the [`Collector`] trait. The registrar core cares
//! about exactly one thing at this seam: a batch's offsets are applied only
//! after the collector confirms delivery. A crash before confirmation means
//! the un-confirmed range is re-harvested on restart — re-forwarding,
//! never loss.
//!
//! The trait-based design also gives tests a trivial mock transport.

use std::future::Future;

use thiserror::Error;

use crate::registrar::{EventBatch, RegistrarEvent, RegistrarHandle, RegistrarStopped};

/// Delivers event batches to the remote collector.
///
/// `publish` resolving to `Ok` *is* the delivery confirmation; there is no
/// separate acknowledgement call. Implementations own reconnect and
/// backpressure behavior — `publish` may block for as long as it needs,
/// and callers must tolerate that without touching registrar state.
pub trait Collector {
    /// The error type returned by this transport.
    type Error;

    /// Delivers one batch, in order, resolving once the remote collector
    /// has acknowledged it.
    fn publish(
        &self,
        batch: &EventBatch,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Errors from forwarding a batch.
#[derive(Debug, Error)]
pub enum ForwardError<E> {
    /// The collector did not confirm delivery. No offsets were advanced;
    /// the caller may retry the same batch.
    #[error("delivery not confirmed: {0}")]
    Delivery(#[source] E),

    /// Delivery was confirmed but the registrar has stopped, so the
    /// offsets could not be recorded. On restart the batch will be
    /// re-forwarded.
    #[error(transparent)]
    RegistrarStopped(#[from] RegistrarStopped),
}

/// Forwards one batch: publish, then — only on confirmed delivery — hand
/// the batch to the registrar to advance offsets.
///
/// This is the harvesting side's single entry point for shipping lines,
/// keeping the confirm-then-advance coupling in one place.
pub async fn forward<C: Collector>(
    collector: &C,
    registrar: &RegistrarHandle,
    batch: EventBatch,
) -> Result<(), ForwardError<C::Error>> {
    if batch.is_empty() {
        return Ok(());
    }
    collector
        .publish(&batch)
        .await
        .map_err(ForwardError::Delivery)?;
    registrar.send(RegistrarEvent::Batch(batch)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::FileIdentity;
    use crate::registrar::{LineEvent, Registrar, event_channel};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    /// Transport that confirms everything and counts publishes.
    #[derive(Default)]
    struct AckingCollector {
        published: AtomicUsize,
    }

    impl Collector for AckingCollector {
        type Error = std::io::Error;

        async fn publish(&self, _batch: &EventBatch) -> Result<(), Self::Error> {
            self.published.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Transport that never confirms.
    struct RefusingCollector;

    impl Collector for RefusingCollector {
        type Error = std::io::Error;

        async fn publish(&self, _batch: &EventBatch) -> Result<(), Self::Error> {
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "collector unreachable",
            ))
        }
    }

    fn identity() -> FileIdentity {
        FileIdentity::Inode {
            device: 1,
            inode: 7,
        }
    }

    fn batch_to(offset: u64) -> EventBatch {
        let fields = BTreeMap::new();
        std::iter::once(LineEvent::new(
            identity(),
            "/var/log/app.log",
            offset,
            "a line",
            &fields,
        ))
        .collect()
    }

    async fn with_running_registrar<F, Fut>(f: F) -> Vec<crate::registrar::FileState>
    where
        F: FnOnce(RegistrarHandle) -> Fut,
        Fut: Future<Output = ()>,
    {
        let registrar = Registrar::new();
        registrar.apply(RegistrarEvent::NewFile {
            source: "/var/log/app.log".to_string(),
            identity: identity(),
            offset: 0,
        });

        let (handle, rx) = event_channel();
        let shutdown = CancellationToken::new();
        let loop_registrar = registrar.clone();
        let loop_shutdown = shutdown.clone();
        let task = tokio::spawn(async move { loop_registrar.run(rx, loop_shutdown).await });

        f(handle).await;

        shutdown.cancel();
        task.await.unwrap();
        registrar.snapshot()
    }

    #[tokio::test]
    async fn confirmed_delivery_advances_offset() {
        let collector = AckingCollector::default();

        let snapshot = with_running_registrar(|handle| async move {
            forward(&collector, &handle, batch_to(64)).await.unwrap();
        })
        .await;

        assert_eq!(snapshot[0].offset, 64);
    }

    #[tokio::test]
    async fn unconfirmed_delivery_leaves_offset_untouched() {
        let snapshot = with_running_registrar(|handle| async move {
            let result = forward(&RefusingCollector, &handle, batch_to(64)).await;
            assert!(matches!(result, Err(ForwardError::Delivery(_))));
        })
        .await;

        assert_eq!(snapshot[0].offset, 0);
    }

    #[tokio::test]
    async fn empty_batch_is_not_published() {
        let collector = AckingCollector::default();
        let collector_ref = &collector;

        with_running_registrar(|handle| async move {
            forward(collector_ref, &handle, EventBatch::new())
                .await
                .unwrap();
        })
        .await;

        assert_eq!(collector.published.load(Ordering::SeqCst), 0);
    }
}
