use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bus::{EventBus, PublishReport};
use crate::store::StoreEvent;

/// The delivery worker is gone and can't accept events anymore.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("event delivery queue is closed")]
pub struct QueueClosed;

/// Sending half of a delivery queue created with [`EventBus::spawn_queue`].
///
/// Batches are delivered by a single worker, one after the other, in the order they are
/// enqueued. The worker stops once every publisher is dropped and the queue is drained.
#[derive(Clone, Debug)]
pub struct QueuedPublisher {
    sender: mpsc::Sender<Vec<StoreEvent>>,
}

impl QueuedPublisher {
    /// Enqueues a batch of persisted events, waiting for room in the queue if it is full.
    ///
    /// # Errors
    ///
    /// Will return [`QueueClosed`] if the worker is not running anymore.
    pub async fn enqueue(&self, store_events: Vec<StoreEvent>) -> Result<(), QueueClosed> {
        self.sender.send(store_events).await.map_err(|_| QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl EventBus {
    /// Spawns a worker delivering events on this bus outside of the dispatching task.
    ///
    /// Returns the publisher feeding the worker and the worker's handle. Must be called within a
    /// tokio runtime.
    pub fn spawn_queue(self: Arc<Self>, capacity: usize) -> (QueuedPublisher, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<Vec<StoreEvent>>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(store_events) = receiver.recv().await {
                let report: PublishReport = self.publish(&store_events).await;

                if !report.is_success() {
                    tracing::warn!(
                        delivered = report.delivered(),
                        failures = report.failures().len(),
                        "queued delivery completed with listener failures"
                    );
                }
            }

            tracing::debug!("event delivery queue closed");
        });

        (QueuedPublisher { sender }, handle)
    }
}
