use std::collections::HashMap;
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::codec::EventCodec;
use crate::event::AnyEvent;
use crate::store::{EventRecord, EventStore, EventStoreError, EventStoreLockGuard, StoreEvent, UnlockOnDrop};
use crate::types::SequenceNumber;

/// Reference, in-memory implementation of the [`EventStore`].
///
/// Events are kept as [`EventRecord`]s, i.e. serialized to json next to their type tag, so that a
/// load goes through the same decoding path a durable store would. The store is protected by an
/// [`Arc`] that allows it to be cloneable still having the same memory reference.
pub struct InMemoryEventStore {
    inner: Arc<InnerInMemoryStore>,
}

struct InnerInMemoryStore {
    codec: EventCodec,
    streams: RwLock<Streams>,
    // Only touched without awaiting, so that guards can clean up on drop.
    locks: SyncMutex<HashMap<String, Arc<Mutex<()>>>>,
}

#[derive(Default)]
struct Streams {
    by_aggregate: HashMap<String, Vec<EventRecord>>,
    // (aggregate id, index in its history) in global append order
    log: Vec<(String, usize)>,
}

/// Per aggregate lock handed out by [`InMemoryEventStore::lock`]. The lock entry of the aggregate
/// is dropped along with the last guard waiting on it.
struct InMemoryLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    aggregate_id: String,
    store: Arc<InnerInMemoryStore>,
}

impl UnlockOnDrop for InMemoryLockGuard {}

impl Drop for InMemoryLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self.store.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let idle: bool = locks
            .get(&self.aggregate_id)
            .map_or(false, |mutex| Arc::strong_count(mutex) == 1);

        if idle {
            locks.remove(&self.aggregate_id);
        }
    }
}

/// Sequence number of the last event of a history of `current` events, and the one it reaches
/// once `batch` more events are appended.
fn sequence_bounds(
    aggregate_id: &str,
    current: usize,
    batch: usize,
) -> Result<(SequenceNumber, SequenceNumber), EventStoreError> {
    let overflow = || EventStoreError::SequenceOverflow {
        aggregate_id: aggregate_id.to_string(),
    };

    let actual: SequenceNumber = SequenceNumber::try_from(current).map_err(|_| overflow())?;
    let last: SequenceNumber = SequenceNumber::try_from(batch)
        .ok()
        .and_then(|batch| actual.checked_add(batch))
        .ok_or_else(overflow)?;

    Ok((actual, last))
}

impl InMemoryEventStore {
    /// Creates an empty store decoding events through `codec`. Usually the codec comes from
    /// [`crate::HandlerRegistry::codec`].
    pub fn new(codec: EventCodec) -> Self {
        Self {
            inner: Arc::new(InnerInMemoryStore {
                codec,
                streams: RwLock::new(Streams::default()),
                locks: SyncMutex::new(HashMap::new()),
            }),
        }
    }

    /// The codec used to encode and decode events.
    pub fn codec(&self) -> &EventCodec {
        &self.inner.codec
    }

    /// Returns the raw records of an aggregate instance.
    pub async fn records(&self, aggregate_id: &str) -> Vec<EventRecord> {
        self.inner
            .streams
            .read()
            .await
            .by_aggregate
            .get(aggregate_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns every stored event, of every aggregate, in the order they were appended. This
    /// should be mainly used to rebuild read models.
    ///
    /// # Errors
    ///
    /// Will return an `Err` if a stored record can't be decoded.
    pub async fn stream_events(&self) -> Result<Vec<StoreEvent>, EventStoreError> {
        let streams = self.inner.streams.read().await;

        streams
            .log
            .iter()
            .filter_map(|(aggregate_id, index)| streams.by_aggregate.get(aggregate_id)?.get(*index))
            .map(|record| record.clone().try_into_store_event(&self.inner.codec))
            .collect()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn lock(&self, aggregate_id: &str) -> Result<EventStoreLockGuard, EventStoreError> {
        let mutex: Arc<Mutex<()>> = {
            let mut locks = self.inner.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(aggregate_id.to_string()).or_default())
        };

        Ok(EventStoreLockGuard::new(InMemoryLockGuard {
            guard: Some(mutex.lock_owned().await),
            aggregate_id: aggregate_id.to_string(),
            store: Arc::clone(&self.inner),
        }))
    }

    async fn by_aggregate_id(&self, aggregate_id: &str) -> Result<Vec<StoreEvent>, EventStoreError> {
        self.records(aggregate_id)
            .await
            .into_iter()
            .map(|record| record.try_into_store_event(&self.inner.codec))
            .collect()
    }

    #[tracing::instrument(skip_all, fields(aggregate_id = %aggregate_id, events = events.len()), err)]
    async fn persist(
        &self,
        aggregate_id: &str,
        events: Vec<AnyEvent>,
        expected_sequence_number: SequenceNumber,
    ) -> Result<Vec<StoreEvent>, EventStoreError> {
        let mut guard = self.inner.streams.write().await;
        let streams: &mut Streams = &mut guard;

        let current: usize = streams.by_aggregate.get(aggregate_id).map_or(0, Vec::len);
        let (actual, last) = sequence_bounds(aggregate_id, current, events.len())?;

        if actual != expected_sequence_number {
            return Err(EventStoreError::SequenceConflict {
                aggregate_id: aggregate_id.to_string(),
                expected: expected_sequence_number,
                actual,
            });
        }

        let occurred_on: DateTime<Utc> = Utc::now();

        // Everything is encoded before anything is appended.
        let records: Vec<EventRecord> = events
            .iter()
            .zip((actual..last).map(|sequence_number| sequence_number + 1))
            .map(|(event, sequence_number)| {
                EventRecord::encode(&self.inner.codec, aggregate_id, event, occurred_on, sequence_number)
            })
            .collect::<Result<_, _>>()?;

        let store_events: Vec<StoreEvent> = records
            .iter()
            .zip(events)
            .map(|(record, payload)| StoreEvent {
                id: record.id,
                aggregate_id: record.aggregate_id.clone(),
                payload,
                occurred_on,
                sequence_number: record.sequence_number,
            })
            .collect();

        let history = streams.by_aggregate.entry(aggregate_id.to_string()).or_default();
        let start = history.len();
        history.extend(records);
        let end = history.len();

        streams
            .log
            .extend((start..end).map(|index| (aggregate_id.to_string(), index)));

        tracing::debug!(sequence_number = last, "events appended");

        Ok(store_events)
    }
}

impl Clone for InMemoryEventStore {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Debug implementation for [`InMemoryEventStore`]. It just shows the codec, the only thing that
/// might be useful to debug.
impl std::fmt::Debug for InMemoryEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventStore")
            .field("codec", &self.inner.codec)
            .finish()
    }
}
