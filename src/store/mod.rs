use std::ops::Deref;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::event::AnyEvent;
use crate::types::SequenceNumber;

pub use memory::InMemoryEventStore;
pub use record::EventRecord;

mod memory;
mod record;

#[derive(thiserror::Error, Debug)]
pub enum EventStoreError {
    /// Serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// The event type tag is not known to the store's codec, or it belongs to another type.
    #[error("unknown event type `{name}`")]
    UnknownEventType { name: String },
    /// Another writer appended to the aggregate after its history was loaded.
    #[error("sequence conflict on aggregate `{aggregate_id}`: expected sequence number {expected}, found {actual}")]
    SequenceConflict {
        aggregate_id: String,
        expected: SequenceNumber,
        actual: SequenceNumber,
    },
    /// The history of the aggregate can't grow any further.
    #[error("sequence number overflow on aggregate `{aggregate_id}`")]
    SequenceOverflow { aggregate_id: String },
    /// Error raised by a custom store implementation.
    #[error(transparent)]
    Custom(Box<dyn std::error::Error + Send + Sync>),
}

/// Marker trait for every [`EventStoreLockGuard`].
///
/// Implementors should unlock concurrent access to the guarded resource, when dropped.
pub trait UnlockOnDrop: Send + Sync + 'static {}

/// Lock guard preventing concurrent access to an aggregate instance.
///
/// The lock is released when this guard is dropped.
pub struct EventStoreLockGuard(Box<dyn UnlockOnDrop>);

impl EventStoreLockGuard {
    /// Creates a new instance from any [`UnlockOnDrop`].
    #[must_use]
    pub fn new(lock: impl UnlockOnDrop) -> Self {
        Self(Box::new(lock))
    }
}

/// An EventStore is responsible for persisting the events an aggregate emits, and for loading the
/// events that represent an aggregate's history.
///
/// Histories are keyed by aggregate id only and are append-only: events are never updated or
/// removed. A store must give back events of the exact type they were persisted with.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Acquires a lock for the given aggregate, or waits for outstanding guards to be released.
    ///
    /// Used to serialize command handling on a single aggregate instance. Writers that do not
    /// `lock` are still subject to the sequence number check in [`EventStore::persist`].
    async fn lock(&self, aggregate_id: &str) -> Result<EventStoreLockGuard, EventStoreError>;

    /// Loads the events that an aggregate instance has emitted in the past, ordered by sequence
    /// number. An unknown aggregate id yields an empty history.
    async fn by_aggregate_id(&self, aggregate_id: &str) -> Result<Vec<StoreEvent>, EventStoreError>;

    /// Appends `events` to the history of `aggregate_id`. Either all the events are persisted, or
    /// none are.
    ///
    /// `expected_sequence_number` is the sequence number of the last event the caller has seen
    /// (0 for an empty history). If the history moved on in the meantime the store must refuse the
    /// write with [`EventStoreError::SequenceConflict`].
    async fn persist(
        &self,
        aggregate_id: &str,
        events: Vec<AnyEvent>,
        expected_sequence_number: SequenceNumber,
    ) -> Result<Vec<StoreEvent>, EventStoreError>;
}

/// Blanket implementation making an [`EventStore`] every (smart) pointer to an [`EventStore`],
/// e.g. `&Store`, `Box<Store>`, `Arc<Store>`.
#[async_trait]
impl<S, T> EventStore for T
where
    S: EventStore + ?Sized,
    T: Deref<Target = S> + Send + Sync,
{
    /// Deref call to [`EventStore::lock`].
    async fn lock(&self, aggregate_id: &str) -> Result<EventStoreLockGuard, EventStoreError> {
        self.deref().lock(aggregate_id).await
    }

    /// Deref call to [`EventStore::by_aggregate_id`].
    async fn by_aggregate_id(&self, aggregate_id: &str) -> Result<Vec<StoreEvent>, EventStoreError> {
        self.deref().by_aggregate_id(aggregate_id).await
    }

    /// Deref call to [`EventStore::persist`].
    async fn persist(
        &self,
        aggregate_id: &str,
        events: Vec<AnyEvent>,
        expected_sequence_number: SequenceNumber,
    ) -> Result<Vec<StoreEvent>, EventStoreError> {
        self.deref()
            .persist(aggregate_id, events, expected_sequence_number)
            .await
    }
}

/// A `StoreEvent` contains the payload (the original event) alongside the event's metadata.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    /// Uniquely identifies an event among all events emitted from all aggregates.
    pub id: Uuid,
    /// The aggregate instance that emitted the event.
    pub aggregate_id: String,
    /// The original, emitted, event.
    pub payload: AnyEvent,
    /// The timestamp of when the event is persisted.
    pub occurred_on: DateTime<Utc>,
    /// The sequence number of the event, within its specific aggregate instance.
    pub sequence_number: SequenceNumber,
}

impl StoreEvent {
    /// Returns the sequence number of the event, within its specific aggregate instance.
    pub const fn sequence_number(&self) -> SequenceNumber {
        self.sequence_number
    }

    /// Returns the original, emitted, event.
    pub const fn payload(&self) -> &AnyEvent {
        &self.payload
    }
}
