use async_trait::async_trait;

use crate::bus::{EventBus, PublishReport};
use crate::store::{EventStore, EventStoreError, InMemoryEventStore, StoreEvent};

/// A store able to give back every event it holds, across aggregates, in append order.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn all_events(&self) -> Result<Vec<StoreEvent>, EventStoreError>;
}

#[async_trait]
impl EventSource for InMemoryEventStore {
    async fn all_events(&self) -> Result<Vec<StoreEvent>, EventStoreError> {
        self.stream_events().await
    }
}

/// Replays the whole event log through the listeners of `bus`.
///
/// The read models are not cleared here: reset them (see [`crate::projection::ProjectionStore::reset`])
/// before calling this function, or the listeners will see every event twice.
///
/// # Errors
///
/// Will return an `Err` if the events can't be read from `source`. Listener failures are reported
/// in the returned [`PublishReport`].
#[tracing::instrument(skip_all, err)]
pub async fn rebuild_projections<S>(source: &S, bus: &EventBus) -> Result<PublishReport, EventStoreError>
where
    S: EventSource + ?Sized,
{
    let store_events: Vec<StoreEvent> = source.all_events().await?;
    let report: PublishReport = bus.publish(&store_events).await;

    tracing::info!(
        events = store_events.len(),
        delivered = report.delivered(),
        failures = report.failures().len(),
        "projections rebuilt"
    );

    Ok(report)
}

/// Replays the history of a single aggregate instance through the listeners of `bus`.
///
/// # Errors
///
/// Will return an `Err` if the history can't be loaded.
#[tracing::instrument(skip_all, fields(aggregate_id = %aggregate_id), err)]
pub async fn rebuild_aggregate<S>(
    store: &S,
    aggregate_id: &str,
    bus: &EventBus,
) -> Result<PublishReport, EventStoreError>
where
    S: EventStore + ?Sized,
{
    let store_events: Vec<StoreEvent> = store.by_aggregate_id(aggregate_id).await?;
    Ok(bus.publish(&store_events).await)
}
