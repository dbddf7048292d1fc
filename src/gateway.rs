use std::any::{type_name, Any, TypeId};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::bus::{EventBus, PublishReport, QueuedPublisher};
use crate::registry::{ErasedAggregate, HandleError};
use crate::store::{EventStore, EventStoreError, EventStoreLockGuard, StoreEvent};
use crate::types::SequenceNumber;
use crate::{Aggregate, AggregateState, AnyEvent, Command, HandlerRegistry};

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    /// No aggregate handles the command type.
    #[error("unconfigured command `{command}`")]
    UnconfiguredCommand { command: &'static str },
    /// The aggregate type is not part of the registry.
    #[error("aggregate `{aggregate}` is not registered")]
    UnregisteredAggregate { aggregate: &'static str },
    /// The command handler returned an error. Use [`GatewayError::rejection`] to get it back.
    #[error(transparent)]
    Rejected(Box<dyn std::error::Error + Send + Sync>),
    /// The handler emitted an event belonging to another aggregate instance.
    #[error("event `{event}` belongs to aggregate `{event_aggregate_id}`, but the command targets `{aggregate_id}`")]
    ForeignEvent {
        event: &'static str,
        event_aggregate_id: String,
        aggregate_id: String,
    },
    #[error(transparent)]
    Store(#[from] EventStoreError),
    /// The deadline elapsed before the events were persisted. Nothing has been written.
    #[error("dispatch deadline elapsed")]
    Timeout,
    /// The events have been persisted but could not be handed to the delivery queue.
    #[error("{} events persisted but the delivery queue is closed", persisted.len())]
    DeliveryClosed { persisted: Vec<StoreEvent> },
}

impl GatewayError {
    /// Returns the error the command handler rejected the command with, if it is an `E`.
    pub fn rejection<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Rejected(error) => error.downcast_ref::<E>(),
            _ => None,
        }
    }
}

enum Delivery {
    None,
    Inline(Arc<EventBus>),
    Queued(QueuedPublisher),
}

/// The entry point of the write side: routes commands to the aggregate handling them, persists the
/// events they produce and hands them to the projections.
///
/// Dispatches targeting the same aggregate id are serialized through [`EventStore::lock`]; those
/// targeting different ids run concurrently.
pub struct CommandGateway<S>
where
    S: EventStore,
{
    registry: Arc<HandlerRegistry>,
    event_store: S,
    delivery: Delivery,
    dispatch_timeout: Option<Duration>,
}

impl<S> CommandGateway<S>
where
    S: EventStore,
{
    /// Creates a new [`CommandGatewayBuilder`].
    pub fn builder(registry: impl Into<Arc<HandlerRegistry>>, event_store: S) -> CommandGatewayBuilder<S> {
        CommandGatewayBuilder::new(registry, event_store)
    }

    /// Handles a command:
    /// 1. looks up the aggregate bound to the command type;
    /// 2. locks the target aggregate instance and loads its history;
    /// 3. replays the history on a fresh aggregate and invokes the handler;
    /// 4. persists the produced events;
    /// 5. publishes them to the event bus, if any.
    ///
    /// A rejected command leaves no trace: nothing is persisted nor published. Listener failures
    /// are logged and do not make the dispatch fail, since the events are already committed.
    ///
    /// If a dispatch timeout is configured, it bounds everything up to the persistence of the
    /// events.
    ///
    /// # Errors
    ///
    /// See [`GatewayError`].
    pub async fn dispatch<C: Command>(&self, command: C) -> Result<(), GatewayError> {
        let deadline: Option<Instant> = self.dispatch_timeout.map(|timeout| Instant::now() + timeout);
        self.dispatch_with_deadline(command, deadline).await
    }

    /// Same as [`CommandGateway::dispatch`], giving up with [`GatewayError::Timeout`] if the events
    /// are not being persisted by `deadline`.
    ///
    /// # Errors
    ///
    /// See [`GatewayError`].
    pub async fn dispatch_until<C: Command>(&self, command: C, deadline: Instant) -> Result<(), GatewayError> {
        self.dispatch_with_deadline(command, Some(deadline)).await
    }

    #[tracing::instrument(
        name = "esrs.dispatch",
        skip_all,
        fields(command = type_name::<C>(), aggregate_id = %command.target_aggregate_id()),
        err
    )]
    async fn dispatch_with_deadline<C: Command>(
        &self,
        command: C,
        deadline: Option<Instant>,
    ) -> Result<(), GatewayError> {
        let aggregate: &dyn ErasedAggregate = self
            .registry
            .lookup_command_handler(TypeId::of::<C>())
            .and_then(|route| self.registry.aggregate(route.aggregate_type()))
            .ok_or(GatewayError::UnconfiguredCommand {
                command: type_name::<C>(),
            })?;

        let aggregate_id: &str = command.target_aggregate_id();

        let (guard, events, expected_sequence_number) = until(deadline, self.handle(aggregate, &command)).await?;

        if events.is_empty() {
            tracing::debug!(aggregate = aggregate.name(), "command produced no events");
            return Ok(());
        }

        // Last point where giving up leaves the store untouched.
        if elapsed(deadline) {
            return Err(GatewayError::Timeout);
        }

        let store_events: Vec<StoreEvent> = self
            .event_store
            .persist(aggregate_id, events, expected_sequence_number)
            .await?;

        // The lock is held until the events are handed over, so that each aggregate's events reach
        // the listeners in sequence order.
        let delivered = self.deliver(store_events).await;
        drop(guard);

        delivered
    }

    async fn handle<C: Command>(
        &self,
        aggregate: &dyn ErasedAggregate,
        command: &C,
    ) -> Result<(EventStoreLockGuard, Vec<AnyEvent>, SequenceNumber), GatewayError> {
        let aggregate_id: &str = command.target_aggregate_id();
        let guard: EventStoreLockGuard = self.event_store.lock(aggregate_id).await?;
        let history: Vec<StoreEvent> = self.event_store.by_aggregate_id(aggregate_id).await?;

        let events: Vec<AnyEvent> = aggregate
            .handle(aggregate_id, &history, command as &dyn Any, TypeId::of::<C>())
            .map_err(|error| match error {
                HandleError::Unhandled => GatewayError::UnconfiguredCommand {
                    command: type_name::<C>(),
                },
                HandleError::Rejected(error) => GatewayError::Rejected(error),
            })?;

        if let Some(event) = events.iter().find(|event| event.aggregate_id() != aggregate_id) {
            return Err(GatewayError::ForeignEvent {
                event: event.name(),
                event_aggregate_id: event.aggregate_id().to_string(),
                aggregate_id: aggregate_id.to_string(),
            });
        }

        let expected_sequence_number: SequenceNumber = history.last().map_or(0, StoreEvent::sequence_number);

        Ok((guard, events, expected_sequence_number))
    }

    async fn deliver(&self, store_events: Vec<StoreEvent>) -> Result<(), GatewayError> {
        match &self.delivery {
            Delivery::None => Ok(()),
            Delivery::Inline(bus) => {
                let report: PublishReport = bus.publish(&store_events).await;

                if !report.is_success() {
                    tracing::warn!(
                        delivered = report.delivered(),
                        failures = report.failures().len(),
                        "events persisted, some listeners failed"
                    );
                }

                Ok(())
            }
            Delivery::Queued(publisher) => publisher
                .enqueue(store_events.clone())
                .await
                .map_err(|_| GatewayError::DeliveryClosed {
                    persisted: store_events,
                }),
        }
    }

    /// Loads an aggregate instance, replaying its history on a fresh `A`. Returns `None` if the
    /// instance has no events.
    ///
    /// # Errors
    ///
    /// Will return an `Err` if `A` is not registered, the history can't be loaded or the dispatch
    /// timeout elapses.
    pub async fn load<A: Aggregate>(&self, aggregate_id: &str) -> Result<Option<AggregateState<A>>, GatewayError> {
        let deadline: Option<Instant> = self.dispatch_timeout.map(|timeout| Instant::now() + timeout);
        self.load_until(aggregate_id, deadline).await
    }

    /// Same as [`CommandGateway::load`], bounded by `deadline` when given.
    ///
    /// # Errors
    ///
    /// See [`CommandGateway::load`].
    pub async fn load_until<A: Aggregate>(
        &self,
        aggregate_id: &str,
        deadline: Option<Instant>,
    ) -> Result<Option<AggregateState<A>>, GatewayError> {
        let bound = self
            .registry
            .bound::<A>()
            .ok_or(GatewayError::UnregisteredAggregate { aggregate: A::NAME })?;

        let history: Vec<StoreEvent> = until(deadline, async {
            self.event_store
                .by_aggregate_id(aggregate_id)
                .await
                .map_err(GatewayError::from)
        })
        .await?;

        Ok(if history.is_empty() {
            None
        } else {
            Some(bound.replay(aggregate_id, &history))
        })
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Returns the internal event store
    pub fn event_store(&self) -> &S {
        &self.event_store
    }
}

impl<S> std::fmt::Debug for CommandGateway<S>
where
    S: EventStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let delivery: &str = match self.delivery {
            Delivery::None => "none",
            Delivery::Inline(_) => "inline",
            Delivery::Queued(_) => "queued",
        };

        f.debug_struct("CommandGateway")
            .field("registry", &self.registry)
            .field("delivery", &delivery)
            .field("dispatch_timeout", &self.dispatch_timeout)
            .finish()
    }
}

fn elapsed(deadline: Option<Instant>) -> bool {
    deadline.map_or(false, |deadline| Instant::now() >= deadline)
}

/// Runs `future` unless `deadline` is already past, giving up with [`GatewayError::Timeout`] once it
/// elapses.
async fn until<T, F>(deadline: Option<Instant>, future: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    if elapsed(deadline) {
        return Err(GatewayError::Timeout);
    }

    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, future)
            .await
            .map_err(|_| GatewayError::Timeout)?,
        None => future.await,
    }
}

/// Struct used to build a brand new [`CommandGateway`].
pub struct CommandGatewayBuilder<S>
where
    S: EventStore,
{
    registry: Arc<HandlerRegistry>,
    event_store: S,
    delivery: Delivery,
    dispatch_timeout: Option<Duration>,
}

impl<S> CommandGatewayBuilder<S>
where
    S: EventStore,
{
    pub fn new(registry: impl Into<Arc<HandlerRegistry>>, event_store: S) -> Self {
        Self {
            registry: registry.into(),
            event_store,
            delivery: Delivery::None,
            dispatch_timeout: None,
        }
    }

    /// Publishes the persisted events on `bus` before `dispatch` returns.
    pub fn with_event_bus(mut self, bus: impl Into<Arc<EventBus>>) -> Self {
        self.delivery = Delivery::Inline(bus.into());
        self
    }

    /// Hands the persisted events to a delivery queue, see [`EventBus::spawn_queue`].
    pub fn with_queued_delivery(mut self, publisher: QueuedPublisher) -> Self {
        self.delivery = Delivery::Queued(publisher);
        self
    }

    /// Bounds every dispatch and load. Persistence is never interrupted.
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> CommandGateway<S> {
        CommandGateway {
            registry: self.registry,
            event_store: self.event_store,
            delivery: self.delivery,
            dispatch_timeout: self.dispatch_timeout,
        }
    }
}
