use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::Instrument;
use uuid::Uuid;

use crate::event::{AnyEvent, Event};
use crate::store::StoreEvent;

pub use queue::{QueueClosed, QueuedPublisher};
pub use rebuild::{rebuild_aggregate, rebuild_projections, EventSource};

mod queue;
mod rebuild;

/// Error a listener returns when it fails to handle an event.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// This trait is used to implement a projection listener for the event `E`. A listener is
/// intended to be an entity updating a read model: it is never authoritative over the event log.
///
/// A single type usually implements it for several events, and is then registered once with a
/// [`ListenerBinding`] naming each of them.
#[async_trait]
pub trait EventListener<E: Event>: Send + Sync {
    /// Handle an event, updating the read side. A failure is reported by the bus and does not
    /// prevent the other listeners from running.
    async fn on_event(&self, event: &E) -> Result<(), ListenerError>;

    /// The name of the listener. By default, this is the type name of the listener, but it can be
    /// overridden to provide a custom name. This name is used as part of tracing spans and in
    /// [`PublishReport`]s.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Listener for a single event type, seen without the event type.
#[async_trait]
trait ErasedListener: Send + Sync {
    fn name(&self) -> &'static str;

    async fn dispatch(&self, event: &AnyEvent) -> Result<(), ListenerError>;
}

struct TypedListener<L, E> {
    listener: Arc<L>,
    _event: PhantomData<fn() -> E>,
}

#[async_trait]
impl<L, E> ErasedListener for TypedListener<L, E>
where
    L: EventListener<E> + 'static,
    E: Event,
{
    fn name(&self) -> &'static str {
        <L as EventListener<E>>::name(&*self.listener)
    }

    async fn dispatch(&self, event: &AnyEvent) -> Result<(), ListenerError> {
        match event.downcast_ref::<E>() {
            Some(event) => self.listener.on_event(event).await,
            None => Ok(()),
        }
    }
}

/// Binds a listener to the event types it wants to receive.
///
/// ```ignore
/// let binding = ListenerBinding::new(SummaryListener::new(summaries.clone()))
///     .on::<AccountOpened>()
///     .on::<Deposited>();
/// ```
pub struct ListenerBinding<L> {
    listener: Arc<L>,
    bindings: Vec<(TypeId, Arc<dyn ErasedListener>)>,
}

impl<L: Send + Sync + 'static> ListenerBinding<L> {
    pub fn new(listener: L) -> Self {
        Self::shared(Arc::new(listener))
    }

    /// Creates a binding for a listener that is also used elsewhere.
    pub fn shared(listener: Arc<L>) -> Self {
        Self {
            listener,
            bindings: vec![],
        }
    }

    /// Delivers the events of type `E` to this listener.
    pub fn on<E: Event>(mut self) -> Self
    where
        L: EventListener<E>,
    {
        let typed: TypedListener<L, E> = TypedListener {
            listener: Arc::clone(&self.listener),
            _event: PhantomData,
        };
        self.bindings.push((TypeId::of::<E>(), Arc::new(typed)));
        self
    }
}

/// Why a listener did not handle an event.
#[derive(Debug)]
pub enum FailureReason {
    /// The listener returned an error.
    Error(ListenerError),
    /// The listener panicked. Holds the panic message, when there is one.
    Panic(String),
}

/// A listener that failed on an event during a publish.
#[derive(Debug)]
pub struct ListenerFailure {
    pub listener: &'static str,
    pub event_id: Uuid,
    pub event: &'static str,
    pub aggregate_id: String,
    pub reason: FailureReason,
}

/// What happened during a [`EventBus::publish`].
#[derive(Debug, Default)]
pub struct PublishReport {
    delivered: usize,
    failures: Vec<ListenerFailure>,
}

impl PublishReport {
    /// Number of successful listener invocations.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn failures(&self) -> &[ListenerFailure] {
        &self.failures
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fans persisted events out to the projection listeners bound to their type.
///
/// The listener index is built once by [`EventBusBuilder::build`] and never changes afterwards.
#[derive(Default)]
pub struct EventBus {
    listeners: HashMap<TypeId, Vec<Arc<dyn ErasedListener>>>,
}

impl EventBus {
    /// Creates a new [`EventBusBuilder`].
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::default()
    }

    /// Number of listeners bound to the event `E`.
    pub fn listeners_of<E: Event>(&self) -> usize {
        self.listeners.get(&TypeId::of::<E>()).map_or(0, Vec::len)
    }

    /// Delivers every event, in the given order, to each listener bound to its concrete type, in
    /// registration order. Returns once every matching listener has run.
    ///
    /// A listener returning an error or panicking is logged and recorded in the returned report,
    /// then the next listener runs.
    pub async fn publish(&self, store_events: &[StoreEvent]) -> PublishReport {
        let mut report = PublishReport::default();

        for store_event in store_events {
            let listeners = match self.listeners.get(&store_event.payload.type_id()) {
                Some(listeners) => listeners,
                None => continue,
            };

            for listener in listeners {
                let span = tracing::debug_span!(
                    "esrs.event_listener",
                    event_id = %store_event.id,
                    aggregate_id = %store_event.aggregate_id,
                    event = store_event.payload.name(),
                    event_listener = listener.name()
                );

                let outcome = AssertUnwindSafe(listener.dispatch(&store_event.payload))
                    .catch_unwind()
                    .instrument(span)
                    .await;

                let reason: FailureReason = match outcome {
                    Ok(Ok(())) => {
                        report.delivered += 1;
                        continue;
                    }
                    Ok(Err(error)) => {
                        tracing::error!({
                            event_id = %store_event.id,
                            aggregate_id = %store_event.aggregate_id,
                            event_listener = listener.name(),
                            error = %error,
                        }, "event listener failed to handle event");
                        FailureReason::Error(error)
                    }
                    Err(panic) => {
                        let message: String = panic
                            .downcast_ref::<&str>()
                            .map(|message| message.to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_default();

                        tracing::error!({
                            event_id = %store_event.id,
                            aggregate_id = %store_event.aggregate_id,
                            event_listener = listener.name(),
                            panic = %message,
                        }, "event listener panicked while handling event");
                        FailureReason::Panic(message)
                    }
                };

                report.failures.push(ListenerFailure {
                    listener: listener.name(),
                    event_id: store_event.id,
                    event: store_event.payload.name(),
                    aggregate_id: store_event.aggregate_id.clone(),
                    reason,
                });
            }
        }

        report
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("event_types", &self.listeners.len())
            .finish()
    }
}

/// Struct used to build a brand new [`EventBus`].
#[derive(Default)]
pub struct EventBusBuilder {
    listeners: HashMap<TypeId, Vec<Arc<dyn ErasedListener>>>,
}

impl EventBusBuilder {
    /// Add a listener with the events it is bound to. Listeners bound to the same event type are
    /// invoked in the order they are added.
    pub fn listener<L>(mut self, binding: ListenerBinding<L>) -> Self {
        for (event_type, listener) in binding.bindings {
            self.listeners.entry(event_type).or_default().push(listener);
        }
        self
    }

    pub fn build(self) -> EventBus {
        EventBus {
            listeners: self.listeners,
        }
    }
}
