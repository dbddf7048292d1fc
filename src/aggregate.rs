use std::any::{Any, TypeId};
use std::collections::HashMap;

use crate::command::Command;
use crate::event::{AnyEvent, Event};
use crate::state::AggregateState;
use crate::store::StoreEvent;

/// An entity whose state is derived by folding its history of events.
///
/// An aggregate is never persisted: every time it is needed, it is rebuilt starting from its
/// `Default` value and applying its events in the order they were persisted. The commands it
/// handles and the events it applies are declared through [`Handle`] and [`Apply`] and bound with
/// an [`crate::AggregateBinding`].
pub trait Aggregate: Default + Send + Sync + 'static {
    /// The name of the aggregate, used in logs and diagnostics.
    const NAME: &'static str;

    /// Error returned when a command is rejected.
    type Error: std::error::Error + Send + Sync + 'static;
}

/// Handling of the command `C`.
pub trait Handle<C: Command>: Aggregate {
    /// Validates the command against the current state and returns the events it produces.
    /// Returning an error rejects the command: nothing is persisted nor published.
    fn handle(&self, command: &C) -> Result<Vec<AnyEvent>, Self::Error>;
}

/// Application of the event `E` on the aggregate state.
pub trait Apply<E: Event>: Aggregate {
    /// Updates the state with the event. Applying events can't fail: events are facts.
    fn apply(&mut self, event: &E);
}

pub(crate) type ApplyFn<A> = fn(&mut A, &AnyEvent);

pub(crate) type HandlerFn<A> = fn(&A, &dyn Any) -> Option<Result<Vec<AnyEvent>, <A as Aggregate>::Error>>;

pub(crate) fn apply_erased<A, E>(aggregate: &mut A, event: &AnyEvent)
where
    A: Apply<E>,
    E: Event,
{
    if let Some(event) = event.downcast_ref::<E>() {
        aggregate.apply(event);
    }
}

pub(crate) fn handle_erased<A, C>(aggregate: &A, command: &dyn Any) -> Option<Result<Vec<AnyEvent>, A::Error>>
where
    A: Handle<C>,
    C: Command,
{
    command
        .downcast_ref::<C>()
        .map(|command| <A as Handle<C>>::handle(aggregate, command))
}

/// The apply functions of a single aggregate type, keyed by event type.
pub(crate) struct ApplyTable<A> {
    functions: HashMap<TypeId, ApplyFn<A>>,
}

impl<A: Aggregate> ApplyTable<A> {
    pub(crate) fn new(functions: HashMap<TypeId, ApplyFn<A>>) -> Self {
        Self { functions }
    }

    pub(crate) fn contains(&self, event_type: TypeId) -> bool {
        self.functions.contains_key(&event_type)
    }

    /// Rebuilds an aggregate instance from a fresh default value, applying `history` strictly in
    /// the given order. Events this aggregate has no apply function for leave the state untouched.
    pub(crate) fn replay(&self, aggregate_id: &str, history: &[StoreEvent]) -> AggregateState<A> {
        let mut state: AggregateState<A> = AggregateState::new(aggregate_id);

        for store_event in history {
            match self.functions.get(&store_event.payload.type_id()) {
                Some(apply) => apply(state.inner_mut(), &store_event.payload),
                None => tracing::trace!(
                    aggregate = A::NAME,
                    aggregate_id,
                    event = store_event.payload.name(),
                    sequence_number = store_event.sequence_number,
                    "no apply function, skipping event"
                ),
            }

            state.set_sequence_number(store_event.sequence_number);
        }

        state
    }
}
