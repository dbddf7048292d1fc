use std::any::{Any, TypeId};
use std::collections::HashMap;

use crate::aggregate::{apply_erased, handle_erased, Aggregate, Apply, ApplyFn, ApplyTable, Handle, HandlerFn};
use crate::codec::EventDescriptor;
use crate::command::Command;
use crate::event::{AnyEvent, Event};
use crate::state::AggregateState;
use crate::store::StoreEvent;

/// Identity of a Rust type, with a readable name for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TypeInfo {
    pub(crate) id: TypeId,
    pub(crate) name: &'static str,
}

impl TypeInfo {
    pub(crate) fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

/// The explicit dispatch table of a single aggregate type: the commands it handles, the events it
/// applies on replay and the events it only emits.
///
/// ```ignore
/// let binding = AggregateBinding::<Account>::new()
///     .handles::<OpenAccount>()
///     .handles::<Deposit>()
///     .applies::<AccountOpened>()
///     .applies::<Deposited>()
///     .emits::<LargeDepositFlagged>();
/// ```
///
/// Nothing is checked here: conflicts are collected all at once by
/// [`crate::HandlerRegistryBuilder::build`].
pub struct AggregateBinding<A: Aggregate> {
    commands: Vec<(TypeInfo, HandlerFn<A>)>,
    applies: Vec<(EventDescriptor, ApplyFn<A>)>,
    emits: Vec<EventDescriptor>,
}

impl<A: Aggregate> AggregateBinding<A> {
    pub fn new() -> Self {
        Self {
            commands: vec![],
            applies: vec![],
            emits: vec![],
        }
    }

    /// Routes the command `C` to this aggregate.
    pub fn handles<C: Command>(mut self) -> Self
    where
        A: Handle<C>,
    {
        self.commands.push((TypeInfo::of::<C>(), handle_erased::<A, C> as HandlerFn<A>));
        self
    }

    /// Applies the event `E` on this aggregate during replay.
    pub fn applies<E: Event>(mut self) -> Self
    where
        A: Apply<E>,
    {
        self.applies.push((EventDescriptor::of::<E>(), apply_erased::<A, E> as ApplyFn<A>));
        self
    }

    /// Declares an event this aggregate emits without applying it, so that the store can decode
    /// it.
    pub fn emits<E: Event>(mut self) -> Self {
        self.emits.push(EventDescriptor::of::<E>());
        self
    }
}

impl<A: Aggregate> Default for AggregateBinding<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// An [`AggregateBinding`] waiting for validation, seen without its aggregate type.
pub(crate) trait PendingAggregate: Send {
    fn aggregate_type(&self) -> TypeInfo;
    fn aggregate_name(&self) -> &'static str;
    fn commands(&self) -> Vec<TypeInfo>;
    fn applied_events(&self) -> Vec<EventDescriptor>;
    fn emitted_events(&self) -> Vec<EventDescriptor>;
    fn bind(self: Box<Self>) -> Box<dyn ErasedAggregate>;
}

impl<A: Aggregate> PendingAggregate for AggregateBinding<A> {
    fn aggregate_type(&self) -> TypeInfo {
        TypeInfo::of::<A>()
    }

    fn aggregate_name(&self) -> &'static str {
        A::NAME
    }

    fn commands(&self) -> Vec<TypeInfo> {
        self.commands.iter().map(|(command, _)| *command).collect()
    }

    fn applied_events(&self) -> Vec<EventDescriptor> {
        self.applies.iter().map(|(event, _)| *event).collect()
    }

    fn emitted_events(&self) -> Vec<EventDescriptor> {
        self.emits.clone()
    }

    fn bind(self: Box<Self>) -> Box<dyn ErasedAggregate> {
        let mut handlers: HashMap<TypeId, HandlerFn<A>> = HashMap::new();
        for (command, handler) in self.commands {
            handlers.entry(command.id).or_insert(handler);
        }

        let mut applies: HashMap<TypeId, ApplyFn<A>> = HashMap::new();
        for (event, apply) in self.applies {
            applies.entry(event.type_id).or_insert(apply);
        }

        Box::new(BoundAggregate {
            handlers,
            applies: ApplyTable::new(applies),
        })
    }
}

/// Why a bound aggregate could not turn a command into events.
pub(crate) enum HandleError {
    /// The aggregate has no handler for the command type.
    Unhandled,
    /// The handler rejected the command.
    Rejected(Box<dyn std::error::Error + Send + Sync>),
}

/// A validated aggregate binding, as stored in the [`crate::HandlerRegistry`].
pub(crate) trait ErasedAggregate: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies(&self, event_type: TypeId) -> bool;

    /// Replays `history` on a fresh aggregate and hands it the command.
    fn handle(
        &self,
        aggregate_id: &str,
        history: &[StoreEvent],
        command: &dyn Any,
        command_type: TypeId,
    ) -> Result<Vec<AnyEvent>, HandleError>;

    fn as_any(&self) -> &dyn Any;
}

pub(crate) struct BoundAggregate<A: Aggregate> {
    handlers: HashMap<TypeId, HandlerFn<A>>,
    applies: ApplyTable<A>,
}

impl<A: Aggregate> BoundAggregate<A> {
    pub(crate) fn replay(&self, aggregate_id: &str, history: &[StoreEvent]) -> AggregateState<A> {
        self.applies.replay(aggregate_id, history)
    }
}

impl<A: Aggregate> ErasedAggregate for BoundAggregate<A> {
    fn name(&self) -> &'static str {
        A::NAME
    }

    fn applies(&self, event_type: TypeId) -> bool {
        self.applies.contains(event_type)
    }

    fn handle(
        &self,
        aggregate_id: &str,
        history: &[StoreEvent],
        command: &dyn Any,
        command_type: TypeId,
    ) -> Result<Vec<AnyEvent>, HandleError> {
        let handler: &HandlerFn<A> = self.handlers.get(&command_type).ok_or(HandleError::Unhandled)?;
        let state: AggregateState<A> = self.replay(aggregate_id, history);

        match handler(state.inner(), command) {
            Some(Ok(events)) => Ok(events),
            Some(Err(error)) => Err(HandleError::Rejected(Box::new(error))),
            None => Err(HandleError::Unhandled),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
