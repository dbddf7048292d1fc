use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};

use crate::aggregate::Aggregate;
use crate::codec::{EventCodec, EventDescriptor};
use crate::command::Command;
use crate::event::Event;

pub use binding::AggregateBinding;
pub(crate) use binding::{BoundAggregate, ErasedAggregate, HandleError};
use binding::{PendingAggregate, TypeInfo};

mod binding;

/// A configuration conflict found while building a [`HandlerRegistry`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("aggregate `{aggregate}` is registered more than once")]
    DuplicateAggregate { aggregate: &'static str },
    #[error("command `{command}` is handled by both `{first}` and `{second}`")]
    DuplicateCommandHandler {
        command: &'static str,
        first: &'static str,
        second: &'static str,
    },
    #[error("aggregate `{aggregate}` binds more than one apply function to event `{event}`")]
    DuplicateApplyFunction {
        aggregate: &'static str,
        event: &'static str,
    },
    #[error("event `{event}` is applied by both `{first}` and `{second}`")]
    ConflictingEventOwner {
        event: &'static str,
        first: &'static str,
        second: &'static str,
    },
    #[error("event type tag `{name}` is used by both `{first}` and `{second}`")]
    EventNameCollision {
        name: &'static str,
        first: &'static str,
        second: &'static str,
    },
}

/// Every conflict found while building a [`HandlerRegistry`]. A registry is built only when
/// there are none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryErrors(Vec<RegistryError>);

impl RegistryErrors {
    pub fn errors(&self) -> &[RegistryError] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<RegistryError> {
        self.0
    }
}

impl Display for RegistryErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "inconsistent handler registry ({} conflicts)", self.0.len())?;
        for error in &self.0 {
            write!(f, "\n - {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for RegistryErrors {}

/// Where a command type is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandRoute {
    aggregate_type: TypeId,
    aggregate_name: &'static str,
    command_name: &'static str,
}

impl CommandRoute {
    /// The [`TypeId`] of the aggregate handling the command.
    pub fn aggregate_type(&self) -> TypeId {
        self.aggregate_type
    }

    /// The [`Aggregate::NAME`] of the aggregate handling the command.
    pub fn aggregate_name(&self) -> &'static str {
        self.aggregate_name
    }

    /// The Rust type name of the command.
    pub fn command_name(&self) -> &'static str {
        self.command_name
    }
}

/// The table binding command types to the aggregate handling them, and event types to the
/// aggregate applying them.
///
/// A registry is immutable once built: it is only read while dispatching commands, and can be
/// shared between gateways behind an [`std::sync::Arc`].
pub struct HandlerRegistry {
    aggregates: HashMap<TypeId, Box<dyn ErasedAggregate>>,
    command_routes: HashMap<TypeId, CommandRoute>,
    event_owners: HashMap<TypeId, TypeInfo>,
    codec: EventCodec,
}

impl HandlerRegistry {
    /// Creates a new [`HandlerRegistryBuilder`].
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// Looks up the route of a command type.
    pub fn lookup_command_handler(&self, command_type: TypeId) -> Option<CommandRoute> {
        self.command_routes.get(&command_type).copied()
    }

    /// Looks up the route of the command `C`.
    pub fn route_of<C: Command>(&self) -> Option<CommandRoute> {
        self.lookup_command_handler(TypeId::of::<C>())
    }

    /// Returns true if the aggregate type has an apply function for the event type.
    pub fn lookup_apply_function(&self, aggregate_type: TypeId, event_type: TypeId) -> bool {
        self.aggregates
            .get(&aggregate_type)
            .map_or(false, |aggregate| aggregate.applies(event_type))
    }

    /// Returns true if `A` applies the event `E`.
    pub fn applies<A: Aggregate, E: Event>(&self) -> bool {
        self.lookup_apply_function(TypeId::of::<A>(), TypeId::of::<E>())
    }

    /// Returns the name of the aggregate applying the event `E`, if any.
    pub fn apply_owner<E: Event>(&self) -> Option<&'static str> {
        self.event_owners.get(&TypeId::of::<E>()).map(|owner| owner.name)
    }

    /// Returns true if `A` has been registered.
    pub fn contains<A: Aggregate>(&self) -> bool {
        self.aggregates.contains_key(&TypeId::of::<A>())
    }

    /// The names of the registered aggregates, sorted.
    pub fn aggregate_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.aggregates.values().map(|aggregate| aggregate.name()).collect();
        names.sort_unstable();
        names
    }

    /// The codec knowing every event applied or emitted by the registered aggregates. Stores
    /// should be created with it.
    pub fn codec(&self) -> EventCodec {
        self.codec.clone()
    }

    pub(crate) fn aggregate(&self, aggregate_type: TypeId) -> Option<&dyn ErasedAggregate> {
        self.aggregates.get(&aggregate_type).map(|aggregate| aggregate.as_ref())
    }

    pub(crate) fn bound<A: Aggregate>(&self) -> Option<&BoundAggregate<A>> {
        self.aggregate(TypeId::of::<A>())?
            .as_any()
            .downcast_ref::<BoundAggregate<A>>()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("aggregates", &self.aggregate_names())
            .field("commands", &self.command_routes.len())
            .field("codec", &self.codec)
            .finish()
    }
}

/// Struct used to build a brand new [`HandlerRegistry`].
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    pending: Vec<Box<dyn PendingAggregate>>,
    events: Vec<EventDescriptor>,
}

impl HandlerRegistryBuilder {
    /// Add an aggregate with its dispatch table.
    pub fn aggregate<A: Aggregate>(mut self, binding: AggregateBinding<A>) -> Self {
        self.pending.push(Box::new(binding));
        self
    }

    /// Make an event known to the codec without binding it to any aggregate.
    pub fn event<E: Event>(mut self) -> Self {
        self.events.push(EventDescriptor::of::<E>());
        self
    }

    /// Validates every binding and builds the registry.
    ///
    /// # Errors
    ///
    /// Will return an `Err` listing every conflict found: aggregates registered twice, command
    /// types bound to more than one handler, event types applied twice by the same aggregate or
    /// applied by two different aggregates, and event type tags shared by distinct types.
    pub fn build(self) -> Result<HandlerRegistry, RegistryErrors> {
        let mut errors: Vec<RegistryError> = vec![];
        let mut aggregates: HashMap<TypeId, Box<dyn ErasedAggregate>> = HashMap::new();
        let mut command_routes: HashMap<TypeId, CommandRoute> = HashMap::new();
        let mut event_owners: HashMap<TypeId, TypeInfo> = HashMap::new();
        let mut codec = EventCodec::new();

        for pending in self.pending {
            let aggregate = pending.aggregate_type();
            let aggregate_name = pending.aggregate_name();

            if aggregates.contains_key(&aggregate.id) {
                errors.push(RegistryError::DuplicateAggregate {
                    aggregate: aggregate_name,
                });
                continue;
            }

            for command in pending.commands() {
                match command_routes.get(&command.id) {
                    Some(route) => errors.push(RegistryError::DuplicateCommandHandler {
                        command: command.name,
                        first: route.aggregate_name,
                        second: aggregate_name,
                    }),
                    None => {
                        command_routes.insert(
                            command.id,
                            CommandRoute {
                                aggregate_type: aggregate.id,
                                aggregate_name,
                                command_name: command.name,
                            },
                        );
                    }
                }
            }

            let mut applied: HashSet<TypeId> = HashSet::new();
            for event in pending.applied_events() {
                if !applied.insert(event.type_id) {
                    errors.push(RegistryError::DuplicateApplyFunction {
                        aggregate: aggregate_name,
                        event: event.name,
                    });
                    continue;
                }

                match event_owners.get(&event.type_id) {
                    Some(owner) => errors.push(RegistryError::ConflictingEventOwner {
                        event: event.name,
                        first: owner.name,
                        second: aggregate_name,
                    }),
                    None => {
                        event_owners.insert(
                            event.type_id,
                            TypeInfo {
                                id: aggregate.id,
                                name: aggregate_name,
                            },
                        );
                    }
                }

                if let Err(error) = codec.insert(event) {
                    errors.push(error);
                }
            }

            for event in pending.emitted_events() {
                if let Err(error) = codec.insert(event) {
                    errors.push(error);
                }
            }

            aggregates.insert(aggregate.id, pending.bind());
        }

        for event in self.events {
            if let Err(error) = codec.insert(event) {
                errors.push(error);
            }
        }

        if !errors.is_empty() {
            tracing::error!(conflicts = errors.len(), "handler registry is inconsistent");
            return Err(RegistryErrors(errors));
        }

        Ok(HandlerRegistry {
            aggregates,
            command_routes,
            event_owners,
            codec,
        })
    }
}
