use std::any::{Any, TypeId};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// An immutable fact that happened to an aggregate instance.
///
/// Events are the only unit of persisted state. `NAME` is the type tag written next to the payload
/// in the store: it is what allows the store to give back a value of the exact same type on load,
/// so it must be unique among all the events known to a registry.
pub trait Event: Serialize + DeserializeOwned + Debug + Send + Sync + 'static {
    /// Stable type tag of this event.
    const NAME: &'static str;

    /// Identifier of the aggregate instance that owns this event.
    fn aggregate_id(&self) -> &str;
}

/// Object safe view over any [`Event`].
pub(crate) trait ErasedEvent: Debug + Send + Sync {
    fn name(&self) -> &'static str;
    fn aggregate_id(&self) -> &str;
    fn event_type_id(&self) -> TypeId;
    fn type_name(&self) -> &'static str;
    fn to_payload(&self) -> Result<Value, serde_json::Error>;
    fn as_any(&self) -> &dyn Any;
}

impl<E: Event> ErasedEvent for E {
    fn name(&self) -> &'static str {
        E::NAME
    }

    fn aggregate_id(&self) -> &str {
        Event::aggregate_id(self)
    }

    fn event_type_id(&self) -> TypeId {
        TypeId::of::<E>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<E>()
    }

    fn to_payload(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A type-erased [`Event`].
///
/// This is what command handlers return and what the store hands back on load. It keeps the
/// concrete type of the wrapped event, which can be recovered with [`AnyEvent::downcast_ref`].
/// Cloning is cheap: the event itself is shared.
#[derive(Clone)]
pub struct AnyEvent(Arc<dyn ErasedEvent>);

impl AnyEvent {
    /// Wraps a concrete event.
    pub fn new<E: Event>(event: E) -> Self {
        Self(Arc::new(event))
    }

    /// The type tag of the wrapped event, see [`Event::NAME`].
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Identifier of the aggregate instance that owns the wrapped event.
    pub fn aggregate_id(&self) -> &str {
        self.0.aggregate_id()
    }

    /// The [`TypeId`] of the wrapped event.
    pub fn type_id(&self) -> TypeId {
        self.0.event_type_id()
    }

    /// The Rust type name of the wrapped event, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    /// Returns true if the wrapped event is an `E`.
    pub fn is<E: Event>(&self) -> bool {
        self.type_id() == TypeId::of::<E>()
    }

    /// Returns the wrapped event if it is an `E`.
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.0.as_any().downcast_ref::<E>()
    }

    pub(crate) fn to_payload(&self) -> Result<Value, serde_json::Error> {
        self.0.to_payload()
    }
}

impl<E: Event> From<E> for AnyEvent {
    fn from(event: E) -> Self {
        Self::new(event)
    }
}

impl Debug for AnyEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&*self.0, f)
    }
}
