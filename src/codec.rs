use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::event::{AnyEvent, Event};
use crate::registry::RegistryError;
use crate::store::EventStoreError;

type DecodeFn = fn(Value) -> Result<AnyEvent, serde_json::Error>;

/// Everything needed to turn a stored payload back into a concrete event.
#[derive(Clone, Copy)]
pub(crate) struct EventDescriptor {
    pub(crate) name: &'static str,
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    decode: DecodeFn,
}

impl EventDescriptor {
    pub(crate) fn of<E: Event>() -> Self {
        Self {
            name: E::NAME,
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
            decode: |payload| Ok(AnyEvent::new(serde_json::from_value::<E>(payload)?)),
        }
    }
}

/// Maps event type tags to concrete event types.
///
/// Stores write the tag next to the json payload and use the codec to rebuild a value of the
/// original type on load. Cloning shares the underlying table.
#[derive(Clone, Default)]
pub struct EventCodec {
    descriptors: Arc<HashMap<&'static str, EventDescriptor>>,
}

impl EventCodec {
    /// Creates an empty codec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `E` known to this codec.
    ///
    /// # Errors
    ///
    /// Will return an `Err` if another type already registered the same [`Event::NAME`].
    pub fn register<E: Event>(&mut self) -> Result<&mut Self, RegistryError> {
        self.insert(EventDescriptor::of::<E>())?;
        Ok(self)
    }

    pub(crate) fn insert(&mut self, descriptor: EventDescriptor) -> Result<(), RegistryError> {
        if let Some(existing) = self.descriptors.get(descriptor.name) {
            if existing.type_id == descriptor.type_id {
                return Ok(());
            }

            return Err(RegistryError::EventNameCollision {
                name: descriptor.name,
                first: existing.type_name,
                second: descriptor.type_name,
            });
        }

        Arc::make_mut(&mut self.descriptors).insert(descriptor.name, descriptor);
        Ok(())
    }

    /// Returns true if an event type with the given tag has been registered.
    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Number of known event types.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Serializes an event into its type tag and json payload.
    ///
    /// # Errors
    ///
    /// Will return an `Err` if the event type is not registered, or if serialization fails.
    pub fn encode(&self, event: &AnyEvent) -> Result<(&'static str, Value), EventStoreError> {
        match self.descriptors.get(event.name()) {
            Some(descriptor) if descriptor.type_id == event.type_id() => Ok((descriptor.name, event.to_payload()?)),
            _ => Err(EventStoreError::UnknownEventType {
                name: event.name().to_string(),
            }),
        }
    }

    /// Rebuilds the concrete event registered under `name` from its json payload.
    ///
    /// # Errors
    ///
    /// Will return an `Err` if no event type is registered under `name`, or if the payload does
    /// not deserialize into it.
    pub fn decode(&self, name: &str, payload: Value) -> Result<AnyEvent, EventStoreError> {
        let descriptor = self
            .descriptors
            .get(name)
            .ok_or_else(|| EventStoreError::UnknownEventType { name: name.to_string() })?;

        Ok((descriptor.decode)(payload)?)
    }
}

impl std::fmt::Debug for EventCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&&str> = self.descriptors.keys().collect();
        names.sort();
        f.debug_struct("EventCodec").field("events", &names).finish()
    }
}
