//! A small event sourcing kernel.
//!
//! Commands are routed to the aggregate that handles them, the aggregate is rebuilt by replaying
//! its events, the events produced by the handler are persisted and finally fanned out to the
//! projections listening on the [`bus::EventBus`].
//!
//! Handlers and apply functions are bound explicitly through [`AggregateBinding`]s and validated
//! once, when the [`HandlerRegistry`] is built.

pub use crate::aggregate::{Aggregate, Apply, Handle};
pub use crate::command::Command;
pub use crate::event::{AnyEvent, Event};
pub use crate::gateway::{CommandGateway, CommandGatewayBuilder, GatewayError};
pub use crate::registry::{AggregateBinding, CommandRoute, HandlerRegistry, HandlerRegistryBuilder};
pub use crate::registry::{RegistryError, RegistryErrors};
pub use crate::state::AggregateState;

mod aggregate;
mod command;
mod event;
mod gateway;
mod registry;
mod state;

pub mod bus;
pub mod codec;
pub mod projection;
pub mod store;

pub mod types {
    /// Position of an event within the history of a single aggregate instance. The first event
    /// of an aggregate has sequence number 1.
    pub type SequenceNumber = i32;
}
