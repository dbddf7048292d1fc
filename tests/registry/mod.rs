use serde::{Deserialize, Serialize};

use esrs_gateway::{Aggregate, AggregateBinding, AnyEvent, Apply, Event, Handle, HandlerRegistry, RegistryError};

use crate::aggregate::*;

/// A second aggregate claiming foo's commands and events.
#[derive(Default)]
struct Impostor;

impl Aggregate for Impostor {
    const NAME: &'static str = "impostor";
    type Error = FooError;
}

impl Handle<CreateFoo> for Impostor {
    fn handle(&self, command: &CreateFoo) -> Result<Vec<AnyEvent>, Self::Error> {
        Ok(vec![FooCreated { id: command.id.clone() }.into()])
    }
}

impl Apply<FooCreated> for Impostor {
    fn apply(&mut self, _event: &FooCreated) {}
}

/// Different type, same tag as [`FooCreated`].
#[derive(Serialize, Deserialize, Debug)]
struct FooCreatedV2 {
    id: String,
}

impl Event for FooCreatedV2 {
    const NAME: &'static str = "FooCreated";

    fn aggregate_id(&self) -> &str {
        &self.id
    }
}

#[test]
fn valid_registry_routes_commands_and_events() {
    let registry = registry();

    let route = registry.route_of::<ConfigureBar>().unwrap();
    assert_eq!(route.aggregate_name(), "bar");
    assert!(route.command_name().ends_with("ConfigureBar"));
    assert!(registry.route_of::<NotConfiguredCommand>().is_none());

    assert!(registry.applies::<FooAggregate, FooNamed>());
    assert!(!registry.applies::<BarAggregate, FooNamed>());
    assert_eq!(registry.apply_owner::<BarConfigured>(), Some("bar"));

    assert_eq!(registry.aggregate_names(), vec!["bar", "foo"]);
    assert!(registry.codec().contains("FooCreated"));
    assert_eq!(registry.codec().len(), 4);
}

#[test]
fn two_aggregates_applying_the_same_event_fail_fast() {
    let errors = HandlerRegistry::builder()
        .aggregate(foo_binding())
        .aggregate(AggregateBinding::<Impostor>::new().applies::<FooCreated>())
        .build()
        .unwrap_err();

    assert_eq!(
        errors.errors(),
        &[RegistryError::ConflictingEventOwner {
            event: "FooCreated",
            first: "foo",
            second: "impostor",
        }]
    );
}

#[test]
fn every_conflict_is_reported_at_once() {
    let errors = HandlerRegistry::builder()
        .aggregate(foo_binding())
        .aggregate(bar_binding())
        .aggregate(
            AggregateBinding::<Impostor>::new()
                .handles::<CreateFoo>()
                .applies::<FooCreated>()
                .emits::<FooCreatedV2>(),
        )
        .aggregate(bar_binding())
        .build()
        .unwrap_err();

    let errors = errors.into_inner();
    assert_eq!(errors.len(), 4);

    assert!(errors.iter().any(|error| matches!(
        error,
        RegistryError::DuplicateCommandHandler {
            first: "foo",
            second: "impostor",
            ..
        }
    )));
    assert!(errors
        .iter()
        .any(|error| matches!(error, RegistryError::ConflictingEventOwner { .. })));
    assert!(errors
        .iter()
        .any(|error| matches!(error, RegistryError::EventNameCollision { name: "FooCreated", .. })));
    assert!(errors
        .iter()
        .any(|error| matches!(error, RegistryError::DuplicateAggregate { aggregate: "bar" })));
}

#[test]
fn registry_errors_display_every_conflict() {
    let errors = HandlerRegistry::builder()
        .aggregate(foo_binding())
        .aggregate(foo_binding())
        .build()
        .unwrap_err();

    let message = errors.to_string();
    assert!(message.starts_with("inconsistent handler registry (1 conflicts)"));
    assert!(message.contains("aggregate `foo` is registered more than once"));
}
