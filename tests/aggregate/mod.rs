use esrs_gateway::{Aggregate, AggregateBinding, AnyEvent, Apply, Handle, HandlerRegistry};

pub use event_handler::*;
pub use structs::*;

mod event_handler;
mod structs;

#[derive(Default, Debug, Clone)]
pub struct FooAggregate {
    pub foo_id: String,
    pub name: String,
}

impl Aggregate for FooAggregate {
    const NAME: &'static str = "foo";
    type Error = FooError;
}

impl Handle<CreateFoo> for FooAggregate {
    fn handle(&self, command: &CreateFoo) -> Result<Vec<AnyEvent>, Self::Error> {
        Ok(vec![FooCreated { id: command.id.clone() }.into()])
    }
}

impl Handle<NameFoo> for FooAggregate {
    fn handle(&self, command: &NameFoo) -> Result<Vec<AnyEvent>, Self::Error> {
        if self.foo_id.is_empty() {
            return Err(FooError::NotInitialized);
        }

        if command.name.is_empty() {
            return Err(FooError::EmptyName);
        }

        Ok(vec![FooNamed {
            id: command.id.clone(),
            name: command.name.clone(),
        }
        .into()])
    }
}

impl Handle<TouchFoo> for FooAggregate {
    fn handle(&self, _command: &TouchFoo) -> Result<Vec<AnyEvent>, Self::Error> {
        Ok(vec![])
    }
}

impl Handle<AdoptFoo> for FooAggregate {
    fn handle(&self, command: &AdoptFoo) -> Result<Vec<AnyEvent>, Self::Error> {
        Ok(vec![
            FooCreated { id: command.id.clone() }.into(),
            FooCreated {
                id: command.other.clone(),
            }
            .into(),
        ])
    }
}

impl Apply<FooCreated> for FooAggregate {
    fn apply(&mut self, event: &FooCreated) {
        self.foo_id = event.id.clone();
    }
}

impl Apply<FooNamed> for FooAggregate {
    fn apply(&mut self, event: &FooNamed) {
        self.name = event.name.clone();
    }
}

#[derive(Default, Debug, Clone)]
pub struct BarAggregate {
    pub bar_id: String,
    pub configuration: String,
}

impl Aggregate for BarAggregate {
    const NAME: &'static str = "bar";
    type Error = BarError;
}

impl Handle<CreateBar> for BarAggregate {
    fn handle(&self, command: &CreateBar) -> Result<Vec<AnyEvent>, Self::Error> {
        Ok(vec![BarCreated { id: command.id.clone() }.into()])
    }
}

impl Handle<ConfigureBar> for BarAggregate {
    fn handle(&self, command: &ConfigureBar) -> Result<Vec<AnyEvent>, Self::Error> {
        if self.bar_id.is_empty() {
            return Err(BarError::NotInitialized);
        }

        Ok(vec![BarConfigured {
            id: command.id.clone(),
            configuration: command.configuration.clone(),
        }
        .into()])
    }
}

impl Apply<BarCreated> for BarAggregate {
    fn apply(&mut self, event: &BarCreated) {
        self.bar_id = event.id.clone();
    }
}

impl Apply<BarConfigured> for BarAggregate {
    fn apply(&mut self, event: &BarConfigured) {
        self.configuration = event.configuration.clone();
    }
}

pub fn foo_binding() -> AggregateBinding<FooAggregate> {
    AggregateBinding::new()
        .handles::<CreateFoo>()
        .handles::<NameFoo>()
        .handles::<TouchFoo>()
        .handles::<AdoptFoo>()
        .applies::<FooCreated>()
        .applies::<FooNamed>()
}

pub fn bar_binding() -> AggregateBinding<BarAggregate> {
    AggregateBinding::new()
        .handles::<CreateBar>()
        .handles::<ConfigureBar>()
        .applies::<BarCreated>()
        .applies::<BarConfigured>()
}

pub fn registry() -> HandlerRegistry {
    HandlerRegistry::builder()
        .aggregate(foo_binding())
        .aggregate(bar_binding())
        .build()
        .unwrap()
}
