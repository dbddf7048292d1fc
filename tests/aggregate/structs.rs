use serde::{Deserialize, Serialize};

use esrs_gateway::{Command, Event};

// Commands

#[derive(Debug, Clone)]
pub struct CreateFoo {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct NameFoo {
    pub id: String,
    pub name: String,
}

/// Accepted by foo, but never produces events.
#[derive(Debug, Clone)]
pub struct TouchFoo {
    pub id: String,
}

/// Makes the foo emit an event on behalf of another foo.
#[derive(Debug, Clone)]
pub struct AdoptFoo {
    pub id: String,
    pub other: String,
}

#[derive(Debug, Clone)]
pub struct CreateBar {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct ConfigureBar {
    pub id: String,
    pub configuration: String,
}

/// Not bound to any aggregate.
#[derive(Debug, Clone)]
pub struct NotConfiguredCommand {
    pub id: String,
}

macro_rules! targets {
    ($($command:ty),*) => {
        $(impl Command for $command {
            fn target_aggregate_id(&self) -> &str {
                &self.id
            }
        })*
    };
}

targets!(CreateFoo, NameFoo, TouchFoo, AdoptFoo, CreateBar, ConfigureBar, NotConfiguredCommand);

// Events

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FooCreated {
    pub id: String,
}

impl Event for FooCreated {
    const NAME: &'static str = "FooCreated";

    fn aggregate_id(&self) -> &str {
        &self.id
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FooNamed {
    pub id: String,
    pub name: String,
}

impl Event for FooNamed {
    const NAME: &'static str = "FooNamed";

    fn aggregate_id(&self) -> &str {
        &self.id
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BarCreated {
    pub id: String,
}

impl Event for BarCreated {
    const NAME: &'static str = "BarCreated";

    fn aggregate_id(&self) -> &str {
        &self.id
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BarConfigured {
    pub id: String,
    pub configuration: String,
}

impl Event for BarConfigured {
    const NAME: &'static str = "BarConfigured";

    fn aggregate_id(&self) -> &str {
        &self.id
    }
}

// Errors

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum FooError {
    #[error("aggregate has not been initialized")]
    NotInitialized,
    #[error("name can't be empty")]
    EmptyName,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum BarError {
    #[error("aggregate has not been initialized")]
    NotInitialized,
}
