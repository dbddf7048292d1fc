use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use esrs_gateway::bus::{EventListener, ListenerError};
use esrs_gateway::projection::ProjectionStore;

use crate::aggregate::{BarConfigured, BarCreated, FooCreated, FooNamed};

#[derive(Default, Debug, Clone, PartialEq)]
pub struct FooBarQuery {
    pub id: String,
    pub kind: String,
    pub name: Option<String>,
    pub configuration: Option<String>,
}

/// Keeps a single read model of both foos and bars.
#[derive(Clone)]
pub struct FooBarListener {
    pub projection: ProjectionStore<FooBarQuery>,
}

#[async_trait]
impl EventListener<FooCreated> for FooBarListener {
    async fn on_event(&self, event: &FooCreated) -> Result<(), ListenerError> {
        self.projection
            .update(event.id.clone(), |row| {
                row.id = event.id.clone();
                row.kind = "Foo".to_string();
            })
            .await;
        Ok(())
    }
}

#[async_trait]
impl EventListener<FooNamed> for FooBarListener {
    async fn on_event(&self, event: &FooNamed) -> Result<(), ListenerError> {
        self.projection
            .update(event.id.clone(), |row| row.name = Some(event.name.clone()))
            .await;
        Ok(())
    }
}

#[async_trait]
impl EventListener<BarCreated> for FooBarListener {
    async fn on_event(&self, event: &BarCreated) -> Result<(), ListenerError> {
        self.projection
            .update(event.id.clone(), |row| {
                row.id = event.id.clone();
                row.kind = "Bar".to_string();
            })
            .await;
        Ok(())
    }
}

#[async_trait]
impl EventListener<BarConfigured> for FooBarListener {
    async fn on_event(&self, event: &BarConfigured) -> Result<(), ListenerError> {
        self.projection
            .update(event.id.clone(), |row| {
                row.configuration = Some(event.configuration.clone())
            })
            .await;
        Ok(())
    }
}

/// Records the events it sees, prefixed with its label.
#[derive(Clone)]
pub struct RecordingListener {
    pub label: &'static str,
    pub seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl EventListener<FooCreated> for RecordingListener {
    async fn on_event(&self, event: &FooCreated) -> Result<(), ListenerError> {
        self.seen
            .lock()
            .unwrap()
            .push(format!("{}:created:{}", self.label, event.id));
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

#[async_trait]
impl EventListener<FooNamed> for RecordingListener {
    async fn on_event(&self, event: &FooNamed) -> Result<(), ListenerError> {
        self.seen
            .lock()
            .unwrap()
            .push(format!("{}:named:{}", self.label, event.name));
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

pub struct FailingListener;

#[async_trait]
impl EventListener<FooCreated> for FailingListener {
    async fn on_event(&self, _event: &FooCreated) -> Result<(), ListenerError> {
        Err("read model unavailable".into())
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

pub struct PanickingListener;

#[async_trait]
impl EventListener<FooCreated> for PanickingListener {
    async fn on_event(&self, _event: &FooCreated) -> Result<(), ListenerError> {
        panic!("listener exploded")
    }

    fn name(&self) -> &'static str {
        "panicking"
    }
}
