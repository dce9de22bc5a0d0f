use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::descriptor::{HandlerRef, ServiceDescriptor};
use crate::error::ServiceError;

/// Capability published by a started service for its dependents.
pub type Export = Arc<dyn Any + Send + Sync>;

/// A long-lived unit driven through `initialize -> start -> stop`.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    async fn initialize(&mut self, ctx: &ServiceContext) -> Result<(), ServiceError>;

    async fn start(&mut self) -> Result<(), ServiceError>;

    async fn stop(&mut self) -> Result<(), ServiceError>;

    /// What dependents may resolve from this service once it is started.
    fn export(&self) -> Option<Export> {
        None
    }
}

/// Given to `initialize`: the service's own name plus the exports of the
/// services it declared in `depends_on`. Nothing else is reachable.
pub struct ServiceContext {
    service: String,
    dependencies: HashMap<String, Export>,
}

impl ServiceContext {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            dependencies: HashMap::new(),
        }
    }

    pub fn with_dependency(mut self, name: impl Into<String>, export: Export) -> Self {
        self.dependencies.insert(name.into(), export);
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Resolves the export of a declared dependency as `T`.
    pub fn dependency<T>(&self, name: &str) -> Result<T, ServiceError>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.dependencies
            .get(name)
            .and_then(|export| export.downcast_ref::<T>())
            .cloned()
            .ok_or_else(|| ServiceError::MissingDependency(name.to_string()))
    }
}

type Factory = Box<dyn Fn(&ServiceDescriptor) -> Result<Box<dyn ServiceHandler>, ServiceError> + Send + Sync>;

/// Static table from handler reference to constructor.
#[derive(Default)]
pub struct HandlerRegistry {
    factories: HashMap<HandlerRef, Factory>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, handler: HandlerRef, factory: F) -> &mut Self
    where
        F: Fn(&ServiceDescriptor) -> Result<Box<dyn ServiceHandler>, ServiceError>
            + Send
            + Sync
            + 'static,
    {
        if self.factories.insert(handler.clone(), Box::new(factory)).is_some() {
            log::warn!("Handler {} registered twice; keeping the latest", handler);
        }
        self
    }

    pub fn contains(&self, handler: &HandlerRef) -> bool {
        self.factories.contains_key(handler)
    }

    pub fn instantiate(
        &self,
        descriptor: &ServiceDescriptor,
    ) -> Result<Box<dyn ServiceHandler>, ServiceError> {
        let factory = self
            .factories
            .get(&descriptor.handler)
            .ok_or_else(|| ServiceError::UnknownHandler(descriptor.handler.to_string()))?;
        factory(descriptor)
    }
}
