//! Service handlers wired into the bootstrap registry.

pub mod api;
pub mod store;

use bootstrap::{HandlerRef, HandlerRegistry};

pub use api::{ApiEndpoint, ApiService};
pub use store::{MemoryStoreService, MongoStoreService};

/// Every handler a bootstrap file may name.
pub fn registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register(HandlerRef::new("store", "memory"), |descriptor| {
            Ok(Box::new(MemoryStoreService::from_descriptor(descriptor)?))
        })
        .register(HandlerRef::new("store", "mongo"), |descriptor| {
            Ok(Box::new(MongoStoreService::from_descriptor(descriptor)?))
        })
        .register(HandlerRef::new("api", "http"), |descriptor| {
            Ok(Box::new(ApiService::from_descriptor(descriptor)?))
        });
    registry
}
