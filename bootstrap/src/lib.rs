//! Dependency-ordered service bootstrap.
//!
//! A bootstrap file declares named services, the handler that implements each
//! one and the services it needs running first. [`ServiceGraph`] turns that
//! into a deterministic start order and [`LifecycleManager`] drives every
//! handler through `initialize -> start`, rolling back on the first failure
//! and stopping everything in reverse on shutdown.

pub mod descriptor;
pub mod error;
pub mod graph;
pub mod handler;
pub mod lifecycle;
pub mod state;

pub use descriptor::{BootstrapSettings, HandlerRef, ServiceDescriptor, ServicesConfig};
pub use error::{BootstrapError, GraphError, Phase, ServiceError, ShutdownError, StopFailure};
pub use graph::ServiceGraph;
pub use handler::{Export, HandlerRegistry, ServiceContext, ServiceHandler};
pub use lifecycle::{LifecycleManager, RunningServices};
pub use state::ServiceState;
