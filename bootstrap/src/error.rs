use std::fmt;
use std::time::Duration;

use crate::state::ServiceState;

/// Failure raised while building the service graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("service `{0}` is declared more than once")]
    DuplicateService(String),

    #[error("service `{service}` depends on undeclared service `{dependency}`")]
    UnresolvedDependency { service: String, dependency: String },

    #[error("dependency cycle detected between services: {}", services.join(", "))]
    CycleDetected { services: Vec<String> },
}

/// Failure returned by a service handler or by the manager driving it.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no handler registered for `{0}`")]
    UnknownHandler(String),

    #[error("dependency `{0}` is not available to this service")]
    MissingDependency(String),

    #[error("phase timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: ServiceState, to: ServiceState },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Instantiate,
    Initialize,
    Start,
    Stop,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Instantiate => "instantiate",
            Phase::Initialize => "initialize",
            Phase::Start => "start",
            Phase::Stop => "stop",
        };
        f.write_str(name)
    }
}

/// A `stop` call that failed, during rollback or shutdown.
#[derive(Debug, thiserror::Error)]
#[error("service `{service}` failed to stop: {cause}")]
pub struct StopFailure {
    pub service: String,
    pub cause: ServiceError,
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// The first failing service. Services started before it were rolled back.
    #[error("service `{service}` failed during {phase}: {cause}")]
    ServiceFailed {
        service: String,
        phase: Phase,
        cause: ServiceError,
        rollback_failures: Vec<StopFailure>,
        /// Final state of every service bootstrap touched, in start order.
        states: Vec<(String, ServiceState)>,
    },

    #[error("bootstrap aborted before service `{service}` was started")]
    Aborted {
        service: String,
        rollback_failures: Vec<StopFailure>,
        states: Vec<(String, ServiceState)>,
    },
}

impl BootstrapError {
    pub fn service(&self) -> &str {
        match self {
            BootstrapError::ServiceFailed { service, .. } => service,
            BootstrapError::Aborted { service, .. } => service,
        }
    }

    /// Where `name` ended up: `Failed` for the failing service, `Stopped` (or
    /// `Failed`) for services that were rolled back.
    pub fn state(&self, name: &str) -> Option<ServiceState> {
        let states = match self {
            BootstrapError::ServiceFailed { states, .. } => states,
            BootstrapError::Aborted { states, .. } => states,
        };
        states
            .iter()
            .find(|(service, _)| service == name)
            .map(|(_, state)| *state)
    }

    pub fn rollback_failures(&self) -> &[StopFailure] {
        match self {
            BootstrapError::ServiceFailed {
                rollback_failures, ..
            } => rollback_failures,
            BootstrapError::Aborted {
                rollback_failures, ..
            } => rollback_failures,
        }
    }
}

/// Every stop failure seen during shutdown, in the order they happened.
#[derive(Debug, thiserror::Error)]
#[error("{} service(s) failed to stop: {}", failures.len(), summarize(failures))]
pub struct ShutdownError {
    pub failures: Vec<StopFailure>,
}

fn summarize(failures: &[StopFailure]) -> String {
    failures
        .iter()
        .map(|f| f.service.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
