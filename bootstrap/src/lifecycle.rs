//! Sequential bring-up and tear-down of services in dependency order.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use crate::descriptor::ServiceDescriptor;
use crate::error::{BootstrapError, Phase, ServiceError, ShutdownError, StopFailure};
use crate::graph::ServiceGraph;
use crate::handler::{Export, HandlerRegistry, ServiceContext, ServiceHandler};
use crate::state::ServiceState;

enum PhaseOutcome {
    Done(Result<(), ServiceError>),
    Aborted,
}

/// Drives `initialize` then `start` for each service in `linear_ordering`,
/// one service at a time. The first failure stops the bring-up and rolls back
/// every started service in reverse start order.
pub struct LifecycleManager {
    registry: HandlerRegistry,
    phase_timeout: Option<Duration>,
}

impl LifecycleManager {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            phase_timeout: None,
        }
    }

    pub fn with_phase_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.phase_timeout = timeout;
        self
    }

    pub async fn bootstrap(&self, graph: &ServiceGraph) -> Result<RunningServices, BootstrapError> {
        let (_keep_open, abort) = watch::channel(false);
        self.bootstrap_until(graph, abort).await
    }

    /// Like [`bootstrap`](Self::bootstrap), but gives up as soon as `abort`
    /// carries `true`. Services not yet started are skipped.
    pub async fn bootstrap_until(
        &self,
        graph: &ServiceGraph,
        mut abort: watch::Receiver<bool>,
    ) -> Result<RunningServices, BootstrapError> {
        let mut running = RunningServices::new(self.phase_timeout);

        for descriptor in graph.ordered_descriptors() {
            let name = descriptor.name.as_str();

            if *abort.borrow() {
                return Err(self.abort(name, None, running).await);
            }

            let mut state = ServiceState::Unstarted;
            let mut handler = match self.registry.instantiate(descriptor) {
                Ok(handler) => handler,
                Err(cause) => {
                    return Err(self
                        .fail(name, Phase::Instantiate, cause, state, running)
                        .await);
                }
            };

            let ctx = running.context_for(descriptor);
            log::info!("Initializing service `{}` ({})", name, descriptor.handler);
            match self
                .run_phase(handler.initialize(&ctx), &mut abort)
                .await
            {
                PhaseOutcome::Done(Ok(())) => {
                    if let Err(cause) = state.transition(ServiceState::Initialized) {
                        return Err(self
                            .fail(name, Phase::Initialize, cause, state, running)
                            .await);
                    }
                }
                PhaseOutcome::Done(Err(cause)) => {
                    return Err(self
                        .fail(name, Phase::Initialize, cause, state, running)
                        .await);
                }
                PhaseOutcome::Aborted => {
                    return Err(self.abort(name, Some(state), running).await)
                }
            }

            log::info!("Starting service `{}`", name);
            match self.run_phase(handler.start(), &mut abort).await {
                PhaseOutcome::Done(Ok(())) => {
                    if let Err(cause) = state.transition(ServiceState::Started) {
                        return Err(self
                            .fail(name, Phase::Start, cause, state, running)
                            .await);
                    }
                }
                PhaseOutcome::Done(Err(cause)) => {
                    return Err(self
                        .fail(name, Phase::Start, cause, state, running)
                        .await);
                }
                PhaseOutcome::Aborted => {
                    return Err(self.abort(name, Some(state), running).await)
                }
            }

            let export = handler.export();
            running.services.push(RunningService {
                name: name.to_string(),
                handler,
                state,
                export,
            });
            log::info!("Service `{}` started", name);
        }

        log::info!(
            "Bootstrap complete: {} service(s) running",
            running.services.len()
        );
        Ok(running)
    }

    async fn run_phase<F>(&self, phase: F, abort: &mut watch::Receiver<bool>) -> PhaseOutcome
    where
        F: Future<Output = Result<(), ServiceError>>,
    {
        let bounded = with_timeout(self.phase_timeout, phase);
        tokio::select! {
            biased;
            result = bounded => PhaseOutcome::Done(result),
            _ = abort_requested(abort) => PhaseOutcome::Aborted,
        }
    }

    async fn fail(
        &self,
        service: &str,
        phase: Phase,
        cause: ServiceError,
        mut state: ServiceState,
        mut running: RunningServices,
    ) -> BootstrapError {
        log::error!(
            "Service `{}` failed during {}: {}; rolling back {} started service(s)",
            service,
            phase,
            cause,
            running.services.len()
        );
        if state.transition(ServiceState::Failed).is_err() {
            log::warn!("Service `{}` cannot be marked failed from {}", service, state);
        }

        let rollback_failures = running.stop_all().await;
        let mut states = running.states();
        states.push((service.to_string(), state));
        BootstrapError::ServiceFailed {
            service: service.to_string(),
            phase,
            cause,
            rollback_failures,
            states,
        }
    }

    // `state` is `None` when the abort came before the service was instantiated.
    async fn abort(
        &self,
        service: &str,
        state: Option<ServiceState>,
        mut running: RunningServices,
    ) -> BootstrapError {
        log::warn!(
            "Bootstrap aborted before `{}`; rolling back {} started service(s)",
            service,
            running.services.len()
        );
        let rollback_failures = running.stop_all().await;
        let mut states = running.states();
        states.extend(state.map(|state| (service.to_string(), state)));
        BootstrapError::Aborted {
            service: service.to_string(),
            rollback_failures,
            states,
        }
    }
}

async fn with_timeout<F>(limit: Option<Duration>, phase: F) -> Result<(), ServiceError>
where
    F: Future<Output = Result<(), ServiceError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, phase)
            .await
            .unwrap_or(Err(ServiceError::Timeout(limit))),
        None => phase.await,
    }
}

// Resolves once `true` is observed; never resolves if the sender is gone.
async fn abort_requested(abort: &mut watch::Receiver<bool>) {
    loop {
        if *abort.borrow_and_update() {
            return;
        }
        if abort.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

struct RunningService {
    name: String,
    handler: Box<dyn ServiceHandler>,
    state: ServiceState,
    export: Option<Export>,
}

/// Services brought up by a successful bootstrap, in start order.
pub struct RunningServices {
    services: Vec<RunningService>,
    phase_timeout: Option<Duration>,
}

impl RunningServices {
    fn new(phase_timeout: Option<Duration>) -> Self {
        Self {
            services: Vec::new(),
            phase_timeout,
        }
    }

    fn context_for(&self, descriptor: &ServiceDescriptor) -> ServiceContext {
        descriptor
            .depends_on
            .iter()
            .filter_map(|dep| {
                self.services
                    .iter()
                    .find(|s| &s.name == dep)
                    .and_then(|s| s.export.clone().map(|export| (dep, export)))
            })
            .fold(ServiceContext::new(&descriptor.name), |ctx, (dep, export)| {
                ctx.with_dependency(dep.clone(), export)
            })
    }

    fn states(&self) -> Vec<(String, ServiceState)> {
        self.services
            .iter()
            .map(|s| (s.name.clone(), s.state))
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn state(&self, name: &str) -> Option<ServiceState> {
        self.services.iter().find(|s| s.name == name).map(|s| s.state)
    }

    pub fn export<T>(&self, name: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.services
            .iter()
            .find(|s| s.name == name)
            .and_then(|s| s.export.as_ref())
            .and_then(|export| export.downcast_ref::<T>())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Stops every service in reverse start order. Individual failures are
    /// collected rather than short-circuiting the rest.
    pub async fn shutdown(mut self) -> Result<(), ShutdownError> {
        let failures = self.stop_all().await;
        if failures.is_empty() {
            log::info!("All services stopped");
            Ok(())
        } else {
            Err(ShutdownError { failures })
        }
    }

    async fn stop_all(&mut self) -> Vec<StopFailure> {
        let mut failures = Vec::new();

        for service in self.services.iter_mut().rev() {
            if service.state != ServiceState::Started {
                continue;
            }

            log::info!("Stopping service `{}`", service.name);
            let result = with_timeout(self.phase_timeout, service.handler.stop()).await;
            match result {
                Ok(()) => {
                    service.state = ServiceState::Stopped;
                }
                Err(cause) => {
                    log::error!("Service `{}` failed to stop: {}", service.name, cause);
                    service.state = ServiceState::Failed;
                    failures.push(StopFailure {
                        service: service.name.clone(),
                        cause,
                    });
                }
            }
        }

        failures
    }
}

impl Drop for RunningServices {
    fn drop(&mut self) {
        let still_running: Vec<_> = self
            .services
            .iter()
            .filter(|s| s.state == ServiceState::Started)
            .map(|s| s.name.as_str())
            .collect();
        if !still_running.is_empty() {
            log::warn!(
                "Dropping running services without shutdown: {}",
                still_running.join(", ")
            );
        }
    }
}
