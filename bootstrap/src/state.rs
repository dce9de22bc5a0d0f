use serde::Serialize;
use std::fmt;

use crate::error::ServiceError;

/// Runtime state of a single service. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceState {
    Unstarted,
    Initialized,
    Started,
    Stopped,
    Failed,
}

impl ServiceState {
    pub fn can_transition_to(self, next: ServiceState) -> bool {
        use ServiceState::*;
        matches!(
            (self, next),
            (Unstarted, Initialized)
                | (Initialized, Started)
                | (Started, Stopped)
                | (Unstarted, Failed)
                | (Initialized, Failed)
                | (Started, Failed)
        )
    }

    pub fn transition(&mut self, next: ServiceState) -> Result<(), ServiceError> {
        if !self.can_transition_to(next) {
            return Err(ServiceError::InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ServiceState::Stopped | ServiceState::Failed)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
