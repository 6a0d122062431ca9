//! Per-request state machine.
//!
//! `Received → Retrieving → Assembling → Prompting → Dispatching → Generating`
//! then `Completed` or `Failed`. Stages only move forward and terminal states
//! accept nothing.

use ragline_core::{ErrorKind, Stage};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Active(Stage),
    Completed,
    Failed { stage: Stage, kind: ErrorKind },
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: Stage, to: Stage },

    #[error("request already finished")]
    AlreadyTerminal,
}

#[derive(Debug, Clone)]
pub struct RequestLifecycle {
    state: RequestState,
}

impl RequestLifecycle {
    pub fn new() -> Self {
        Self {
            state: RequestState::Active(Stage::Received),
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// The stage currently running, or the one that failed.
    pub fn stage(&self) -> Option<Stage> {
        match self.state {
            RequestState::Active(stage) => Some(stage),
            RequestState::Failed { stage, .. } => Some(stage),
            RequestState::Completed => None,
        }
    }

    /// Move to `next`, which must come strictly after the current stage.
    pub fn advance(&mut self, next: Stage) -> Result<(), LifecycleError> {
        match self.state {
            RequestState::Active(current) if next > current => {
                self.state = RequestState::Active(next);
                Ok(())
            }
            RequestState::Active(current) => Err(LifecycleError::InvalidTransition {
                from: current,
                to: next,
            }),
            _ => Err(LifecycleError::AlreadyTerminal),
        }
    }

    /// Only a request that reached `Generating` can complete.
    pub fn complete(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            RequestState::Active(Stage::Generating) => {
                self.state = RequestState::Completed;
                Ok(())
            }
            RequestState::Active(current) => Err(LifecycleError::InvalidTransition {
                from: current,
                to: Stage::Generating,
            }),
            _ => Err(LifecycleError::AlreadyTerminal),
        }
    }

    /// Fail in the current stage.
    pub fn fail(&mut self, kind: ErrorKind) -> Result<Stage, LifecycleError> {
        match self.state {
            RequestState::Active(stage) => {
                self.state = RequestState::Failed { stage, kind };
                Ok(stage)
            }
            _ => Err(LifecycleError::AlreadyTerminal),
        }
    }
}

impl Default for RequestLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
