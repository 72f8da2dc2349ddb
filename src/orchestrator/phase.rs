//! Lifecycle phases and the instance descriptor the orchestrator mutates.

use std::fmt;

use thiserror::Error;

use crate::provider::InstanceId;
use crate::remote::RemoteCommandError;

/// Named stage in an instance's lifecycle.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Phase {
    /// The create call has been issued.
    Requested,
    /// Waiting for the provider to report the instance running.
    Running,
    /// Bootstrapping over SSH and uploading files.
    Configuring,
    /// Starting the service and waiting for its port.
    ServiceStarting,
    /// The service accepts connections.
    Ready,
    /// Termination has been requested.
    Terminating,
    /// The provider no longer reports the instance.
    Terminated,
    /// A fatal error stopped the run.
    Failed,
}

impl Phase {
    const fn rank(self) -> u8 {
        match self {
            Self::Requested => 0,
            Self::Running => 1,
            Self::Configuring => 2,
            Self::ServiceStarting => 3,
            Self::Ready => 4,
            Self::Terminating => 5,
            Self::Terminated => 6,
            Self::Failed => 7,
        }
    }

    /// Returns `true` once no further transitions are valid.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated | Self::Failed)
    }

    /// Whether moving from `self` to `next` respects the lifecycle.
    ///
    /// Phases only move forward; `Terminating` may follow any live phase and
    /// `Failed` may interrupt any live phase.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed => true,
            Self::Terminating => !matches!(self, Self::Terminating),
            _ => next.rank() > self.rank(),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Requested => "requested",
            Self::Running => "running",
            Self::Configuring => "configuring",
            Self::ServiceStarting => "service-starting",
            Self::Ready => "ready",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Raised when a phase change would break the lifecycle ordering.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum PhaseError {
    /// The requested phase does not follow the current one.
    #[error("invalid phase transition from {from} to {to}")]
    InvalidTransition {
        /// Phase the descriptor was in.
        from: Phase,
        /// Phase that was requested.
        to: Phase,
    },
}

/// Instance state owned by the orchestrator for the length of one run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceDescriptor {
    id: InstanceId,
    public_address: Option<String>,
    phase: Phase,
    bootstrap_failures: Vec<RemoteCommandError>,
}

impl InstanceDescriptor {
    /// Descriptor for an instance whose create call was just issued.
    #[must_use]
    pub const fn requested(id: InstanceId) -> Self {
        Self::at(id, Phase::Requested)
    }

    pub(crate) const fn at(id: InstanceId, phase: Phase) -> Self {
        Self {
            id,
            public_address: None,
            phase,
            bootstrap_failures: Vec::new(),
        }
    }

    /// Provider identifier.
    #[must_use]
    pub const fn id(&self) -> &InstanceId {
        &self.id
    }

    /// Public address, once the provider assigned one.
    #[must_use]
    pub fn public_address(&self) -> Option<&str> {
        self.public_address.as_deref()
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Bootstrap commands that failed without stopping the run.
    #[must_use]
    pub fn bootstrap_failures(&self) -> &[RemoteCommandError] {
        &self.bootstrap_failures
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError`] when the transition would move backwards or
    /// leave a terminal phase.
    pub fn advance(&mut self, next: Phase) -> Result<(), PhaseError> {
        if !self.phase.can_advance_to(next) {
            return Err(PhaseError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        Ok(())
    }

    /// Marks the run as failed and returns the phase the failure occurred in.
    ///
    /// A descriptor that is already terminal keeps its phase.
    pub fn fail(&mut self) -> Phase {
        let failed_in = self.phase;
        if !failed_in.is_terminal() {
            self.phase = Phase::Failed;
        }
        failed_in
    }

    pub(crate) fn set_public_address(&mut self, address: String) {
        self.public_address = Some(address);
    }

    pub(crate) fn record_bootstrap_failure(&mut self, failure: RemoteCommandError) {
        self.bootstrap_failures.push(failure);
    }
}
