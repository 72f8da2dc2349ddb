//! Error types for the start and stop workflows.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::phase::{InstanceDescriptor, Phase, PhaseError};
use crate::config::ConfigError;
use crate::provider::InstanceId;
use crate::remote::{RemoteCommandError, RemoteError};

/// Coarse classification of a workflow failure.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// The configuration document or credentials were rejected.
    Config,
    /// The provider refused a request or never finished one.
    Provisioning,
    /// A readiness wait ran out of time.
    Timeout,
    /// A fatal remote command failed.
    RemoteCommand,
    /// The instance disappeared while it was being waited on.
    ResourceGone,
    /// The SSH transport could not be used.
    Transport,
}

/// Failure inside a single workflow step.
#[derive(Debug, Error)]
pub enum ProvisionError<E>
where
    E: StdError + 'static,
{
    /// The provision document or credentials were invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A provider call failed.
    #[error("provider {operation} failed: {source}")]
    Provisioning {
        /// Provider operation that failed.
        operation: &'static str,
        /// Underlying provider error.
        #[source]
        source: E,
    },
    /// A readiness wait hit its deadline.
    #[error(
        "timed out after {elapsed:?} waiting for {what} (timeout {timeout:?}){}",
        cause_text(.last_error)
    )]
    Timeout {
        /// Condition being waited on.
        what: &'static str,
        /// Time spent waiting.
        elapsed: Duration,
        /// Configured timeout.
        timeout: Duration,
        /// Last retryable failure seen before giving up, if any.
        last_error: Option<String>,
    },
    /// A command whose failure stops the run exited non-zero.
    #[error(transparent)]
    RemoteCommand(RemoteCommandError),
    /// SSH could not be spawned or connected.
    #[error(transparent)]
    Transport(RemoteError),
    /// The instance vanished while being polled.
    #[error("instance {instance_id} disappeared while waiting for {what}")]
    ResourceGone {
        /// Identifier of the vanished instance.
        instance_id: InstanceId,
        /// Condition being waited on.
        what: &'static str,
    },
    /// Terminate was accepted but the instance never reported terminated.
    #[error("instance {instance_id} was not terminated after {elapsed:?} (timeout {timeout:?})")]
    TerminationIncomplete {
        /// Identifier of the instance.
        instance_id: InstanceId,
        /// Time spent waiting.
        elapsed: Duration,
        /// Configured timeout.
        timeout: Duration,
    },
    /// The descriptor refused a phase change.
    #[error(transparent)]
    Phase(#[from] PhaseError),
}

impl<E> ProvisionError<E>
where
    E: StdError + 'static,
{
    /// Maps the failure onto the coarse taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Provisioning { .. } | Self::TerminationIncomplete { .. } | Self::Phase(_) => {
                ErrorKind::Provisioning
            }
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::RemoteCommand(_) => ErrorKind::RemoteCommand,
            Self::Transport(_) => ErrorKind::Transport,
            Self::ResourceGone { .. } => ErrorKind::ResourceGone,
        }
    }
}

impl<E> From<RemoteError> for ProvisionError<E>
where
    E: StdError + 'static,
{
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Command(failure) => Self::RemoteCommand(failure),
            other => Self::Transport(other),
        }
    }
}

/// Which workflow failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Workflow {
    /// Provision and start.
    Start,
    /// Terminate.
    Stop,
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Stop => "stop",
        })
    }
}

/// A workflow failure together with where it happened.
///
/// `phase` is absent when the run failed before any instance work began,
/// for example while resolving configuration. `descriptor` is absent when
/// no instance exists yet.
#[derive(Debug, Error)]
#[error("{workflow} failed during {}: {source}", phase_text(.phase))]
pub struct OrchestratorError<E>
where
    E: StdError + 'static,
{
    /// Workflow that failed.
    pub workflow: Workflow,
    /// Phase the failure occurred in.
    pub phase: Option<Phase>,
    /// Descriptor in its `failed` state.
    pub descriptor: Option<InstanceDescriptor>,
    /// Underlying cause.
    #[source]
    pub source: ProvisionError<E>,
}

impl<E> OrchestratorError<E>
where
    E: StdError + 'static,
{
    /// Shorthand for `self.source.kind()`.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

fn cause_text(last_error: &Option<String>) -> String {
    last_error
        .as_ref()
        .map_or_else(String::new, |cause| format!("; last error: {cause}"))
}

fn phase_text(phase: &Option<Phase>) -> String {
    phase.map_or_else(|| String::from("configuration"), |phase| phase.to_string())
}
