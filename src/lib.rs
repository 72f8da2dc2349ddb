//! Core library for the Hoist service provisioning tool.
//!
//! The crate exposes a provider abstraction for creating short-lived compute
//! instances, a Scaleway implementation of it, an SSH-backed remote executor,
//! and an orchestrator that drives the full lifecycle (create → wait for the
//! instance → bootstrap over SSH → start the service → wait for its port)
//! together with the symmetric teardown path.

pub mod config;
pub mod orchestrator;
pub mod poll;
pub mod provider;
pub mod remote;
pub mod scaleway;
pub mod test_support;

pub use config::{ConfigError, ProvisionConfig, ScalewayConfig, UploadFile};
pub use orchestrator::{
    ErrorKind, InstanceDescriptor, Orchestrator, OrchestratorError, Phase, PhaseError,
    ProvisionError, ReachabilityProbe, TcpProbe, Workflow,
};
pub use poll::{PollError, PollSpec, Probe, wait_until};
pub use provider::{
    IngressRule, InstanceId, InstanceState, InstanceStatus, Provider, ProviderFuture,
};
pub use remote::{
    CommandOutput, CommandRunner, ProcessCommandRunner, RemoteCommandError,
    RemoteCommandOutput, RemoteError, RemoteExecutor, RemoteSession, SshSettings,
    SshSettingsLoadError, UploadOutcome,
};
pub use scaleway::{ScalewayProvider, ScalewayProviderError};
