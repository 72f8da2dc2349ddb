//! Drives an instance through its lifecycle.
//!
//! `start` opens the ingress rule, creates the instance, waits for it to run,
//! bootstraps it over SSH, uploads configuration files, launches the service
//! and waits for its port. `stop` terminates the instance and waits until the
//! provider stops reporting it. Phases run strictly in sequence and nothing
//! is retried across phases; a failed start leaves the instance in place.

use std::convert::Infallible;
use std::future::ready;
use std::time::Duration;

use camino::Utf8Path;
use tracing::{debug, info, warn};

use crate::config::ProvisionConfig;
use crate::poll::{PollError, PollSpec, Probe, wait_until};
use crate::provider::{InstanceId, InstanceState, InstanceStatus, Provider};
use crate::remote::{CommandRunner, RemoteError, RemoteExecutor, RemoteSession, UploadOutcome};

mod error;
mod phase;
mod probe;

pub use error::{ErrorKind, OrchestratorError, ProvisionError, Workflow};
pub use phase::{InstanceDescriptor, Phase, PhaseError};
pub use probe::{ReachabilityProbe, TcpProbe};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const RUNNING_WAIT_TIMEOUT: Duration = Duration::from_secs(600);
const SESSION_WAIT_TIMEOUT: Duration = Duration::from_secs(300);
const SERVICE_WAIT_TIMEOUT: Duration = Duration::from_secs(300);
const TERMINATION_WAIT_TIMEOUT: Duration = Duration::from_secs(600);

/// Runs the start and stop workflows against a provider.
#[derive(Debug)]
pub struct Orchestrator<P, R: CommandRunner, T> {
    provider: P,
    executor: RemoteExecutor<R>,
    probe: T,
    running_poll: PollSpec,
    session_poll: PollSpec,
    service_poll: PollSpec,
    termination_poll: PollSpec,
}

impl<P, R, T> Orchestrator<P, R, T>
where
    P: Provider,
    R: CommandRunner,
    T: ReachabilityProbe,
{
    /// Creates an orchestrator with the default poll intervals and timeouts.
    #[must_use]
    pub const fn new(provider: P, executor: RemoteExecutor<R>, probe: T) -> Self {
        Self {
            provider,
            executor,
            probe,
            running_poll: PollSpec::new(DEFAULT_POLL_INTERVAL, RUNNING_WAIT_TIMEOUT),
            session_poll: PollSpec::new(DEFAULT_POLL_INTERVAL, SESSION_WAIT_TIMEOUT),
            service_poll: PollSpec::new(DEFAULT_POLL_INTERVAL, SERVICE_WAIT_TIMEOUT),
            termination_poll: PollSpec::new(DEFAULT_POLL_INTERVAL, TERMINATION_WAIT_TIMEOUT),
        }
    }

    /// Overrides the wait for the instance to report `running`.
    #[must_use]
    pub const fn with_running_poll(mut self, spec: PollSpec) -> Self {
        self.running_poll = spec;
        self
    }

    /// Overrides the wait for an SSH session to open.
    #[must_use]
    pub const fn with_session_poll(mut self, spec: PollSpec) -> Self {
        self.session_poll = spec;
        self
    }

    /// Overrides the wait for the service port.
    #[must_use]
    pub const fn with_service_poll(mut self, spec: PollSpec) -> Self {
        self.service_poll = spec;
        self
    }

    /// Overrides the wait for termination.
    #[must_use]
    pub const fn with_termination_poll(mut self, spec: PollSpec) -> Self {
        self.termination_poll = spec;
        self
    }

    /// Resolves the provision document at `path` and runs [`Self::start`].
    ///
    /// # Errors
    ///
    /// Returns an [`OrchestratorError`] without a phase when the document is
    /// rejected, and otherwise whatever [`Self::start`] returns.
    pub async fn start_from_path(
        &self,
        path: Option<&Utf8Path>,
    ) -> Result<InstanceDescriptor, OrchestratorError<P::Error>> {
        let config = ProvisionConfig::resolve(path).map_err(|err| OrchestratorError {
            workflow: Workflow::Start,
            phase: None,
            descriptor: None,
            source: ProvisionError::Config(err),
        })?;
        self.start(&config).await
    }

    /// Provisions an instance and starts the service on it.
    ///
    /// Returns the descriptor in the [`Phase::Ready`] phase. Bootstrap
    /// commands that exit non-zero are recorded on the descriptor and do not
    /// stop the run.
    ///
    /// # Errors
    ///
    /// Returns an [`OrchestratorError`] carrying the failing phase. When the
    /// create call itself is rejected no descriptor is attached; otherwise
    /// the descriptor is in [`Phase::Failed`] and the instance is left
    /// running for inspection.
    pub async fn start(
        &self,
        config: &ProvisionConfig,
    ) -> Result<InstanceDescriptor, OrchestratorError<P::Error>> {
        self.open_ingress(config).await;

        info!(
            phase = %Phase::Requested,
            image = %config.image_id,
            instance_type = %config.instance_type,
            "creating instance"
        );
        let id = self
            .provider
            .create(config)
            .await
            .map_err(|source| OrchestratorError {
                workflow: Workflow::Start,
                phase: Some(Phase::Requested),
                descriptor: None,
                source: ProvisionError::Provisioning {
                    operation: "create",
                    source,
                },
            })?;

        let mut descriptor = InstanceDescriptor::requested(id);
        info!(instance_id = %descriptor.id(), "instance requested");

        match self.drive_start(config, &mut descriptor).await {
            Ok(()) => Ok(descriptor),
            Err(source) => Err(Self::failed(Workflow::Start, descriptor, source)),
        }
    }

    /// Terminates `id` and waits until the provider reports it gone.
    ///
    /// Stopping an instance that is already terminated succeeds without
    /// issuing another terminate request.
    ///
    /// # Errors
    ///
    /// Returns an [`OrchestratorError`] when the terminate request is
    /// rejected or termination is not observed before the timeout.
    pub async fn stop(
        &self,
        id: &InstanceId,
    ) -> Result<InstanceDescriptor, OrchestratorError<P::Error>> {
        let mut descriptor = InstanceDescriptor::at(id.clone(), Phase::Terminating);
        match self.drive_stop(&mut descriptor).await {
            Ok(()) => Ok(descriptor),
            Err(source) => Err(Self::failed(Workflow::Stop, descriptor, source)),
        }
    }

    async fn drive_start(
        &self,
        config: &ProvisionConfig,
        descriptor: &mut InstanceDescriptor,
    ) -> Result<(), ProvisionError<P::Error>> {
        enter(descriptor, Phase::Running)?;
        let address = self.wait_for_running(descriptor.id()).await?;
        info!(instance_id = %descriptor.id(), %address, "instance running");
        descriptor.set_public_address(address.clone());

        enter(descriptor, Phase::Configuring)?;
        let session = self.wait_for_session(&address, config).await?;
        Self::bootstrap(&session, config, descriptor)?;
        Self::upload(&session, config)?;

        enter(descriptor, Phase::ServiceStarting)?;
        info!(command = %config.service_start_command, "starting service");
        session.run(&config.service_start_command)?;
        close_session(session);
        self.wait_for_service(&address, config.service_port).await?;

        enter(descriptor, Phase::Ready)?;
        Ok(())
    }

    async fn drive_stop(
        &self,
        descriptor: &mut InstanceDescriptor,
    ) -> Result<(), ProvisionError<P::Error>> {
        let id = descriptor.id().clone();
        match self.provider.describe(&id).await {
            Ok(status) if status.state == InstanceState::Terminated => {
                info!(instance_id = %id, "instance already terminated");
                enter(descriptor, Phase::Terminated)?;
                return Ok(());
            }
            Ok(_) => {}
            Err(err) => {
                warn!(instance_id = %id, error = %err, "could not describe instance; requesting termination anyway");
            }
        }

        info!(instance_id = %id, phase = %Phase::Terminating, "terminating instance");
        self.provider
            .terminate(&id)
            .await
            .map_err(|source| ProvisionError::Provisioning {
                operation: "terminate",
                source,
            })?;
        self.wait_for_termination(&id).await?;

        enter(descriptor, Phase::Terminated)?;
        Ok(())
    }

    async fn open_ingress(&self, config: &ProvisionConfig) {
        let Some(rule) = config.ingress_rule() else {
            info!("no security group configured; skipping ingress rule");
            return;
        };

        match self.provider.open_ingress(&rule).await {
            Ok(()) => info!(
                security_group = %rule.security_group,
                cidr = %rule.cidr,
                port = rule.port,
                "ingress rule opened"
            ),
            Err(err) => warn!(
                security_group = %rule.security_group,
                error = %err,
                "failed to open ingress rule; continuing"
            ),
        }
    }

    async fn wait_for_running(&self, id: &InstanceId) -> Result<String, ProvisionError<P::Error>> {
        let outcome = wait_until(&self.running_poll, || async move {
            match self.provider.describe(id).await {
                Ok(InstanceStatus {
                    state: InstanceState::Running,
                    public_address: Some(address),
                }) => Probe::Ready(address),
                Ok(InstanceStatus {
                    state: InstanceState::Terminated,
                    ..
                }) => Probe::Halt(()),
                Ok(status) => {
                    debug!(instance_id = %id, state = %status.state, "instance not running yet");
                    Probe::Pending
                }
                Err(err) => {
                    debug!(instance_id = %id, error = %err, "describe failed; retrying");
                    Probe::Pending
                }
            }
        })
        .await;

        outcome.map_err(|err| match err {
            PollError::Timeout { elapsed, timeout } => ProvisionError::Timeout {
                what: "instance to run",
                elapsed,
                timeout,
                last_error: None,
            },
            PollError::Halted(()) => ProvisionError::ResourceGone {
                instance_id: id.clone(),
                what: "instance to run",
            },
        })
    }

    async fn wait_for_session(
        &self,
        address: &str,
        config: &ProvisionConfig,
    ) -> Result<RemoteSession<'_, R>, ProvisionError<P::Error>> {
        let identity_file = config.ssh_identity_file();
        let mut last_error = None;
        let outcome = wait_until(&self.session_poll, || {
            let attempt = match self
                .executor
                .open(address, &config.ssh_user, &identity_file)
            {
                Ok(session) => Probe::Ready(session),
                Err(err @ RemoteError::Spawn { .. }) => Probe::Halt(err),
                Err(err) => {
                    debug!(%address, error = %err, "ssh not reachable yet");
                    last_error = Some(err.to_string());
                    Probe::Pending
                }
            };
            ready(attempt)
        })
        .await;

        outcome.map_err(|err| match err {
            PollError::Timeout { elapsed, timeout } => {
                if let Some(cause) = &last_error {
                    warn!(%address, error = %cause, "ssh session never came up");
                }
                ProvisionError::Timeout {
                    what: "ssh session",
                    elapsed,
                    timeout,
                    last_error,
                }
            }
            PollError::Halted(transport) => ProvisionError::Transport(transport),
        })
    }

    fn bootstrap(
        session: &RemoteSession<'_, R>,
        config: &ProvisionConfig,
        descriptor: &mut InstanceDescriptor,
    ) -> Result<(), ProvisionError<P::Error>> {
        for command in config.expanded_bootstrap_commands() {
            info!(%command, "running bootstrap command");
            match session.run(&command) {
                Ok(output) => {
                    debug!(%command, stdout = %output.stdout.trim(), "bootstrap command finished");
                }
                Err(RemoteError::Command(failure)) => {
                    warn!(%command, error = %failure, "bootstrap command failed; continuing");
                    descriptor.record_bootstrap_failure(failure);
                }
                Err(other) => return Err(ProvisionError::Transport(other)),
            }
        }
        Ok(())
    }

    fn upload(
        session: &RemoteSession<'_, R>,
        config: &ProvisionConfig,
    ) -> Result<(), ProvisionError<P::Error>> {
        for file in &config.upload_files {
            let local = Utf8Path::new(&file.local_path);
            match session.upload(local, &file.remote_path)? {
                UploadOutcome::Uploaded => {
                    info!(%local, remote = %file.remote_path, "uploaded file");
                }
                UploadOutcome::Skipped => warn!(%local, "local file not found; upload skipped"),
            }
        }
        Ok(())
    }

    async fn wait_for_service(
        &self,
        address: &str,
        port: u16,
    ) -> Result<(), ProvisionError<P::Error>> {
        let outcome = wait_until(&self.service_poll, || async move {
            let reachable = self.probe.is_reachable(address, port).await;
            if !reachable {
                debug!(%address, port, "service port not accepting connections yet");
            }
            Probe::<(), Infallible>::from_bool(reachable)
        })
        .await;

        outcome.map_err(|err| match err {
            PollError::Timeout { elapsed, timeout } => ProvisionError::Timeout {
                what: "service port",
                elapsed,
                timeout,
                last_error: None,
            },
            PollError::Halted(never) => match never {},
        })
    }

    async fn wait_for_termination(&self, id: &InstanceId) -> Result<(), ProvisionError<P::Error>> {
        let outcome = wait_until(&self.termination_poll, || async move {
            match self.provider.describe(id).await {
                Ok(status) if status.state == InstanceState::Terminated => Probe::Ready(()),
                Ok(status) => {
                    debug!(instance_id = %id, state = %status.state, "instance not terminated yet");
                    Probe::<(), Infallible>::Pending
                }
                Err(err) => {
                    debug!(instance_id = %id, error = %err, "describe failed; retrying");
                    Probe::Pending
                }
            }
        })
        .await;

        outcome.map_err(|err| match err {
            PollError::Timeout { elapsed, timeout } => ProvisionError::TerminationIncomplete {
                instance_id: id.clone(),
                elapsed,
                timeout,
            },
            PollError::Halted(never) => match never {},
        })
    }

    fn failed(
        workflow: Workflow,
        mut descriptor: InstanceDescriptor,
        source: ProvisionError<P::Error>,
    ) -> OrchestratorError<P::Error> {
        let phase = descriptor.fail();
        warn!(
            instance_id = %descriptor.id(),
            %workflow,
            %phase,
            kind = ?source.kind(),
            error = %source,
            "workflow failed"
        );
        OrchestratorError {
            workflow,
            phase: Some(phase),
            descriptor: Some(descriptor),
            source,
        }
    }
}

fn enter(descriptor: &mut InstanceDescriptor, phase: Phase) -> Result<(), PhaseError> {
    descriptor.advance(phase)?;
    info!(instance_id = %descriptor.id(), %phase, "entering phase");
    Ok(())
}

fn close_session<R: CommandRunner>(session: RemoteSession<'_, R>) {
    let destination = session.destination().to_owned();
    if let Err(err) = session.close() {
        warn!(%destination, error = %err, "failed to close ssh session");
    }
}
