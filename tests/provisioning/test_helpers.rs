//! Shared fixtures for provisioning BDD scenarios.

use std::time::Duration;

use hoist::test_support::{ScriptedProbe, ScriptedProvider, ScriptedRunner};
use hoist::{
    ErrorKind, InstanceDescriptor, Orchestrator, Phase, PollSpec, ProvisionConfig,
    RemoteExecutor, SshSettings,
};
use rstest::fixture;

pub const INSTANCE_ADDRESS: &str = "10.0.0.5";
pub const BOOTSTRAP_COMMANDS: [&str; 2] = ["apt-get update", "make install"];
pub const START_COMMAND: &str = "run-service";

pub type ScriptedOrchestrator = Orchestrator<ScriptedProvider, ScriptedRunner, ScriptedProbe>;

#[derive(Clone, Debug)]
pub struct ProvisionContext {
    pub provider: ScriptedProvider,
    pub runner: ScriptedRunner,
    pub probe: ScriptedProbe,
    pub config: ProvisionConfig,
    pub outcome: Option<Outcome>,
}

#[derive(Clone, Debug)]
pub enum Outcome {
    Finished(InstanceDescriptor),
    Failed {
        message: String,
        kind: ErrorKind,
        phase: Option<Phase>,
    },
}

impl ProvisionContext {
    /// Builds an orchestrator over the scripted doubles with short polls.
    pub fn orchestrator(&self) -> ScriptedOrchestrator {
        let executor = RemoteExecutor::new(SshSettings::default(), self.runner.clone())
            .unwrap_or_else(|err| panic!("default ssh settings should be valid: {err}"));
        let poll = PollSpec::new(Duration::from_secs(1), Duration::from_secs(10));

        Orchestrator::new(self.provider.clone(), executor, self.probe.clone())
            .with_running_poll(poll)
            .with_session_poll(poll)
            .with_service_poll(poll)
            .with_termination_poll(poll)
    }

    pub fn descriptor(&self) -> Option<&InstanceDescriptor> {
        match &self.outcome {
            Some(Outcome::Finished(descriptor)) => Some(descriptor),
            _ => None,
        }
    }
}

#[fixture]
pub fn provision_context() -> ProvisionContext {
    ProvisionContext {
        provider: ScriptedProvider::new(),
        runner: ScriptedRunner::accepting_all(),
        probe: ScriptedProbe::succeeds_on_attempt(1),
        config: provision_config(),
        outcome: None,
    }
}

fn provision_config() -> ProvisionConfig {
    ProvisionConfig {
        image_id: String::from("ubuntu_noble"),
        bootstrap_commands: BOOTSTRAP_COMMANDS.map(str::to_owned).to_vec(),
        upload_files: Vec::new(),
        service_start_command: String::from(START_COMMAND),
        service_port: 9000,
        ..ProvisionConfig::default()
    }
}
