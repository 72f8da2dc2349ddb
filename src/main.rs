//! Binary entry point for the Hoist CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use hoist::config::ConfigError;
use hoist::{
    InstanceDescriptor, InstanceId, Orchestrator, OrchestratorError, ProcessCommandRunner,
    ProvisionConfig, ProvisionError, RemoteError, RemoteExecutor, ScalewayConfig,
    ScalewayProvider, ScalewayProviderError, SshSettings, TcpProbe, Workflow,
};

mod cli;

use cli::{Cli, Command, StartCommand, StopCommand};

type CliOrchestrator = Orchestrator<ScalewayProvider, ProcessCommandRunner, TcpProbe>;

#[derive(Debug, Error)]
enum CliError {
    #[error("credential configuration failed: {0}")]
    Credentials(#[source] ConfigError),
    #[error("provider setup failed: {0}")]
    Provider(#[from] ScalewayProviderError),
    #[error("ssh configuration failed: {0}")]
    Ssh(String),
    #[error(transparent)]
    Workflow(#[from] OrchestratorError<ScalewayProviderError>),
}

impl From<RemoteError> for CliError {
    fn from(value: RemoteError) -> Self {
        Self::Ssh(value.to_string())
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match dispatch(cli.command).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn,hoist=info",
        1 => "warn,hoist=debug",
        _ => "trace",
    }
}

async fn dispatch(command: Command) -> Result<(), CliError> {
    match command {
        Command::Start(args) => start_command(args).await,
        Command::Stop(args) => stop_command(args).await,
    }
}

async fn start_command(args: StartCommand) -> Result<(), CliError> {
    let path = Utf8PathBuf::from(args.config);
    let config = ProvisionConfig::resolve(Some(&path)).map_err(config_failure)?;

    let orchestrator = build_orchestrator()?;
    let descriptor = orchestrator.start(&config).await?;

    write_summary(io::stdout(), &descriptor, config.service_port);
    Ok(())
}

async fn stop_command(args: StopCommand) -> Result<(), CliError> {
    let orchestrator = build_orchestrator()?;
    let descriptor = orchestrator
        .stop(&InstanceId::from(args.instance_id))
        .await?;

    writeln!(io::stdout(), "Instance {} terminated", descriptor.id()).ok();
    Ok(())
}

fn build_orchestrator() -> Result<CliOrchestrator, CliError> {
    let credentials = ScalewayConfig::load_without_cli_args().map_err(CliError::Credentials)?;
    let provider = ScalewayProvider::new(credentials)?;

    let ssh_settings =
        SshSettings::load_without_cli_args().map_err(|err| CliError::Ssh(err.to_string()))?;
    let executor = RemoteExecutor::with_process_runner(ssh_settings)?;

    Ok(Orchestrator::new(provider, executor, TcpProbe::default()))
}

fn config_failure(err: ConfigError) -> CliError {
    CliError::Workflow(OrchestratorError {
        workflow: Workflow::Start,
        phase: None,
        descriptor: None,
        source: ProvisionError::Config(err),
    })
}

fn write_summary(mut target: impl Write, descriptor: &InstanceDescriptor, port: u16) {
    writeln!(target, "Instance ID: {}", descriptor.id()).ok();
    if let Some(address) = descriptor.public_address() {
        writeln!(target, "Public address: {address}").ok();
        writeln!(target, "Service URL: http://{address}:{port}").ok();
    }
    let failures = descriptor.bootstrap_failures();
    if !failures.is_empty() {
        writeln!(target, "Bootstrap commands that failed: {}", failures.len()).ok();
        for failure in failures {
            writeln!(target, "  {}", failure.command).ok();
        }
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
