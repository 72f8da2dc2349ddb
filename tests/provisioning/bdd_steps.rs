//! BDD step definitions for the `hoist start` and `hoist stop` workflows.

use hoist::test_support::ScriptedProbe;
use hoist::{ErrorKind, InstanceDescriptor, InstanceId, InstanceState, OrchestratorError, Phase};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::{Builder, Runtime};

use super::test_helpers::{
    BOOTSTRAP_COMMANDS, INSTANCE_ADDRESS, Outcome, ProvisionContext, START_COMMAND,
};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("runtime: {0}")]
    Runtime(String),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn paused_runtime() -> Result<Runtime, StepError> {
    Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .map_err(|err| StepError::Runtime(err.to_string()))
}

fn record<E: std::error::Error + 'static>(
    result: Result<InstanceDescriptor, OrchestratorError<E>>,
) -> Outcome {
    match result {
        Ok(descriptor) => Outcome::Finished(descriptor),
        Err(err) => Outcome::Failed {
            message: err.to_string(),
            kind: err.kind(),
            phase: err.phase,
        },
    }
}

#[given("an instance that reports running after \"{checks}\" pending checks")]
fn running_after(provision_context: ProvisionContext, checks: u32) -> ProvisionContext {
    for _ in 0..checks {
        provision_context
            .provider
            .push_state(InstanceState::Pending, None);
    }
    provision_context
        .provider
        .settle(InstanceState::Running, Some(INSTANCE_ADDRESS));
    provision_context
}

#[given("an instance that disappears after \"{checks}\" pending checks")]
fn disappears_after(provision_context: ProvisionContext, checks: u32) -> ProvisionContext {
    for _ in 0..checks {
        provision_context
            .provider
            .push_state(InstanceState::Pending, None);
    }
    provision_context
        .provider
        .settle(InstanceState::Terminated, None);
    provision_context
}

#[given("an instance that is already terminated")]
fn already_terminated(provision_context: ProvisionContext) -> ProvisionContext {
    provision_context
        .provider
        .settle(InstanceState::Terminated, None);
    provision_context
}

#[given("a running instance that terminates on request")]
fn terminates_on_request(provision_context: ProvisionContext) -> ProvisionContext {
    provision_context
        .provider
        .settle(InstanceState::Running, Some(INSTANCE_ADDRESS));
    provision_context.provider.terminate_on_request();
    provision_context
}

#[given("the service answers on probe attempt \"{attempt}\"")]
fn service_answers(mut provision_context: ProvisionContext, attempt: u32) -> ProvisionContext {
    provision_context.probe = ScriptedProbe::succeeds_on_attempt(attempt);
    provision_context
}

#[given("bootstrap command \"{index}\" exits with status \"{code}\"")]
fn bootstrap_command_fails(
    provision_context: ProvisionContext,
    index: usize,
    code: i32,
) -> ProvisionContext {
    // Control master start, then the commands before the failing one.
    provision_context.runner.push_success();
    for _ in 1..index {
        provision_context.runner.push_success();
    }
    provision_context.runner.push_failure(code);
    provision_context
}

#[given("the service start command exits with status \"{code}\"")]
fn service_start_fails(provision_context: ProvisionContext, code: i32) -> ProvisionContext {
    provision_context.runner.push_success();
    for _ in BOOTSTRAP_COMMANDS {
        provision_context.runner.push_success();
    }
    provision_context.runner.push_failure(code);
    provision_context
}

#[when("I start the service")]
fn start_service(provision_context: ProvisionContext) -> Result<ProvisionContext, StepError> {
    let runtime = paused_runtime()?;
    let orchestrator = provision_context.orchestrator();
    let result = runtime.block_on(orchestrator.start(&provision_context.config));

    Ok(ProvisionContext {
        outcome: Some(record(result)),
        ..provision_context
    })
}

#[when("I stop instance \"{id}\"")]
fn stop_instance(
    provision_context: ProvisionContext,
    id: String,
) -> Result<ProvisionContext, StepError> {
    let runtime = paused_runtime()?;
    let orchestrator = provision_context.orchestrator();
    let instance_id = InstanceId::from(id.trim());
    let result = runtime.block_on(orchestrator.stop(&instance_id));

    Ok(ProvisionContext {
        outcome: Some(record(result)),
        ..provision_context
    })
}

#[then("the instance is ready at \"{address}\"")]
fn instance_ready(provision_context: &ProvisionContext, address: String) -> Result<(), StepError> {
    let descriptor = finished(provision_context)?;
    if descriptor.phase() != Phase::Ready {
        return Err(StepError::Assertion(format!(
            "expected ready, got {}",
            descriptor.phase()
        )));
    }
    if descriptor.public_address() != Some(address.as_str()) {
        return Err(StepError::Assertion(format!(
            "expected address {address}, got {:?}",
            descriptor.public_address()
        )));
    }
    Ok(())
}

#[then("the bootstrap and start commands ran in order")]
fn commands_in_order(provision_context: &ProvisionContext) -> Result<(), StepError> {
    let expected: Vec<String> = BOOTSTRAP_COMMANDS
        .iter()
        .chain([START_COMMAND].iter())
        .map(|command| (*command).to_owned())
        .collect();
    let actual = provision_context.runner.remote_commands();
    if actual == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected:?}, got {actual:?}"
        )))
    }
}

#[then("\"{count}\" bootstrap failure is recorded")]
fn bootstrap_failures_recorded(
    provision_context: &ProvisionContext,
    count: usize,
) -> Result<(), StepError> {
    let failures = finished(provision_context)?.bootstrap_failures();
    if failures.len() != count {
        return Err(StepError::Assertion(format!(
            "expected {count} bootstrap failures, got {failures:?}"
        )));
    }
    if failures
        .iter()
        .any(|failure| failure.command != BOOTSTRAP_COMMANDS[1])
    {
        return Err(StepError::Assertion(format!(
            "unexpected failing command in {failures:?}"
        )));
    }
    Ok(())
}

#[then("the start fails during \"{phase}\"")]
fn start_fails_during(provision_context: &ProvisionContext, phase: String) -> Result<(), StepError> {
    match &provision_context.outcome {
        Some(Outcome::Failed {
            phase: Some(actual),
            kind: ErrorKind::RemoteCommand,
            message,
        }) if actual.to_string() == phase && message.contains(START_COMMAND) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected remote command failure during {phase}, got {other:?}"
        ))),
    }
}

#[then("the service port is never probed")]
fn port_never_probed(provision_context: &ProvisionContext) -> Result<(), StepError> {
    let attempts = provision_context.probe.attempts();
    if attempts == 0 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no probe attempts, got {attempts}"
        )))
    }
}

#[then("the start fails because the instance is gone")]
fn instance_gone(provision_context: &ProvisionContext) -> Result<(), StepError> {
    match &provision_context.outcome {
        Some(Outcome::Failed {
            kind: ErrorKind::ResourceGone,
            phase: Some(Phase::Running),
            ..
        }) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected a resource-gone failure while running, got {other:?}"
        ))),
    }
}

#[then("the instance is terminated")]
fn instance_terminated(provision_context: &ProvisionContext) -> Result<(), StepError> {
    let phase = finished(provision_context)?.phase();
    if phase == Phase::Terminated {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected terminated, got {phase}"
        )))
    }
}

#[then("no terminate request was sent")]
fn no_terminate_request(provision_context: &ProvisionContext) -> Result<(), StepError> {
    let terminated = provision_context.provider.terminated();
    if terminated.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "unexpected terminate requests: {terminated:?}"
        )))
    }
}

#[then("termination was requested for \"{id}\"")]
fn termination_requested(provision_context: &ProvisionContext, id: String) -> Result<(), StepError> {
    let terminated = provision_context.provider.terminated();
    if terminated == [InstanceId::from(id.trim())] {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected a single terminate request for {id}, got {terminated:?}"
        )))
    }
}

fn finished(provision_context: &ProvisionContext) -> Result<&InstanceDescriptor, StepError> {
    provision_context.descriptor().ok_or_else(|| {
        StepError::Assertion(format!(
            "expected a finished workflow, got {:?}",
            provision_context.outcome
        ))
    })
}
