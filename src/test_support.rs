//! Test doubles shared across unit and integration tests.
//!
//! [`ScriptedRunner`] replaces the process runner behind SSH sessions,
//! [`ScriptedProvider`] stands in for the compute provider, and
//! [`ScriptedProbe`] replaces the TCP reachability check.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::config::ProvisionConfig;
use crate::orchestrator::ReachabilityProbe;
use crate::provider::{
    IngressRule, InstanceId, InstanceState, InstanceStatus, Provider, ProviderFuture,
};
use crate::remote::{CommandOutput, CommandRunner, RemoteError};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// When the queue is empty the runner either fails with
/// [`RemoteError::Spawn`] or, if built with
/// [`ScriptedRunner::accepting_all`], reports success.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
    accept_when_empty: bool,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }

    /// Returns `true` for control master start and exit requests.
    #[must_use]
    pub fn is_session_control(&self) -> bool {
        self.args
            .iter()
            .any(|arg| arg == "ControlMaster=yes" || arg == "-O")
    }

    /// Returns the final argument, which is the remote command for `ssh`.
    #[must_use]
    pub fn last_arg(&self) -> Option<String> {
        self.args
            .last()
            .map(|arg| arg.to_string_lossy().into_owned())
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a runner that reports success once its queue is drained.
    #[must_use]
    pub fn accepting_all() -> Self {
        Self {
            accept_when_empty: true,
            ..Self::default()
        }
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Returns the remote commands sent through `ssh`, in order, leaving out
    /// control master start and exit requests.
    #[must_use]
    pub fn remote_commands(&self) -> Vec<String> {
        self.invocations
            .borrow()
            .iter()
            .filter(|invocation| invocation.program == "ssh")
            .filter(|invocation| !invocation.is_session_control())
            .filter_map(CommandInvocation::last_arg)
            .collect()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a specific exit code.
    pub fn push_exit_code(&self, code: i32) {
        self.push_output(Some(code), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });

        if let Some(response) = self.responses.borrow_mut().pop_front() {
            return Ok(response);
        }

        if self.accept_when_empty {
            return Ok(CommandOutput {
                code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            });
        }

        Err(RemoteError::Spawn {
            program: program.to_owned(),
            message: String::from("no scripted response available"),
        })
    }
}

/// Errors produced by [`ScriptedProvider`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptedProviderError {
    /// Scripted ingress failure.
    #[error("ingress failure")]
    Ingress,
    /// Scripted create failure.
    #[error("create failure")]
    Create,
    /// Scripted describe failure.
    #[error("describe failure")]
    Describe,
    /// Scripted terminate failure.
    #[error("terminate failure")]
    Terminate,
}

#[derive(Debug, Default)]
struct ProviderState {
    statuses: VecDeque<Result<InstanceStatus, ScriptedProviderError>>,
    settled: Option<InstanceStatus>,
    fail_on_ingress: bool,
    fail_on_create: bool,
    fail_on_terminate: bool,
    terminated_on_request: bool,
    created: u32,
    describe_calls: u32,
    ingress_rules: Vec<IngressRule>,
    terminated: Vec<InstanceId>,
}

/// Provider double that replays scripted describe results.
///
/// Describe calls pop queued statuses first and then repeat the settled
/// status (pending when none was set). Every create returns a fresh id.
#[derive(Clone, Debug, Default)]
pub struct ScriptedProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl ScriptedProvider {
    /// Creates a provider with no scripted behaviour.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that reports `pending` for `pending_checks` describe calls
    /// and `running` at `address` afterwards.
    #[must_use]
    pub fn running_after(pending_checks: u32, address: &str) -> Self {
        let provider = Self::new();
        for _ in 0..pending_checks {
            provider.push_state(InstanceState::Pending, None);
        }
        provider.settle(InstanceState::Running, Some(address));
        provider
    }

    fn lock(&self) -> MutexGuard<'_, ProviderState> {
        self.state
            .lock()
            .unwrap_or_else(|err| panic!("scripted provider lock poisoned: {err}"))
    }

    /// Queues a describe result.
    pub fn push_state(&self, state: InstanceState, address: Option<&str>) {
        self.lock().statuses.push_back(Ok(InstanceStatus {
            state,
            public_address: address.map(str::to_owned),
        }));
    }

    /// Queues a describe failure.
    pub fn push_describe_failure(&self) {
        self.lock()
            .statuses
            .push_back(Err(ScriptedProviderError::Describe));
    }

    /// Sets the status repeated once the queue is drained.
    pub fn settle(&self, state: InstanceState, address: Option<&str>) {
        self.lock().settled = Some(InstanceStatus {
            state,
            public_address: address.map(str::to_owned),
        });
    }

    /// Makes every ingress request fail.
    pub fn fail_on_ingress(&self) {
        self.lock().fail_on_ingress = true;
    }

    /// Makes every create request fail.
    pub fn fail_on_create(&self) {
        self.lock().fail_on_create = true;
    }

    /// Makes every terminate request fail.
    pub fn fail_on_terminate(&self) {
        self.lock().fail_on_terminate = true;
    }

    /// Settles on `terminated` as soon as terminate is requested.
    pub fn terminate_on_request(&self) {
        self.lock().terminated_on_request = true;
    }

    /// Number of successful create calls.
    #[must_use]
    pub fn create_calls(&self) -> u32 {
        self.lock().created
    }

    /// Number of describe calls.
    #[must_use]
    pub fn describe_calls(&self) -> u32 {
        self.lock().describe_calls
    }

    /// Ingress rules requested so far.
    #[must_use]
    pub fn ingress_rules(&self) -> Vec<IngressRule> {
        self.lock().ingress_rules.clone()
    }

    /// Instances terminate was requested for.
    #[must_use]
    pub fn terminated(&self) -> Vec<InstanceId> {
        self.lock().terminated.clone()
    }
}

impl Provider for ScriptedProvider {
    type Error = ScriptedProviderError;

    fn open_ingress<'a>(&'a self, rule: &'a IngressRule) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            state.ingress_rules.push(rule.clone());
            if state.fail_on_ingress {
                return Err(ScriptedProviderError::Ingress);
            }
            Ok(())
        })
    }

    fn create<'a>(
        &'a self,
        _config: &'a ProvisionConfig,
    ) -> ProviderFuture<'a, InstanceId, Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            if state.fail_on_create {
                return Err(ScriptedProviderError::Create);
            }
            state.created += 1;
            Ok(InstanceId::from(format!("scripted-{}", state.created)))
        })
    }

    fn describe<'a>(
        &'a self,
        _id: &'a InstanceId,
    ) -> ProviderFuture<'a, InstanceStatus, Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            state.describe_calls += 1;
            if let Some(next) = state.statuses.pop_front() {
                return next;
            }
            Ok(state.settled.clone().unwrap_or(InstanceStatus {
                state: InstanceState::Pending,
                public_address: None,
            }))
        })
    }

    fn terminate<'a>(&'a self, id: &'a InstanceId) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            if state.fail_on_terminate {
                return Err(ScriptedProviderError::Terminate);
            }
            state.terminated.push(id.clone());
            if state.terminated_on_request {
                state.statuses.clear();
                state.settled = Some(InstanceStatus::terminated());
            }
            Ok(())
        })
    }
}

/// Reachability double that succeeds after a fixed number of attempts.
#[derive(Clone, Debug, Default)]
pub struct ScriptedProbe {
    succeed_on: u32,
    attempts: Arc<AtomicU32>,
}

impl ScriptedProbe {
    /// Probe whose `attempt`-th call (1-based) and later ones succeed.
    #[must_use]
    pub fn succeeds_on_attempt(attempt: u32) -> Self {
        Self {
            succeed_on: attempt,
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Probe that never succeeds.
    #[must_use]
    pub fn never() -> Self {
        Self::succeeds_on_attempt(u32::MAX)
    }

    /// Number of attempts made so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl ReachabilityProbe for ScriptedProbe {
    fn is_reachable<'a>(
        &'a self,
        _host: &'a str,
        _port: u16,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            attempt >= self.succeed_on
        })
    }
}
