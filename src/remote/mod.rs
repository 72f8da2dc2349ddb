//! SSH-backed remote execution.
//!
//! [`RemoteExecutor::open`] starts an OpenSSH control master for a host and
//! returns a [`RemoteSession`]. Commands and `scp` uploads issued through the
//! session reuse that master connection, and closing the session (explicitly
//! or on drop) tells the master to exit.

use std::ffi::OsString;

use thiserror::Error;
use uuid::Uuid;

mod session;
mod settings;
mod types;
mod util;

pub use session::RemoteSession;
pub use settings::{DEFAULT_SSH_PORT, SshSettings, SshSettingsLoadError};
pub use types::{
    CommandOutput, CommandRunner, ProcessCommandRunner, RemoteCommandOutput, UploadOutcome,
};
pub use util::expand_tilde;

/// A remote command finished with a non-zero or missing exit status.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error(
    "remote command `{command}` exited with status {}: {}",
    status_text(.exit_status),
    .output.trim()
)]
pub struct RemoteCommandError {
    /// Command as sent to the remote shell.
    pub command: String,
    /// Exit status, absent when the command was killed by a signal.
    pub exit_status: Option<i32>,
    /// Combined stdout and stderr.
    pub output: String,
}

/// Errors surfaced while talking to a remote host.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RemoteError {
    /// A transport setting is missing or malformed.
    #[error("missing {field}: set HOIST_SSH_{env_suffix} or add {field} to [ssh] in hoist.toml", env_suffix = field.to_uppercase())]
    InvalidConfig {
        /// Setting that failed validation.
        field: String,
    },
    /// A local process could not be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// The SSH control master could not be established.
    #[error("could not open ssh session to {destination} (status {}): {}", status_text(.status), .stderr.trim())]
    Connect {
        /// `user@host` the session targeted.
        destination: String,
        /// Exit status of the `ssh` process.
        status: Option<i32>,
        /// Stderr captured from `ssh`.
        stderr: String,
    },
    /// A remote command or upload failed.
    #[error(transparent)]
    Command(#[from] RemoteCommandError),
    /// The control master did not acknowledge the exit request.
    #[error("failed to close ssh session to {destination}: {}", .stderr.trim())]
    Close {
        /// `user@host` the session targeted.
        destination: String,
        /// Stderr captured from `ssh -O exit`.
        stderr: String,
    },
}

fn status_text(status: &Option<i32>) -> String {
    status.map_or_else(|| String::from("unknown"), |code| code.to_string())
}

/// Opens SSH sessions using the configured transport settings.
#[derive(Clone, Debug)]
pub struct RemoteExecutor<R: CommandRunner> {
    settings: SshSettings,
    runner: R,
}

impl RemoteExecutor<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfig`] when validation fails.
    pub fn with_process_runner(settings: SshSettings) -> Result<Self, RemoteError> {
        Self::new(settings, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> RemoteExecutor<R> {
    /// Creates an executor using the provided runner and settings.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfig`] when settings validation fails.
    pub fn new(settings: SshSettings, runner: R) -> Result<Self, RemoteError> {
        settings.validate()?;
        Ok(Self { settings, runner })
    }

    /// Returns the transport settings.
    #[must_use]
    pub const fn settings(&self) -> &SshSettings {
        &self.settings
    }

    /// Opens a session to `address` as `user`, authenticating with the
    /// private key at `identity_file`.
    ///
    /// The call returns once the control master is connected, so a failure
    /// here usually means the host is not reachable yet.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Spawn`] when `ssh` cannot be started and
    /// [`RemoteError::Connect`] when the connection is refused or times out.
    pub fn open(
        &self,
        address: &str,
        user: &str,
        identity_file: &str,
    ) -> Result<RemoteSession<'_, R>, RemoteError> {
        let destination = format!("{user}@{address}");
        let control_path = std::env::temp_dir()
            .join(format!("hoist-{}.sock", Uuid::new_v4().simple()))
            .to_string_lossy()
            .into_owned();

        let mut args = self.ssh_options(identity_file, &control_path);
        args.extend([
            OsString::from("-o"),
            OsString::from("ControlMaster=yes"),
            OsString::from("-o"),
            OsString::from("ControlPersist=yes"),
            OsString::from(destination.as_str()),
            OsString::from("true"),
        ]);

        let output = self.runner.run(&self.settings.ssh_bin, &args)?;
        if !output.is_success() {
            return Err(RemoteError::Connect {
                destination,
                status: output.code,
                stderr: output.stderr,
            });
        }

        Ok(RemoteSession::new(
            self,
            destination,
            identity_file.to_owned(),
            control_path,
        ))
    }

    pub(crate) fn runner(&self) -> &R {
        &self.runner
    }

    /// Options for `ssh`, which takes the port as `-p`.
    pub(crate) fn ssh_options(&self, identity_file: &str, control_path: &str) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(self.settings.ssh_port.to_string()),
        ];
        args.extend(self.common_options(identity_file, control_path));
        args
    }

    /// Options for `scp`, which takes the port as `-P`.
    pub(crate) fn scp_options(&self, identity_file: &str, control_path: &str) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-P"),
            OsString::from(self.settings.ssh_port.to_string()),
        ];
        args.extend(self.common_options(identity_file, control_path));
        args
    }

    fn common_options(&self, identity_file: &str, control_path: &str) -> Vec<OsString> {
        let mut args = Vec::new();

        if !identity_file.trim().is_empty() {
            args.push(OsString::from("-i"));
            args.push(OsString::from(identity_file));
        }

        args.push(OsString::from("-o"));
        args.push(OsString::from(format!("ControlPath={control_path}")));
        args.push(OsString::from("-o"));
        args.push(OsString::from(format!(
            "ConnectTimeout={}",
            self.settings.connect_timeout_secs
        )));

        if self.settings.ssh_batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.settings.ssh_strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.settings.ssh_known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.settings.ssh_known_hosts_file
            )));
        }

        args
    }
}

#[cfg(test)]
mod tests;
