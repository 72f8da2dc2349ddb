//! Scoped SSH session over an OpenSSH control master.

use std::ffi::OsString;

use camino::Utf8Path;
use shell_escape::unix::escape;
use tracing::debug;

use super::{
    CommandRunner, RemoteCommandError, RemoteCommandOutput, RemoteError, RemoteExecutor,
    UploadOutcome,
};
use super::util::is_local_file;

/// Open connection to a remote host.
///
/// The session must be released with [`RemoteSession::close`]; dropping an
/// open session closes it as well and discards any error.
#[derive(Debug)]
pub struct RemoteSession<'a, R: CommandRunner> {
    executor: &'a RemoteExecutor<R>,
    destination: String,
    identity_file: String,
    control_path: String,
    open: bool,
}

impl<'a, R: CommandRunner> RemoteSession<'a, R> {
    pub(super) const fn new(
        executor: &'a RemoteExecutor<R>,
        destination: String,
        identity_file: String,
        control_path: String,
    ) -> Self {
        Self {
            executor,
            destination,
            identity_file,
            control_path,
            open: true,
        }
    }

    /// Returns the `user@host` this session is connected to.
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Runs `command` through the remote user's shell.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Command`] when the command exits non-zero and
    /// [`RemoteError::Spawn`] when `ssh` cannot be started.
    ///
    /// # Security
    ///
    /// `command` is passed verbatim to the remote shell.
    pub fn run(&self, command: &str) -> Result<RemoteCommandOutput, RemoteError> {
        let mut args = self
            .executor
            .ssh_options(&self.identity_file, &self.control_path);
        args.push(OsString::from(self.destination.as_str()));
        args.push(OsString::from(command));

        let output = self
            .executor
            .runner()
            .run(&self.executor.settings().ssh_bin, &args)?;
        if output.is_success() {
            return Ok(output.into());
        }

        Err(RemoteCommandError {
            command: command.to_owned(),
            exit_status: output.code,
            output: combine_streams(&output.stdout, &output.stderr),
        }
        .into())
    }

    /// Copies `local` to `remote`, creating the remote parent directory.
    ///
    /// A missing local file is not an error: the upload is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Command`] when the directory creation or the
    /// copy fails.
    pub fn upload(&self, local: &Utf8Path, remote: &str) -> Result<UploadOutcome, RemoteError> {
        if !is_local_file(local) {
            debug!(%local, "local file missing; skipping upload");
            return Ok(UploadOutcome::Skipped);
        }

        if let Some(parent) = Utf8Path::new(remote)
            .parent()
            .filter(|dir| !dir.as_str().is_empty())
        {
            let escaped = escape(parent.as_str().into());
            self.run(&format!("mkdir -p {escaped}"))?;
        }

        let mut args = self
            .executor
            .scp_options(&self.identity_file, &self.control_path);
        args.push(OsString::from(local.as_str()));
        args.push(OsString::from(format!("{}:{remote}", self.destination)));

        let program = &self.executor.settings().scp_bin;
        let output = self.executor.runner().run(program, &args)?;
        if output.is_success() {
            return Ok(UploadOutcome::Uploaded);
        }

        Err(RemoteCommandError {
            command: format!("{program} {local} {}:{remote}", self.destination),
            exit_status: output.code,
            output: combine_streams(&output.stdout, &output.stderr),
        }
        .into())
    }

    /// Asks the control master to exit, releasing the connection.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Close`] when the master rejects the request and
    /// [`RemoteError::Spawn`] when `ssh` cannot be started.
    pub fn close(mut self) -> Result<(), RemoteError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), RemoteError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        let args = vec![
            OsString::from("-o"),
            OsString::from(format!("ControlPath={}", self.control_path)),
            OsString::from("-O"),
            OsString::from("exit"),
            OsString::from(self.destination.as_str()),
        ];
        let output = self
            .executor
            .runner()
            .run(&self.executor.settings().ssh_bin, &args)?;
        if output.is_success() {
            return Ok(());
        }

        Err(RemoteError::Close {
            destination: self.destination.clone(),
            stderr: output.stderr,
        })
    }
}

impl<R: CommandRunner> Drop for RemoteSession<'_, R> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            debug!(destination = %self.destination, error = %err, "ssh session close on drop failed");
        }
    }
}

fn combine_streams(stdout: &str, stderr: &str) -> String {
    match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
        (true, _) => stderr.to_owned(),
        (false, true) => stdout.to_owned(),
        (false, false) => format!("{stdout}\n{stderr}"),
    }
}
