//! SSH transport settings and validation.
//!
//! Settings are loaded via `ortho-config`, which merges defaults,
//! `hoist.toml`, and `HOIST_SSH_*` environment variables.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use super::RemoteError;

/// Default TCP port for SSH.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Transport settings shared by every session a run opens.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "HOIST_SSH",
    discovery(
        app_name = "hoist",
        env_var = "HOIST_CONFIG_PATH",
        config_file_name = "hoist.toml",
        dotfile_name = ".hoist.toml",
        project_file_name = "hoist.toml"
    )
)]
pub struct SshSettings {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `scp` executable.
    #[ortho_config(default = "scp".to_owned())]
    pub scp_bin: String,
    /// TCP port the instance's SSH daemon listens on.
    #[ortho_config(default = 22)]
    pub ssh_port: u16,
    /// Whether to force batch mode so SSH never prompts for a password.
    #[ortho_config(default = true)]
    pub ssh_batch_mode: bool,
    /// Whether to enforce host key checking; disabled by default because
    /// every instance is new.
    #[ortho_config(default = false)]
    pub ssh_strict_host_key_checking: bool,
    /// Known hosts file override; defaults to `/dev/null` for ephemeral hosts.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub ssh_known_hosts_file: String,
    /// Seconds a single connection attempt may take.
    #[ortho_config(default = 10)]
    pub connect_timeout_secs: u64,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            ssh_bin: String::from("ssh"),
            scp_bin: String::from("scp"),
            ssh_port: DEFAULT_SSH_PORT,
            ssh_batch_mode: true,
            ssh_strict_host_key_checking: false,
            ssh_known_hosts_file: String::from("/dev/null"),
            connect_timeout_secs: 10,
        }
    }
}

/// Errors raised when loading SSH settings from layered sources.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SshSettingsLoadError {
    /// Indicates that parsing or merging configuration layers failed.
    #[error("ssh settings parsing failed: {0}")]
    Parse(String),
}

impl SshSettings {
    /// Loads settings from defaults, configuration files, and environment
    /// variables without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`SshSettingsLoadError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, SshSettingsLoadError> {
        Self::load_from_iter([std::ffi::OsString::from("hoist")])
            .map_err(|err| SshSettingsLoadError::Parse(err.to_string()))
    }

    /// Ensures required values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfig`] when a field is empty or zero.
    pub fn validate(&self) -> Result<(), RemoteError> {
        Self::require_value(&self.ssh_bin, "ssh_bin")?;
        Self::require_value(&self.scp_bin, "scp_bin")?;
        if self.ssh_port == 0 {
            return Err(RemoteError::InvalidConfig {
                field: String::from("ssh_port"),
            });
        }
        Ok(())
    }

    fn require_value(value: &str, field: &str) -> Result<(), RemoteError> {
        if value.trim().is_empty() {
            return Err(RemoteError::InvalidConfig {
                field: field.to_owned(),
            });
        }
        Ok(())
    }
}
