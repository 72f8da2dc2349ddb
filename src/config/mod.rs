//! Configuration for provisioning runs.
//!
//! Two layers feed a run. [`ScalewayConfig`] carries provider credentials and
//! placement, merged by `ortho-config` from defaults, `hoist.toml` and `SCW_*`
//! environment variables. [`ProvisionConfig`] describes what to deploy and is
//! resolved from a JSON document merged key-wise over built-in defaults.

use camino::Utf8PathBuf;
use thiserror::Error;

mod credentials;
mod provision;

pub use credentials::ScalewayConfig;
pub use provision::{
    DEFAULT_CONFIG_PATH, DEFAULT_INGRESS_CIDR, DEFAULT_SERVICE_PORT, ProvisionConfig,
    SOURCE_REPO_PLACEHOLDER, UploadFile,
};

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required credential field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Load(String),
    /// The provision document is not valid JSON.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Document that failed to parse.
        path: Utf8PathBuf,
        /// Parser diagnostic.
        message: String,
    },
    /// The provision document parsed but is not a JSON object.
    #[error("{path} must contain a JSON object at the top level")]
    NotAnObject {
        /// Offending document.
        path: Utf8PathBuf,
    },
    /// A recognised key holds a value of the wrong shape.
    #[error("invalid provision configuration: {0}")]
    Field(String),
    /// A value has the right shape but violates an invariant.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Field that failed validation.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Load(value.to_string())
    }
}
