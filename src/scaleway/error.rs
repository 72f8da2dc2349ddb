//! Error types for the Scaleway provider.

use scaleway_rs::ScalewayError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by the Scaleway provider.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScalewayProviderError {
    /// Raised when the credentials are incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when the requested image label cannot be resolved.
    #[error("image '{label}' (arch {arch}) not found in zone {zone}")]
    ImageNotFound {
        /// Image label passed by the caller.
        label: String,
        /// Architecture requested by the caller.
        arch: String,
        /// Zone used for the lookup.
        zone: String,
    },
    /// Raised when the server type is not available in the selected zone.
    #[error("instance type '{instance_type}' not available in zone {zone}")]
    InstanceTypeUnavailable {
        /// Requested commercial type.
        instance_type: String,
        /// Target zone.
        zone: String,
    },
    /// Raised when a freshly created server cannot be powered on.
    #[error("instance {instance_id} in state {state} cannot be powered on")]
    PowerOnNotAllowed {
        /// Provider instance identifier.
        instance_id: String,
        /// Current state reported by the provider.
        state: String,
    },
    /// Raised when a created server could not be powered on. The server was
    /// deleted again.
    #[error("server {instance_id} could not be powered on and was deleted: {reason}")]
    PowerOnFailed {
        /// Provider instance identifier.
        instance_id: String,
        /// Why the power-on failed.
        reason: String,
    },
    /// Raised when a server that failed to power on could not be deleted
    /// either, so it still exists.
    #[error(
        "server {instance_id} could not be powered on ({reason}) and deleting it failed \
         ({cleanup}); remove it with `hoist stop {instance_id}`"
    )]
    ServerLeftBehind {
        /// Provider instance identifier.
        instance_id: String,
        /// Why the power-on failed.
        reason: String,
        /// Why the delete failed.
        cleanup: String,
    },
    /// Wrapper for transport and API failures.
    #[error("provider error: {message}")]
    Provider {
        /// Message returned by the SDK or the API.
        message: String,
    },
}

impl ScalewayProviderError {
    pub(crate) fn provider(err: impl ToString) -> Self {
        Self::Provider {
            message: err.to_string(),
        }
    }
}

impl From<ScalewayError> for ScalewayProviderError {
    fn from(value: ScalewayError) -> Self {
        Self::provider(value)
    }
}

impl From<ConfigError> for ScalewayProviderError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}
