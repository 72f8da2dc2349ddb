//! Provider abstraction for creating and tearing down compute instances.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::config::ProvisionConfig;

/// Opaque, provider-assigned instance identifier.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct InstanceId(String);

impl InstanceId {
    /// Wraps a provider identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for InstanceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state reported by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InstanceState {
    /// The instance is booting or being allocated.
    Pending,
    /// The instance is running.
    Running,
    /// The instance is shutting down.
    Stopping,
    /// The instance exists but is powered off.
    Stopped,
    /// The instance no longer exists.
    Terminated,
    /// Any state the provider reports that has no dedicated variant.
    Other(String),
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Running => f.write_str("running"),
            Self::Stopping => f.write_str("stopping"),
            Self::Stopped => f.write_str("stopped"),
            Self::Terminated => f.write_str("terminated"),
            Self::Other(state) => f.write_str(state),
        }
    }
}

/// Snapshot returned by [`Provider::describe`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceStatus {
    /// Current lifecycle state.
    pub state: InstanceState,
    /// Public address, absent until the provider assigns one.
    pub public_address: Option<String>,
}

impl InstanceStatus {
    /// Status of an instance the provider no longer knows about.
    #[must_use]
    pub const fn terminated() -> Self {
        Self {
            state: InstanceState::Terminated,
            public_address: None,
        }
    }
}

/// Inbound firewall rule opened before an instance is created.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IngressRule {
    /// Security group receiving the rule.
    pub security_group: String,
    /// Source range allowed to connect.
    pub cidr: String,
    /// TCP port to open.
    pub port: u16,
}

/// Future returned by provider operations.
pub type ProviderFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by compute providers.
pub trait Provider {
    /// Provider specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Adds an inbound TCP rule to a security group.
    ///
    /// Callers treat failures as advisory: the rule may already exist.
    fn open_ingress<'a>(&'a self, rule: &'a IngressRule) -> ProviderFuture<'a, (), Self::Error>;

    /// Creates a new instance and returns its identifier.
    ///
    /// Not idempotent: every call creates a distinct instance.
    fn create<'a>(
        &'a self,
        config: &'a ProvisionConfig,
    ) -> ProviderFuture<'a, InstanceId, Self::Error>;

    /// Fetches the current state and public address of an instance.
    fn describe<'a>(
        &'a self,
        id: &'a InstanceId,
    ) -> ProviderFuture<'a, InstanceStatus, Self::Error>;

    /// Requests termination of an instance without waiting for completion.
    fn terminate<'a>(&'a self, id: &'a InstanceId) -> ProviderFuture<'a, (), Self::Error>;
}
