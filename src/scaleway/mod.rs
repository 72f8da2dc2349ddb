//! Scaleway implementation of the provider interface.
//!
//! Servers are created stopped through the Instances API and powered on
//! straight afterwards. Security group rules go through the same HTTP client
//! because the SDK does not cover them.

mod error;
mod lifecycle;
mod types;

use std::fmt;

use scaleway_rs::{ScalewayApi, ScalewayApiError};
use tracing::{info, warn};

use crate::config::{ProvisionConfig, ScalewayConfig};
use crate::provider::{IngressRule, InstanceId, InstanceStatus, Provider, ProviderFuture};
use lifecycle::{ImageQuery, InstanceSnapshot};
use types::{ServerId, Zone};

pub use error::ScalewayProviderError;

/// Provider backed by the Scaleway Instances API.
#[derive(Clone)]
pub struct ScalewayProvider {
    api: ScalewayApi,
    config: ScalewayConfig,
}

impl fmt::Debug for ScalewayProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalewayProvider")
            .field("zone", &self.config.default_zone)
            .field("project", &self.config.default_project_id)
            .finish_non_exhaustive()
    }
}

impl ScalewayProvider {
    /// Constructs a provider from validated credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayProviderError::Config`] when a required credential
    /// is missing.
    pub fn new(config: ScalewayConfig) -> Result<Self, ScalewayProviderError> {
        config.validate()?;
        Ok(Self {
            api: ScalewayApi::new(&config.secret_key),
            config,
        })
    }

    fn zone(&self) -> Zone {
        Zone::from(self.config.default_zone.as_str())
    }

    fn is_instance_type_error(api_err: &ScalewayApiError, instance_type: &str) -> bool {
        matches!(api_err.resource.as_deref(), Some("commercial_type"))
            || api_err
                .resource_id
                .as_deref()
                .is_some_and(|id| id == instance_type)
            || (api_err.etype == "invalid_arguments"
                && api_err
                    .message
                    .to_ascii_lowercase()
                    .contains("commercial_type"))
    }
}

impl Provider for ScalewayProvider {
    type Error = ScalewayProviderError;

    fn open_ingress<'a>(&'a self, rule: &'a IngressRule) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move { self.add_ingress_rule(&self.zone(), rule).await })
    }

    fn create<'a>(
        &'a self,
        config: &'a ProvisionConfig,
    ) -> ProviderFuture<'a, InstanceId, Self::Error> {
        Box::pin(async move {
            let zone = self.zone();
            let query = ImageQuery::new(&config.image_id, &self.config);
            let image_id = self.resolve_image_id(&query).await?;

            if let Some(ignored) = config
                .security_group_ids
                .get(1..)
                .filter(|rest| !rest.is_empty())
            {
                warn!(?ignored, "scaleway attaches one security group per server; extra groups ignored");
            }

            let server = self
                .create_instance_stopped(&zone, config, &image_id)
                .await?;
            let snapshot = InstanceSnapshot::from(server);
            info!(instance_id = snapshot.id.as_str(), %image_id, "server created");

            if let Err(err) = self.power_on_if_needed(&zone, &snapshot).await {
                warn!(
                    instance_id = snapshot.id.as_str(),
                    error = %err,
                    "power-on failed; deleting server"
                );
                let cleanup = self
                    .api
                    .delete_instance_async(zone.as_str(), snapshot.id.as_str())
                    .await
                    .map_err(ScalewayProviderError::from);
                return Err(lifecycle::unstarted_server_error(&snapshot.id, &err, cleanup));
            }
            Ok(InstanceId::from(snapshot.id.as_str()))
        })
    }

    fn describe<'a>(
        &'a self,
        id: &'a InstanceId,
    ) -> ProviderFuture<'a, InstanceStatus, Self::Error> {
        Box::pin(async move {
            let snapshot = self
                .fetch_instance(&self.zone(), &ServerId::from(id.as_str()))
                .await?;
            Ok(lifecycle::status_of(snapshot))
        })
    }

    fn terminate<'a>(&'a self, id: &'a InstanceId) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.tear_down(&self.zone(), &ServerId::from(id.as_str())).await
        })
    }
}
