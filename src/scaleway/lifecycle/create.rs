//! Server creation for the Scaleway provider.
//!
//! Servers are created with `stopped: true` and powered on once the create
//! call returns, so a rejected power-on surfaces before any polling starts.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::ProvisionConfig;
use crate::scaleway::types::{ServerId, Zone};

use super::super::{ScalewayProvider, ScalewayProviderError};
use super::InstanceSnapshot;

const SERVER_NAME_PREFIX: &str = "hoist";

#[derive(Debug, Serialize)]
pub(super) struct CreateServerRequest {
    name: String,
    commercial_type: String,
    image: String,
    project: String,
    routed_ip_enabled: bool,
    dynamic_ip_required: bool,
    tags: Vec<String>,
    stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    security_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    organization: Option<String>,
}

#[derive(Deserialize)]
struct CreateServerResponse {
    server: scaleway_rs::ScalewayInstance,
}

/// Error for a server that was created but never started, naming the server
/// so it can still be found when the cleanup delete failed.
pub(crate) fn unstarted_server_error(
    id: &ServerId,
    power_on: &ScalewayProviderError,
    cleanup: Result<(), ScalewayProviderError>,
) -> ScalewayProviderError {
    let instance_id = id.as_str().to_owned();
    let reason = power_on.to_string();
    match cleanup {
        Ok(()) => ScalewayProviderError::PowerOnFailed {
            instance_id,
            reason,
        },
        Err(err) => ScalewayProviderError::ServerLeftBehind {
            instance_id,
            reason,
            cleanup: err.to_string(),
        },
    }
}

impl ScalewayProvider {
    pub(super) fn server_tags(key_name: &str) -> Vec<String> {
        let mut tags = vec![String::from(SERVER_NAME_PREFIX), String::from("ephemeral")];
        if !key_name.trim().is_empty() {
            tags.push(format!("ssh-key={key_name}"));
        }
        tags
    }

    pub(super) fn create_request(
        &self,
        config: &ProvisionConfig,
        image_id: &str,
    ) -> CreateServerRequest {
        CreateServerRequest {
            name: format!("{SERVER_NAME_PREFIX}-{}", Uuid::new_v4().simple()),
            commercial_type: config.instance_type.clone(),
            image: image_id.to_owned(),
            project: self.config.default_project_id.clone(),
            routed_ip_enabled: true,
            dynamic_ip_required: true,
            tags: Self::server_tags(&config.key_name),
            stopped: true,
            security_group: config.security_group_ids.first().cloned(),
            organization: self.config.default_organization_id.clone(),
        }
    }

    pub(in crate::scaleway) async fn power_on_if_needed(
        &self,
        zone: &Zone,
        snapshot: &InstanceSnapshot,
    ) -> Result<(), ScalewayProviderError> {
        if matches!(snapshot.state.as_str(), "running" | "starting") {
            return Ok(());
        }

        if snapshot
            .allowed_actions
            .iter()
            .any(|action| action.as_str() == "poweron")
        {
            debug!(instance_id = snapshot.id.as_str(), "powering on server");
            self.api
                .perform_instance_action_async(zone.as_str(), snapshot.id.as_str(), "poweron")
                .await?;
            return Ok(());
        }

        Err(ScalewayProviderError::PowerOnNotAllowed {
            instance_id: snapshot.id.as_str().to_owned(),
            state: snapshot.state.as_str().to_owned(),
        })
    }

    /// Creates a server in the stopped state.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayProviderError`] when the request fails or the
    /// provider rejects the requested instance type or image.
    pub(in crate::scaleway) async fn create_instance_stopped(
        &self,
        zone: &Zone,
        config: &ProvisionConfig,
        image_id: &str,
    ) -> Result<scaleway_rs::ScalewayInstance, ScalewayProviderError> {
        let url = format!(
            "{}/zones/{}/servers",
            super::SCALEWAY_INSTANCE_API_BASE,
            zone.as_str()
        );
        let payload = self.create_request(config, image_id);

        let response = super::HTTP_CLIENT
            .post(&url)
            .header("X-Auth-Token", &self.config.secret_key)
            .json(&payload)
            .send()
            .await
            .map_err(ScalewayProviderError::provider)?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(ScalewayProviderError::provider)?;

        if status.is_success() {
            let parsed: CreateServerResponse =
                serde_json::from_slice(&body).map_err(ScalewayProviderError::provider)?;
            return Ok(parsed.server);
        }

        if let Ok(api_err) = serde_json::from_slice::<scaleway_rs::ScalewayApiError>(&body)
            && Self::is_instance_type_error(&api_err, &config.instance_type)
        {
            return Err(ScalewayProviderError::InstanceTypeUnavailable {
                instance_type: config.instance_type.clone(),
                zone: zone.as_str().to_owned(),
            });
        }

        Err(ScalewayProviderError::Provider {
            message: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}
