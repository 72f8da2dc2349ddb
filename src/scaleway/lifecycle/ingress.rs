//! Security group rules for the Scaleway provider.

use serde::Serialize;
use tracing::debug;

use crate::provider::IngressRule;
use crate::scaleway::types::Zone;

use super::super::{ScalewayProvider, ScalewayProviderError};

#[derive(Debug, Serialize)]
pub(super) struct CreateRuleRequest {
    protocol: &'static str,
    direction: &'static str,
    action: &'static str,
    ip_range: String,
    dest_port_from: u16,
    dest_port_to: u16,
}

impl From<&IngressRule> for CreateRuleRequest {
    fn from(rule: &IngressRule) -> Self {
        Self {
            protocol: "TCP",
            direction: "inbound",
            action: "accept",
            ip_range: rule.cidr.clone(),
            dest_port_from: rule.port,
            dest_port_to: rule.port,
        }
    }
}

impl ScalewayProvider {
    /// Adds an inbound TCP accept rule to the rule's security group.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayProviderError::Provider`] when the request fails or
    /// the API rejects the rule, for example because it already exists.
    pub(in crate::scaleway) async fn add_ingress_rule(
        &self,
        zone: &Zone,
        rule: &IngressRule,
    ) -> Result<(), ScalewayProviderError> {
        let url = format!(
            "{}/zones/{}/security_groups/{}/rules",
            super::SCALEWAY_INSTANCE_API_BASE,
            zone.as_str(),
            rule.security_group
        );
        debug!(%url, cidr = %rule.cidr, port = rule.port, "adding security group rule");

        let response = super::HTTP_CLIENT
            .post(&url)
            .header("X-Auth-Token", &self.config.secret_key)
            .json(&CreateRuleRequest::from(rule))
            .send()
            .await
            .map_err(ScalewayProviderError::provider)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .map_err(ScalewayProviderError::provider)?;
        Err(ScalewayProviderError::Provider {
            message: format!("security group rule rejected ({status}): {body}"),
        })
    }
}
