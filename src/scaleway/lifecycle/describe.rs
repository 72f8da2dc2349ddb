//! Server lookups for the Scaleway provider.

use crate::provider::{InstanceState, InstanceStatus};
use crate::scaleway::types::{ServerId, Zone};

use super::super::{ScalewayProvider, ScalewayProviderError};
use super::InstanceSnapshot;

impl ScalewayProvider {
    pub(in crate::scaleway) async fn fetch_instance(
        &self,
        zone: &Zone,
        id: &ServerId,
    ) -> Result<Option<InstanceSnapshot>, ScalewayProviderError> {
        let mut servers = self
            .api
            .list_instances(zone.as_str())
            .servers(id.as_str())
            .per_page(1)
            .run_async()
            .await?;

        Ok(servers.pop().map(InstanceSnapshot::from))
    }
}

/// Maps a server snapshot onto the provider-neutral status.
///
/// A server the API no longer lists has been terminated.
pub(crate) fn status_of(snapshot: Option<InstanceSnapshot>) -> InstanceStatus {
    let Some(server) = snapshot else {
        return InstanceStatus::terminated();
    };

    let state = match server.state.as_str() {
        "running" => InstanceState::Running,
        "starting" => InstanceState::Pending,
        "stopping" => InstanceState::Stopping,
        "stopped" | "stopped in place" => InstanceState::Stopped,
        other => InstanceState::Other(other.to_owned()),
    };

    InstanceStatus {
        state,
        public_address: server.public_ip.filter(|ip| !ip.trim().is_empty()),
    }
}
