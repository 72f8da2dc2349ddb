//! Server removal for the Scaleway provider.
//!
//! The `terminate` action is only accepted while a server runs. Stopped
//! servers are deleted instead; either way the caller polls until the server
//! no longer lists.

use tracing::{debug, info};

use crate::scaleway::types::{ServerId, Zone};

use super::super::{ScalewayProvider, ScalewayProviderError};
use super::InstanceSnapshot;

/// How a server is removed given its current snapshot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Teardown {
    AlreadyGone,
    Terminate,
    Delete,
}

pub(crate) fn teardown_for(snapshot: Option<&InstanceSnapshot>) -> Teardown {
    let Some(server) = snapshot else {
        return Teardown::AlreadyGone;
    };

    if server
        .allowed_actions
        .iter()
        .any(|action| action.as_str() == "terminate")
    {
        return Teardown::Terminate;
    }

    match server.state.as_str() {
        "stopped" | "stopped in place" => Teardown::Delete,
        _ => Teardown::Terminate,
    }
}

impl ScalewayProvider {
    pub(in crate::scaleway) async fn tear_down(
        &self,
        zone: &Zone,
        id: &ServerId,
    ) -> Result<(), ScalewayProviderError> {
        let snapshot = self.fetch_instance(zone, id).await?;
        match teardown_for(snapshot.as_ref()) {
            Teardown::AlreadyGone => {
                debug!(instance_id = id.as_str(), "server already gone");
            }
            Teardown::Terminate => {
                self.api
                    .perform_instance_action_async(zone.as_str(), id.as_str(), "terminate")
                    .await?;
            }
            Teardown::Delete => {
                info!(instance_id = id.as_str(), "server is stopped; deleting it");
                self.api
                    .delete_instance_async(zone.as_str(), id.as_str())
                    .await?;
            }
        }
        Ok(())
    }
}
