//! Instance lifecycle helpers for the Scaleway provider.

use std::sync::LazyLock;
use std::time::Duration;

mod create;
mod describe;
mod image;
mod ingress;
mod teardown;

pub(crate) use create::unstarted_server_error;
pub(crate) use describe::status_of;
pub(crate) use image::ImageQuery;

use crate::scaleway::types::{Action, ServerId, ServerState};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const SCALEWAY_INSTANCE_API_BASE: &str = "https://api.scaleway.com/instance/v1";

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceSnapshot {
    pub(crate) id: ServerId,
    pub(crate) state: ServerState,
    pub(crate) allowed_actions: Vec<Action>,
    pub(crate) public_ip: Option<String>,
}

impl From<scaleway_rs::ScalewayInstance> for InstanceSnapshot {
    fn from(server: scaleway_rs::ScalewayInstance) -> Self {
        Self {
            id: server.id.into(),
            state: server.state.into(),
            allowed_actions: server
                .allowed_actions
                .into_iter()
                .map(Action::from)
                .collect(),
            public_ip: server.public_ip.map(|ip| ip.address),
        }
    }
}

#[cfg(test)]
mod tests;
