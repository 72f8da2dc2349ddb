//! Unit tests for Scaleway lifecycle helpers.

use std::collections::HashMap;

use rstest::rstest;
use scaleway_rs::{ScalewayApi, ScalewayImage};
use serde_json::json;

use super::teardown::{Teardown, teardown_for};
use super::{ImageQuery, InstanceSnapshot, status_of, unstarted_server_error};
use crate::ScalewayConfig;
use crate::config::ProvisionConfig;
use crate::provider::{IngressRule, InstanceState};
use crate::scaleway::lifecycle::ingress::CreateRuleRequest;
use crate::scaleway::types::{Action, ServerId, ServerState, Zone};
use crate::scaleway::{ScalewayProvider, ScalewayProviderError};

fn snapshot(
    id: impl Into<ServerId>,
    state: impl Into<ServerState>,
    allowed: impl IntoIterator<Item = impl Into<Action>>,
    public_ip: Option<&str>,
) -> InstanceSnapshot {
    InstanceSnapshot {
        id: id.into(),
        state: state.into(),
        allowed_actions: allowed.into_iter().map(Into::into).collect(),
        public_ip: public_ip.map(str::to_owned),
    }
}

#[derive(Copy, Clone)]
struct ImageSpec {
    id: &'static str,
    arch: &'static str,
    state: &'static str,
    creation_date: &'static str,
}

fn image(spec: ImageSpec) -> ScalewayImage {
    ScalewayImage {
        id: spec.id.to_owned(),
        name: String::new(),
        arch: spec.arch.to_owned(),
        creation_date: spec.creation_date.to_owned(),
        modification_date: String::new(),
        from_server: None,
        organization: String::new(),
        public: true,
        state: spec.state.to_owned(),
        project: String::new(),
        tags: vec![],
        zone: String::new(),
        root_volume: scaleway_rs::ScalewayImageRootVolume {
            id: String::new(),
            name: String::new(),
            size: 0,
            volume_type: String::new(),
        },
        default_bootscript: None,
        extra_volumes: scaleway_rs::ScalewayImageExtraVolumes {
            volumes: HashMap::new(),
        },
    }
}

fn dummy_config() -> ScalewayConfig {
    ScalewayConfig {
        access_key: None,
        secret_key: String::from("dummy"),
        default_organization_id: None,
        default_project_id: String::from("proj"),
        default_zone: String::from("zone"),
        default_architecture: String::from("x86_64"),
    }
}

fn base_query() -> ImageQuery {
    ImageQuery::new("label", &dummy_config())
}

fn provider_fixture() -> ScalewayProvider {
    ScalewayProvider {
        api: ScalewayApi::new("dummy"),
        config: dummy_config(),
    }
}

#[tokio::test]
async fn power_on_if_needed_returns_ok_for_running() {
    let snap = snapshot("id", "running", [Action::from("poweron")], Some("1.1.1.1"));
    let zone = Zone::from("zone");
    let result = provider_fixture().power_on_if_needed(&zone, &snap).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn power_on_if_needed_errors_when_not_allowed() {
    let snap = snapshot("id", "stopped", Vec::<Action>::new(), None);
    let zone = Zone::from("zone");
    let result = provider_fixture().power_on_if_needed(&zone, &snap).await;
    assert!(matches!(
        result,
        Err(ScalewayProviderError::PowerOnNotAllowed { .. })
    ));
}

#[rstest]
#[case("running", InstanceState::Running)]
#[case("starting", InstanceState::Pending)]
#[case("stopping", InstanceState::Stopping)]
#[case("stopped", InstanceState::Stopped)]
#[case("stopped in place", InstanceState::Stopped)]
#[case("locked", InstanceState::Other(String::from("locked")))]
fn server_states_map_onto_instance_states(#[case] raw: &str, #[case] expected: InstanceState) {
    let status = status_of(Some(snapshot("id", raw, Vec::<Action>::new(), Some("51.15.0.1"))));

    assert_eq!(status.state, expected);
    assert_eq!(status.public_address.as_deref(), Some("51.15.0.1"));
}

#[test]
fn missing_server_is_terminated() {
    let status = status_of(None);

    assert_eq!(status.state, InstanceState::Terminated);
    assert!(status.public_address.is_none());
}

#[test]
fn blank_public_ip_is_treated_as_unassigned() {
    let status = status_of(Some(snapshot("id", "running", Vec::<Action>::new(), Some(""))));

    assert!(status.public_address.is_none());
}

#[test]
fn create_request_starts_stopped_with_first_security_group() {
    let config = ProvisionConfig {
        instance_type: String::from("DEV1-M"),
        key_name: String::from("deploy"),
        security_group_ids: vec![String::from("sg-1"), String::from("sg-2")],
        ..ProvisionConfig::default()
    };

    let payload = serde_json::to_value(provider_fixture().create_request(&config, "img-1"))
        .expect("serialise payload");

    assert_eq!(payload["commercial_type"], json!("DEV1-M"));
    assert_eq!(payload["image"], json!("img-1"));
    assert_eq!(payload["project"], json!("proj"));
    assert_eq!(payload["stopped"], json!(true));
    assert_eq!(payload["security_group"], json!("sg-1"));
    assert_eq!(
        payload["tags"],
        json!(["hoist", "ephemeral", "ssh-key=deploy"])
    );
    assert!(payload.get("organization").is_none());
    assert!(
        payload["name"]
            .as_str()
            .is_some_and(|name| name.starts_with("hoist-")),
        "unexpected name: {payload}"
    );
}

#[test]
fn every_create_request_gets_a_fresh_name() {
    let provider = provider_fixture();
    let config = ProvisionConfig::default();

    let first = serde_json::to_value(provider.create_request(&config, "img")).expect("first");
    let second = serde_json::to_value(provider.create_request(&config, "img")).expect("second");

    assert_ne!(first["name"], second["name"]);
    assert!(first.get("security_group").is_none());
}

#[test]
fn ingress_rule_payload_opens_a_single_tcp_port() {
    let rule = IngressRule {
        security_group: String::from("sg-1"),
        cidr: String::from("203.0.113.0/24"),
        port: 9000,
    };

    let payload = serde_json::to_value(CreateRuleRequest::from(&rule)).expect("serialise rule");

    assert_eq!(
        payload,
        json!({
            "protocol": "TCP",
            "direction": "inbound",
            "action": "accept",
            "ip_range": "203.0.113.0/24",
            "dest_port_from": 9000,
            "dest_port_to": 9000
        })
    );
}

#[test]
fn provider_rejects_incomplete_credentials() {
    let config = ScalewayConfig {
        secret_key: String::new(),
        ..dummy_config()
    };

    let err = ScalewayProvider::new(config).expect_err("secret key is required");

    assert!(matches!(err, ScalewayProviderError::Config(ref message) if message.contains("SCW_SECRET_KEY")));
}

#[test]
fn debug_output_hides_the_secret_key() {
    let rendered = format!("{:?}", provider_fixture());

    assert!(rendered.contains("ScalewayProvider"), "{rendered}");
    assert!(!rendered.contains("dummy"), "secret leaked: {rendered}");
}

#[rstest]
#[case("running", vec!["poweroff", "terminate", "reboot"], Teardown::Terminate)]
#[case("stopped", vec!["poweron", "backup"], Teardown::Delete)]
#[case("stopped in place", vec!["poweron", "poweroff"], Teardown::Delete)]
#[case("stopped", vec!["poweron", "terminate"], Teardown::Terminate)]
#[case("starting", vec![], Teardown::Terminate)]
fn teardown_matches_server_state(
    #[case] state: &str,
    #[case] allowed: Vec<&str>,
    #[case] expected: Teardown,
) {
    let snap = snapshot("srv-1", state, allowed, None);

    assert_eq!(teardown_for(Some(&snap)), expected);
}

#[test]
fn missing_server_needs_no_teardown() {
    assert_eq!(teardown_for(None), Teardown::AlreadyGone);
}

#[test]
fn unstarted_server_that_was_deleted_is_named_in_the_error() {
    let power_on = ScalewayProviderError::PowerOnNotAllowed {
        instance_id: String::from("srv-1"),
        state: String::from("locked"),
    };

    let err = unstarted_server_error(&ServerId::from("srv-1"), &power_on, Ok(()));

    assert_eq!(
        err,
        ScalewayProviderError::PowerOnFailed {
            instance_id: String::from("srv-1"),
            reason: String::from("instance srv-1 in state locked cannot be powered on"),
        }
    );
}

#[test]
fn unstarted_server_left_behind_points_at_stop() {
    let power_on = ScalewayProviderError::provider("quota exceeded");
    let cleanup = Err(ScalewayProviderError::provider("connection reset"));

    let err = unstarted_server_error(&ServerId::from("srv-2"), &power_on, cleanup);

    assert!(matches!(
        err,
        ScalewayProviderError::ServerLeftBehind { ref instance_id, .. } if instance_id == "srv-2"
    ));
    let message = err.to_string();
    assert!(message.contains("connection reset"), "{message}");
    assert!(message.contains("hoist stop srv-2"), "{message}");
}
