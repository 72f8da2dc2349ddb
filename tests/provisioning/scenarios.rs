//! BDD scenarios for the provisioning lifecycle.

use rstest_bdd_macros::scenario;

use super::test_helpers::{ProvisionContext, provision_context};

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Start drives a fresh instance to ready"
)]
fn scenario_start_reaches_ready(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Failed bootstrap commands are recorded and the run continues"
)]
fn scenario_bootstrap_failure_continues(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "A failing service start halts the run"
)]
fn scenario_service_start_failure(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "An instance that disappears while booting is reported as gone"
)]
fn scenario_instance_disappears(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Stopping an already terminated instance succeeds"
)]
fn scenario_stop_already_terminated(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Stopping waits until the instance is gone"
)]
fn scenario_stop_waits(provision_context: ProvisionContext) {
    let _ = provision_context;
}
