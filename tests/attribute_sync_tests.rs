//! End-to-end tests for the extension attribute reconciler against a mock Graph

use intune_sync::cmd::attribute_sync::{fetch_desired_devices, fetch_tagged_devices, sync};
use intune_sync::config::AttributeSyncConfig;
use intune_sync::graph::GraphClient;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RUN_STATES_PATH: &str =
    "/beta/deviceManagement/deviceCustomAttributeShellScripts/script-1/deviceRunStates";
const PLACEHOLDER: &str = "00000000-0000-0000-0000-000000000000";

fn attribute_config() -> AttributeSyncConfig {
    AttributeSyncConfig {
        script_id: "script-1".into(),
        desired_result: "Compliant".into(),
        sentinel_value: "Compliant".into(),
        extension_attribute: 1,
        operating_system: "MacMDM".into(),
    }
}

fn run_state(id: &str, result: &str, device_name: &str, aad_device_id: &str) -> Value {
    json!({
        "id": id,
        "resultMessage": result,
        "managedDevice": {
            "id": format!("md-{}", id),
            "deviceName": device_name,
            "azureADDeviceId": aad_device_id
        }
    })
}

fn directory_device(object_id: &str, name: &str, attribute: Option<&str>) -> Value {
    directory_device_on("MacMDM", object_id, name, attribute)
}

fn directory_device_on(
    operating_system: &str,
    object_id: &str,
    name: &str,
    attribute: Option<&str>,
) -> Value {
    json!({
        "id": object_id,
        "deviceId": format!("aad-{}", object_id),
        "displayName": name,
        "operatingSystem": operating_system,
        "extensionAttributes": { "extensionAttribute1": attribute }
    })
}

/// Mounts run states for mac-1 (aad-1), mac-2 (placeholder), mac-3 (aad-3)
/// and a non-matching mac-4, plus the directory lookups for aad-1 and aad-3
async fn mount_desired(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(RUN_STATES_PATH))
        .and(query_param("$filter", "resultMessage eq 'Compliant'"))
        .and(query_param("$expand", "managedDevice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                run_state("rs-1", "Compliant", "mac-1", "aad-1"),
                run_state("rs-2", "Compliant", "mac-2", PLACEHOLDER),
                run_state("rs-3", "Compliant", "mac-3", "aad-3"),
                run_state("rs-4", "NotCompliant", "mac-4", "aad-4"),
            ]
        })))
        .mount(server)
        .await;

    for (aad, object_id, name) in [("aad-1", "obj-1", "mac-1"), ("aad-3", "obj-3", "mac-3")] {
        Mock::given(method("GET"))
            .and(path("/v1.0/devices"))
            .and(query_param("$filter", format!("deviceId eq '{}'", aad)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [directory_device(object_id, name, None)]
            })))
            .mount(server)
            .await;
    }
}

async fn mount_tagged(server: &MockServer, devices: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/v1.0/devices"))
        .and(query_param("$filter", "operatingSystem eq 'MacMDM'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": devices })))
        .mount(server)
        .await;
}

async fn patch_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == "PATCH")
        .count()
}

fn client_for(server: &MockServer) -> GraphClient {
    GraphClient::with_host("test-token".into(), &server.uri(), None)
}

#[tokio::test]
async fn test_desired_devices_exclude_placeholder_and_other_results() {
    let server = MockServer::start().await;
    mount_desired(&server).await;

    let found = fetch_desired_devices(&client_for(&server), &attribute_config())
        .await
        .unwrap();
    let (desired, report) = (found.devices, found.report);

    let ids: Vec<&str> = desired.iter().map(|d| d.object_id.as_str()).collect();
    assert_eq!(ids, vec!["obj-1", "obj-3"]);
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_tagged_devices_only_carry_sentinel() {
    let server = MockServer::start().await;
    mount_tagged(
        &server,
        vec![
            directory_device("obj-3", "mac-3", Some("Compliant")),
            directory_device("obj-5", "mac-5", None),
            directory_device("obj-6", "mac-6", Some("Pending")),
        ],
    )
    .await;

    let tagged = fetch_tagged_devices(&client_for(&server), &attribute_config())
        .await
        .unwrap();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].object_id, "obj-3");
    assert_eq!(tagged[0].name, "mac-3");
}

#[tokio::test]
async fn test_sync_sets_and_clears_symmetric_difference() {
    let server = MockServer::start().await;
    mount_desired(&server).await;
    mount_tagged(
        &server,
        vec![
            directory_device("obj-3", "mac-3", Some("Compliant")),
            directory_device("obj-9", "mac-9", Some("Compliant")),
        ],
    )
    .await;

    Mock::given(method("PATCH"))
        .and(path("/v1.0/devices/obj-1"))
        .and(body_json(json!({
            "extensionAttributes": { "extensionAttribute1": "Compliant" }
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/v1.0/devices/obj-9"))
        .and(body_json(json!({
            "extensionAttributes": { "extensionAttribute1": null }
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let report = sync(&client_for(&server), &attribute_config(), false)
        .await
        .unwrap();

    assert_eq!(report.writes, 2);
    assert!(report.is_clean());
    assert_eq!(patch_count(&server).await, 2);
}

#[tokio::test]
async fn test_converged_state_writes_nothing() {
    let server = MockServer::start().await;
    mount_desired(&server).await;
    mount_tagged(
        &server,
        vec![
            directory_device("obj-1", "mac-1", Some("Compliant")),
            directory_device("obj-3", "mac-3", Some("Compliant")),
        ],
    )
    .await;

    let report = sync(&client_for(&server), &attribute_config(), false)
        .await
        .unwrap();

    assert_eq!(report.writes, 0);
    assert_eq!(patch_count(&server).await, 0);
}

#[tokio::test]
async fn test_failed_write_does_not_abort_batch() {
    let server = MockServer::start().await;
    mount_desired(&server).await;
    mount_tagged(
        &server,
        vec![directory_device("obj-9", "mac-9", Some("Compliant"))],
    )
    .await;

    Mock::given(method("PATCH"))
        .and(path("/v1.0/devices/obj-1"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": "Authorization_RequestDenied", "message": "Insufficient privileges" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/v1.0/devices/obj-3"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/v1.0/devices/obj-9"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let report = sync(&client_for(&server), &attribute_config(), false)
        .await
        .unwrap();

    assert_eq!(report.writes, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].target, "set mac-1");
}

#[tokio::test]
async fn test_failed_lookup_skips_device() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(RUN_STATES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                run_state("rs-1", "Compliant", "mac-1", "aad-1"),
                run_state("rs-7", "Compliant", "mac-7", "aad-7"),
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/devices"))
        .and(query_param("$filter", "deviceId eq 'aad-1'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [directory_device("obj-1", "mac-1", None)]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/devices"))
        .and(query_param("$filter", "deviceId eq 'aad-7'"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let found = fetch_desired_devices(&client_for(&server), &attribute_config())
        .await
        .unwrap();
    let (desired, report) = (found.devices, found.report);

    assert_eq!(desired.len(), 1);
    assert_eq!(desired[0].object_id, "obj-1");
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].target, "lookup mac-7");
}

#[tokio::test]
async fn test_tagged_device_outside_listed_os_is_not_rewritten() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(RUN_STATES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [run_state("rs-1", "Compliant", "mac-1", "aad-1")]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/devices"))
        .and(query_param("$filter", "deviceId eq 'aad-1'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [directory_device_on("macOS", "obj-1", "mac-1", Some("Compliant"))]
        })))
        .mount(&server)
        .await;

    mount_tagged(&server, vec![]).await;

    let client = client_for(&server);
    let found = fetch_desired_devices(&client, &attribute_config())
        .await
        .unwrap();
    assert_eq!(found.already_tagged.len(), 1);
    assert_eq!(found.already_tagged[0].object_id, "obj-1");

    for _ in 0..2 {
        let report = sync(&client, &attribute_config(), false).await.unwrap();
        assert_eq!(report.writes, 0);
        assert!(report.is_clean());
    }
    assert_eq!(patch_count(&server).await, 0);
}

#[tokio::test]
async fn test_dry_run_issues_no_patch() {
    let server = MockServer::start().await;
    mount_desired(&server).await;
    mount_tagged(
        &server,
        vec![directory_device("obj-9", "mac-9", Some("Compliant"))],
    )
    .await;

    let report = sync(&client_for(&server), &attribute_config(), true)
        .await
        .unwrap();

    assert_eq!(report.planned, 3);
    assert_eq!(report.writes, 0);
    assert_eq!(patch_count(&server).await, 0);
}

#[tokio::test]
async fn test_run_state_fetch_failure_is_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(RUN_STATES_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = sync(&client_for(&server), &attribute_config(), false).await;
    assert!(result.is_err());
    assert_eq!(patch_count(&server).await, 0);
}
