//! Runs the ARM client and the lifecycle against a local server that answers
//! like Azure Resource Manager: async-operation and location polling, plain
//! synchronous responses, failures and missing resources.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use launch_vm::azure::{ArmClient, ArmError, AzureApi, Credential, OperationContext};
use launch_vm::{Config, Lifecycle, NicMode, ResourceApi, Stage, build_launch_plan};

const TOKEN: &str = "test-token";

#[derive(Default)]
struct FakeArm {
    base: Mutex<String>,
    requests: Mutex<Vec<String>>,
    polls: Mutex<HashMap<String, usize>>,
}

impl FakeArm {
    fn poll(&self, key: &str) -> usize {
        let mut polls = self.polls.lock().unwrap();
        let count = polls.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Create and delete calls, in order.
    fn mutations(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !r.starts_with("GET"))
            .cloned()
            .collect()
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn reply(status: u16, headers: &[(&str, String)], body: Option<Value>) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(status).unwrap())
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, value);
    }
    let body = body.map(|b| b.to_string()).unwrap_or_default();
    builder.body(Body::from(body)).unwrap()
}

fn resource(path: &str, state: &str) -> Value {
    json!({"id": path, "properties": {"provisioningState": state}})
}

async fn handle(
    State(arm): State<Arc<FakeArm>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", TOKEN));
    if !authorized {
        let error = json!({"error": {"code": "AuthenticationFailed", "message": "bad token"}});
        return reply(401, &[], Some(error));
    }

    let path = uri.path().to_string();
    arm.requests
        .lock()
        .unwrap()
        .push(format!("{} {}", method, path));
    let base = arm.base.lock().unwrap().clone();
    let name = path.rsplit('/').next().unwrap_or_default().to_string();
    let now = [("retry-after", "0".to_string())];

    if path.starts_with("/operations/") {
        let count = arm.poll(&path);
        let status = match name.as_str() {
            "fail" => json!({
                "status": "Failed",
                "error": {"code": "OSProvisioningTimedOut", "message": "guest agent never reported"}
            }),
            "never" => json!({"status": "InProgress"}),
            _ if count < 2 => json!({"status": "InProgress"}),
            _ => json!({"status": "Succeeded"}),
        };
        return reply(200, &now, Some(status));
    }
    if path.starts_with("/locations/") {
        return if arm.poll(&path) < 2 {
            let next = ("location", format!("{}{}", base, path));
            reply(202, &[next, now[0].clone()], None)
        } else {
            reply(200, &[], None)
        };
    }

    let is_vm = path.contains("/virtualMachines/");
    match (method.as_str(), name.as_str()) {
        ("PUT", "vm-bad") => reply(
            201,
            &[("azure-asyncoperation", format!("{}/operations/fail", base))],
            Some(resource(&path, "Creating")),
        ),
        ("PUT", "vm-slow") => reply(
            201,
            &[("azure-asyncoperation", format!("{}/operations/never", base))],
            Some(resource(&path, "Creating")),
        ),
        ("PUT", "vm-mixed") => reply(
            201,
            &[
                ("azure-asyncoperation", format!("{}/operations/vm-mixed", base)),
                ("location", "not a url".to_string()),
                now[0].clone(),
            ],
            Some(resource(&path, "Creating")),
        ),
        ("PUT", "nic-pending") => reply(201, &[], Some(resource(&path, "Updating"))),
        ("PUT", _) if is_vm => reply(
            201,
            &[
                ("azure-asyncoperation", format!("{}/operations/{}", base, name)),
                now[0].clone(),
            ],
            Some(resource(&path, "Creating")),
        ),
        ("PUT", _) => reply(200, &[], Some(resource(&path, "Succeeded"))),
        ("GET", "nic-pending") => {
            let state = if arm.poll(&path) < 2 { "Updating" } else { "Succeeded" };
            reply(200, &[], Some(resource(&path, state)))
        }
        ("GET", _) => reply(200, &[], Some(resource(&path, "Succeeded"))),
        ("DELETE", "gone") => reply(
            404,
            &[],
            Some(json!({"error": {"code": "NotFound", "message": "The resource was not found."}})),
        ),
        ("DELETE", _) if is_vm => reply(
            202,
            &[
                ("location", format!("{}/locations/{}", base, name)),
                now[0].clone(),
            ],
            None,
        ),
        ("DELETE", _) => reply(204, &[], None),
        _ => reply(405, &[], None),
    }
}

async fn spawn_arm() -> (Arc<FakeArm>, String) {
    let arm = Arc::new(FakeArm::default());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    *arm.base.lock().unwrap() = base.clone();

    let app = Router::new().fallback(handle).with_state(arm.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (arm, base)
}

fn api(base: &str, token: &str) -> AzureApi {
    let client = ArmClient::new(base, "sub1", Credential::AccessToken(token.to_string()))
        .with_http_client(reqwest::Client::new())
        .with_poll_interval(Duration::from_millis(10));
    AzureApi::new(client, "rg1")
}

fn ctx(timeout: Duration) -> OperationContext {
    OperationContext::new(timeout, CancellationToken::new())
}

fn config(key: &tempfile::NamedTempFile, name: &str, nic_mode: NicMode) -> Config {
    Config {
        resource_group: "rg1".to_string(),
        subnet_id: "/subs/x/subnet1".to_string(),
        image_id: "/subs/x/img1".to_string(),
        subscription_id: "sub1".to_string(),
        secure_boot: false,
        confidential: false,
        location: "westeurope".to_string(),
        vm_name: name.to_string(),
        instance_size: "Standard_DC2as_v5".to_string(),
        keep: false,
        ssh_public_key_path: key.path().to_path_buf(),
        admin_username: "azureuser".to_string(),
        nic_mode,
        disk_size_gb: None,
        arm_endpoint: String::new(),
        operation_timeout: Duration::from_secs(10),
        poll_interval: Duration::from_millis(10),
        dry_run: false,
    }
}

fn key_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "ssh-ed25519 AAAAC3Nza me@host").unwrap();
    file
}

const RG: &str = "/subscriptions/sub1/resourceGroups/rg1/providers";

#[tokio::test]
async fn full_lifecycle_in_order() {
    let (arm, base) = spawn_arm().await;
    let api = api(&base, TOKEN);
    let key = key_file();
    let plan = build_launch_plan(&config(&key, "vm1", NicMode::Standalone)).unwrap();

    let mut lifecycle = Lifecycle::new(&api, ctx(Duration::from_secs(10)));
    let outcome = lifecycle.run(&plan, false).await.unwrap();

    assert_eq!(lifecycle.stage(), Stage::Done);
    assert_eq!(
        outcome.vm_id,
        format!("{}/Microsoft.Compute/virtualMachines/vm1", RG)
    );
    assert_eq!(
        arm.mutations(),
        vec![
            format!("PUT {}/Microsoft.Network/networkInterfaces/vm1-nic", RG),
            format!("PUT {}/Microsoft.Compute/virtualMachines/vm1", RG),
            format!("DELETE {}/Microsoft.Compute/virtualMachines/vm1", RG),
            format!("DELETE {}/Microsoft.Compute/disks/vm1-disk", RG),
            format!("DELETE {}/Microsoft.Network/networkInterfaces/vm1-nic", RG),
        ]
    );
}

#[tokio::test]
async fn create_polls_async_operation_then_reads_resource() {
    let (arm, base) = spawn_arm().await;
    let api = api(&base, TOKEN);
    let key = key_file();
    let plan = build_launch_plan(&config(&key, "vm2", NicMode::Inline)).unwrap();

    let id = api
        .create_virtual_machine(&ctx(Duration::from_secs(10)), "vm2", &plan.virtual_machine)
        .await
        .unwrap();

    assert!(id.ends_with("/virtualMachines/vm2"));
    let vm = format!("{}/Microsoft.Compute/virtualMachines/vm2", RG);
    assert_eq!(
        arm.requests(),
        vec![
            format!("PUT {}", vm),
            "GET /operations/vm2".to_string(),
            "GET /operations/vm2".to_string(),
            format!("GET {}", vm),
        ]
    );
}

#[tokio::test]
async fn async_operation_wins_over_unusable_location() {
    let (arm, base) = spawn_arm().await;
    let api = api(&base, TOKEN);
    let key = key_file();
    let plan = build_launch_plan(&config(&key, "vm-mixed", NicMode::Inline)).unwrap();

    let id = api
        .create_virtual_machine(&ctx(Duration::from_secs(10)), "vm-mixed", &plan.virtual_machine)
        .await
        .unwrap();

    assert!(id.ends_with("/virtualMachines/vm-mixed"));
    assert_eq!(
        arm.requests()
            .iter()
            .filter(|r| r.as_str() == "GET /operations/vm-mixed")
            .count(),
        2
    );
}

#[tokio::test]
async fn create_polls_provisioning_state_without_headers() {
    let (arm, base) = spawn_arm().await;
    let api = api(&base, TOKEN);

    let nic = launch_vm::vm::builder::build_network_interface("westeurope", "/subs/x/subnet1");
    let id = api
        .create_network_interface(&ctx(Duration::from_secs(10)), "nic-pending", &nic)
        .await
        .unwrap();

    assert!(id.ends_with("/networkInterfaces/nic-pending"));
    assert_eq!(arm.requests().len(), 3);
}

#[tokio::test]
async fn delete_follows_location_until_done() {
    let (arm, base) = spawn_arm().await;
    let api = api(&base, TOKEN);

    api.delete_virtual_machine(&ctx(Duration::from_secs(10)), "vm3")
        .await
        .unwrap();

    assert_eq!(
        arm.requests(),
        vec![
            format!("DELETE {}/Microsoft.Compute/virtualMachines/vm3", RG),
            "GET /locations/vm3".to_string(),
            "GET /locations/vm3".to_string(),
        ]
    );
}

#[tokio::test]
async fn failed_operation_is_reported_with_its_code() {
    let (_arm, base) = spawn_arm().await;
    let api = api(&base, TOKEN);
    let key = key_file();
    let plan = build_launch_plan(&config(&key, "vm-bad", NicMode::Standalone)).unwrap();

    let mut lifecycle = Lifecycle::new(&api, ctx(Duration::from_secs(10)));
    let err = lifecycle.run(&plan, false).await.unwrap_err();

    assert_eq!(lifecycle.stage(), Stage::VmCreating);
    match err.downcast_ref::<ArmError>() {
        Some(ArmError::OperationFailed { status, code, .. }) => {
            assert_eq!(status, "Failed");
            assert_eq!(code, "OSProvisioningTimedOut");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn deleting_a_missing_resource_fails() {
    let (_arm, base) = spawn_arm().await;
    let api = api(&base, TOKEN);

    let err = api
        .delete_disk(&ctx(Duration::from_secs(10)), "gone")
        .await
        .unwrap_err();

    let arm_error = err.downcast_ref::<ArmError>().expect("ARM error");
    assert_eq!(arm_error.status(), Some(reqwest::StatusCode::NOT_FOUND));
    assert!(arm_error.to_string().contains("NotFound"));
}

#[tokio::test]
async fn already_absent_resource_deletes_cleanly() {
    let (_arm, base) = spawn_arm().await;
    let api = api(&base, TOKEN);

    api.delete_network_interface(&ctx(Duration::from_secs(10)), "vm1-nic")
        .await
        .unwrap();
}

#[tokio::test]
async fn slow_operation_hits_the_deadline() {
    let (_arm, base) = spawn_arm().await;
    let api = api(&base, TOKEN);
    let key = key_file();
    let plan = build_launch_plan(&config(&key, "vm-slow", NicMode::Inline)).unwrap();

    let err = api
        .create_virtual_machine(&ctx(Duration::from_millis(300)), "vm-slow", &plan.virtual_machine)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ArmError>(),
        Some(ArmError::Timeout { resource, .. }) if resource == "vm-slow"
    ));
}

#[tokio::test]
async fn bad_token_is_rejected_before_anything_is_created() {
    let (arm, base) = spawn_arm().await;
    let api = api(&base, "wrong");
    let key = key_file();
    let plan = build_launch_plan(&config(&key, "vm1", NicMode::Standalone)).unwrap();

    let mut lifecycle = Lifecycle::new(&api, ctx(Duration::from_secs(10)));
    let err = lifecycle.run(&plan, true).await.unwrap_err();

    assert_eq!(lifecycle.stage(), Stage::NicCreating);
    let arm_error = err.downcast_ref::<ArmError>().expect("ARM error");
    assert_eq!(arm_error.status(), Some(reqwest::StatusCode::UNAUTHORIZED));
    assert!(arm.requests().is_empty());
}
