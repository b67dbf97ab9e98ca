use crate::{ApiBackend, Backend, BackendError, CloneMode, OpContext, VmConfig, VmStatus};
use std::io::Write;
use std::net::Ipv4Addr;
use std::time::Duration;
use wiremock::{
    Mock, MockServer, Request, ResponseTemplate,
    matchers::{body_string_contains, method, path},
};

const TOKEN: &str = "root@pam!agentlab=00000000-0000-0000-0000-000000000000";
const UPID: &str = "UPID:pve:0000ABCD:00001234:65B2C3D4:qmclone:9000:root@pam:";

fn fast(builder: crate::ApiBackendBuilder) -> crate::ApiBackendBuilder {
    builder
        .task_backoff(Duration::from_millis(5), Duration::from_millis(20))
        .guest_ip_backoff(Duration::from_millis(5), Duration::from_millis(20))
}

async fn create_test_backend(mock_server: &MockServer) -> ApiBackend {
    fast(ApiBackend::builder())
        .base_url(mock_server.uri())
        .token(TOKEN)
        .node("pve")
        .dhcp_lease_paths(Vec::new())
        .build()
        .await
        .unwrap()
}

async fn mount_task_ok(mock_server: &MockServer, upid: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/api2/json/nodes/pve/tasks/{}/status", upid)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"status": "stopped", "exitstatus": "OK"}
        })))
        .mount(mock_server)
        .await;
}

fn form_value(request: &Request, key: &str) -> Option<String> {
    url::form_urlencoded::parse(&request.body)
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

#[tokio::test]
async fn test_linked_clone_falls_back_to_full() {
    let mock_server = MockServer::start().await;
    let backend = fast(ApiBackend::builder())
        .base_url(mock_server.uri())
        .token(TOKEN)
        .node("pve")
        .clone_mode(CloneMode::Linked)
        .build()
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve/qemu/9000/clone"))
        .and(body_string_contains("full=0"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "errors": {"": "linked clone requires snapshot support"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve/qemu/9000/clone"))
        .and(body_string_contains("full=1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": UPID})))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_task_ok(&mock_server, UPID).await;

    backend
        .clone_vm(&OpContext::new(), 9000, 101, "sandbox-101")
        .await
        .unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    let posts: Vec<_> = requests
        .iter()
        .filter(|r| r.method.as_str() == "POST")
        .collect();
    assert_eq!(posts.len(), 2);
    assert_eq!(form_value(posts[0], "full").as_deref(), Some("0"));
    assert_eq!(form_value(posts[1], "full").as_deref(), Some("1"));
    assert_eq!(form_value(posts[1], "newid").as_deref(), Some("101"));
    assert_eq!(form_value(posts[1], "name").as_deref(), Some("sandbox-101"));
}

#[tokio::test]
async fn test_full_clone_failure_not_retried() {
    let mock_server = MockServer::start().await;
    let backend = create_test_backend(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve/qemu/9000/clone"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "errors": {"": "linked clone requires snapshot support"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = backend
        .clone_vm(&OpContext::new(), 9000, 101, "")
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Api { status: 500, .. }));
}

#[tokio::test]
async fn test_failed_clone_task_surfaces_exit_status() {
    let mock_server = MockServer::start().await;
    let backend = create_test_backend(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve/qemu/9000/clone"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": UPID})))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api2/json/nodes/pve/tasks/{}/status", UPID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"status": "stopped", "exitstatus": "clone failed: out of space"}
        })))
        .mount(&mock_server)
        .await;

    let err = backend
        .clone_vm(&OpContext::new(), 9000, 101, "")
        .await
        .unwrap_err();
    match err {
        BackendError::TaskFailed { upid, exit_status } => {
            assert_eq!(upid, UPID);
            assert_eq!(exit_status, "clone failed: out of space");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_configure_retries_without_fwgroup() {
    let mock_server = MockServer::start().await;
    let backend = create_test_backend(&mock_server).await;

    Mock::given(method("PUT"))
        .and(path("/api2/json/nodes/pve/qemu/101/config"))
        .and(body_string_contains("fwgroup"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "errors": {"net0.fwgroup": "property is not defined in schema and the schema does not allow additional properties"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api2/json/nodes/pve/qemu/101/config"))
        .and(|request: &Request| !String::from_utf8_lossy(&request.body).contains("fwgroup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = VmConfig {
        bridge: Some("vmbr1".into()),
        firewall: Some(true),
        firewall_group: Some("agent_nat_default".into()),
        ..Default::default()
    };
    backend
        .configure(&OpContext::new(), 101, &config)
        .await
        .unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        form_value(&requests[0], "net0").as_deref(),
        Some("virtio,bridge=vmbr1,firewall=1,fwgroup=agent_nat_default")
    );
    assert_eq!(
        form_value(&requests[1], "net0").as_deref(),
        Some("virtio,bridge=vmbr1,firewall=1")
    );
}

#[tokio::test]
async fn test_configure_grows_root_disk() {
    let mock_server = MockServer::start().await;
    let backend = create_test_backend(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve/qemu/100/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "scsi0": "local-zfs:vm-100-disk-0,discard=on,size=2.8G",
                "bootdisk": "scsi0",
                "digest": "abc"
            }
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api2/json/nodes/pve/qemu/100/resize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = VmConfig {
        root_disk_gb: Some(40),
        root_disk: Some(String::new()),
        ..Default::default()
    };
    backend
        .configure(&OpContext::new(), 100, &config)
        .await
        .unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    let resize = requests
        .iter()
        .find(|r| r.url.path().ends_with("/resize"))
        .unwrap();
    assert_eq!(form_value(resize, "disk").as_deref(), Some("scsi0"));
    assert_eq!(form_value(resize, "size").as_deref(), Some("+38G"));
    assert!(
        !requests.iter().any(|r| r.url.path().ends_with("/config") && r.method.as_str() == "PUT")
    );
}

#[tokio::test]
async fn test_configure_skips_resize_when_large_enough() {
    let mock_server = MockServer::start().await;
    let backend = create_test_backend(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve/qemu/100/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"virtio0": "local-zfs:vm-100-disk-0,size=40.7G", "boot": "order=virtio0;net0"}
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api2/json/nodes/pve/qemu/100/resize"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = VmConfig {
        root_disk_gb: Some(40),
        ..Default::default()
    };
    backend
        .configure(&OpContext::new(), 100, &config)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_guest_ip_selected_by_cidr() {
    let mock_server = MockServer::start().await;
    let backend = fast(ApiBackend::builder())
        .base_url(mock_server.uri())
        .token(TOKEN)
        .node("pve")
        .dhcp_lease_paths(Vec::new())
        .agent_cidr("10.77.0.0/16")
        .unwrap()
        .build()
        .await
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve/qemu/101/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"net0": "virtio=52:54:00:AA:BB:CC,bridge=vmbr1"}
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve/qemu/101/agent/network-get-interfaces"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"result": [
                {"name": "lo", "ip-addresses": [
                    {"ip-address": "127.0.0.1", "ip-address-type": "ipv4", "prefix": 8}
                ]},
                {"name": "eth0", "hardware-address": "52:54:00:aa:bb:cc", "ip-addresses": [
                    {"ip-address": "192.168.1.10", "ip-address-type": "ipv4", "prefix": 24},
                    {"ip-address": "fe80::1", "ip-address-type": "ipv6", "prefix": 64},
                    {"ip-address": "10.77.0.9", "ip-address-type": "ipv4", "prefix": 16}
                ]}
            ]}
        })))
        .mount(&mock_server)
        .await;

    let ip = backend.guest_ip(&OpContext::new(), 101).await.unwrap();
    assert_eq!(ip, Ipv4Addr::new(10, 77, 0, 9));
}

#[tokio::test]
async fn test_guest_ip_falls_back_to_dhcp_lease() {
    let mock_server = MockServer::start().await;
    let mut leases = tempfile::NamedTempFile::new().unwrap();
    writeln!(leases, "0 52:54:00:aa:bb:cc 10.77.0.55 host *").unwrap();
    let backend = fast(ApiBackend::builder())
        .base_url(mock_server.uri())
        .token(TOKEN)
        .node("pve")
        .dhcp_lease_paths(vec![leases.path().display().to_string()])
        .build()
        .await
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve/qemu/101/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"net0": "virtio=52:54:00:aa:bb:cc,bridge=vmbr1"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve/qemu/101/agent/network-get-interfaces"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "data": null,
            "message": "QEMU guest agent is not running\n"
        })))
        .mount(&mock_server)
        .await;

    let ip = backend.guest_ip(&OpContext::new(), 101).await.unwrap();
    assert_eq!(ip, Ipv4Addr::new(10, 77, 0, 55));
}

#[tokio::test]
async fn test_guest_ip_deadline_yields_not_found() {
    let mock_server = MockServer::start().await;
    let backend = create_test_backend(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve/qemu/101/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"net0": "virtio=52:54:00:aa:bb:cc,bridge=vmbr1"}
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve/qemu/101/agent/network-get-interfaces"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "message": "QEMU guest agent is not running"
        })))
        .mount(&mock_server)
        .await;

    let ctx = OpContext::new().with_timeout(Duration::from_millis(150));
    let err = backend.guest_ip(&ctx, 101).await.unwrap_err();
    assert!(err.is_guest_ip_not_found(), "{:?}", err);
}

#[tokio::test]
async fn test_guest_ip_cancellation_propagates() {
    let mock_server = MockServer::start().await;
    let backend = create_test_backend(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve/qemu/101/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {}})))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve/qemu/101/agent/network-get-interfaces"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "message": "QEMU guest agent is not running"
        })))
        .mount(&mock_server)
        .await;

    let ctx = OpContext::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });
    let err = backend.guest_ip(&ctx, 101).await.unwrap_err();
    assert!(matches!(err, BackendError::Cancelled), "{:?}", err);
}

#[tokio::test]
async fn test_vm_lifecycle() {
    let mock_server = MockServer::start().await;
    let backend = create_test_backend(&mock_server).await;

    for op in ["start", "stop"] {
        let upid = format!("UPID:pve:00000001:00000002:65B2C3D4:qm{}:101:root@pam:", op);
        Mock::given(method("POST"))
            .and(path(format!("/api2/json/nodes/pve/qemu/101/status/{}", op)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": upid})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
        mount_task_ok(&mock_server, &upid).await;
    }
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve/qemu/101/status/current"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"status": "running", "cpu": 0.42, "vmid": 101}
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api2/json/nodes/pve/qemu/101"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let ctx = OpContext::new();
    backend.start(&ctx, 101).await.unwrap();
    assert_eq!(backend.status(&ctx, 101).await.unwrap(), VmStatus::Running);
    assert_eq!(backend.current_stats(&ctx, 101).await.unwrap().cpu_usage, 0.42);
    backend.stop(&ctx, 101).await.unwrap();
    backend.destroy(&ctx, 101).await.unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    let delete = requests
        .iter()
        .find(|r| r.method.as_str() == "DELETE")
        .unwrap();
    assert_eq!(delete.url.query(), Some("purge=1"));
}

#[tokio::test]
async fn test_missing_vm_is_vm_not_found() {
    let mock_server = MockServer::start().await;
    let backend = create_test_backend(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve/qemu/404/status/current"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "data": null,
            "message": "Configuration file 'nodes/pve/qemu-server/404.conf' does not exist\n"
        })))
        .mount(&mock_server)
        .await;

    let err = backend.status(&OpContext::new(), 404).await.unwrap_err();
    assert!(err.is_vm_not_found(), "{:?}", err);
}

#[tokio::test]
async fn test_snapshot_list_drops_current() {
    let mock_server = MockServer::start().await;
    let backend = create_test_backend(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve/qemu/101/snapshot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {"name": "clean", "description": "after boot\n", "snaptime": 1738159200},
                {"name": "current", "description": "You are here!", "parent": "clean"}
            ]
        })))
        .mount(&mock_server)
        .await;

    let snapshots = backend.snapshot_list(&OpContext::new(), 101).await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].name, "clean");
    assert_eq!(snapshots[0].description, "after boot");
    assert_eq!(snapshots[0].created_at.timestamp(), 1738159200);
}

#[tokio::test]
async fn test_node_detected_once() {
    let mock_server = MockServer::start().await;
    let backend = fast(ApiBackend::builder())
        .base_url(mock_server.uri())
        .token(TOKEN)
        .build()
        .await
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/api2/json/nodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"node": "pve-a", "status": "online"}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve-a/qemu/9000/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "agent": "enabled=1",
                "ide2": "local-lvm:vm-9000-cloudinit,media=cdrom"
            }
        })))
        .expect(2)
        .mount(&mock_server)
        .await;

    let ctx = OpContext::new();
    backend.validate_template(&ctx, 9000).await.unwrap();
    backend.validate_template(&ctx, 9000).await.unwrap();
    assert_eq!(backend.node(&ctx).await.unwrap(), "pve-a");
}
