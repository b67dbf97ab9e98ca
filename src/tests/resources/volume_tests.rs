use crate::{ApiBackend, Backend, OpContext};
use std::time::Duration;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string, method, path},
};

const TOKEN: &str = "root@pam!agentlab=00000000-0000-0000-0000-000000000000";

async fn create_test_backend(mock_server: &MockServer) -> ApiBackend {
    ApiBackend::builder()
        .base_url(mock_server.uri())
        .token(TOKEN)
        .node("pve")
        .task_backoff(Duration::from_millis(5), Duration::from_millis(20))
        .build()
        .await
        .unwrap()
}

async fn mount_storage_type(mock_server: &MockServer, storage: &str, storage_type: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/api2/json/nodes/pve/storage/{}/status", storage)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"type": storage_type, "active": 1, "total": 1000, "avail": 500}
        })))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_snapshot_on_non_zfs_storage_refused() {
    let mock_server = MockServer::start().await;
    let backend = create_test_backend(&mock_server).await;
    mount_storage_type(&mock_server, "local-lvm", "lvm").await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let err = backend
        .volume_snapshot_create(&OpContext::new(), "local-lvm:vm-0-disk-1", "snap1")
        .await
        .unwrap_err();
    assert!(err.is_storage_unsupported(), "{:?}", err);

    let err = backend
        .volume_clone(&OpContext::new(), "local-lvm:vm-0-disk-1", "copy")
        .await
        .unwrap_err();
    assert!(err.is_storage_unsupported(), "{:?}", err);
}

#[tokio::test]
async fn test_zfs_volume_snapshot_and_clone() {
    let mock_server = MockServer::start().await;
    let backend = create_test_backend(&mock_server).await;
    mount_storage_type(&mock_server, "tank", "zfspool").await;

    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve/storage/tank/content/tank:ws-1/snapshot"))
        .and(body_string("snapname=s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve/storage/tank/content/tank:ws-1/snapshot/s1/rollback"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api2/json/nodes/pve/storage/tank/content/tank:ws-1/snapshot/s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve/storage/tank/content/tank:ws-1/clone"))
        .and(body_string("target=ws-2&snapname=s1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": "tank:ws-2"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let ctx = OpContext::new();
    backend.volume_snapshot_create(&ctx, "tank:ws-1", "s1").await.unwrap();
    backend.volume_snapshot_restore(&ctx, "tank:ws-1", "s1").await.unwrap();
    let clone = backend
        .volume_clone_from_snapshot(&ctx, "tank:ws-1", "s1", "ws-2")
        .await
        .unwrap();
    assert_eq!(clone, "tank:ws-2");
    backend.volume_snapshot_delete(&ctx, "tank:ws-1", "s1").await.unwrap();
}

#[tokio::test]
async fn test_create_attach_and_delete_volume() {
    let mock_server = MockServer::start().await;
    let backend = create_test_backend(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve/storage/tank/content"))
        .and(body_string("vmid=0&filename=ws-1&size=10G"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": "tank:vm-0-ws-1"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api2/json/nodes/pve/qemu/101/config"))
        .and(body_string("scsi1=tank%3Avm-0-ws-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api2/json/nodes/pve/qemu/101/config"))
        .and(body_string("delete=scsi1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve/storage/tank/content/tank:vm-0-ws-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"path": "/dev/zvol/tank/vm-0-ws-1", "format": "raw", "size": 10737418240u64}
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api2/json/nodes/pve/storage/tank/content/tank:vm-0-ws-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let ctx = OpContext::new();
    let volid = backend.create_volume(&ctx, "tank", "ws-1", 10).await.unwrap();
    assert_eq!(volid, "tank:vm-0-ws-1");
    backend.attach_volume(&ctx, 101, &volid, "scsi1").await.unwrap();

    let info = backend.volume_info(&ctx, &volid).await.unwrap();
    assert_eq!(info.path, "/dev/zvol/tank/vm-0-ws-1");
    assert_eq!(info.storage, "tank");

    backend.detach_volume(&ctx, 101, "scsi1").await.unwrap();
    backend.delete_volume(&ctx, &volid).await.unwrap();
}

#[tokio::test]
async fn test_missing_volume_is_volume_not_found() {
    let mock_server = MockServer::start().await;
    let backend = create_test_backend(&mock_server).await;

    Mock::given(method("DELETE"))
        .and(path("/api2/json/nodes/pve/storage/tank/content/tank:gone"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "message": "no such volume 'tank:gone'\n"
        })))
        .mount(&mock_server)
        .await;

    let err = backend
        .delete_volume(&OpContext::new(), "tank:gone")
        .await
        .unwrap_err();
    assert!(err.is_volume_not_found(), "{:?}", err);
}
