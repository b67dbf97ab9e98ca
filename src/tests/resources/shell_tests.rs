use crate::{
    Backend, BackendError, BackendResult, CloneMode, CommandFailureInfo, CommandRunner,
    OpContext, ShellBackend, ShellBackendConfig, VmConfig,
};
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Responder = Box<dyn Fn(&str) -> BackendResult<String> + Send + Sync>;

/// Records every command line and answers from a closure.
struct ScriptedRunner {
    calls: Mutex<Vec<String>>,
    respond: Responder,
}

impl ScriptedRunner {
    fn new(respond: impl Fn(&str) -> BackendResult<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, ctx: &OpContext, name: &str, args: &[String]) -> BackendResult<String> {
        ctx.check()?;
        crate::core::infrastructure::command::validate_args(name, args)?;
        let line = std::iter::once(name.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.lock().unwrap().push(line.clone());
        (self.respond)(&line)
    }
}

fn failure(line: &str, stderr: &str) -> BackendError {
    BackendError::Command(Box::new(CommandFailureInfo {
        command: line.to_string(),
        status: Some(255),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }))
}

fn backend(runner: Arc<ScriptedRunner>, config: ShellBackendConfig) -> ShellBackend {
    ShellBackend::with_runner(
        ShellBackendConfig {
            node: "pve".to_string(),
            ..config
        },
        runner,
    )
    .unwrap()
    .task_backoff(Duration::from_millis(5), Duration::from_millis(20))
    .guest_ip_backoff(Duration::from_millis(5), Duration::from_millis(20))
}

#[tokio::test]
async fn test_linked_clone_falls_back_to_full() {
    let runner = ScriptedRunner::new(|line| {
        if line.contains("--full 0") {
            Err(failure(line, "linked clone feature is not supported for drive 'scsi0'"))
        } else {
            Ok(String::new())
        }
    });
    let config = ShellBackendConfig {
        clone_mode: CloneMode::Linked,
        ..Default::default()
    };
    backend(runner.clone(), config)
        .clone_vm(&OpContext::new(), 9000, 101, "sandbox-101")
        .await
        .unwrap();

    assert_eq!(
        runner.calls(),
        vec![
            "qm clone 9000 101 --full 0 --name sandbox-101",
            "qm clone 9000 101 --full 1 --name sandbox-101",
        ]
    );
}

#[tokio::test]
async fn test_configure_retries_without_fwgroup_then_resizes() {
    let runner = ScriptedRunner::new(|line| {
        if line.starts_with("qm set") && line.contains("fwgroup") {
            return Err(failure(
                line,
                "400 Parameter verification failed.\nnet0: invalid format - format error\nnet0.fwgroup: property is not defined in schema and the schema does not allow additional properties\n",
            ));
        }
        if line == "qm config 100" {
            return Ok("bootdisk: scsi0\nscsi0: local-zfs:vm-100-disk-0,discard=on,size=2.8G\n".to_string());
        }
        Ok(String::new())
    });
    let config = VmConfig {
        cores: Some(2),
        bridge: Some("vmbr1".into()),
        firewall: Some(true),
        firewall_group: Some("agent_nat_default".into()),
        root_disk_gb: Some(40),
        ..Default::default()
    };
    backend(runner.clone(), ShellBackendConfig::default())
        .configure(&OpContext::new(), 100, &config)
        .await
        .unwrap();

    assert_eq!(
        runner.calls(),
        vec![
            "qm set 100 --cores 2 --net0 virtio,bridge=vmbr1,firewall=1,fwgroup=agent_nat_default",
            "qm set 100 --cores 2 --net0 virtio,bridge=vmbr1,firewall=1",
            "qm config 100",
            "qm resize 100 scsi0 +38G",
        ]
    );
}

#[tokio::test]
async fn test_volume_snapshot_waits_for_task() {
    let upid = "UPID:pve:00001111:00002222:65B2C3D4:zfssnapshot:tank:root@pam:";
    let polls = Arc::new(Mutex::new(0));
    let counter = polls.clone();
    let runner = ScriptedRunner::new(move |line| {
        if line.starts_with("pvesm status --storage tank") {
            return Ok(r#"[{"storage":"tank","type":"zfspool","active":1}]"#.to_string());
        }
        if line.starts_with("pvesh create /nodes/pve/storage/tank/content/tank:ws-1/snapshot") {
            return Ok(format!("{}\n", upid));
        }
        if line.starts_with(&format!("pvesh get /nodes/pve/tasks/{}/status", upid)) {
            let mut n = counter.lock().unwrap();
            *n += 1;
            let status = if *n < 2 {
                r#"{"status":"running"}"#
            } else {
                r#"{"status":"stopped","exitstatus":"OK"}"#
            };
            return Ok(status.to_string());
        }
        Err(failure(line, "unexpected command"))
    });

    backend(runner.clone(), ShellBackendConfig::default())
        .volume_snapshot_create(&OpContext::new(), "tank:ws-1", "s1")
        .await
        .unwrap();

    assert_eq!(*polls.lock().unwrap(), 2);
    assert!(
        runner
            .calls()
            .contains(&"pvesh create /nodes/pve/storage/tank/content/tank:ws-1/snapshot --snapname s1".to_string())
    );
}

#[tokio::test]
async fn test_storage_type_from_table_output() {
    let runner = ScriptedRunner::new(|line| {
        if line.ends_with("--output-format json") {
            return Err(failure(line, "Unknown option: output-format"));
        }
        if line == "pvesm status --storage local-lvm" {
            return Ok("Name Type Status Total Used Available %\nlocal-lvm lvmthin active 100 0 100 0.00%\n".to_string());
        }
        Err(failure(line, "unexpected command"))
    });

    let err = backend(runner.clone(), ShellBackendConfig::default())
        .volume_clone(&OpContext::new(), "local-lvm:vm-0-disk-1", "copy")
        .await
        .unwrap_err();
    assert!(err.is_storage_unsupported(), "{:?}", err);
    assert!(runner.calls().iter().all(|c| !c.starts_with("pvesh")));
}

#[tokio::test]
async fn test_guest_ip_from_agent_output() {
    let runner = ScriptedRunner::new(|line| match line {
        "qm config 101" => Ok("net0: virtio=52:54:00:AA:BB:CC,bridge=vmbr1\n".to_string()),
        "qm guest cmd 101 network-get-interfaces" => Ok(serde_json::json!([
            {"name": "lo", "ip-addresses": [{"ip-address": "127.0.0.1", "ip-address-type": "ipv4"}]},
            {"name": "eth0", "ip-addresses": [
                {"ip-address": "203.0.113.7", "ip-address-type": "ipv4"},
                {"ip-address": "192.168.10.20", "ip-address-type": "ipv4"}
            ]}
        ])
        .to_string()),
        _ => Err(failure(line, "unexpected command")),
    });
    let config = ShellBackendConfig {
        dhcp_lease_paths: Vec::new(),
        ..Default::default()
    };

    let ip = backend(runner, config)
        .guest_ip(&OpContext::new(), 101)
        .await
        .unwrap();
    assert_eq!(ip, Ipv4Addr::new(192, 168, 10, 20));
}

#[tokio::test]
async fn test_create_volume_and_info() {
    let runner = ScriptedRunner::new(|line| match line {
        "pvesm alloc tank 0 ws-1 10G" => Ok("successfully created 'tank:vm-0-ws-1'\n".to_string()),
        "pvesm path tank:vm-0-ws-1" => Ok("/dev/zvol/tank/vm-0-ws-1\n".to_string()),
        _ => Err(failure(line, "unexpected command")),
    });
    let shell = backend(runner, ShellBackendConfig::default());
    let ctx = OpContext::new();

    let volid = shell.create_volume(&ctx, "tank", "ws-1", 10).await.unwrap();
    assert_eq!(volid, "tank:vm-0-ws-1");
    let info = shell.volume_info(&ctx, &volid).await.unwrap();
    assert_eq!(info.path, "/dev/zvol/tank/vm-0-ws-1");
}

#[tokio::test]
async fn test_node_detected_through_pvesh() {
    let runner = ScriptedRunner::new(|line| match line {
        "pvesh get /nodes --output-format json" => {
            Ok(r#"[{"node":"pve-b","status":"online"}]"#.to_string())
        }
        "pvesh get /nodes/pve-b/qemu/101/snapshot --output-format json" => {
            Ok(r#"[{"name":"current","description":"You are here!"}]"#.to_string())
        }
        _ => Err(failure(line, "unexpected command")),
    });
    let shell = ShellBackend::with_runner(ShellBackendConfig::default(), runner.clone()).unwrap();
    let ctx = OpContext::new();

    assert!(shell.snapshot_list(&ctx, 101).await.unwrap().is_empty());
    assert!(shell.snapshot_list(&ctx, 101).await.unwrap().is_empty());
    assert_eq!(
        runner
            .calls()
            .iter()
            .filter(|c| c.as_str() == "pvesh get /nodes --output-format json")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_unsafe_argument_never_runs() {
    let runner = ScriptedRunner::new(|_| Ok(String::new()));
    let err = backend(runner.clone(), ShellBackendConfig::default())
        .clone_vm(&OpContext::new(), 9000, 101, "evil\nname")
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::UnsafeArgument { .. }), "{:?}", err);
    assert!(runner.calls().is_empty());
}
