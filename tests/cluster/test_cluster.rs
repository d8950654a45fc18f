use std::future::Future;
use std::path::Path;
use std::thread;
use std::time::Duration;

use maplit::btreemap;
use raft3d::client::PrintFarmClient;
use raft3d::config::NodeConfig;
use raft3d::engine::Suffrage;
use raft3d::model::Filament;
use raft3d::model::JobStatus;
use raft3d::model::PrintJob;
use raft3d::model::Printer;
use raft3d::start_raft_node;
use raft3d::NodeId;
use reqwest::StatusCode;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

fn addr(node_id: NodeId) -> String {
    format!("127.0.0.1:2100{}", node_id)
}

fn node_config(id: NodeId, bootstrap: bool, join: Option<String>, data_dir: &Path) -> NodeConfig {
    NodeConfig {
        id,
        http_addr: addr(id),
        bootstrap,
        join,
        data_dir: data_dir.to_path_buf(),
        write_timeout_ms: 5_000,
        join_timeout_ms: 10_000,
        heartbeat_interval: 200,
        election_timeout_min: 600,
        election_timeout_max: 1_200,
        snapshot_threshold: 100,
    }
}

/// Poll `f` until it returns `true` or `timeout` elapses.
async fn wait_for<F, Fut>(msg: &str, timeout: Duration, mut f: F) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if f().await {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("timeout waiting for: {}", msg);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Bootstrap node 1, let node 2 and 3 join through it, then write to the leader and read the
/// replicated resources back from every node.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_cluster() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .with_ansi(false)
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    // --- Start 3 nodes in 3 threads. Node 1 bootstraps, the others join through it.

    let dirs = [TempDir::new()?, TempDir::new()?, TempDir::new()?];

    let configs = [
        node_config(1, true, None, dirs[0].path()),
        node_config(2, false, Some(addr(1)), dirs[1].path()),
        node_config(3, false, Some(addr(1)), dirs[2].path()),
    ];

    for config in configs {
        thread::spawn(move || {
            let rt = Runtime::new().unwrap();
            let x = rt.block_on(start_raft_node(config));
            println!("x: {:?}", x);
        });
    }

    let client1 = PrintFarmClient::new(addr(1));
    let client2 = PrintFarmClient::new(addr(2));
    let client3 = PrintFarmClient::new(addr(3));

    // --- 1. Wait for node 1 to become leader and the other two to be promoted to voters.

    println!("=== wait for 3 voters");
    let leader = &client1;
    wait_for("3 voters", Duration::from_secs(30), move || async move {
        match leader.configuration().await {
            Ok(servers) => servers.len() == 3 && servers.iter().all(|s| s.suffrage == Suffrage::Voter),
            Err(_) => false,
        }
    })
    .await?;

    assert_eq!(Some(addr(1)), client1.leader().await?);

    let metrics = client2.metrics().await?;
    assert_eq!(Some(1), metrics.current_leader);
    assert_eq!(3, metrics.membership_config.membership().voter_ids().count());

    // An initialized cluster refuses to be initialized again.
    let res = client3.init().await;
    assert!(res.is_err(), "node 3 is already a member: {:?}", res);

    // --- 2. Write resources to the leader.

    println!("=== write to leader");
    let printer = Printer {
        id: "p1".to_string(),
        company: "Acme".to_string(),
        model: "X1".to_string(),
    };
    let filament = Filament {
        id: "f1".to_string(),
        kind: "PLA".to_string(),
        color: "orange".to_string(),
        total_weight_grams: 1000,
        remaining_weight_grams: 1000,
    };
    let job = PrintJob {
        id: "j1".to_string(),
        printer_id: "p1".to_string(),
        filament_id: "f1".to_string(),
        file_path: "/prints/vase.gcode".to_string(),
        print_weight_grams: 120,
        status: JobStatus::Queued,
    };

    client1.add_printer(&printer).await?;
    client1.add_filament(&filament).await?;
    client1.add_print_job(&job).await?;

    let text = client1.update_job_status("j1", JobStatus::Running).await?;
    assert_eq!("Print job j1 updated to Running", text);

    // --- 3. Every node eventually serves the same resources.

    let want_jobs = btreemap! {
        "j1".to_string() => PrintJob {
            status: JobStatus::Running,
            ..job.clone()
        },
    };

    let want_jobs = &want_jobs;
    for client in [&client1, &client2, &client3] {
        println!("=== read from {}", client.addr());
        wait_for("replicated print job", Duration::from_secs(10), move || async move {
            matches!(client.list_print_jobs().await, Ok(jobs) if &jobs == want_jobs)
        })
        .await?;

        assert_eq!(btreemap! {"p1".to_string() => printer.clone()}, client.list_printers().await?);
        assert_eq!(btreemap! {"f1".to_string() => filament.clone()}, client.list_filaments().await?);
    }

    // --- 4. Followers refuse writes and point at the leader.

    println!("=== write to follower");
    let res = client2.add_printer(&printer).await;
    let err = res.expect_err("follower must refuse writes");
    assert_eq!(Some(StatusCode::FORBIDDEN), err.status());

    assert_eq!(Some(addr(1)), client2.leader().await?);
    assert_eq!(Some(addr(1)), client3.leader().await?);

    // --- 5. Joining again is a no-op.

    println!("=== join node 2 again");
    client1.join(2, &addr(2)).await?;
    assert_eq!(3, client1.configuration().await?.len());

    Ok(())
}
