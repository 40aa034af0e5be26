//! Node allocation through a hosted resource manager and in-process nodes

mod common;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use activeobj::{Future, Runtime};
use async_trait::async_trait;
use common::*;
use futures::future::join_all;
use rmcore::{
    LocalNode, NodeHandle, NodeInfo, ResourceCore, ResourceManager, RmClient, RmConfig, RmEvent,
    SelectionScript,
};

/// Wraps a local node and counts script runs
struct CountingNode {
    inner: Arc<LocalNode>,
    script_runs: AtomicUsize,
}

impl CountingNode {
    fn runs(&self) -> usize {
        self.script_runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeHandle for CountingNode {
    fn url(&self) -> &str {
        self.inner.url()
    }

    async fn identity(&self) -> rmcore::Result<NodeInfo> {
        self.inner.identity().await
    }

    async fn clean(&self) -> rmcore::Result<()> {
        self.inner.clean().await
    }

    async fn execute_script(&self, script: &SelectionScript) -> rmcore::Result<Future> {
        self.script_runs.fetch_add(1, Ordering::SeqCst);
        self.inner.execute_script(script).await
    }
}

struct Cluster {
    runtime: Runtime,
    rm: RmClient,
    nodes: Vec<Arc<CountingNode>>,
}

impl Cluster {
    /// `n` nodes; node i gets attribute `gpu` when `gpu(i)` holds
    async fn start(n: usize, gpu: impl Fn(usize) -> bool) -> Self {
        let runtime = Runtime::default();
        let rm = ResourceManager::start(&runtime, ResourceCore::new(RmConfig::default())).unwrap();
        let mut nodes = Vec::new();
        for i in 0..n {
            let mut attributes = HashMap::new();
            if gpu(i) {
                attributes.insert("gpu".to_string(), "a100".to_string());
            }
            let inner = LocalNode::start(&runtime, &format!("n{}", i), attributes).unwrap();
            let node = Arc::new(CountingNode {
                inner,
                script_runs: AtomicUsize::new(0),
            });
            rm.add_node(node.clone(), None).await.unwrap();
            nodes.push(node);
        }
        Self { runtime, rm, nodes }
    }

    fn total_runs(&self) -> usize {
        self.nodes.iter().map(|n| n.runs()).sum()
    }
}

fn url(i: usize) -> String {
    format!("local://n{}", i)
}

#[tokio::test]
async fn test_two_of_three_without_script() {
    init_logging();

    let cluster = Cluster::start(3, |_| false).await;
    let granted = cluster.rm.get_at_most_nodes(2, None, &[]).await.unwrap();
    assert_eq!(granted.len(), 2);

    let state = cluster.rm.snapshot().await.unwrap();
    assert_eq!(state.busy.len(), 2);
    assert_eq!(state.free.len(), 1);
    assert!(!granted.contains(&state.free[0]));

    // Asking for more than is free returns what there is
    let rest = cluster.rm.get_at_most_nodes(5, None, &[]).await.unwrap();
    assert_eq!(rest, state.free);
    assert_eq!(cluster.rm.free_node_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_static_verdicts_are_cached() {
    init_logging();

    let cluster = Cluster::start(4, |i| i % 2 == 0).await;
    let script = SelectionScript::new_static("gpu");

    let first = cluster.rm.get_at_most_nodes(2, Some(&script), &[]).await.unwrap();
    let first: HashSet<_> = first.into_iter().collect();
    assert_eq!(first, HashSet::from([url(0), url(2)]));
    let runs_after_first = cluster.total_runs();
    cluster.rm.free_nodes(&first.iter().cloned().collect::<Vec<_>>()).await.unwrap();

    // Verified nodes sort first and are taken without running the script
    let second = cluster.rm.get_at_most_nodes(2, Some(&script), &[]).await.unwrap();
    let second: HashSet<_> = second.into_iter().collect();
    assert_eq!(second, first);
    assert_eq!(cluster.total_runs(), runs_after_first);
    println!("\n=== Static script: {} runs for two allocations ===", cluster.total_runs());
}

#[tokio::test]
async fn test_dynamic_script_sees_changes() {
    init_logging();

    let cluster = Cluster::start(3, |_| false).await;
    let script = SelectionScript::new_dynamic("ready");

    let none = cluster.rm.get_at_most_nodes(3, Some(&script), &[]).await.unwrap();
    assert!(none.is_empty());
    let runs = cluster.total_runs();
    assert_eq!(runs, 3);

    cluster.nodes[1].inner.set_attribute("ready", "yes").await.unwrap();
    let granted = cluster.rm.get_at_most_nodes(3, Some(&script), &[]).await.unwrap();
    assert_eq!(granted, vec![url(1)]);
    cluster.rm.free_nodes(&granted).await.unwrap();

    // Dynamic scripts run again every time, even on nodes that passed
    let again = cluster.rm.get_at_most_nodes(1, Some(&script), &[]).await.unwrap();
    assert_eq!(again, vec![url(1)]);
    assert!(cluster.nodes[1].runs() >= 3);
}

#[tokio::test]
async fn test_killed_node_goes_down() {
    init_logging();

    let cluster = Cluster::start(3, |_| true).await;
    cluster.nodes[0].inner.kill().await.unwrap();

    let granted = cluster
        .rm
        .get_at_most_nodes(3, Some(&SelectionScript::new_static("gpu")), &[])
        .await
        .unwrap();
    assert_eq!(granted.len(), 2);
    assert!(!granted.contains(&url(0)));

    let state = cluster.rm.snapshot().await.unwrap();
    assert_eq!(state.down, vec![url(0)]);

    // A down node is never handed out again
    cluster.rm.free_nodes(&granted).await.unwrap();
    let again = cluster.rm.get_at_most_nodes(3, None, &[]).await.unwrap();
    assert_eq!(again.len(), 2);
    assert!(!again.contains(&url(0)));
}

#[tokio::test]
async fn test_exclusion_list_is_respected() {
    init_logging();

    let cluster = Cluster::start(4, |_| false).await;
    let excluded = vec![url(0), url(3)];
    let granted = cluster.rm.get_at_most_nodes(4, None, &excluded).await.unwrap();

    let granted: HashSet<_> = granted.into_iter().collect();
    assert_eq!(granted, HashSet::from([url(1), url(2)]));
    assert_eq!(cluster.total_runs(), 0);
}

#[tokio::test]
async fn test_freed_node_is_cleaned() {
    init_logging();

    let cluster = Cluster::start(1, |_| false).await;
    let granted = cluster.rm.get_at_most_nodes(1, None, &[]).await.unwrap();
    let node = &cluster.nodes[0].inner;
    node.start_work().await.unwrap();
    node.start_work().await.unwrap();
    assert_eq!(node.residual_work().await.unwrap(), 2);

    cluster.rm.free_nodes(&granted).await.unwrap();
    assert_eq!(cluster.rm.free_node_count().await.unwrap(), 1);
    assert_eq!(node.residual_work().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clients_get_disjoint_nodes() {
    init_logging();

    const CLIENTS: usize = 6;

    let cluster = Cluster::start(8, |_| false).await;
    let stats = Arc::new(ConcurrentStats::new());

    let requests = (0..CLIENTS).map(|_| {
        let rm = cluster.rm.clone();
        let stats = stats.clone();
        async move {
            let started = Instant::now();
            let granted = rm.get_at_most_nodes(2, None, &[]).await;
            match &granted {
                Ok(_) => stats.record_success(started.elapsed()),
                Err(_) => stats.record_failure(),
            }
            granted
        }
    });
    let results: Vec<Vec<String>> = join_all(requests)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    stats.print_report("Concurrent allocation");

    let total: usize = results.iter().map(Vec::len).sum();
    let distinct: HashSet<&String> = results.iter().flatten().collect();
    assert_eq!(total, 8);
    assert_eq!(distinct.len(), 8, "a node was handed to two clients");
    assert_eq!(stats.failure_count(), 0);
}

#[tokio::test]
async fn test_lifecycle_events() {
    init_logging();

    let runtime = Runtime::default();
    let rm = ResourceManager::start(&runtime, ResourceCore::new(RmConfig::default())).unwrap();
    let mut events = rm.subscribe();

    rm.create_node_source("lab").await.unwrap();
    let node = LocalNode::start(&runtime, "ev", HashMap::new()).unwrap();
    rm.add_node(node.clone(), Some("lab")).await.unwrap();
    let granted = rm.get_at_most_nodes(1, None, &[]).await.unwrap();
    rm.free_nodes(&granted).await.unwrap();
    rm.remove_source("lab", false).await.unwrap();
    rm.shutdown(false).await.unwrap();
    // Flush: the sync call returns after everything above was served
    rm.free_node_count().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    println!("\n=== Events: {:?} ===", seen);

    let url = "local://ev".to_string();
    let position = |wanted: &RmEvent| seen.iter().position(|e| e == wanted);
    let added = position(&RmEvent::NodeAdded {
        url: url.clone(),
        source: "lab".to_string(),
    });
    let busy = position(&RmEvent::NodeBusy { url: url.clone() });
    let removed = position(&RmEvent::NodeRemoved { url: url.clone() });

    assert!(position(&RmEvent::SourceAdded { name: "lab".to_string() }).is_some());
    assert!(added.is_some() && busy.is_some() && removed.is_some());
    assert!(added < busy && busy < removed);
    assert!(seen.contains(&RmEvent::NodeFree { url }));
    assert!(seen.contains(&RmEvent::SourceRemoved { name: "lab".to_string() }));
    assert!(seen.contains(&RmEvent::ShuttingDown));
}

#[tokio::test]
async fn test_no_nodes_after_shutdown() {
    init_logging();

    let cluster = Cluster::start(3, |_| false).await;
    cluster.rm.shutdown(true).await.unwrap();

    let granted = cluster.rm.get_at_most_nodes(3, None, &[]).await.unwrap();
    assert!(granted.is_empty());
    assert_eq!(cluster.rm.free_node_count().await.unwrap(), 0);
    cluster.runtime.shutdown().await;
}
