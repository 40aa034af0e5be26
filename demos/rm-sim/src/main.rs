//! Resource manager simulation
//!
//! Starts a pool of in-process nodes, hosts a resource manager over them and
//! runs a few allocation rounds.
//!
//! Run with: cargo run --bin rm-sim -- --nodes 8 --request 3 --script "gpu"

use std::collections::HashMap;
use std::time::Instant;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use activeobj::{Runtime, RuntimeConfig};
use rmcore::{LocalNode, NodeHandle, ResourceCore, ResourceManager, RmConfig, SelectionScript};

#[derive(Parser)]
#[command(name = "rm-sim")]
#[command(about = "Simulated resource manager over in-process nodes")]
struct Args {
    /// Number of nodes to start
    #[arg(short, long, default_value = "8")]
    nodes: usize,

    /// Nodes requested per allocation round
    #[arg(short, long, default_value = "3")]
    request: usize,

    /// Allocation rounds
    #[arg(long, default_value = "3")]
    rounds: usize,

    /// Selection script, e.g. "gpu" or "arch=arm64 && !maintenance"
    #[arg(short, long)]
    script: Option<String>,

    /// Run the script again on every allocation instead of caching verdicts
    #[arg(long)]
    dynamic: bool,

    /// Every n-th node gets a GPU attribute
    #[arg(long, default_value = "2")]
    gpu_every: usize,

    /// Kill this many nodes after the first round
    #[arg(long, default_value = "0")]
    kill: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let runtime = Runtime::new(RuntimeConfig::default());

    info!("Starting {} nodes", args.nodes);
    let mut nodes = Vec::with_capacity(args.nodes);
    for i in 0..args.nodes {
        let mut attributes = HashMap::new();
        attributes.insert("arch".to_string(), if i % 3 == 0 { "arm64" } else { "x86_64" }.to_string());
        if args.gpu_every > 0 && i % args.gpu_every == 0 {
            attributes.insert("gpu".to_string(), "a100".to_string());
        }
        nodes.push(LocalNode::start(&runtime, &format!("node-{}", i), attributes)?);
    }

    let rm = ResourceManager::start(&runtime, ResourceCore::new(RmConfig::default()))?;
    let mut events = rm.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::debug!(?event, "rm event");
        }
    });

    rm.create_node_source("simulated").await?;
    for node in &nodes {
        rm.add_node(node.clone(), Some("simulated")).await?;
    }
    info!("Free nodes: {}", rm.free_node_count().await?);

    let script = args.script.as_deref().map(|source| {
        if args.dynamic {
            SelectionScript::new_dynamic(source)
        } else {
            SelectionScript::new_static(source)
        }
    });

    for round in 1..=args.rounds {
        let started = Instant::now();
        let granted = rm.get_at_most_nodes(args.request, script.as_ref(), &[]).await?;
        info!(
            "Round {}: asked {}, got {} in {:?}: {:?}",
            round,
            args.request,
            granted.len(),
            started.elapsed(),
            granted
        );

        for url in &granted {
            if let Some(node) = nodes.iter().find(|n| n.url() == url.as_str()) {
                node.start_work().await?;
            }
        }
        rm.free_nodes(&granted).await?;

        if round == 1 && args.kill > 0 {
            for node in nodes.iter().rev().take(args.kill) {
                warn!("Killing {}", node.url());
                node.kill().await?;
            }
        }
    }

    let state = rm.snapshot().await?;
    info!(
        "Final state: {} free, {} busy, {} to release, {} down",
        state.free.len(),
        state.busy.len(),
        state.to_release.len(),
        state.down.len()
    );

    rm.shutdown(true).await?;
    runtime.shutdown().await;
    Ok(())
}
