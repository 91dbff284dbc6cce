//! vipd — the vipgrid daemon.
//!
//! Keeps a pool of virtual addresses spread evenly over a group of nodes.
//! `run` owns the local redb node store and serves the membership API next
//! to the balancing loop; `node add` / `node remove` / `status` are clients
//! of that API, so membership can change while `run` is balancing.
//!
//! # Usage
//!
//! ```text
//! vipd run --data-dir /var/lib/vipgrid --vips 10.0.0.0/28 --workers 10
//! vipd node add vm-4
//! vipd status
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use vipgrid_api::{ApiClient, build_router};
use vipgrid_control::{Controller, FileConfig};
use vipgrid_state::{Node, NodeStore};

const DB_FILE: &str = "vipd.redb";
const DEFAULT_ADDR: &str = "127.0.0.1:7480";

#[derive(Parser)]
#[command(name = "vipd", about = "vipgrid daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the balancing loop and membership API until interrupted.
    Run {
        /// Data directory for the node store.
        #[arg(long, default_value = "/var/lib/vipgrid")]
        data_dir: PathBuf,

        /// Address the membership API listens on.
        #[arg(long, default_value = DEFAULT_ADDR)]
        listen: SocketAddr,

        /// TOML config file. Flags below override its values.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Addresses and prefixes to manage, comma or space separated.
        #[arg(long)]
        vips: Option<String>,

        /// Concurrent executor workers.
        #[arg(long)]
        workers: Option<usize>,

        /// Sleep between quiet cycles, e.g. "10s".
        #[arg(long)]
        sleep: Option<String>,

        /// Max wait for a node to reflect a write, e.g. "60s".
        #[arg(long)]
        wait: Option<String>,
    },

    /// Print every node and its addresses.
    Status {
        /// Address of a running daemon.
        #[arg(long, default_value = DEFAULT_ADDR)]
        addr: String,
    },

    /// Change node group membership on a running daemon.
    Node {
        #[arg(long, default_value = DEFAULT_ADDR)]
        addr: String,

        #[command(subcommand)]
        action: NodeAction,
    },
}

#[derive(Subcommand)]
enum NodeAction {
    /// Add a node with no addresses.
    Add {
        id: String,

        /// Network attachment the addresses are bound to.
        #[arg(long, default_value = "nic0")]
        attachment: String,
    },
    /// Remove a node; its addresses become spare.
    Remove { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,vipd=debug,vipgrid=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            data_dir,
            listen,
            config,
            vips,
            workers,
            sleep,
            wait,
        } => {
            let overrides = FileConfig {
                vips: vips.into_iter().collect(),
                workers,
                sleep,
                wait,
            };
            run(data_dir, listen, config.as_deref(), overrides).await
        }
        Command::Status { addr } => status(&ApiClient::new(addr)).await,
        Command::Node { addr, action } => node(&ApiClient::new(addr), action).await,
    }
}

async fn run(
    data_dir: PathBuf,
    listen: SocketAddr,
    config_path: Option<&Path>,
    overrides: FileConfig,
) -> anyhow::Result<()> {
    let file = match config_path {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    let config = file.merge(overrides).into_config()?;
    config.log_summary();

    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join(DB_FILE);
    let store = NodeStore::open(&db_path)?;
    info!(path = ?db_path, "node store opened");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Membership API ─────────────────────────────────────────

    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(addr = %listen, "membership API listening");
    let mut server_shutdown = shutdown_rx.clone();
    let router = build_router(store.clone());
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    // ── Shutdown signal ────────────────────────────────────────

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    // ── Balancing loop ─────────────────────────────────────────

    let mut controller = Controller::new(Arc::new(store), config);
    controller.run(shutdown_rx).await;
    controller.shutdown().await;

    server.await??;
    info!("vipd stopped");
    Ok(())
}

async fn status(client: &ApiClient) -> anyhow::Result<()> {
    let nodes = client.list_nodes().await?;
    print!("{}", render_status(&nodes));
    Ok(())
}

fn render_status(nodes: &[Node]) -> String {
    if nodes.is_empty() {
        return "no nodes\n".to_string();
    }

    let mut out = format!("{:<24} {:<12} {:>5}  ADDRESSES\n", "NODE", "ATTACHMENT", "COUNT");
    for node in nodes {
        let addresses: Vec<String> = node.addresses.iter().map(|a| a.to_string()).collect();
        out.push_str(&format!(
            "{:<24} {:<12} {:>5}  {}\n",
            node.id,
            node.attachment_id,
            node.address_count(),
            addresses.join(",")
        ));
    }
    out
}

async fn node(client: &ApiClient, action: NodeAction) -> anyhow::Result<()> {
    match action {
        NodeAction::Add { id, attachment } => {
            let node = client.register_node(&id, &attachment).await?;
            println!("node {} ready ({} addresses)", node.id, node.address_count());
        }
        NodeAction::Remove { id } => match client.remove_node(&id).await {
            Ok(()) => println!("node {id} removed"),
            Err(e) if e.is_not_found() => anyhow::bail!("node {id} not found"),
            Err(e) => return Err(e.into()),
        },
    }
    Ok(())
}
