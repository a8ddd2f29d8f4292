//! `cairn`: add a local file or directory tree into an in-process cluster.
//!
//! # Usage
//!
//! ```text
//! cairn add ./photos                        # balanced layout, 3 peers
//! cairn add ./photos --layout trickle --wrap
//! cairn add ./big.iso --peers 5 --min 2 --max 3 --chunk-size 1048576
//! cairn add ./site --list                   # print the root listing too
//! cairn config                              # print the effective config
//! ```

mod config;
mod telemetry;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use cairn_adder::{Adder, FsWalk};
use cairn_dag::reader;
use cairn_rpc::LocalCluster;
use cairn_types::{AddedOutput, Block, Cid, Layout, PeerId};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;
use tracing::{info, warn};

use config::CliConfig;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "cairn",
    version,
    about = "Build replicated content-addressed DAGs from local files"
)]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a file or directory tree.
    Add {
        /// File or directory to add.
        path: PathBuf,

        /// Name recorded on the pin (defaults to the path's file name).
        #[arg(short, long)]
        name: Option<String>,

        /// File layout.
        #[arg(long, value_enum)]
        layout: Option<LayoutArg>,

        /// Chunk size in bytes.
        #[arg(long)]
        chunk_size: Option<u32>,

        /// Minimum replication factor.
        #[arg(long)]
        min: Option<usize>,

        /// Maximum replication factor.
        #[arg(long)]
        max: Option<usize>,

        /// Number of local peers.
        #[arg(short, long)]
        peers: Option<usize>,

        /// Peer to prefer when allocating (hex ID). Can be repeated.
        #[arg(long)]
        prefer: Vec<PeerId>,

        /// Wrap the input in an enclosing directory.
        #[arg(short, long)]
        wrap: bool,

        /// Include hidden files.
        #[arg(short = 'H', long)]
        hidden: bool,

        /// Abort the add after this many milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Print the root directory listing after the add.
        #[arg(long)]
        list: bool,

        /// Print only the root CID.
        #[arg(short, long)]
        quiet: bool,
    },

    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum LayoutArg {
    Balanced,
    Trickle,
}

impl From<LayoutArg> for Layout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Balanced => Layout::default(),
            LayoutArg::Trickle => Layout::trickle(),
        }
    }
}

struct AddFlags {
    path: PathBuf,
    list: bool,
    quiet: bool,
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    telemetry::init(&config.log.level);

    match cli.command {
        Commands::Add {
            path,
            name,
            layout,
            chunk_size,
            min,
            max,
            peers,
            prefer,
            wrap,
            hidden,
            timeout_ms,
            list,
            quiet,
        } => {
            // CLI args override config file values.
            let add = &mut config.add;
            if let Some(name) = name {
                add.name = name;
            } else if add.name.is_empty() {
                add.name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
            }
            if let Some(layout) = layout {
                add.layout = layout.into();
            }
            if let Some(size) = chunk_size {
                add.chunk_size = size;
            }
            if let Some(min) = min {
                add.replication_factor_min = min;
            }
            if let Some(max) = max {
                add.replication_factor_max = max;
            }
            if !prefer.is_empty() {
                add.user_allocations = prefer;
            }
            add.wrap |= wrap;
            add.hidden |= hidden;
            if timeout_ms.is_some() {
                add.timeout_ms = timeout_ms;
            }
            if let Some(peers) = peers {
                config.cluster.peers = peers;
            }
            cmd_add(config, AddFlags { path, list, quiet }).await
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

// -----------------------------------------------------------------------
// cairn add
// -----------------------------------------------------------------------

async fn cmd_add(config: CliConfig, flags: AddFlags) -> Result<()> {
    let mut cluster = LocalCluster::new(config.cluster.peers);
    if let Some(ms) = config.cluster.store_latency_ms {
        cluster = cluster.with_store_latency(Duration::from_millis(ms));
    }
    let cluster = Arc::new(cluster);
    info!(
        path = %flags.path.display(),
        peers = config.cluster.peers,
        layout = ?config.add.layout,
        chunk_size = config.add.chunk_size,
        "adding"
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<AddedOutput>();
    let quiet = flags.quiet;
    let printer = tokio::spawn(async move {
        while let Some(output) = rx.recv().await {
            if !quiet {
                let name = if output.name.is_empty() { "." } else { output.name.as_str() };
                println!("added {} {name}", output.cid);
            }
        }
    });

    let hidden = config.add.hidden;
    let adder = Adder::new(cluster.clone(), config.add).with_outputs(tx);
    let abort = adder.abort_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, aborting add");
            abort.abort();
        }
    });

    let started = Instant::now();
    let result = adder.add(FsWalk::new(&flags.path, hidden)).await;
    interrupt.abort();
    printer.await.context("output printer failed")?;
    let summary = result.with_context(|| format!("failed to add {}", flags.path.display()))?;

    if flags.quiet {
        println!("{}", summary.root);
        return Ok(());
    }

    println!("root {}", summary.root);
    println!(
        "{} blocks ({} duplicates), {} bytes, stored in {:.2?}",
        summary.report.blocks,
        summary.report.duplicates,
        summary.size,
        started.elapsed()
    );
    for peer in &summary.pin.allocations {
        let acks = summary.report.acks.get(peer).copied().unwrap_or(0);
        println!("  peer {} holds {acks} blocks", peer.short());
    }

    if flags.list {
        let blocks = collect_blocks(&cluster).await;
        match reader::list(&blocks, &summary.root) {
            Ok(links) => {
                for link in links {
                    println!("{} {:>12} {}", link.cid, link.size, link.name);
                }
            }
            Err(e) => warn!(error = %e, "root is not a directory, nothing to list"),
        }
    }

    Ok(())
}

async fn collect_blocks(cluster: &LocalCluster) -> HashMap<Cid, Block> {
    let mut blocks = HashMap::new();
    for peer in cluster.peers() {
        blocks.extend(cluster.blocks_on(peer).await);
    }
    blocks
}
