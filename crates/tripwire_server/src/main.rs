//! TRIPWIRE Server
//!
//! Reads tool calls from stdin and writes results to stdout.

#![warn(missing_docs)]
#![warn(clippy::all)]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;
use tripwire_runtime::{EvictionPolicy, PacketRouter, RouterConfig};
use tripwire_server::ApiServer;
use tripwire_tool::ServiceFactory;

#[derive(Parser)]
#[command(name = "tripwire-server")]
#[command(about = "TRIPWIRE packet router over stdio", long_about = None)]
struct Args {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Loaded tool capacity (overrides the config file)
    #[arg(long)]
    max_tools: Option<usize>,

    /// Eviction policy: lfu, lru or hybrid (overrides the config file)
    #[arg(long)]
    policy: Option<EvictionPolicy>,

    /// Log filter, used when RUST_LOG is unset
    #[arg(long, default_value = "tripwire=info")]
    log_filter: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_filter));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let mut config = match &args.config {
        Some(path) => tripwire_server::config::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RouterConfig::default(),
    };
    if let Some(max_tools) = args.max_tools {
        config = config.with_max_loaded_tools(max_tools);
    }
    if let Some(policy) = args.policy {
        config = config.with_eviction_policy(policy);
    }

    let handlers = ServiceFactory::new().build_builtin();
    let router = PacketRouter::with_services(config, handlers).context("building router")?;
    let server = ApiServer::new(Arc::new(router));

    tracing::info!(tools = tripwire_server::TOOL_CALLS.len(), "Serving tool calls on stdio");
    server
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
        .context("serving stdio")?;

    Ok(())
}
