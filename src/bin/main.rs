use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::{ArgAction, Parser};

use tether::endpoint::{ServiceEndpoint, WorkerRegistry};
use tether::store::ContentStore;
use tether::transport::{self, WsConnector};
use tether::{config, telemetry};

/// File-serving service endpoint: registers with a coordinator and serves
/// the content-addressable file channel.
#[derive(Parser, Debug)]
#[command(name = "tether", version, about = "Service endpoint worker client")]
struct Cli {
    /// Config file (default: ./tether.toml when present).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Coordinator address, e.g. ws://127.0.0.1:8765.
    #[arg(long, value_name = "URL")]
    server: Option<String>,

    /// Service name to register under.
    #[arg(long, value_name = "NAME")]
    service_name: Option<String>,

    /// Content store directory.
    #[arg(long, value_name = "DIR")]
    store_dir: Option<PathBuf>,

    /// Debug output (repeat for more).
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    let mut config = match config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };
    if let Some(server) = cli.server {
        config.server_addr = server;
    }
    if let Some(service_name) = cli.service_name {
        config.service_name = service_name;
    }
    if let Some(store_dir) = cli.store_dir {
        config.store_dir = store_dir;
    }

    let _telemetry_guard = telemetry::init(cli.verbose, &config.logging);

    let store = Arc::new(ContentStore::new(&config.store_dir));
    let (outbound_tx, outbound_rx) = crossbeam::channel::unbounded();
    let endpoint = ServiceEndpoint::new(
        config.service_name.clone(),
        WorkerRegistry::new(),
        store,
        outbound_tx,
    );
    let connector = WsConnector::new(config.server_addr.clone());

    tracing::info!(
        service = %config.service_name,
        server = %config.server_addr,
        store = %config.store_dir.display(),
        "starting service endpoint"
    );

    // Retries forever; the process is stopped from outside.
    let shutdown = AtomicBool::new(false);
    transport::run(&connector, &endpoint, &outbound_rx, &shutdown);
}
