//! galaxyd — the Galaxy daemon.
//!
//! One binary, two roles:
//! - `control`: holds the node registry and serves the control service
//! - `node`: serves a heartbeat endpoint and keeps itself registered
//!
//! # Usage
//!
//! ```text
//! galaxyd control --port 50051
//! galaxyd node 9001 --control-addr localhost:50051
//! ```

mod control_mode;
mod node_mode;

use std::time::Duration;

use clap::{Parser, Subcommand};
use galaxy_cluster::{DEFAULT_CONTROL_ADDR, DEFAULT_CONTROL_PORT, DEFAULT_POLL_INTERVAL};

#[derive(Parser, Debug)]
#[command(name = "galaxyd", about = "Galaxy control service and node daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the control service that tracks registered nodes.
    Control {
        /// Port to listen on.
        #[arg(long, default_value_t = DEFAULT_CONTROL_PORT)]
        port: u16,

        /// HTTP/2 concurrent stream limit per connection.
        #[arg(long, default_value_t = u32::MAX)]
        max_concurrent_streams: u32,
    },

    /// Run a node: serve its endpoint and register with the control service.
    Node {
        /// Port this node's endpoint listens on.
        port: u16,

        /// Control service address.
        #[arg(long, default_value = DEFAULT_CONTROL_ADDR)]
        control_addr: String,

        /// Service name to register under.
        #[arg(long, default_value = "node")]
        name: String,

        /// Address to advertise.
        #[arg(long, default_value = "localhost")]
        address: String,

        /// Seconds between peer listings.
        #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
        interval_secs: u64,

        /// Print peers as JSON lines.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Control {
            port,
            max_concurrent_streams,
        } => control_mode::run_control(port, max_concurrent_streams).await,
        Command::Node {
            port,
            control_addr,
            name,
            address,
            interval_secs,
            json,
        } => {
            let config = galaxy_cluster::AgentConfig {
                control_plane_addr: control_addr,
                service_name: name,
                service_address: address,
                service_port: u32::from(port),
                poll_interval: Duration::from_secs(interval_secs),
            };
            node_mode::run_node(config, json).await
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,galaxyd=debug,galaxy_cluster=debug"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
