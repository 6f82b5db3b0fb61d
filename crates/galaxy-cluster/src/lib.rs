//! galaxy-cluster — service registry for Galaxy nodes.
//!
//! Provides the in-memory node registry, the gRPC control service that
//! owns it, the per-node heartbeat endpoint, and the agent that drives a
//! node's registration lifecycle.
//!
//! # Architecture
//!
//! ```text
//! Control Service
//!   └── ControlServer (gRPC)
//!       ├── Heartbeat()  → UP
//!       ├── Register()   → Registry::register
//!       ├── Deregister() → Registry::deregister
//!       └── ListNodes()  → Registry::list_except, streamed
//!
//! Node
//!   ├── NodeServer (gRPC)
//!   │   └── Heartbeat() → UP
//!   └── NodeAgent
//!       ├── connect + verify (control heartbeat)
//!       ├── register
//!       ├── poll ListNodes every interval
//!       └── shutdown → deregister once
//! ```

use std::time::Duration;

pub mod agent;
pub mod error;
pub mod node_server;
pub mod proto;
pub mod registry;
pub mod server;

pub use agent::{AgentConfig, AgentState, NodeAgent};
pub use error::{ClusterError, ClusterResult};
pub use node_server::NodeServer;
pub use registry::{NodeDescriptor, NodeKey, RegisterOutcome, Registry};
pub use server::ControlServer;

/// Port the control service listens on.
pub const DEFAULT_CONTROL_PORT: u16 = 50051;

/// Address nodes dial to reach the control service.
pub const DEFAULT_CONTROL_ADDR: &str = "localhost:50051";

/// Pause between a node's peer listings.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
