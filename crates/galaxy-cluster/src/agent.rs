//! Node agent — client-side registration lifecycle.
//!
//! The agent runs inside every node process. It connects to the control
//! service, checks that it is up, registers the node, polls the peer list
//! on an interval and deregisters on the way out.
//!
//! ```text
//! Starting -> Verified -> Registered -> Polling -> Deregistering -> Terminated
//! ```
//!
//! Nothing here exits the process. Every failure comes back as a
//! [`ClusterError`] and the caller decides what to do with it; the one
//! teardown path is [`NodeAgent::shutdown`].

use std::time::Duration;

use tokio::sync::watch;
use tonic::transport::Channel;
use tracing::{debug, info, warn};

use crate::error::{ClusterError, ClusterResult};
use crate::proto;
use crate::proto::control_service_client::ControlServiceClient;
use crate::registry::{NodeDescriptor, RegisterOutcome};
use crate::{DEFAULT_CONTROL_ADDR, DEFAULT_POLL_INTERVAL};

/// Configuration for the node agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Address (`host:port`) of the control service's gRPC endpoint.
    pub control_plane_addr: String,
    /// Role this node announces.
    pub service_name: String,
    /// This node's advertised address.
    pub service_address: String,
    /// This node's advertised port.
    pub service_port: u32,
    /// Pause between peer listings.
    pub poll_interval: Duration,
}

impl AgentConfig {
    /// Defaults for a node serving on `port`.
    pub fn for_port(port: u32) -> Self {
        Self {
            control_plane_addr: DEFAULT_CONTROL_ADDR.to_string(),
            service_name: "node".to_string(),
            service_address: "localhost".to_string(),
            service_port: port,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// The descriptor this node registers under.
    pub fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor::new(
            self.service_name.clone(),
            self.service_address.clone(),
            self.service_port,
        )
    }
}

/// Where the agent is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Starting,
    Verified,
    Registered,
    Polling,
    Deregistering,
    Terminated,
}

/// The node agent that maintains this node's registration.
pub struct NodeAgent {
    config: AgentConfig,
    node: NodeDescriptor,
    client: Option<ControlServiceClient<Channel>>,
    state: AgentState,
}

impl NodeAgent {
    /// Create a new node agent.
    pub fn new(config: AgentConfig) -> Self {
        let node = config.descriptor();
        Self {
            config,
            node,
            client: None,
            state: AgentState::Starting,
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    /// This node's own descriptor.
    pub fn node(&self) -> &NodeDescriptor {
        &self.node
    }

    /// Open a plaintext channel to the control service.
    pub async fn connect(&mut self) -> ClusterResult<()> {
        let addr = format!("http://{}", self.config.control_plane_addr);
        let client = ControlServiceClient::connect(addr.clone())
            .await
            .map_err(|source| ClusterError::Connect { addr, source })?;

        info!(addr = %self.config.control_plane_addr, "connected to control service");
        self.client = Some(client);
        Ok(())
    }

    /// Check that the control service answers its heartbeat with `UP`.
    pub async fn verify(&mut self) -> ClusterResult<()> {
        self.expect_state(AgentState::Starting, "Starting")?;
        let mut client = self.client()?;

        let resp = client
            .heartbeat(proto::Empty {})
            .await
            .map_err(ClusterError::rpc("heartbeat"))?
            .into_inner();

        match resp.status() {
            proto::ServingStatus::Up => {
                debug!("control service is up");
                self.state = AgentState::Verified;
                Ok(())
            }
            other => Err(ClusterError::NotServing(format!("{other:?}"))),
        }
    }

    /// Register this node.
    ///
    /// A rejected registration (`success = false`) is logged and the agent
    /// still moves on; only a failed RPC is an error.
    pub async fn register(&mut self) -> ClusterResult<RegisterOutcome> {
        self.expect_state(AgentState::Verified, "Verified")?;
        let mut client = self.client()?;

        let resp = client
            .register(proto::Node::from(self.node.clone()))
            .await
            .map_err(ClusterError::rpc("register"))?
            .into_inner();

        let outcome = RegisterOutcome {
            message: resp.message,
            success: resp.success,
        };
        if outcome.success {
            info!(node = %self.node, message = %outcome.message, "registered with control service");
        } else {
            warn!(node = %self.node, message = %outcome.message, "registration rejected");
        }

        self.state = AgentState::Registered;
        Ok(outcome)
    }

    /// Fetch every registered node except this one.
    pub async fn list_peers(&self) -> ClusterResult<Vec<NodeDescriptor>> {
        let mut client = self.client()?;

        let mut stream = client
            .list_nodes(proto::Node::from(self.node.clone()))
            .await
            .map_err(ClusterError::rpc("list_nodes"))?
            .into_inner();

        let mut peers = Vec::new();
        while let Some(node) = stream
            .message()
            .await
            .map_err(ClusterError::rpc("list_nodes"))?
        {
            peers.push(NodeDescriptor::from(node));
        }

        debug!(peers = peers.len(), "listed peers");
        Ok(peers)
    }

    /// Run the poll loop.
    ///
    /// Lists peers, hands them to `on_peers`, then waits for the poll
    /// interval. Returns `Ok(())` once `shutdown` fires (or its sender is
    /// dropped) and the first error otherwise.
    pub async fn run<F>(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
        mut on_peers: F,
    ) -> ClusterResult<()>
    where
        F: FnMut(&[NodeDescriptor]),
    {
        self.expect_state(AgentState::Registered, "Registered")?;
        self.state = AgentState::Polling;

        info!(node = %self.node, interval = ?self.config.poll_interval, "poll loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let peers = self.list_peers().await?;
            on_peers(&peers);

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!(node = %self.node, "poll loop shutting down");
        Ok(())
    }

    /// Deregister this node if it was registered, then terminate.
    ///
    /// Safe to call on every exit path: the deregistration is attempted at
    /// most once, and later calls are no-ops.
    pub async fn shutdown(&mut self) -> ClusterResult<Option<RegisterOutcome>> {
        match self.state {
            AgentState::Registered | AgentState::Polling => {}
            AgentState::Deregistering | AgentState::Terminated => return Ok(None),
            AgentState::Starting | AgentState::Verified => {
                self.state = AgentState::Terminated;
                return Ok(None);
            }
        }

        self.state = AgentState::Deregistering;
        let result = self.deregister().await;
        self.state = AgentState::Terminated;
        result.map(Some)
    }

    async fn deregister(&self) -> ClusterResult<RegisterOutcome> {
        let mut client = self.client()?;

        let resp = client
            .deregister(proto::Node::from(self.node.clone()))
            .await
            .map_err(ClusterError::rpc("deregister"))?
            .into_inner();

        if resp.success {
            info!(node = %self.node, "deregistered from control service");
        } else {
            warn!(node = %self.node, message = %resp.message, "deregistration rejected");
        }

        Ok(RegisterOutcome {
            message: resp.message,
            success: resp.success,
        })
    }

    fn client(&self) -> ClusterResult<ControlServiceClient<Channel>> {
        self.client.clone().ok_or(ClusterError::InvalidState {
            actual: self.state,
            expected: "connected",
        })
    }

    fn expect_state(&self, expected: AgentState, name: &'static str) -> ClusterResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ClusterError::InvalidState {
                actual: self.state,
                expected: name,
            })
        }
    }
}
