//! Control gRPC server — control service side.
//!
//! Implements the `ControlService` gRPC interface. Dispatches heartbeat,
//! register, deregister and list calls to the [`Registry`] it owns.

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{debug, warn};

use crate::proto;
use crate::proto::control_service_server::ControlService;
use crate::registry::{NodeDescriptor, Registry};

/// Peers buffered between the registry sweep and the response stream.
const LIST_STREAM_BUFFER: usize = 16;

/// gRPC implementation of the control service.
pub struct ControlServer {
    registry: Registry,
}

impl ControlServer {
    /// Create a control server that takes ownership of `registry`.
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Get the tonic service for mounting on a gRPC server.
    pub fn into_service(self) -> proto::control_service_server::ControlServiceServer<Self> {
        proto::control_service_server::ControlServiceServer::new(self)
    }
}

impl Default for ControlServer {
    fn default() -> Self {
        Self::new(Registry::new())
    }
}

#[tonic::async_trait]
impl ControlService for ControlServer {
    type ListNodesStream = ReceiverStream<Result<proto::Node, Status>>;

    async fn heartbeat(
        &self,
        _request: Request<proto::Empty>,
    ) -> Result<Response<proto::HeartbeatResponse>, Status> {
        debug!("heartbeat");
        Ok(Response::new(proto::HeartbeatResponse::up()))
    }

    async fn register(
        &self,
        request: Request<proto::Node>,
    ) -> Result<Response<proto::RegisterResponse>, Status> {
        let node = NodeDescriptor::from(request.into_inner());
        let outcome = self.registry.register(node);
        Ok(Response::new(outcome.into()))
    }

    async fn deregister(
        &self,
        request: Request<proto::Node>,
    ) -> Result<Response<proto::RegisterResponse>, Status> {
        let node = NodeDescriptor::from(request.into_inner());
        let outcome = self.registry.deregister(&node);
        Ok(Response::new(outcome.into()))
    }

    async fn list_nodes(
        &self,
        request: Request<proto::Node>,
    ) -> Result<Response<Self::ListNodesStream>, Status> {
        let requester = NodeDescriptor::from(request.into_inner());
        let peers = self.registry.list_except(&requester);
        let requester = requester.key();

        let (tx, rx) = mpsc::channel(LIST_STREAM_BUFFER);
        tokio::spawn(async move {
            let total = peers.len();
            let sent = stream_peers(peers, tx).await;
            if sent < total {
                warn!(%requester, sent, total, "list stream closed by caller");
            } else {
                debug!(%requester, sent, "list stream complete");
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

/// Send `peers` down `tx` in order, stopping at the first failed send.
///
/// Returns how many peers were delivered.
async fn stream_peers(
    peers: Vec<NodeDescriptor>,
    tx: mpsc::Sender<Result<proto::Node, Status>>,
) -> usize {
    let mut sent = 0;
    for peer in peers {
        if tx.send(Ok(peer.into())).await.is_err() {
            break;
        }
        sent += 1;
    }
    sent
}

#[cfg(test)]
mod tests {
    use tokio_stream::StreamExt;

    use super::*;

    fn wire(port: u32) -> proto::Node {
        NodeDescriptor::new("node", "localhost", port).into()
    }

    async fn list(server: &ControlServer, requester: proto::Node) -> Vec<proto::Node> {
        let stream = server
            .list_nodes(Request::new(requester))
            .await
            .unwrap()
            .into_inner();
        stream.map(|item| item.unwrap()).collect().await
    }

    #[tokio::test]
    async fn heartbeat_reports_up() {
        let server = ControlServer::default();
        let resp = server
            .heartbeat(Request::new(proto::Empty {}))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.status(), proto::ServingStatus::Up);
    }

    #[tokio::test]
    async fn duplicate_register_is_successful_rpc() {
        let server = ControlServer::default();

        let first = server.register(Request::new(wire(9001))).await.unwrap();
        assert!(first.into_inner().success);

        let second = server
            .register(Request::new(wire(9001)))
            .await
            .expect("duplicate must not be a transport error")
            .into_inner();
        assert!(!second.success);
        assert!(second.message.contains("already registered"));
        assert_eq!(server.registry().len(), 1);
    }

    #[tokio::test]
    async fn deregister_unknown_is_successful_rpc() {
        let server = ControlServer::default();
        let resp = server
            .deregister(Request::new(wire(9001)))
            .await
            .unwrap()
            .into_inner();
        assert!(!resp.success);
        assert!(resp.message.contains("not found"));
    }

    #[tokio::test]
    async fn list_nodes_streams_peers_only() {
        let server = ControlServer::default();
        for port in [9001, 9002, 9003] {
            server.register(Request::new(wire(port))).await.unwrap();
        }

        let mut ports: Vec<u32> = list(&server, wire(9002))
            .await
            .into_iter()
            .map(|n| n.service_port)
            .collect();
        ports.sort_unstable();
        assert_eq!(ports, vec![9001, 9003]);
    }

    #[tokio::test]
    async fn list_nodes_on_empty_registry() {
        let server = ControlServer::default();
        assert!(list(&server, wire(9001)).await.is_empty());
    }

    #[tokio::test]
    async fn dropped_list_stream_leaves_registry_writable() {
        let server = ControlServer::default();
        for port in 9000..9100 {
            server.register(Request::new(wire(port))).await.unwrap();
        }

        let stream = server
            .list_nodes(Request::new(wire(1)))
            .await
            .unwrap()
            .into_inner();
        drop(stream);

        let resp = server.register(Request::new(wire(9100))).await.unwrap();
        assert!(resp.into_inner().success);
        assert_eq!(server.registry().len(), 101);
    }

    #[tokio::test]
    async fn stream_peers_stops_at_first_failed_send() {
        let peers: Vec<NodeDescriptor> = (9000..9100)
            .map(|port| NodeDescriptor::new("node", "localhost", port))
            .collect();
        let (tx, mut rx) = mpsc::channel(1);

        let producer = tokio::spawn(stream_peers(peers, tx));

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.service_port, 9000);
        drop(rx);

        let sent = producer.await.unwrap();
        assert!(sent <= 2, "producer kept sending after the caller left: {sent}");
    }

    #[tokio::test]
    async fn stream_peers_delivers_everything_to_a_live_caller() {
        let peers: Vec<NodeDescriptor> = (9000..9005)
            .map(|port| NodeDescriptor::new("node", "localhost", port))
            .collect();
        let (tx, mut rx) = mpsc::channel(LIST_STREAM_BUFFER);

        assert_eq!(stream_peers(peers, tx).await, 5);

        let mut ports = Vec::new();
        while let Some(node) = rx.recv().await {
            ports.push(node.unwrap().service_port);
        }
        assert_eq!(ports, vec![9000, 9001, 9002, 9003, 9004]);
    }
}
