//! Node gRPC server — the peer-facing endpoint every node runs.
//!
//! Only answers heartbeats, so a control service or a peer can check a
//! node's liveness directly.

use tonic::{Request, Response, Status};
use tracing::debug;

use crate::proto;
use crate::proto::node_service_server::NodeService;

/// gRPC implementation of the node service.
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeServer;

impl NodeServer {
    pub fn new() -> Self {
        Self
    }

    /// Get the tonic service for mounting on a gRPC server.
    pub fn into_service(self) -> proto::node_service_server::NodeServiceServer<Self> {
        proto::node_service_server::NodeServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl NodeService for NodeServer {
    async fn heartbeat(
        &self,
        _request: Request<proto::Empty>,
    ) -> Result<Response<proto::HeartbeatResponse>, Status> {
        debug!("node heartbeat");
        Ok(Response::new(proto::HeartbeatResponse::up()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn heartbeat_reports_up() {
        let resp = NodeServer::new()
            .heartbeat(Request::new(proto::Empty {}))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.status(), proto::ServingStatus::Up);
    }
}
