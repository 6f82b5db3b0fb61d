//! Wire types for the `galaxy` gRPC package.
//!
//! Services:
//!
//! ```text
//! service ControlService {
//!   rpc Heartbeat(Empty) returns (HeartbeatResponse);
//!   rpc Register(Node) returns (RegisterResponse);
//!   rpc Deregister(Node) returns (RegisterResponse);
//!   rpc ListNodes(Node) returns (stream Node);
//! }
//!
//! service NodeService {
//!   rpc Heartbeat(Empty) returns (HeartbeatResponse);
//! }
//! ```

/// Empty request body.
#[derive(Clone, Copy, PartialEq, Eq, Hash, prost::Message)]
pub struct Empty {}

/// A node as it travels on the wire.
#[derive(Clone, PartialEq, Eq, Hash, prost::Message)]
pub struct Node {
    #[prost(string, tag = "1")]
    pub service_name: String,
    #[prost(string, tag = "2")]
    pub service_address: String,
    #[prost(uint32, tag = "3")]
    pub service_port: u32,
}

/// Liveness reported by a heartbeat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ServingStatus {
    Unknown = 0,
    Up = 1,
    Down = 2,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, prost::Message)]
pub struct HeartbeatResponse {
    #[prost(enumeration = "ServingStatus", tag = "1")]
    pub status: i32,
}

impl HeartbeatResponse {
    pub fn up() -> Self {
        Self {
            status: ServingStatus::Up.into(),
        }
    }
}

/// Result of a register or deregister call.
///
/// `success = false` is a business outcome, not an RPC failure.
#[derive(Clone, PartialEq, Eq, Hash, prost::Message)]
pub struct RegisterResponse {
    #[prost(string, tag = "1")]
    pub message: String,
    #[prost(bool, tag = "2")]
    pub success: bool,
}

include!(concat!(env!("OUT_DIR"), "/galaxy.ControlService.rs"));
include!(concat!(env!("OUT_DIR"), "/galaxy.NodeService.rs"));
