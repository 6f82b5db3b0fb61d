//! Error types for the Galaxy cluster crate.
//!
//! Only transport and protocol failures live here. A duplicate
//! registration or a missing deregistration target is a normal
//! [`RegisterOutcome`](crate::registry::RegisterOutcome), never an error.

use thiserror::Error;

use crate::agent::AgentState;

/// Result type alias for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors raised by the node agent and the cluster servers.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("could not connect to control service at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("{op} rpc failed: {status}")]
    Rpc {
        op: &'static str,
        status: Box<tonic::Status>,
    },

    #[error("control service is not serving (status {0})")]
    NotServing(String),

    #[error("agent is {actual:?}, expected {expected}")]
    InvalidState {
        actual: AgentState,
        expected: &'static str,
    },
}

impl ClusterError {
    /// Build a closure mapping a `tonic::Status` into an `Rpc` error for `op`.
    pub(crate) fn rpc(op: &'static str) -> impl FnOnce(tonic::Status) -> Self {
        move |status| ClusterError::Rpc {
            op,
            status: Box::new(status),
        }
    }
}
