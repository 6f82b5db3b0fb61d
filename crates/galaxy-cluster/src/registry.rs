//! Registry — the authoritative set of live nodes.
//!
//! Nodes are keyed by a deterministic identity derived from their
//! address, port and lowercased service name. All mutations take the
//! registry's single lock for their full read-modify-write.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::proto;

/// A node as announced to the control service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Role this node plays.
    pub service_name: String,
    /// Host or IP the node is reachable at.
    pub service_address: String,
    /// Port the node's own endpoint listens on.
    pub service_port: u32,
}

impl NodeDescriptor {
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u32) -> Self {
        Self {
            service_name: name.into(),
            service_address: address.into(),
            service_port: port,
        }
    }

    /// Identity key: `{address}:{port}-{lowercase(name)}`.
    pub fn key(&self) -> NodeKey {
        NodeKey(format!(
            "{}:{}-{}",
            self.service_address,
            self.service_port,
            self.service_name.to_lowercase()
        ))
    }
}

impl fmt::Display for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {}:{}",
            self.service_name, self.service_address, self.service_port
        )
    }
}

impl From<proto::Node> for NodeDescriptor {
    fn from(node: proto::Node) -> Self {
        Self {
            service_name: node.service_name,
            service_address: node.service_address,
            service_port: node.service_port,
        }
    }
}

impl From<NodeDescriptor> for proto::Node {
    fn from(node: NodeDescriptor) -> Self {
        Self {
            service_name: node.service_name,
            service_address: node.service_address,
            service_port: node.service_port,
        }
    }
}

/// Identity key of a registered node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(String);

impl NodeKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a register or deregister call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterOutcome {
    pub message: String,
    pub success: bool,
}

impl RegisterOutcome {
    fn accepted(message: String) -> Self {
        Self {
            message,
            success: true,
        }
    }

    fn rejected(message: String) -> Self {
        Self {
            message,
            success: false,
        }
    }
}

impl From<RegisterOutcome> for proto::RegisterResponse {
    fn from(outcome: RegisterOutcome) -> Self {
        Self {
            message: outcome.message,
            success: outcome.success,
        }
    }
}

/// In-memory keyed set of registered nodes.
///
/// Owned by the control endpoint; nothing else reads or writes it.
#[derive(Debug, Default)]
pub struct Registry {
    nodes: Mutex<HashMap<NodeKey, NodeDescriptor>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node unless one with the same identity key is present.
    pub fn register(&self, node: NodeDescriptor) -> RegisterOutcome {
        let key = node.key();
        let mut nodes = self.nodes.lock().expect("registry lock");

        if nodes.contains_key(&key) {
            let msg = format!("service with name {key} already registered");
            warn!(%key, "register failed: already registered");
            return RegisterOutcome::rejected(msg);
        }

        nodes.insert(key.clone(), node);
        info!(%key, nodes = nodes.len(), "node registered");
        RegisterOutcome::accepted(format!("service with name {key} registered"))
    }

    /// Remove the node with the same identity key, if any.
    pub fn deregister(&self, node: &NodeDescriptor) -> RegisterOutcome {
        let key = node.key();
        let mut nodes = self.nodes.lock().expect("registry lock");

        if nodes.remove(&key).is_none() {
            warn!(%key, "deregister failed: not found");
            return RegisterOutcome::rejected(format!("service with name {key} not found"));
        }

        info!(%key, nodes = nodes.len(), "node deregistered");
        RegisterOutcome::accepted(format!("service with name {key} deregistered"))
    }

    /// Every registered node except `requester`, in arbitrary order.
    ///
    /// The matching descriptors are copied out under the lock and the lock
    /// is released before returning, so callers can stream the result over
    /// the network without blocking writers. The result is a point-in-time
    /// view: registrations that land after the copy are not included.
    pub fn list_except(&self, requester: &NodeDescriptor) -> Vec<NodeDescriptor> {
        let key = requester.key();
        let nodes = self.nodes.lock().expect("registry lock");

        let peers: Vec<NodeDescriptor> = nodes
            .iter()
            .filter(|(k, _)| **k != key)
            .map(|(_, node)| node.clone())
            .collect();

        debug!(requester = %key, peers = peers.len(), "listed peers");
        peers
    }

    /// Whether a node with this identity key is registered.
    pub fn contains(&self, node: &NodeDescriptor) -> bool {
        self.nodes
            .lock()
            .expect("registry lock")
            .contains_key(&node.key())
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().expect("registry lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(port: u32) -> NodeDescriptor {
        NodeDescriptor::new("node", "localhost", port)
    }

    #[test]
    fn key_lowercases_name_only() {
        let n = NodeDescriptor::new("Worker", "Host-A", 9001);
        assert_eq!(n.key().as_str(), "Host-A:9001-worker");
    }

    #[test]
    fn register_then_duplicate() {
        let registry = Registry::new();

        let first = registry.register(node(9001));
        assert!(first.success);
        assert!(first.message.ends_with("registered"));

        let second = registry.register(node(9001));
        assert!(!second.success);
        assert!(second.message.contains("already registered"));

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_detection_ignores_name_case() {
        let registry = Registry::new();
        assert!(registry.register(NodeDescriptor::new("Node", "localhost", 9001)).success);

        let dup = registry.register(NodeDescriptor::new("NODE", "localhost", 9001));
        assert!(!dup.success);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn deregister_missing_is_not_found() {
        let registry = Registry::new();
        registry.register(node(9002));

        let outcome = registry.deregister(&node(9001));
        assert!(!outcome.success);
        assert!(outcome.message.contains("not found"));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&node(9002)));
    }

    #[test]
    fn deregister_frees_key_for_reregistration() {
        let registry = Registry::new();
        assert!(registry.register(node(9001)).success);

        let outcome = registry.deregister(&node(9001));
        assert!(outcome.success);
        assert!(outcome.message.ends_with("deregistered"));
        assert!(registry.is_empty());

        assert!(registry.register(node(9001)).success);
    }

    #[test]
    fn list_except_omits_requester() {
        let registry = Registry::new();
        registry.register(node(9001));
        registry.register(node(9002));
        registry.register(node(9003));

        let mut peers = registry.list_except(&node(9001));
        peers.sort_by_key(|n| n.service_port);
        assert_eq!(peers, vec![node(9002), node(9003)]);
    }

    #[test]
    fn list_except_unregistered_requester_sees_everyone() {
        let registry = Registry::new();
        registry.register(node(9001));
        registry.register(node(9002));

        assert_eq!(registry.list_except(&node(9999)).len(), 2);
    }

    #[test]
    fn scenario_single_node() {
        let registry = Registry::new();
        let a = node(9001);

        assert!(registry.register(a.clone()).success);
        assert!(!registry.register(a.clone()).success);
        assert!(registry.list_except(&a).is_empty());
        assert!(registry.deregister(&a).success);
        assert!(registry.list_except(&a).is_empty());
    }

    #[test]
    fn scenario_two_nodes_see_each_other() {
        let registry = Registry::new();
        let a = node(9001);
        let b = node(9002);

        assert!(registry.register(a.clone()).success);
        assert!(registry.register(b.clone()).success);

        assert_eq!(registry.list_except(&a), vec![b.clone()]);
        assert_eq!(registry.list_except(&b), vec![a]);
    }

    #[test]
    fn concurrent_duplicate_registrations_admit_one() {
        let registry = Registry::new();

        let wins = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| s.spawn(|| registry.register(node(9001)).success))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });

        assert_eq!(wins, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn concurrent_distinct_registrations_all_land() {
        let registry = Registry::new();

        std::thread::scope(|s| {
            for port in 9000..9032 {
                let registry = &registry;
                s.spawn(move || assert!(registry.register(node(port)).success));
            }
        });

        assert_eq!(registry.len(), 32);
    }

    #[test]
    fn descriptor_proto_conversion() {
        let n = NodeDescriptor::new("node", "10.0.0.1", 9001);
        let wire: proto::Node = n.clone().into();
        assert_eq!(wire.service_port, 9001);
        assert_eq!(NodeDescriptor::from(wire), n);
    }

    #[test]
    fn descriptor_serializes_field_names() {
        let json = serde_json::to_value(node(9001)).unwrap();
        assert_eq!(json["service_name"], "node");
        assert_eq!(json["service_address"], "localhost");
        assert_eq!(json["service_port"], 9001);
    }
}
