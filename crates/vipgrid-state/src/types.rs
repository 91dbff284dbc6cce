//! Domain types shared by the planner, the engine, and the node store.
//!
//! A node is always re-read wholesale from the inventory; nothing here is
//! patched incrementally in memory.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Unique identifier for a node in the group.
pub type NodeId = String;

/// Opaque optimistic-concurrency token for a node's network attachment.
pub type Fingerprint = String;

/// Every node of one inventory read, ordered by node id.
pub type Snapshot = BTreeMap<NodeId, Node>;

// ── Node ──────────────────────────────────────────────────────────

/// A worker node and its managed alias addresses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    /// Network attachment the alias addresses live on (e.g. "nic0").
    pub attachment_id: String,
    /// Token supplied on write; the write is rejected if it is stale.
    pub fingerprint: Fingerprint,
    /// Addresses from the managed alias network currently on this node.
    pub addresses: Vec<IpAddr>,
    /// Alias ranges from other networks on the same attachment.
    #[serde(default)]
    pub other_ranges: Vec<AliasRange>,
}

/// An alias range that belongs to an unmanaged alias network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AliasRange {
    pub network: String,
    pub cidr: String,
}

impl Node {
    /// Create a node with no addresses.
    pub fn new(id: impl Into<NodeId>, attachment_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attachment_id: attachment_id.into(),
            fingerprint: String::new(),
            addresses: Vec::new(),
            other_ranges: Vec::new(),
        }
    }

    /// Number of managed addresses on this node.
    pub fn address_count(&self) -> usize {
        self.addresses.len()
    }
}

// ── Operation ─────────────────────────────────────────────────────

/// Direction of an address change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Add,
    Remove,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Add => f.write_str("add"),
            OperationKind::Remove => f.write_str("remove"),
        }
    }
}

/// A planned change to one node's address set.
///
/// Produced by the planner and consumed exactly once by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    pub node_id: NodeId,
    pub addresses: Vec<IpAddr>,
}

impl Operation {
    pub fn add(node_id: impl Into<NodeId>, addresses: Vec<IpAddr>) -> Self {
        Self {
            kind: OperationKind::Add,
            node_id: node_id.into(),
            addresses,
        }
    }

    pub fn remove(node_id: impl Into<NodeId>, addresses: Vec<IpAddr>) -> Self {
        Self {
            kind: OperationKind::Remove,
            node_id: node_id.into(),
            addresses,
        }
    }

    /// An operation with no addresses is never submitted.
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}
