//! Inventory and mutation contracts consumed by the allocation core.

use std::future::Future;
use std::net::IpAddr;

use tracing::warn;

use crate::error::{StateError, StateResult};
use crate::store::NodeStore;
use crate::types::*;

/// Read access to the node group.
pub trait Inventory: Send + Sync {
    /// IDs of every node currently in the group.
    fn list_nodes(&self) -> impl Future<Output = StateResult<Vec<NodeId>>> + Send;

    /// Authoritative state of one node. A missing node is `StateError::NotFound`.
    fn get_node(&self, id: &str) -> impl Future<Output = StateResult<Node>> + Send;
}

/// Write access to a node's managed address set.
pub trait Mutation: Send + Sync {
    /// Replace the node's managed addresses with `addresses`.
    ///
    /// Fails with `StateError::Conflict` if `fingerprint` no longer matches.
    fn set_addresses(
        &self,
        id: &str,
        addresses: &[IpAddr],
        fingerprint: &str,
    ) -> impl Future<Output = StateResult<()>> + Send;
}

/// Everything the worker pool needs from the outside world.
pub trait Backend: Inventory + Mutation + 'static {}

impl<T: Inventory + Mutation + 'static> Backend for T {}

/// Read every node in the group.
///
/// Failing to list the group fails the whole read. A node that cannot be
/// read is left out and logged; the rest of the snapshot is still returned.
pub async fn fetch_snapshot<I: Inventory>(inventory: &I) -> StateResult<Snapshot> {
    let ids = inventory.list_nodes().await?;
    let mut snapshot = Snapshot::new();
    for id in ids {
        match inventory.get_node(&id).await {
            Ok(node) => {
                snapshot.insert(id, node);
            }
            Err(e) => {
                warn!(node = %id, error = %e, "skipping node, read failed");
            }
        }
    }
    Ok(snapshot)
}

impl Inventory for NodeStore {
    async fn list_nodes(&self) -> StateResult<Vec<NodeId>> {
        Ok(NodeStore::list_nodes(self)?
            .into_iter()
            .map(|n| n.id)
            .collect())
    }

    async fn get_node(&self, id: &str) -> StateResult<Node> {
        NodeStore::get_node(self, id)?.ok_or_else(|| StateError::NotFound(id.to_string()))
    }
}

impl Mutation for NodeStore {
    async fn set_addresses(
        &self,
        id: &str,
        addresses: &[IpAddr],
        fingerprint: &str,
    ) -> StateResult<()> {
        NodeStore::set_addresses(self, id, addresses, fingerprint).map(|_| ())
    }
}
