//! NodeStore — redb-backed node inventory.
//!
//! Stands in for a cloud inventory: holds each node's managed alias
//! addresses and fingerprint, and enforces the fingerprint check on
//! address writes. Supports both on-disk and in-memory backends (the
//! latter for testing).

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::NODES;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe node store backed by redb.
#[derive(Clone)]
pub struct NodeStore {
    db: Arc<Database>,
}

impl NodeStore {
    /// Open (or create) a persistent node store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "node store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory node store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory node store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Add a node with no addresses. Returns the existing record if the
    /// node is already registered.
    pub fn register_node(&self, id: &str, attachment_id: &str) -> StateResult<Node> {
        if let Some(existing) = self.get_node(id)? {
            return Ok(existing);
        }
        let mut node = Node::new(id, attachment_id);
        node.fingerprint = derive_fingerprint(id, "", &node.addresses);
        self.put_node(&node)?;
        debug!(node = %id, attachment = %attachment_id, "node registered");
        Ok(node)
    }

    /// Insert or overwrite a node record as-is.
    pub fn put_node(&self, node: &Node) -> StateResult<()> {
        let value = serde_json::to_vec(node).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            table
                .insert(node.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get a node by ID.
    pub fn get_node(&self, id: &str) -> StateResult<Option<Node>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let node: Node =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    /// List all nodes, ordered by ID.
    pub fn list_nodes(&self) -> StateResult<Vec<Node>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let node: Node =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(node);
        }
        Ok(results)
    }

    /// Delete a node by ID. Returns true if it existed.
    pub fn delete_node(&self, id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(node = %id, existed, "node deleted");
        Ok(existed)
    }

    /// Replace a node's managed addresses if `fingerprint` is current.
    ///
    /// Read, compare, and write happen in a single write transaction.
    /// `other_ranges` are carried over untouched. Returns the updated node.
    pub fn set_addresses(
        &self,
        id: &str,
        addresses: &[IpAddr],
        fingerprint: &str,
    ) -> StateResult<Node> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            let mut node: Node = match table.get(id).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(id.to_string())),
            };

            if node.fingerprint != fingerprint {
                return Err(StateError::Conflict {
                    node: id.to_string(),
                    expected: fingerprint.to_string(),
                    actual: node.fingerprint,
                });
            }

            node.addresses = addresses.to_vec();
            node.fingerprint = derive_fingerprint(id, fingerprint, addresses);

            let value = serde_json::to_vec(&node).map_err(map_err!(Serialize))?;
            table
                .insert(id, value.as_slice())
                .map_err(map_err!(Write))?;
            updated = node;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(node = %id, count = addresses.len(), "addresses replaced");
        Ok(updated)
    }
}

/// Chain the previous fingerprint into the next so every write changes it.
fn derive_fingerprint(id: &str, previous: &str, addresses: &[IpAddr]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update([0]);
    hasher.update(previous.as_bytes());
    for addr in addresses {
        hasher.update([0]);
        hasher.update(addr.to_string().as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn register_and_get() {
        let store = NodeStore::open_in_memory().unwrap();
        let node = store.register_node("vm-1", "nic0").unwrap();

        assert_eq!(node.attachment_id, "nic0");
        assert!(node.addresses.is_empty());
        assert_eq!(node.fingerprint.len(), 16);
        assert_eq!(store.get_node("vm-1").unwrap(), Some(node));
    }

    #[test]
    fn register_is_idempotent() {
        let store = NodeStore::open_in_memory().unwrap();
        let first = store.register_node("vm-1", "nic0").unwrap();
        store
            .set_addresses("vm-1", &[ip("10.0.0.1")], &first.fingerprint)
            .unwrap();

        let again = store.register_node("vm-1", "nic0").unwrap();
        assert_eq!(again.addresses, vec![ip("10.0.0.1")]);
    }

    #[test]
    fn get_nonexistent_returns_none() {
        let store = NodeStore::open_in_memory().unwrap();
        assert!(store.get_node("missing").unwrap().is_none());
    }

    #[test]
    fn list_is_ordered_by_id() {
        let store = NodeStore::open_in_memory().unwrap();
        store.register_node("vm-b", "nic0").unwrap();
        store.register_node("vm-a", "nic0").unwrap();
        store.register_node("vm-c", "nic0").unwrap();

        let ids: Vec<_> = store.list_nodes().unwrap().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["vm-a", "vm-b", "vm-c"]);
    }

    #[test]
    fn delete_node() {
        let store = NodeStore::open_in_memory().unwrap();
        store.register_node("vm-1", "nic0").unwrap();

        assert!(store.delete_node("vm-1").unwrap());
        assert!(!store.delete_node("vm-1").unwrap());
        assert!(store.get_node("vm-1").unwrap().is_none());
    }

    #[test]
    fn set_addresses_rotates_fingerprint() {
        let store = NodeStore::open_in_memory().unwrap();
        let node = store.register_node("vm-1", "nic0").unwrap();

        let updated = store
            .set_addresses("vm-1", &[ip("10.0.0.1"), ip("10.0.0.2")], &node.fingerprint)
            .unwrap();

        assert_eq!(updated.addresses.len(), 2);
        assert_ne!(updated.fingerprint, node.fingerprint);
        assert_eq!(store.get_node("vm-1").unwrap(), Some(updated));
    }

    #[test]
    fn stale_fingerprint_is_a_conflict() {
        let store = NodeStore::open_in_memory().unwrap();
        let node = store.register_node("vm-1", "nic0").unwrap();
        store
            .set_addresses("vm-1", &[ip("10.0.0.1")], &node.fingerprint)
            .unwrap();

        let err = store
            .set_addresses("vm-1", &[ip("10.0.0.2")], &node.fingerprint)
            .unwrap_err();
        assert!(err.is_conflict());

        // The rejected write left the node untouched.
        let current = store.get_node("vm-1").unwrap().unwrap();
        assert_eq!(current.addresses, vec![ip("10.0.0.1")]);
    }

    #[test]
    fn same_addresses_still_rotate_fingerprint() {
        let store = NodeStore::open_in_memory().unwrap();
        let node = store.register_node("vm-1", "nic0").unwrap();
        let a = store.set_addresses("vm-1", &[], &node.fingerprint).unwrap();
        assert_ne!(a.fingerprint, node.fingerprint);
    }

    #[test]
    fn set_addresses_preserves_other_ranges() {
        let store = NodeStore::open_in_memory().unwrap();
        let mut node = store.register_node("vm-1", "nic0").unwrap();
        node.other_ranges.push(AliasRange {
            network: "pods".to_string(),
            cidr: "10.8.0.0/24".to_string(),
        });
        store.put_node(&node).unwrap();

        let updated = store
            .set_addresses("vm-1", &[ip("10.0.0.1")], &node.fingerprint)
            .unwrap();
        assert_eq!(updated.other_ranges, node.other_ranges);
    }

    #[test]
    fn set_addresses_on_missing_node() {
        let store = NodeStore::open_in_memory().unwrap();
        let err = store.set_addresses("ghost", &[], "abc").unwrap_err();
        assert!(matches!(err, StateError::NotFound(id) if id == "ghost"));
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.redb");

        {
            let store = NodeStore::open(&path).unwrap();
            let node = store.register_node("vm-1", "nic0").unwrap();
            store
                .set_addresses("vm-1", &[ip("10.0.0.7")], &node.fingerprint)
                .unwrap();
        }

        let store = NodeStore::open(&path).unwrap();
        let node = store.get_node("vm-1").unwrap().unwrap();
        assert_eq!(node.addresses, vec![ip("10.0.0.7")]);
    }
}
