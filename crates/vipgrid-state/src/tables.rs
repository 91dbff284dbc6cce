//! redb table definitions for the local node store.
//!
//! Keys are node ids, values are JSON-serialized [`crate::Node`] records.

use redb::TableDefinition;

/// Node records keyed by `{node_id}`.
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");
