//! vipgrid-state — node model and inventory contracts for vipgrid.
//!
//! Defines the data the allocation core works with: [`Node`]s carrying
//! their managed alias addresses and an optimistic-concurrency
//! fingerprint, and the [`Operation`]s the planner emits against them.
//!
//! # Contracts
//!
//! The core never talks to a cloud API directly. It consumes two traits:
//!
//! ```text
//! Inventory::list_nodes()                         -> [NodeId]
//! Inventory::get_node(id)                         -> Node
//! Mutation::set_addresses(id, addrs, fingerprint) -> Ok | Conflict | Error
//! ```
//!
//! [`NodeStore`] implements both on top of [redb](https://docs.rs/redb),
//! on disk or in memory, and is what the daemon's standalone mode and the
//! test suites run against.

pub mod error;
pub mod inventory;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use inventory::{Backend, Inventory, Mutation, fetch_snapshot};
pub use store::NodeStore;
pub use types::*;
