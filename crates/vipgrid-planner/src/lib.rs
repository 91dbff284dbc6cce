//! vipgrid allocation planner — decides which addresses move where.
//!
//! Works on a [`Snapshot`](vipgrid_state::Snapshot) of the node group and
//! the configured [`AddressPool`]; produces [`Operation`](vipgrid_state::Operation)s
//! for the engine. Nothing in this crate performs I/O.
//!
//! # Components
//!
//! - **`pool`** — The managed address pool (parsing, prefix expansion)
//! - **`planner`** — Spare detection, grow pass, Robin Hood shrink pass
//!
//! # Balancing
//!
//! ```text
//! grow:   for each spare address
//!             give it to the node with the fewest (current + staged)
//!
//! shrink: target = current counts
//!         while max(target) - min(target) > 1
//!             target[first max] -= 1
//!             target[first min] += 1
//!         remove (current - target) addresses from each node above target
//! ```
//!
//! Nodes are scanned in id order, so ties always go to the lowest id.

pub mod planner;
pub mod pool;

pub use planner::{balanced_targets, plan_grow, plan_shrink, spare_addresses};
pub use pool::{AddressPool, PoolError, expand_prefix};
