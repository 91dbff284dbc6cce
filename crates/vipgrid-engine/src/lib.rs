//! vipgrid-engine — applies planned address changes to nodes.
//!
//! Operations from the planner are fanned out over a fixed number of
//! workers. Each worker re-reads its node, computes the full desired
//! address set, writes it in one call guarded by the node's fingerprint,
//! and then polls until the change is visible.
//!
//! # Architecture
//!
//! ```text
//! WorkerPool
//!   ├── work queue    (bounded, one Operation per message)
//!   ├── N workers     (each: get_node → desired set → set_addresses → wait)
//!   └── result queue  (one Applied per Operation)
//! ```
//!
//! Workers share nothing but the backend handle. Concurrent writers are
//! caught by the fingerprint check, not by locking here.
//!
//! # Convergence
//!
//! Polling backs off with elapsed time: 1s under 5s, 2s under 15s, 5s
//! under 60s, then 10s. Giving up is logged, never reported as an error.

pub mod convergence;
pub mod executor;

pub use convergence::{ConvergenceOutcome, backoff, wait_for_convergence};
pub use executor::{Applied, ApplyOutcome, WorkerPool, apply, desired_addresses};
