//! vipgrid-control — the control loop that keeps addresses balanced.
//!
//! Each cycle re-reads the node group twice, once per pass:
//!
//! ```text
//! loop:
//!     changes  = allocate_ips()   // spare addresses → least-loaded nodes
//!     changes += reduce_ips()     // overloaded nodes give addresses back
//!     if changes > 0: log state, go again immediately
//!     else:           sleep the inactivity interval
//! ```
//!
//! Any failure inside a pass counts as zero changes and is retried on the
//! next cycle. Only one controller may run against a given pool and node
//! group at a time; this is an operating constraint, not enforced here.

pub mod config;
pub mod controller;
pub mod error;

pub use config::{FileConfig, ManagerConfig, parse_duration};
pub use controller::Controller;
pub use error::{ConfigError, ConfigResult};
