//! Convergence polling after an address write.
//!
//! A successful write is not immediately visible; the node is re-read
//! with a backoff that grows with elapsed time until its address count
//! matches, or the maximum wait runs out.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use vipgrid_state::Inventory;

/// How a wait for a node's address count ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceOutcome {
    /// The observed count reached the expected count.
    Converged { elapsed: Duration },
    /// The maximum wait elapsed first.
    TimedOut { elapsed: Duration },
    /// A poll read failed; waiting stopped early.
    Unobservable { elapsed: Duration },
}

impl ConvergenceOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceOutcome::Converged { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match *self {
            ConvergenceOutcome::Converged { elapsed }
            | ConvergenceOutcome::TimedOut { elapsed }
            | ConvergenceOutcome::Unobservable { elapsed } => elapsed,
        }
    }
}

/// Poll interval for a wait that has been running for `elapsed`.
pub fn backoff(elapsed: Duration) -> Duration {
    match elapsed.as_secs() {
        0..5 => Duration::from_secs(1),
        5..15 => Duration::from_secs(2),
        15..60 => Duration::from_secs(5),
        _ => Duration::from_secs(10),
    }
}

/// Poll `node_id` until it reports `expected` addresses or `max_wait` runs out.
///
/// Never fails: a timeout or a failed read is logged and returned as an
/// outcome, and the caller treats the write as applied either way.
pub async fn wait_for_convergence<I: Inventory>(
    inventory: &I,
    node_id: &str,
    expected: usize,
    max_wait: Duration,
) -> ConvergenceOutcome {
    let start = Instant::now();
    loop {
        let elapsed = start.elapsed();
        if elapsed >= max_wait {
            warn!(
                node = %node_id,
                waited_secs = elapsed.as_secs(),
                "gave up waiting for node update"
            );
            return ConvergenceOutcome::TimedOut { elapsed };
        }

        match inventory.get_node(node_id).await {
            Ok(node) if node.address_count() == expected => {
                let elapsed = start.elapsed();
                info!(
                    node = %node_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "node updated"
                );
                return ConvergenceOutcome::Converged { elapsed };
            }
            Ok(node) => {
                debug!(
                    node = %node_id,
                    observed = node.address_count(),
                    expected,
                    "node not updated yet"
                );
            }
            Err(e) => {
                warn!(node = %node_id, error = %e, "convergence poll failed, not waiting further");
                return ConvergenceOutcome::Unobservable {
                    elapsed: start.elapsed(),
                };
            }
        }

        tokio::time::sleep(backoff(start.elapsed())).await;
    }
}
