//! Worker pool — applies operations concurrently against fresh node state.
//!
//! The pool owns its work queue and result queue. A batch submitted
//! through [`WorkerPool::execute_batch`] returns only after one result has
//! come back for every operation that was sent.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vipgrid_state::{Backend, NodeId, Operation, OperationKind};

use crate::convergence::{ConvergenceOutcome, wait_for_convergence};

/// What happened to a single operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The node already had the desired address set; nothing was written.
    Unchanged,
    /// The write was accepted.
    Changed(ConvergenceOutcome),
    /// The node could not be re-read; skipped for this pass.
    FetchFailed,
    /// The node changed after it was read; the write was rejected.
    Conflict,
    /// The write failed for any other reason.
    WriteFailed,
    /// Applying the operation panicked; the node was left as the backend had it.
    Aborted,
}

impl ApplyOutcome {
    /// Only accepted writes count as changes.
    pub fn is_change(&self) -> bool {
        matches!(self, ApplyOutcome::Changed(_))
    }
}

/// Result message for one operation.
#[derive(Debug, Clone)]
pub struct Applied {
    pub node_id: NodeId,
    pub kind: OperationKind,
    pub outcome: ApplyOutcome,
}

/// Final address set for a node: `current ∪ delta` for adds, `current ∖ delta`
/// for removes. Order follows `current`, then `delta`; duplicates are dropped.
pub fn desired_addresses(kind: OperationKind, current: &[IpAddr], delta: &[IpAddr]) -> Vec<IpAddr> {
    let mut seen = HashSet::new();
    match kind {
        OperationKind::Add => current
            .iter()
            .chain(delta)
            .filter(|addr| seen.insert(**addr))
            .copied()
            .collect(),
        OperationKind::Remove => {
            let removed: HashSet<&IpAddr> = delta.iter().collect();
            current
                .iter()
                .filter(|addr| !removed.contains(addr) && seen.insert(**addr))
                .copied()
                .collect()
        }
    }
}

/// Apply one operation: re-read, compute, write the whole set, wait.
pub async fn apply<B: Backend>(backend: &B, op: &Operation, max_wait: Duration) -> ApplyOutcome {
    let node = match backend.get_node(&op.node_id).await {
        Ok(node) => node,
        Err(e) => {
            warn!(node = %op.node_id, error = %e, "failed to read node, skipping");
            return ApplyOutcome::FetchFailed;
        }
    };

    let desired = desired_addresses(op.kind, &node.addresses, &op.addresses);
    let current: HashSet<&IpAddr> = node.addresses.iter().collect();
    if desired.len() == current.len() && desired.iter().all(|addr| current.contains(addr)) {
        debug!(node = %node.id, kind = %op.kind, "no actual change");
        return ApplyOutcome::Unchanged;
    }

    if let Err(e) = backend
        .set_addresses(&node.id, &desired, &node.fingerprint)
        .await
    {
        if e.is_conflict() {
            warn!(node = %node.id, error = %e, "node changed since read, write rejected");
            return ApplyOutcome::Conflict;
        }
        warn!(node = %node.id, error = %e, "failed to update addresses");
        return ApplyOutcome::WriteFailed;
    }

    info!(
        node = %node.id,
        kind = %op.kind,
        from = node.addresses.len(),
        to = desired.len(),
        "addresses written"
    );
    let outcome = wait_for_convergence(backend, &node.id, desired.len(), max_wait).await;
    ApplyOutcome::Changed(outcome)
}

/// A fixed set of workers fed through an owned work queue.
pub struct WorkerPool {
    work_tx: mpsc::Sender<Operation>,
    results_rx: mpsc::UnboundedReceiver<Applied>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` workers (at least one) on the current tokio runtime.
    pub fn start<B: Backend>(backend: Arc<B>, workers: usize, max_wait: Duration) -> Self {
        let workers = workers.max(1);
        let (work_tx, work_rx) = mpsc::channel::<Operation>(workers);
        let work_rx = Arc::new(Mutex::new(work_rx));
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        let handles = (0..workers)
            .map(|index| {
                let backend = Arc::clone(&backend);
                let work_rx = Arc::clone(&work_rx);
                let results_tx = results_tx.clone();
                tokio::spawn(async move {
                    run_worker(index, backend, work_rx, results_tx, max_wait).await;
                })
            })
            .collect();

        info!(workers, max_wait_secs = max_wait.as_secs(), "worker pool started");
        Self {
            work_tx,
            results_rx,
            handles,
        }
    }

    /// Number of workers in the pool.
    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    /// Submit every non-empty operation and collect one result for each.
    pub async fn execute_batch(&mut self, operations: Vec<Operation>) -> Vec<Applied> {
        let mut in_flight = 0usize;
        for op in operations {
            if op.is_empty() {
                continue;
            }
            info!(node = %op.node_id, kind = %op.kind, addresses = ?op.addresses, "submitting operation");
            if self.work_tx.send(op).await.is_err() {
                warn!("work queue closed, dropping remaining operations");
                break;
            }
            in_flight += 1;
        }

        let mut results = Vec::with_capacity(in_flight);
        while results.len() < in_flight {
            match self.results_rx.recv().await {
                Some(applied) => results.push(applied),
                None => {
                    warn!(
                        expected = in_flight,
                        received = results.len(),
                        "all workers exited before the batch finished"
                    );
                    break;
                }
            }
        }
        results
    }

    /// Submit a batch and return how many operations changed a node.
    pub async fn submit(&mut self, operations: Vec<Operation>) -> usize {
        self.execute_batch(operations)
            .await
            .iter()
            .filter(|applied| applied.outcome.is_change())
            .count()
    }

    /// Close the work queue and wait for every worker to exit.
    pub async fn shutdown(self) {
        let Self {
            work_tx, handles, ..
        } = self;
        drop(work_tx);
        for handle in handles {
            let _ = handle.await;
        }
        debug!("worker pool stopped");
    }
}

async fn run_worker<B: Backend>(
    index: usize,
    backend: Arc<B>,
    work_rx: Arc<Mutex<mpsc::Receiver<Operation>>>,
    results_tx: mpsc::UnboundedSender<Applied>,
    max_wait: Duration,
) {
    loop {
        let next = work_rx.lock().await.recv().await;
        let Some(op) = next else {
            debug!(worker = index, "work queue closed");
            break;
        };

        // Each apply runs in its own task so a panicking backend costs one
        // result, not the worker and the batch waiting on it.
        let task = {
            let backend = Arc::clone(&backend);
            let op = op.clone();
            tokio::spawn(async move { apply(backend.as_ref(), &op, max_wait).await })
        };
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(worker = index, node = %op.node_id, error = %e, "operation aborted");
                ApplyOutcome::Aborted
            }
        };
        let applied = Applied {
            node_id: op.node_id,
            kind: op.kind,
            outcome,
        };
        if results_tx.send(applied).is_err() {
            break;
        }
    }
}
