//! The allocation control loop.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use vipgrid_engine::WorkerPool;
use vipgrid_planner::{plan_grow, plan_shrink, spare_addresses};
use vipgrid_state::{Backend, fetch_snapshot};

use crate::config::ManagerConfig;

/// Drives grow and shrink passes against one node group.
pub struct Controller<B: Backend> {
    backend: Arc<B>,
    config: ManagerConfig,
    executor: WorkerPool,
}

impl<B: Backend> Controller<B> {
    /// Start the worker pool. `config` is expected to be validated.
    pub fn new(backend: Arc<B>, config: ManagerConfig) -> Self {
        let executor = WorkerPool::start(Arc::clone(&backend), config.workers, config.max_wait);
        Self {
            backend,
            config,
            executor,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Hand spare addresses to the least-loaded nodes.
    /// Returns the number of nodes that changed.
    pub async fn allocate_ips(&mut self) -> usize {
        let snapshot = match fetch_snapshot(self.backend.as_ref()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "failed to read node group, skipping grow pass");
                return 0;
            }
        };

        let operations = plan_grow(&self.config.pool, &snapshot);
        if operations.is_empty() {
            return 0;
        }
        self.executor.submit(operations).await
    }

    /// Take addresses away from nodes above their balanced share.
    /// Returns the number of nodes that changed.
    pub async fn reduce_ips(&mut self) -> usize {
        let snapshot = match fetch_snapshot(self.backend.as_ref()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "failed to read node group, skipping shrink pass");
                return 0;
            }
        };

        let operations = plan_shrink(&snapshot);
        if operations.is_empty() {
            return 0;
        }
        self.executor.submit(operations).await
    }

    /// One grow pass followed by one shrink pass.
    pub async fn run_once(&mut self) -> usize {
        let grown = self.allocate_ips().await;
        let shrunk = self.reduce_ips().await;
        debug!(grown, shrunk, "cycle complete");
        grown + shrunk
    }

    /// Log every node's current assignment.
    pub async fn log_state(&self) {
        let snapshot = match fetch_snapshot(self.backend.as_ref()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "failed to read node group for state dump");
                return;
            }
        };

        for node in snapshot.values() {
            let addresses: Vec<String> = node.addresses.iter().map(|a| a.to_string()).collect();
            info!(
                node = %node.id,
                count = node.address_count(),
                addresses = %addresses.join(","),
                "node state"
            );
        }
        info!(
            nodes = snapshot.len(),
            spare = spare_addresses(&self.config.pool, &snapshot).len(),
            "group state"
        );
    }

    /// Run cycles until `shutdown` flips or its sender goes away.
    ///
    /// A cycle that changed anything is followed immediately by another;
    /// a quiet cycle is followed by the inactivity sleep.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            addresses = self.config.pool.len(),
            workers = self.executor.workers(),
            sleep_secs = self.config.sleep.as_secs(),
            "controller started"
        );

        loop {
            if *shutdown.borrow() {
                info!("controller shutting down");
                break;
            }

            let changes = self.run_once().await;
            if changes > 0 {
                info!(changes, "addresses moved, running again");
                self.log_state().await;
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.sleep) => {}
                _ = shutdown.changed() => {
                    info!("controller shutting down");
                    break;
                }
            }
        }
    }

    /// Stop the worker pool.
    pub async fn shutdown(self) {
        self.executor.shutdown().await;
    }
}
