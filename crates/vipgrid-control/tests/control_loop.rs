//! Control loop scenarios.
//!
//! Runs the full grow/shrink cycle against an in-memory node store, with a
//! wrapper that can take the group offline or reject every write.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use vipgrid_control::{Controller, ManagerConfig};
use vipgrid_planner::AddressPool;
use vipgrid_state::*;

fn test_store() -> NodeStore {
    NodeStore::open_in_memory().unwrap()
}

fn pool(spec: &str) -> AddressPool {
    AddressPool::parse(spec).unwrap()
}

fn config(pool: AddressPool) -> ManagerConfig {
    ManagerConfig::new(pool)
        .with_workers(4)
        .with_max_wait(Duration::from_secs(5))
}

fn seed(store: &NodeStore, id: &str, addresses: &[&str]) {
    let node = store.register_node(id, "nic0").unwrap();
    let addresses: Vec<IpAddr> = addresses.iter().map(|a| a.parse().unwrap()).collect();
    store
        .set_addresses(id, &addresses, &node.fingerprint)
        .unwrap();
}

fn counts(store: &NodeStore) -> Vec<usize> {
    store
        .list_nodes()
        .unwrap()
        .iter()
        .map(Node::address_count)
        .collect()
}

/// Run cycles until one makes no changes.
async fn settle<B: Backend>(controller: &mut Controller<B>) -> usize {
    for cycle in 1..=20 {
        if controller.run_once().await == 0 {
            return cycle;
        }
    }
    panic!("control loop did not settle");
}

/// Every pool address is held by exactly one node and the spread is at most one.
fn assert_balanced(store: &NodeStore, pool: &AddressPool) {
    let nodes = store.list_nodes().unwrap();
    let mut seen = BTreeSet::new();
    for node in &nodes {
        for addr in &node.addresses {
            assert!(pool.contains(addr), "{addr} is not in the pool");
            assert!(seen.insert(*addr), "{addr} assigned twice");
        }
    }
    assert_eq!(seen.len(), pool.len(), "spare addresses left behind");

    let counts: Vec<usize> = nodes.iter().map(Node::address_count).collect();
    let max = counts.iter().max().copied().unwrap_or(0);
    let min = counts.iter().min().copied().unwrap_or(0);
    assert!(max - min <= 1, "unbalanced counts {counts:?}");
}

/// Wraps a NodeStore so tests can take the group offline or reject writes.
struct FlakyBackend {
    store: NodeStore,
    offline: AtomicBool,
    reject_writes: AtomicBool,
}

impl FlakyBackend {
    fn new(store: NodeStore) -> Self {
        Self {
            store,
            offline: AtomicBool::new(false),
            reject_writes: AtomicBool::new(false),
        }
    }
}

impl Inventory for FlakyBackend {
    async fn list_nodes(&self) -> StateResult<Vec<NodeId>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StateError::Transport("connection refused".to_string()));
        }
        Inventory::list_nodes(&self.store).await
    }

    async fn get_node(&self, id: &str) -> StateResult<Node> {
        Inventory::get_node(&self.store, id).await
    }
}

impl Mutation for FlakyBackend {
    async fn set_addresses(
        &self,
        id: &str,
        addresses: &[IpAddr],
        fingerprint: &str,
    ) -> StateResult<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StateError::Conflict {
                node: id.to_string(),
                expected: fingerprint.to_string(),
                actual: "newer".to_string(),
            });
        }
        Mutation::set_addresses(&self.store, id, addresses, fingerprint).await
    }
}

#[tokio::test]
async fn four_addresses_over_two_empty_nodes() {
    let store = test_store();
    seed(&store, "vm-1", &[]);
    seed(&store, "vm-2", &[]);
    let pool = pool("10.0.0.1 10.0.0.2 10.0.0.3 10.0.0.4");

    let mut controller = Controller::new(Arc::new(store.clone()), config(pool.clone()));
    assert_eq!(controller.allocate_ips().await, 2);
    assert_eq!(counts(&store), vec![2, 2]);
    assert_eq!(controller.reduce_ips().await, 0);

    assert_balanced(&store, &pool);
    controller.shutdown().await;
}

#[tokio::test]
async fn new_node_takes_from_the_overloaded() {
    let store = test_store();
    seed(&store, "vm-a", &["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    seed(&store, "vm-b", &["10.0.0.4", "10.0.0.5", "10.0.0.6"]);
    seed(&store, "vm-c", &["10.0.0.7", "10.0.0.8", "10.0.0.9"]);
    seed(&store, "vm-d", &[]);
    let pool = pool("10.0.0.1, 10.0.0.2, 10.0.0.3, 10.0.0.4, 10.0.0.5, 10.0.0.6, 10.0.0.7, 10.0.0.8, 10.0.0.9");

    let mut controller = Controller::new(Arc::new(store.clone()), config(pool.clone()));

    // No spares yet; the shrink pass frees one address each from vm-a and vm-b.
    assert_eq!(controller.allocate_ips().await, 0);
    assert_eq!(controller.reduce_ips().await, 2);
    assert_eq!(counts(&store), vec![2, 2, 3, 0]);

    // Both freed addresses land on the new node in one operation.
    assert_eq!(controller.allocate_ips().await, 1);
    assert_eq!(counts(&store), vec![2, 2, 3, 2]);

    assert_eq!(controller.run_once().await, 0);
    assert_balanced(&store, &pool);
    controller.shutdown().await;
}

#[tokio::test]
async fn scale_out_rebalances() {
    let store = test_store();
    seed(&store, "vm-1", &[]);
    seed(&store, "vm-2", &[]);
    seed(&store, "vm-3", &[]);
    let pool = pool("10.0.1.0/28");

    let mut controller = Controller::new(Arc::new(store.clone()), config(pool.clone()));
    settle(&mut controller).await;
    assert_balanced(&store, &pool);

    seed(&store, "vm-4", &[]);
    seed(&store, "vm-5", &[]);
    settle(&mut controller).await;
    assert_balanced(&store, &pool);

    let counts = counts(&store);
    assert_eq!(counts.iter().sum::<usize>(), 16);
    assert_eq!(counts.len(), 5);
    controller.shutdown().await;
}

#[tokio::test]
async fn scale_in_reclaims_addresses() {
    let store = test_store();
    for id in ["vm-1", "vm-2", "vm-3", "vm-4"] {
        seed(&store, id, &[]);
    }
    let pool = pool("10.0.2.0/29");

    let mut controller = Controller::new(Arc::new(store.clone()), config(pool.clone()));
    settle(&mut controller).await;
    assert_eq!(counts(&store), vec![2, 2, 2, 2]);

    assert!(store.delete_node("vm-2").unwrap());
    assert!(store.delete_node("vm-3").unwrap());
    settle(&mut controller).await;

    assert_eq!(counts(&store), vec![4, 4]);
    assert_balanced(&store, &pool);
    controller.shutdown().await;
}

#[tokio::test]
async fn more_nodes_than_addresses() {
    let store = test_store();
    for id in ["vm-1", "vm-2", "vm-3"] {
        seed(&store, id, &[]);
    }
    let pool = pool("10.0.3.1 10.0.3.2");

    let mut controller = Controller::new(Arc::new(store.clone()), config(pool.clone()));
    settle(&mut controller).await;

    assert_eq!(counts(&store), vec![1, 1, 0]);
    assert_balanced(&store, &pool);
    controller.shutdown().await;
}

#[tokio::test]
async fn foreign_addresses_are_not_spare() {
    let store = test_store();
    seed(&store, "vm-1", &["192.168.0.9"]);
    seed(&store, "vm-2", &[]);
    let pool = pool("10.0.4.1");

    let mut controller = Controller::new(Arc::new(store.clone()), config(pool));
    settle(&mut controller).await;

    // vm-1 still counts its foreign address, so the only pool address goes to vm-2.
    let vm2 = store.get_node("vm-2").unwrap().unwrap();
    assert_eq!(vm2.addresses, vec!["10.0.4.1".parse::<IpAddr>().unwrap()]);
    controller.shutdown().await;
}

#[tokio::test]
async fn offline_inventory_counts_as_no_change() {
    let store = test_store();
    seed(&store, "vm-1", &[]);
    let backend = Arc::new(FlakyBackend::new(store.clone()));
    backend.offline.store(true, Ordering::SeqCst);

    let mut controller = Controller::new(Arc::clone(&backend), config(pool("10.0.5.1")));
    assert_eq!(controller.run_once().await, 0);
    assert_eq!(counts(&store), vec![0]);

    // Recovers on the next cycle once the group is reachable again.
    backend.offline.store(false, Ordering::SeqCst);
    assert_eq!(controller.run_once().await, 1);
    assert_eq!(counts(&store), vec![1]);
    controller.shutdown().await;
}

#[tokio::test]
async fn rejected_writes_count_as_no_change() {
    let store = test_store();
    seed(&store, "vm-1", &[]);
    seed(&store, "vm-2", &[]);
    let backend = Arc::new(FlakyBackend::new(store.clone()));
    backend.reject_writes.store(true, Ordering::SeqCst);

    let mut controller = Controller::new(Arc::clone(&backend), config(pool("10.0.6.0/30")));
    assert_eq!(controller.run_once().await, 0);
    assert_eq!(counts(&store), vec![0, 0]);
    controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn run_balances_then_stops_on_shutdown() {
    let store = test_store();
    seed(&store, "vm-1", &["10.0.7.1", "10.0.7.2", "10.0.7.3", "10.0.7.4"]);
    seed(&store, "vm-2", &[]);
    let pool = pool("10.0.7.0/29");

    let mut controller = Controller::new(Arc::new(store.clone()), config(pool.clone()));
    let (tx, rx) = watch::channel(false);

    tokio::join!(controller.run(rx), async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        tx.send(true).unwrap();
    });

    assert_balanced(&store, &pool);
    controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn run_returns_when_shutdown_sender_dropped() {
    let store = test_store();
    seed(&store, "vm-1", &[]);

    let mut controller = Controller::new(Arc::new(store), config(pool("10.0.8.1")));
    let (tx, rx) = watch::channel(false);
    drop(tx);

    // Must not hang: the closed channel ends the loop after the first quiet cycle.
    tokio::time::timeout(Duration::from_secs(60), controller.run(rx))
        .await
        .unwrap();
    controller.shutdown().await;
}
