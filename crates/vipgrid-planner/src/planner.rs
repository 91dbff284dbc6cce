//! Allocation planner — grow and shrink passes over a node snapshot.
//!
//! Given the current [`Snapshot`] and the managed [`AddressPool`], the
//! planner decides:
//! 1. Which pool addresses are spare (assigned to no node)
//! 2. Which node each spare address goes to (grow)
//! 3. How many addresses each overloaded node gives up (shrink)
//!
//! Nodes are always visited in id order so ties resolve the same way on
//! every run. Which of a node's addresses a shrink removes is not part of
//! the contract; the current choice is the first ones listed.

use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;

use tracing::{debug, info};

use vipgrid_state::{NodeId, Operation, Snapshot};

use crate::pool::AddressPool;

/// Pool addresses not currently assigned to any node, in pool order.
pub fn spare_addresses(pool: &AddressPool, snapshot: &Snapshot) -> Vec<IpAddr> {
    let used: HashSet<&IpAddr> = snapshot
        .values()
        .flat_map(|node| node.addresses.iter())
        .collect();
    pool.iter().filter(|addr| !used.contains(addr)).copied().collect()
}

/// Plan the grow pass: hand every spare address to the least-loaded node.
///
/// Load counts addresses already staged earlier in the same pass. Nodes
/// that receive nothing get no operation.
pub fn plan_grow(pool: &AddressPool, snapshot: &Snapshot) -> Vec<Operation> {
    let spare = spare_addresses(pool, snapshot);
    if spare.is_empty() || snapshot.is_empty() {
        return Vec::new();
    }
    info!(count = spare.len(), spare = ?spare, "spare addresses found");

    let mut staged: BTreeMap<&str, Vec<IpAddr>> = snapshot
        .keys()
        .map(|id| (id.as_str(), Vec::new()))
        .collect();

    for addr in spare {
        let Some(target) = least_loaded(snapshot, &staged) else {
            break;
        };
        if let Some(list) = staged.get_mut(target) {
            list.push(addr);
        }
    }

    staged
        .into_iter()
        .filter(|(_, addrs)| !addrs.is_empty())
        .map(|(id, addrs)| {
            debug!(node = %id, count = addrs.len(), "staged addresses");
            Operation::add(id, addrs)
        })
        .collect()
}

/// First node (in id order) with the fewest current plus staged addresses.
fn least_loaded<'a>(snapshot: &'a Snapshot, staged: &BTreeMap<&str, Vec<IpAddr>>) -> Option<&'a str> {
    snapshot
        .iter()
        .map(|(id, node)| {
            let pending = staged.get(id.as_str()).map_or(0, Vec::len);
            (id.as_str(), node.address_count() + pending)
        })
        .min_by_key(|(_, load)| *load)
        .map(|(id, _)| id)
}

/// "Robin Hood" smoothing: take from the rich and give to the poor until
/// no two targets differ by more than one.
///
/// The total is preserved. Each transfer moves one unit from the first
/// node at the maximum to the first node at the minimum.
pub fn balanced_targets(counts: &BTreeMap<NodeId, usize>) -> BTreeMap<NodeId, usize> {
    let mut targets = counts.clone();
    while let Some((rich, poor)) = next_transfer(&targets) {
        if let Some(t) = targets.get_mut(&rich) {
            *t -= 1;
        }
        if let Some(t) = targets.get_mut(&poor) {
            *t += 1;
        }
    }
    targets
}

fn next_transfer(targets: &BTreeMap<NodeId, usize>) -> Option<(NodeId, NodeId)> {
    let mut richest: Option<(&NodeId, usize)> = None;
    let mut poorest: Option<(&NodeId, usize)> = None;
    for (id, &count) in targets {
        if richest.is_none_or(|(_, max)| count > max) {
            richest = Some((id, count));
        }
        if poorest.is_none_or(|(_, min)| count < min) {
            poorest = Some((id, count));
        }
    }
    let ((rich, max), (poor, min)) = (richest?, poorest?);
    (max - min > 1).then(|| (rich.clone(), poor.clone()))
}

/// Plan the shrink pass: remove addresses from nodes above their balanced
/// target so the spare pool can be redistributed.
pub fn plan_shrink(snapshot: &Snapshot) -> Vec<Operation> {
    if snapshot.is_empty() {
        return Vec::new();
    }

    let counts: BTreeMap<NodeId, usize> = snapshot
        .iter()
        .map(|(id, node)| {
            if node.addresses.is_empty() {
                info!(node = %id, "detected new node");
            }
            (id.clone(), node.address_count())
        })
        .collect();
    let targets = balanced_targets(&counts);

    snapshot
        .iter()
        .filter_map(|(id, node)| {
            let target = targets.get(id).copied().unwrap_or(0);
            let excess = node.address_count().saturating_sub(target);
            if excess == 0 {
                return None;
            }
            debug!(node = %id, current = node.address_count(), target, "node above target");
            Some(Operation::remove(id.clone(), node.addresses[..excess].to_vec()))
        })
        .collect()
}
