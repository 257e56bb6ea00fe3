//! Topological layering over dependency sets.
//!
//! Both graph builders represent a graph as `receiver -> {senders}`
//! dependency sets and lean on the same two operations: a cheap acyclicity
//! probe used while deciding whether a tentative dependency may enter the
//! execution graph, and a full layering that yields the execution sets.
//! Layers are name-sorted so iteration order is reproducible across runs.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::types::NodeId;

/// Dependency-set representation: receiver node mapped to the set of nodes
/// it depends on. Nodes appearing only inside a dependency set (never as a
/// key) are still part of the graph.
pub type DependencyGraph = FxHashMap<NodeId, FxHashSet<NodeId>>;

/// Marker returned when layering finds an unresolvable remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CycleDetected {
    /// Nodes that could not be scheduled, sorted by name.
    pub remaining: Vec<NodeId>,
}

/// Layer the graph: each returned set depends only on earlier sets.
///
/// Nodes within a layer are sorted by name, giving a deterministic
/// flattened order for free.
pub(crate) fn topological_layers(
    deps: &DependencyGraph,
) -> Result<Vec<Vec<NodeId>>, CycleDetected> {
    let mut pending: FxHashMap<NodeId, FxHashSet<NodeId>> = FxHashMap::default();
    for (receiver, senders) in deps {
        pending
            .entry(receiver.clone())
            .or_default()
            .extend(senders.iter().cloned());
        // Sender-only nodes enter with an empty dependency set.
        for sender in senders {
            pending.entry(sender.clone()).or_default();
        }
    }

    let mut resolved: FxHashSet<NodeId> = FxHashSet::default();
    let mut layers: Vec<Vec<NodeId>> = Vec::new();

    while !pending.is_empty() {
        let mut ready: Vec<NodeId> = pending
            .iter()
            .filter(|(_, senders)| senders.iter().all(|s| resolved.contains(s)))
            .map(|(node, _)| node.clone())
            .collect();
        if ready.is_empty() {
            let mut remaining: Vec<NodeId> = pending.keys().cloned().collect();
            remaining.sort();
            return Err(CycleDetected { remaining });
        }
        ready.sort();
        for node in &ready {
            pending.remove(node);
            resolved.insert(node.clone());
        }
        layers.push(ready);
    }

    Ok(layers)
}

/// Probe whether the graph is currently acyclic.
pub(crate) fn is_acyclic(deps: &DependencyGraph) -> bool {
    topological_layers(deps).is_ok()
}

/// Flatten layers into one deterministic execution list.
pub(crate) fn flatten(layers: &[Vec<NodeId>]) -> Vec<NodeId> {
    layers.iter().flatten().cloned().collect()
}
