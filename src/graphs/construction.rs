//! Processing-graph construction.
//!
//! Walks every pathway from its entry node, building two parallel views of
//! the processing topology: a `full_graph` that records every dependency,
//! cycles included, and an `execution_graph` kept acyclic at all times. A
//! dependency is admitted to the execution graph only if a topological probe
//! still succeeds with it in place; otherwise the edge is rolled back,
//! recorded as broken, and the two endpoints are classified as part of a
//! cycle. The broken edge survives in `full_graph` and drives the one-trial
//! latency semantics at run time.
//!
//! Role classification happens during the same walk: entry nodes that pass
//! the origin test seed the traversal as `ORIGIN`, nodes whose every
//! downstream receiver is a monitoring node become `TERMINAL` (or
//! `SINGLETON` when already `ORIGIN`), senders of broken edges become
//! `INITIALIZE_CYCLE` unless already origin-like, and everything else
//! defaults to `INTERNAL`.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::pathway::Pathway;
use crate::projection::{Projection, ProjectionId, ProjectionKind, ReceiverPort, SenderPort};
use crate::system::NodeSpec;
use crate::types::{NodeId, Role};

use super::builder::{GraphBuildError, InternalError};
use super::toposort::{self, DependencyGraph};

/// Read-only view of the topology handed to the graph builders.
pub(crate) struct Topology<'a> {
    pub nodes: &'a FxHashMap<NodeId, NodeSpec>,
    pub projections: &'a [Projection],
    pub pathways: &'a [Pathway],
    pub system_name: &'a str,
}

impl<'a> Topology<'a> {
    /// Projections whose receiver is an input port of `node`, in
    /// declaration order.
    pub fn afferents(&self, node: &NodeId) -> impl Iterator<Item = (ProjectionId, &'a Projection)> {
        let node = node.clone();
        self.projections
            .iter()
            .enumerate()
            .filter(move |(_, p)| p.receiver.node() == Some(&node))
            .map(|(i, p)| (ProjectionId(i), p))
    }

    /// Projections sent from any output port of `node`, in declaration order.
    pub fn efferents(&self, node: &NodeId) -> impl Iterator<Item = (ProjectionId, &'a Projection)> {
        let node = node.clone();
        self.projections
            .iter()
            .enumerate()
            .filter(move |(_, p)| p.sender.node() == Some(&node))
            .map(|(i, p)| (ProjectionId(i), p))
    }

    pub fn pathways_containing(&self, node: &NodeId) -> impl Iterator<Item = &'a Pathway> {
        let node = node.clone();
        self.pathways.iter().filter(move |pw| pw.contains(&node))
    }
}

/// Output of the processing pass. Learning builds its own counterpart.
#[derive(Debug, Clone, Default)]
pub struct GraphLayout {
    /// Every processing dependency, cycles included.
    pub full_graph: DependencyGraph,
    /// Acyclic subset of `full_graph` actually used for scheduling.
    pub execution_graph: DependencyGraph,
    /// Execution sets: members of one set depend only on earlier sets.
    pub execution_sets: Vec<Vec<NodeId>>,
    /// `execution_sets` flattened, deterministic.
    pub execution_list: Vec<NodeId>,
    /// `(sender, receiver)` pairs excluded from the execution graph.
    pub broken_edges: Vec<(NodeId, NodeId)>,
}

/// Result of offering one dependency to an execution graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// The dependency is in the graph and the graph is still acyclic.
    Accepted,
    /// The dependency would close a loop; the graph was restored to its
    /// exact pre-attempt state.
    Broken,
}

/// Offer `receiver depends on sender` to an execution graph, keeping it
/// acyclic. Both graph passes share this one probe-and-rollback policy;
/// they differ only in seeding, edge filtering, and what a broken edge
/// means for roles.
///
/// A receiver not yet keyed in the graph is admitted without probing.
pub(crate) fn admit_dependency(
    graph: &mut DependencyGraph,
    sender: &NodeId,
    receiver: &NodeId,
) -> Admission {
    if !graph.contains_key(receiver) {
        graph
            .entry(receiver.clone())
            .or_default()
            .insert(sender.clone());
        return Admission::Accepted;
    }
    let set = graph.entry(receiver.clone()).or_default();
    let was_present = set.contains(sender);
    set.insert(sender.clone());
    if toposort::is_acyclic(graph) {
        return Admission::Accepted;
    }
    if !was_present {
        if let Some(set) = graph.get_mut(receiver) {
            set.remove(sender);
        }
    }
    Admission::Broken
}

/// Build the processing graph, classifying roles as a side effect.
pub(crate) fn build_processing_graph(
    topo: &Topology<'_>,
    roles: &mut FxHashMap<NodeId, Role>,
) -> Result<GraphLayout, GraphBuildError> {
    let mut layout = GraphLayout::default();

    let mut pathways: Vec<&Pathway> = topo.pathways.iter().collect();
    pathways.sort_by(|a, b| a.name().cmp(b.name()));

    for pathway in pathways {
        let first = pathway.first_node();
        if qualifies_as_origin(topo, pathway, first) {
            // Empty dependency sets make the entry node a graph key up
            // front, so back-edges into it go through the cycle probe.
            layout.full_graph.entry(first.clone()).or_default();
            layout.execution_graph.entry(first.clone()).or_default();
            roles.insert(first.clone(), Role::Origin);
        }
        traverse(topo, roles, &mut layout, first)?;
    }

    let layers = toposort::topological_layers(&layout.execution_graph).map_err(|cycle| {
        GraphBuildError::Internal(InternalError::ResidualCycle {
            nodes: cycle
                .remaining
                .iter()
                .map(|n| n.as_str().to_owned())
                .collect::<Vec<_>>()
                .join(", "),
        })
    })?;
    layout.execution_list = toposort::flatten(&layers);
    layout.execution_sets = layers;

    debug!(
        sets = layout.execution_sets.len(),
        broken = layout.broken_edges.len(),
        "processing graph assembled"
    );

    Ok(layout)
}

/// A pathway entry node is an origin only when every pathway-carried
/// afferent comes from inside its own scope: its pathway's input stub,
/// a node of the same pathway, or a node that is itself the entry of every
/// pathway containing it.
fn qualifies_as_origin(topo: &Topology<'_>, pathway: &Pathway, first: &NodeId) -> bool {
    topo.afferents(first)
        .filter(|(_, p)| {
            matches!(
                p.kind,
                ProjectionKind::Pathway | ProjectionKind::PathwayInput
            )
        })
        .all(|(_, p)| match &p.sender {
            SenderPort::PathwayInput { pathway: owner } => topo
                .pathways_containing(first)
                .any(|pw| pw.name() == owner),
            SenderPort::NodeOutput { node: sender, .. } => {
                if pathway.contains(sender) {
                    return true;
                }
                let mut owners = topo.pathways_containing(sender).peekable();
                owners.peek().is_some() && owners.all(|pw| pw.first_node() == first)
            }
            _ => true,
        })
}

/// A sender counts as in-system when some pathway carries it or when it
/// is a monitoring component (those join through learning chains or the
/// controller declaration rather than pathway membership).
fn anchors_receiver(topo: &Topology<'_>, sender: &NodeId) -> bool {
    topo.pathways_containing(sender).next().is_some()
        || topo
            .nodes
            .get(sender)
            .is_some_and(|s| s.class.is_monitoring())
}

fn traverse(
    topo: &Topology<'_>,
    roles: &mut FxHashMap<NodeId, Role>,
    layout: &mut GraphLayout,
    sender: &NodeId,
) -> Result<(), GraphBuildError> {
    let spec = topo
        .nodes
        .get(sender)
        .ok_or_else(|| GraphBuildError::UnknownNode {
            node: sender.as_str().to_owned(),
        })?;

    // Monitoring nodes never enter the processing graph; mark and stop.
    if spec.class.is_monitoring() {
        roles.insert(sender.clone(), Role::Learning);
        return Ok(());
    }

    // Projections from components in no pathway cannot anchor their
    // receiver in the system. A node whose every node-borne afferent is
    // pruned this way would never execute; reject it here instead.
    let mut anchors = topo
        .afferents(sender)
        .filter_map(|(_, p)| match &p.sender {
            SenderPort::NodeOutput { node, .. } => Some(node),
            _ => None,
        })
        .peekable();
    if anchors.peek().is_some() && !anchors.any(|n| anchors_receiver(topo, n)) {
        return Err(GraphBuildError::OrphanedNode {
            node: sender.as_str().to_owned(),
            system: topo.system_name.to_owned(),
        });
    }

    let downstream: Vec<(ProjectionId, &NodeId)> = topo
        .efferents(sender)
        .filter_map(|(id, p)| match &p.receiver {
            ReceiverPort::NodeInput { node, .. } => Some((id, node)),
            ReceiverPort::ProjectionWeight { .. } => None,
        })
        .collect();

    let is_terminal = downstream.iter().all(|(_, receiver)| {
        *receiver == sender
            || topo
                .nodes
                .get(*receiver)
                .is_some_and(|r| r.class.is_monitoring())
    });
    if is_terminal {
        let role = match roles.get(sender) {
            Some(Role::Origin) => Role::Singleton,
            _ => Role::Terminal,
        };
        roles.insert(sender.clone(), role);
        return Ok(());
    }

    for (_, receiver) in downstream {
        if topo
            .nodes
            .get(receiver)
            .is_some_and(|r| r.class.is_monitoring())
        {
            continue;
        }

        layout
            .full_graph
            .entry(receiver.clone())
            .or_default()
            .insert(sender.clone());

        if admit_dependency(&mut layout.execution_graph, sender, receiver) == Admission::Broken {
            if !matches!(roles.get(sender), Some(Role::Origin | Role::Singleton)) {
                roles.insert(sender.clone(), Role::InitializeCycle);
            }
            if !matches!(
                roles.get(receiver),
                Some(Role::Origin | Role::Singleton | Role::InitializeCycle)
            ) {
                roles.insert(receiver.clone(), Role::Cycle);
            }
            // The same edge can be re-offered through a second pathway;
            // the ledger records it once.
            let edge = (sender.clone(), receiver.clone());
            if !layout.broken_edges.contains(&edge) {
                layout.broken_edges.push(edge);
            }
            debug!(
                sender = sender.as_str(),
                receiver = receiver.as_str(),
                "dependency closes a loop; deferred to previous-trial value"
            );
            continue;
        }

        roles.entry(sender.clone()).or_insert(Role::Internal);
        traverse(topo, roles, layout, receiver)?;
    }

    Ok(())
}
