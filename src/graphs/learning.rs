//! Learning-graph construction.
//!
//! Learning runs over a second graph built from the learning-kind
//! projections, walked backwards from each learning-enabled pathway's seed
//! (the component closest to the error source). When pathways converge, a
//! downstream node may carry an objective node that duplicates error
//! information already flowing through the graph; such objectives are
//! elided rather than included:
//!
//! * Terminal convergence: every node feeding the objective's sample port
//!   already feeds another objective present in the graph. The walk
//!   continues from that other objective instead.
//! * Internal convergence: some node feeding the sample port is not a
//!   terminal of the processing graph. The objective is replaced by the
//!   learning node of the downstream stretch, wiring its error-signal
//!   output into the local learning node's error-signal port and
//!   transplanting the error matrix reference so the local learner trains
//!   against the downstream projection.
//!
//! Port conventions are fixed: objective nodes receive the sample on
//! input 0 and the target on input 1, and emit the error signal on
//! output 0; learning nodes receive the activation on input 0 and the
//! error signal on input 1, and emit the weight delta on output 0 and a
//! propagated error signal on output 1.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::pathway::Pathway;
use crate::projection::{
    Projection, ProjectionId, ProjectionKind, ReceiverPort, SenderPort,
};
use crate::registry::NameRegistry;
use crate::types::{NodeClass, NodeId, Role};

use super::builder::{GraphBuildError, InternalError};
use super::construction::{Admission, Topology, admit_dependency};
use super::toposort::{self, DependencyGraph};

/// Objective-node sample input.
pub const SAMPLE_PORT: usize = 0;
/// Objective-node target input.
pub const TARGET_PORT: usize = 1;
/// Learning-node activation input.
pub const ACTIVATION_PORT: usize = 0;
/// Learning-node error-signal input, and error-signal output.
pub const ERROR_SIGNAL_PORT: usize = 1;

/// Output of the learning pass.
#[derive(Debug, Clone, Default)]
pub struct LearningLayout {
    pub learning_graph: DependencyGraph,
    pub learning_execution_graph: DependencyGraph,
    pub learning_execution_sets: Vec<Vec<NodeId>>,
    pub learning_execution_list: Vec<NodeId>,
    /// Every node of the learning graph, in execution order, deduplicated.
    pub learning_nodes: Vec<NodeId>,
    /// Surviving objective nodes, in execution order. Each receives a
    /// system target slot.
    pub target_nodes: Vec<NodeId>,
    /// Learning node mapped to the pathway projection whose weight stands
    /// in for its own when the objective between them was elided.
    pub error_matrix: FxHashMap<NodeId, ProjectionId>,
}

/// Build the learning graph over `projections`, appending any error-signal
/// projections the elision rules call for.
pub(crate) fn build_learning_graph(
    nodes: &FxHashMap<NodeId, crate::system::NodeSpec>,
    projections: &mut Vec<Projection>,
    pathways: &[Pathway],
    system_name: &str,
    roles: &mut FxHashMap<NodeId, Role>,
    registry: &mut NameRegistry,
) -> Result<LearningLayout, GraphBuildError> {
    let mut layout = LearningLayout::default();

    let mut sorted: Vec<&Pathway> = pathways.iter().collect();
    sorted.sort_by(|a, b| a.name().cmp(b.name()));

    for pathway in sorted {
        if !pathway.learning_enabled() {
            continue;
        }
        let seed = pathway
            .learning_seed()
            .ok_or_else(|| GraphBuildError::ObjectiveWithoutLearner {
                objective: "<none>".to_owned(),
                pathway: pathway.name().to_owned(),
            })?
            .clone();
        traverse(
            nodes,
            projections,
            pathways,
            system_name,
            roles,
            registry,
            &mut layout,
            pathway,
            seed,
        )?;
    }

    let layers =
        toposort::topological_layers(&layout.learning_execution_graph).map_err(|cycle| {
            GraphBuildError::Internal(InternalError::ResidualCycle {
                nodes: cycle
                    .remaining
                    .iter()
                    .map(|n| n.as_str().to_owned())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
        })?;
    layout.learning_execution_list = toposort::flatten(&layers);
    layout.learning_execution_sets = layers;

    for node in &layout.learning_execution_list {
        if !layout.learning_nodes.contains(node) {
            layout.learning_nodes.push(node.clone());
        }
        let is_objective = nodes
            .get(node)
            .is_some_and(|spec| spec.class == NodeClass::Objective);
        if is_objective && !layout.target_nodes.contains(node) {
            layout.target_nodes.push(node.clone());
        }
    }

    debug!(
        nodes = layout.learning_nodes.len(),
        targets = layout.target_nodes.len(),
        "learning graph assembled"
    );

    Ok(layout)
}

#[allow(clippy::too_many_arguments)]
fn traverse(
    nodes: &FxHashMap<NodeId, crate::system::NodeSpec>,
    projections: &mut Vec<Projection>,
    pathways: &[Pathway],
    system_name: &str,
    roles: &mut FxHashMap<NodeId, Role>,
    registry: &mut NameRegistry,
    layout: &mut LearningLayout,
    pathway: &Pathway,
    mut sender: NodeId,
) -> Result<(), GraphBuildError> {
    let class = nodes
        .get(&sender)
        .map(|spec| spec.class)
        .ok_or_else(|| GraphBuildError::UnknownNode {
            node: sender.as_str().to_owned(),
        })?;
    if !class.is_monitoring() {
        return Err(GraphBuildError::Internal(InternalError::RoleContradiction {
            node: sender.as_str().to_owned(),
            detail: "only learning and objective nodes may enter the learning graph".to_owned(),
        }));
    }

    if class == NodeClass::Objective && !layout.learning_execution_graph.is_empty() {
        sender = elide_objective(
            nodes,
            projections,
            system_name,
            roles,
            registry,
            layout,
            pathway,
            sender,
        )?;
    }

    let topo = Topology {
        nodes,
        projections,
        pathways,
        system_name,
    };
    if topo.afferents(&sender).next().is_none() {
        return Err(GraphBuildError::OrphanedNode {
            node: sender.as_str().to_owned(),
            system: system_name.to_owned(),
        });
    }

    // Weight-bearing efferents feed the update pass at run time; only
    // node-to-node learning edges shape the graph.
    let downstream: Vec<NodeId> = topo
        .efferents(&sender)
        .filter(|(_, p)| p.kind == ProjectionKind::Learning)
        .filter_map(|(_, p)| match &p.receiver {
            ReceiverPort::NodeInput { node, .. } => Some(node.clone()),
            ReceiverPort::ProjectionWeight { .. } => None,
        })
        .filter(|node| {
            nodes
                .get(node)
                .is_some_and(|spec| spec.class.is_monitoring())
        })
        .collect();

    // Nodes whose only efferents are weight updates still belong to the
    // learning phase.
    roles.entry(sender.clone()).or_insert(Role::Learning);

    for receiver in downstream {
        layout
            .learning_graph
            .entry(receiver.clone())
            .or_default()
            .insert(sender.clone());

        if admit_dependency(&mut layout.learning_execution_graph, &sender, &receiver)
            == Admission::Broken
        {
            roles.insert(receiver.clone(), Role::Cycle);
            continue;
        }

        traverse(
            nodes,
            projections,
            pathways,
            system_name,
            roles,
            registry,
            layout,
            pathway,
            receiver,
        )?;
    }

    Ok(())
}

/// Decide whether `objective` duplicates error information already in the
/// graph and, if so, return the node the walk should continue from instead.
#[allow(clippy::too_many_arguments)]
fn elide_objective(
    nodes: &FxHashMap<NodeId, crate::system::NodeSpec>,
    projections: &mut Vec<Projection>,
    system_name: &str,
    roles: &FxHashMap<NodeId, Role>,
    registry: &mut NameRegistry,
    layout: &mut LearningLayout,
    pathway: &Pathway,
    objective: NodeId,
) -> Result<NodeId, GraphBuildError> {
    let sample_feeders = sample_feeders(projections, &objective);
    if sample_feeders.is_empty() {
        return Ok(objective);
    }

    let in_graph: FxHashSet<&NodeId> = layout
        .learning_execution_graph
        .values()
        .flatten()
        .collect();

    // Terminal convergence: every sample feeder already reports to another
    // objective present in the graph.
    let terminal_convergence = sample_feeders.iter().all(|feeder| {
        node_input_receivers(projections, feeder).any(|(receiver, _)| {
            receiver != &objective
                && in_graph.contains(receiver)
                && nodes
                    .get(receiver)
                    .is_some_and(|spec| spec.class == NodeClass::Objective)
        })
    });
    if terminal_convergence {
        let error_source = sample_feeders[0].clone();
        let replacement = node_input_receivers(projections, &error_source)
            .map(|(receiver, _)| receiver.clone())
            .find(|receiver| {
                receiver != &objective
                    && nodes
                        .get(receiver)
                        .is_some_and(|spec| spec.class == NodeClass::Objective)
            })
            .ok_or_else(|| GraphBuildError::UnresolvableElision {
                objective: objective.as_str().to_owned(),
                pathway: pathway.name().to_owned(),
                detail: format!(
                    "no other objective node receives from '{}'",
                    error_source.as_str()
                ),
            })?;
        debug!(
            objective = objective.as_str(),
            replacement = replacement.as_str(),
            "objective elided at terminal convergence"
        );
        return Ok(replacement);
    }

    // Internal convergence: some sample feeder is not a terminal of the
    // processing graph, so a downstream stretch continues past it.
    let internal_convergence = !sample_feeders.iter().all(|feeder| {
        matches!(roles.get(feeder), Some(Role::Terminal | Role::Singleton))
    });
    if !internal_convergence {
        return Ok(objective);
    }

    let learning_node = node_input_receivers(projections, &objective)
        .map(|(receiver, _)| receiver.clone())
        .find(|receiver| {
            nodes
                .get(receiver)
                .is_some_and(|spec| spec.class == NodeClass::Learning)
        })
        .ok_or_else(|| GraphBuildError::ObjectiveWithoutLearner {
            objective: objective.as_str().to_owned(),
            pathway: pathway.name().to_owned(),
        })?;

    let error_source = sample_feeders[0].clone();

    // The learning node of the downstream stretch: the one receiving the
    // error source's activation.
    let error_signal_node = node_input_receivers(projections, &error_source)
        .find(|(receiver, port)| {
            *port == ACTIVATION_PORT
                && nodes
                    .get(receiver)
                    .is_some_and(|spec| spec.class == NodeClass::Learning)
        })
        .map(|(receiver, _)| receiver.clone())
        .ok_or_else(|| GraphBuildError::UnresolvableElision {
            objective: objective.as_str().to_owned(),
            pathway: pathway.name().to_owned(),
            detail: format!(
                "no learning node receives '{}' on its activation input",
                error_source.as_str()
            ),
        })?;

    // An error-signal projection may already exist from a prior pathway.
    let existing = projections.iter().find_map(|p| {
        let ReceiverPort::NodeInput { node, port } = &p.receiver else {
            return None;
        };
        if node != &learning_node || *port != ERROR_SIGNAL_PORT {
            return None;
        }
        let SenderPort::NodeOutput { node: s, .. } = &p.sender else {
            return None;
        };
        if s == &objective || !nodes.get(s).is_some_and(|spec| spec.class.is_monitoring()) {
            return None;
        }
        Some(s.clone())
    });
    if let Some(existing_sender) = existing {
        debug!(
            objective = objective.as_str(),
            replacement = existing_sender.as_str(),
            "objective elided; error-signal projection already in place"
        );
        return Ok(existing_sender);
    }

    let name = registry.uniquify(&format!(
        "{} to {} error signal",
        error_signal_node.as_str(),
        learning_node.as_str()
    ));
    projections.push(Projection {
        name,
        kind: ProjectionKind::Learning,
        sender: SenderPort::NodeOutput {
            node: error_signal_node.clone(),
            port: ERROR_SIGNAL_PORT,
        },
        receiver: ReceiverPort::NodeInput {
            node: learning_node.clone(),
            port: ERROR_SIGNAL_PORT,
        },
        weight: None,
    });

    // The local learner now trains against the downstream stretch's
    // projection rather than its own elided objective's.
    let trained = projections.iter().find_map(|p| {
        let SenderPort::NodeOutput { node, .. } = &p.sender else {
            return None;
        };
        if node != &error_signal_node {
            return None;
        }
        match &p.receiver {
            ReceiverPort::ProjectionWeight { projection } => Some(*projection),
            ReceiverPort::NodeInput { .. } => None,
        }
    });
    if let Some(trained) = trained {
        layout.error_matrix.insert(learning_node.clone(), trained);
    }

    debug!(
        objective = objective.as_str(),
        replacement = error_signal_node.as_str(),
        system = system_name,
        "objective elided at internal convergence"
    );
    Ok(error_signal_node)
}

/// Senders of pathway projections into the objective's sample port, in
/// declaration order.
fn sample_feeders(projections: &[Projection], objective: &NodeId) -> Vec<NodeId> {
    projections
        .iter()
        .filter(|p| p.kind == ProjectionKind::Pathway)
        .filter(|p| {
            matches!(
                &p.receiver,
                ReceiverPort::NodeInput { node, port }
                    if node == objective && *port == SAMPLE_PORT
            )
        })
        .filter_map(|p| match &p.sender {
            SenderPort::NodeOutput { node, .. } => Some(node.clone()),
            _ => None,
        })
        .collect()
}

/// `(receiver, receiver_port)` pairs for every node-input efferent of
/// `sender`, in declaration order.
fn node_input_receivers<'a>(
    projections: &'a [Projection],
    sender: &'a NodeId,
) -> impl Iterator<Item = (&'a NodeId, usize)> {
    projections
        .iter()
        .filter(move |p| p.sender.node() == Some(sender))
        .filter_map(|p| match &p.receiver {
            ReceiverPort::NodeInput { node, port } => Some((node, *port)),
            ReceiverPort::ProjectionWeight { .. } => None,
        })
}
