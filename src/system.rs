//! The compiled system: an immutable bundle of mechanisms, projections,
//! graphs, and roles produced by [`SystemBuilder`](crate::graphs::SystemBuilder).
//!
//! Roles are owned here, in a single map keyed by node, rather than being
//! scattered across the nodes themselves; [`roles_for`](System::roles_for)
//! and [`nodes_with_role`](System::nodes_with_role) are the query surface.
//!
//! A `System` holds no per-run state. Projection values and working
//! weights live in the [`TrialRunner`](crate::runtime::TrialRunner), so one
//! system can back any number of concurrent or sequential runs.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::graphs::{GraphLayout, LearningLayout};
use crate::mechanism::Mechanism;
use crate::pathway::Pathway;
use crate::projection::{Projection, ProjectionId};
use crate::runtime::{RunConfig, RunReport, RunnerError, TrialInputs, TrialRunner, TrialTargets};
use crate::types::{NodeClass, NodeId, Role, Value};

/// A registered mechanism plus its port declaration.
#[derive(Clone)]
pub struct NodeSpec {
    pub id: NodeId,
    pub class: NodeClass,
    /// Expected width of each input port.
    pub input_widths: Vec<usize>,
    pub output_ports: usize,
    pub mechanism: Arc<dyn Mechanism>,
}

impl fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSpec")
            .field("id", &self.id)
            .field("class", &self.class)
            .field("input_widths", &self.input_widths)
            .field("output_ports", &self.output_ports)
            .finish_non_exhaustive()
    }
}

/// Compiled system. See the [module docs](self) for the state split
/// between this type and the runner.
pub struct System {
    name: String,
    nodes: FxHashMap<NodeId, NodeSpec>,
    projections: Vec<Projection>,
    pathways: Vec<Pathway>,
    roles: FxHashMap<NodeId, Role>,
    processing: GraphLayout,
    learning: Option<LearningLayout>,
    origin_nodes: Vec<NodeId>,
    terminal_nodes: Vec<NodeId>,
    recurrent_init_nodes: Vec<NodeId>,
    system_input_slots: Vec<(NodeId, usize)>,
    system_input_projections: Vec<ProjectionId>,
    system_target_slots: Vec<NodeId>,
    system_target_projections: Vec<ProjectionId>,
    controller: Option<NodeId>,
    initial_values: FxHashMap<NodeId, Vec<Value>>,
    afferents_by_node: FxHashMap<NodeId, Vec<ProjectionId>>,
    efferents_by_node: FxHashMap<NodeId, Vec<ProjectionId>>,
}

impl System {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        name: String,
        nodes: FxHashMap<NodeId, NodeSpec>,
        projections: Vec<Projection>,
        pathways: Vec<Pathway>,
        roles: FxHashMap<NodeId, Role>,
        processing: GraphLayout,
        learning: Option<LearningLayout>,
        origin_nodes: Vec<NodeId>,
        terminal_nodes: Vec<NodeId>,
        recurrent_init_nodes: Vec<NodeId>,
        system_input_slots: Vec<(NodeId, usize)>,
        system_input_projections: Vec<ProjectionId>,
        system_target_slots: Vec<NodeId>,
        system_target_projections: Vec<ProjectionId>,
        controller: Option<NodeId>,
        initial_values: FxHashMap<NodeId, Vec<Value>>,
    ) -> Self {
        let mut afferents_by_node: FxHashMap<NodeId, Vec<ProjectionId>> = FxHashMap::default();
        let mut efferents_by_node: FxHashMap<NodeId, Vec<ProjectionId>> = FxHashMap::default();
        for (i, projection) in projections.iter().enumerate() {
            if let Some(node) = projection.receiver.node() {
                afferents_by_node
                    .entry(node.clone())
                    .or_default()
                    .push(ProjectionId(i));
            }
            if let Some(node) = projection.sender.node() {
                efferents_by_node
                    .entry(node.clone())
                    .or_default()
                    .push(ProjectionId(i));
            }
        }
        System {
            name,
            nodes,
            projections,
            pathways,
            roles,
            processing,
            learning,
            origin_nodes,
            terminal_nodes,
            recurrent_init_nodes,
            system_input_slots,
            system_input_projections,
            system_target_slots,
            system_target_projections,
            controller,
            initial_values,
            afferents_by_node,
            efferents_by_node,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&NodeSpec> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn nodes(&self) -> &FxHashMap<NodeId, NodeSpec> {
        &self.nodes
    }

    #[must_use]
    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }

    #[must_use]
    pub fn projection(&self, id: ProjectionId) -> Option<&Projection> {
        self.projections.get(id.0)
    }

    #[must_use]
    pub fn pathways(&self) -> &[Pathway] {
        &self.pathways
    }

    /// The role a node carries in this system, if any.
    #[must_use]
    pub fn roles_for(&self, node: &NodeId) -> Option<Role> {
        self.roles.get(node).copied()
    }

    /// All nodes carrying `role`, sorted by name.
    #[must_use]
    pub fn nodes_with_role(&self, role: Role) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .roles
            .iter()
            .filter(|(_, r)| **r == role)
            .map(|(node, _)| node.clone())
            .collect();
        out.sort();
        out
    }

    #[must_use]
    pub fn execution_sets(&self) -> &[Vec<NodeId>] {
        &self.processing.execution_sets
    }

    #[must_use]
    pub fn execution_list(&self) -> &[NodeId] {
        &self.processing.execution_list
    }

    #[must_use]
    pub fn processing_layout(&self) -> &GraphLayout {
        &self.processing
    }

    #[must_use]
    pub fn learning_layout(&self) -> Option<&LearningLayout> {
        self.learning.as_ref()
    }

    /// Origins in execution order; one external input set is expected per
    /// entry of [`system_input_slots`](System::system_input_slots).
    #[must_use]
    pub fn origin_nodes(&self) -> &[NodeId] {
        &self.origin_nodes
    }

    #[must_use]
    pub fn terminal_nodes(&self) -> &[NodeId] {
        &self.terminal_nodes
    }

    /// Senders of broken cycle edges; the nodes whose outputs are worth
    /// seeding through [`initialize`](System::initialize).
    #[must_use]
    pub fn recurrent_init_nodes(&self) -> &[NodeId] {
        &self.recurrent_init_nodes
    }

    #[must_use]
    pub fn learning_nodes(&self) -> &[NodeId] {
        self.learning
            .as_ref()
            .map(|l| l.learning_nodes.as_slice())
            .unwrap_or_default()
    }

    /// Surviving objective nodes, one target slot each.
    #[must_use]
    pub fn target_nodes(&self) -> &[NodeId] {
        self.learning
            .as_ref()
            .map(|l| l.target_nodes.as_slice())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn controller(&self) -> Option<&NodeId> {
        self.controller.as_ref()
    }

    /// `(origin, input_port)` per external input slot, in slot order.
    #[must_use]
    pub fn system_input_slots(&self) -> &[(NodeId, usize)] {
        &self.system_input_slots
    }

    #[must_use]
    pub fn system_input_projections(&self) -> &[ProjectionId] {
        &self.system_input_projections
    }

    /// Target node per target slot, in slot order.
    #[must_use]
    pub fn system_target_slots(&self) -> &[NodeId] {
        &self.system_target_slots
    }

    #[must_use]
    pub fn system_target_projections(&self) -> &[ProjectionId] {
        &self.system_target_projections
    }

    #[must_use]
    pub fn initial_values(&self) -> &FxHashMap<NodeId, Vec<Value>> {
        &self.initial_values
    }

    /// Learning node mapped to the projection whose weight it trains
    /// against after an elision transplanted the reference.
    #[must_use]
    pub fn error_matrix(&self) -> Option<&FxHashMap<NodeId, ProjectionId>> {
        self.learning.as_ref().map(|l| &l.error_matrix)
    }

    /// Afferent projections of `node`, in declaration order.
    #[must_use]
    pub fn afferents(&self, node: &NodeId) -> &[ProjectionId] {
        self.afferents_by_node
            .get(node)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Efferent projections of `node`, in declaration order.
    #[must_use]
    pub fn efferents(&self, node: &NodeId) -> &[ProjectionId] {
        self.efferents_by_node
            .get(node)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Replace the seed values applied ahead of a run's first trial.
    ///
    /// Each entry supplies one value per output port of its node. Seeding
    /// a node that is not the sender of a broken cycle edge is accepted
    /// but pointless, and logged as such.
    pub fn initialize(
        &mut self,
        values: FxHashMap<NodeId, Vec<Value>>,
    ) -> Result<(), RunnerError> {
        for (node, outputs) in &values {
            let spec = self
                .nodes
                .get(node)
                .ok_or_else(|| RunnerError::UnknownNode {
                    node: node.as_str().to_owned(),
                })?;
            if outputs.len() != spec.output_ports {
                return Err(RunnerError::InitialValueShape {
                    node: node.as_str().to_owned(),
                    expected: spec.output_ports,
                    got: outputs.len(),
                });
            }
            if !self.recurrent_init_nodes.contains(node) {
                warn!(
                    node = node.as_str(),
                    "initial value set for a node that has no broken cycle edge"
                );
            }
        }
        self.initial_values = values;
        Ok(())
    }

    /// Run `inputs.len()` trials (or `config.num_trials`) without targets.
    pub async fn run(
        &self,
        inputs: &[TrialInputs],
        config: RunConfig,
    ) -> Result<RunReport, RunnerError> {
        TrialRunner::new(self, config).run(inputs, None).await
    }

    /// Convenience for systems with a single one-port origin: one value
    /// per trial, no maps.
    pub async fn run_values(
        &self,
        inputs: &[Value],
        config: RunConfig,
    ) -> Result<RunReport, RunnerError> {
        let [origin] = self.origin_nodes() else {
            return Err(RunnerError::UnknownOriginInput {
                trial: 0,
                node: format!("<{} origins>", self.origin_nodes().len()),
            });
        };
        let sets: Vec<TrialInputs> = inputs
            .iter()
            .map(|value| {
                let mut set = TrialInputs::default();
                set.insert(origin.clone(), vec![value.clone()]);
                set
            })
            .collect();
        self.run(&sets, config).await
    }

    /// Run with per-trial target values for the target nodes.
    pub async fn run_with_targets(
        &self,
        inputs: &[TrialInputs],
        targets: &[TrialTargets],
        config: RunConfig,
    ) -> Result<RunReport, RunnerError> {
        TrialRunner::new(self, config).run(inputs, Some(targets)).await
    }
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .field("projections", &self.projections.len())
            .field("execution_sets", &self.processing.execution_sets)
            .field("origins", &self.origin_nodes)
            .field("terminals", &self.terminal_nodes)
            .finish_non_exhaustive()
    }
}
