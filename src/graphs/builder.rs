//! Fluent construction of a [`System`].
//!
//! [`SystemBuilder`] collects mechanisms, pathways, and explicit
//! projections, then `compile()` materializes the implicit wiring (pathway
//! chains, pathway input stubs, learning chains, system input and target
//! slots), builds the processing and learning graphs, classifies roles, and
//! returns an immutable [`System`].
//!
//! # Examples
//!
//! ```
//! use neurograph::graphs::SystemBuilder;
//! use neurograph::pathway::Pathway;
//! use neurograph::utils::testing::doubler;
//!
//! let system = SystemBuilder::new("demo")
//!     .add_processing("a", vec![1], 1, doubler())
//!     .add_processing("b", vec![1], 1, doubler())
//!     .add_pathway(Pathway::new("p", ["a", "b"]))
//!     .compile()?;
//! assert_eq!(system.execution_list().len(), 2);
//! # Ok::<(), neurograph::graphs::GraphBuildError>(())
//! ```

use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{instrument, warn};

use crate::mechanism::Mechanism;
use crate::pathway::Pathway;
use crate::projection::{
    PortBinding, Projection, ProjectionId, ProjectionKind, ReceiverPort, SenderPort,
};
use crate::registry::NameRegistry;
use crate::system::{NodeSpec, System};
use crate::types::{NodeClass, NodeId, Role, Value};

use super::construction::{self, Topology};
use super::learning::{self, ACTIVATION_PORT, ERROR_SIGNAL_PORT, SAMPLE_PORT, TARGET_PORT};

/// Errors surfaced while compiling a system's graphs.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphBuildError {
    #[error("system '{system}' has no pathways")]
    #[diagnostic(
        code(neurograph::graph::empty_system),
        help("add at least one pathway before compiling")
    )]
    EmptySystem { system: String },

    #[error("node '{node}' is not registered in the system")]
    #[diagnostic(
        code(neurograph::graph::unknown_node),
        help("register the node with add_processing/add_objective/add_learning first")
    )]
    UnknownNode { node: String },

    #[error("node '{node}' is already registered")]
    #[diagnostic(code(neurograph::graph::duplicate_node))]
    DuplicateNode { node: String },

    #[error("pathway '{pathway}' is already registered")]
    #[diagnostic(code(neurograph::graph::duplicate_pathway))]
    DuplicatePathway { pathway: String },

    #[error("node '{node}' has no port {port}; it declares {available}")]
    #[diagnostic(code(neurograph::graph::port_out_of_range))]
    PortOutOfRange {
        node: String,
        port: usize,
        available: usize,
    },

    #[error("'{node}' only receives projections from components outside the system '{system}'")]
    #[diagnostic(
        code(neurograph::graph::orphaned_node),
        help("every traversed node needs at least one in-system afferent")
    )]
    OrphanedNode { node: String, system: String },

    #[error("objective '{objective}' in pathway '{pathway}' does not feed a learning node")]
    #[diagnostic(code(neurograph::graph::objective_without_learner))]
    ObjectiveWithoutLearner { objective: String, pathway: String },

    #[error("cannot elide objective '{objective}' in pathway '{pathway}': {detail}")]
    #[diagnostic(code(neurograph::graph::unresolvable_elision))]
    UnresolvableElision {
        objective: String,
        pathway: String,
        detail: String,
    },

    #[error("projection '{name}' still has an unbound endpoint")]
    #[diagnostic(
        code(neurograph::graph::unbound_projection),
        help("bind both ends with bind_sender/bind_receiver before compiling")
    )]
    UnboundProjection { name: String },

    #[error("no pathway projection from '{from}' to '{to}' to attach the weight update to")]
    #[diagnostic(code(neurograph::graph::unknown_projection))]
    UnknownProjection { from: String, to: String },

    #[error("initial value for '{node}' is invalid: {detail}")]
    #[diagnostic(code(neurograph::graph::invalid_initial_value))]
    InvalidInitialValue { node: String, detail: String },

    #[error("controller '{node}' is invalid: {detail}")]
    #[diagnostic(code(neurograph::graph::invalid_controller))]
    InvalidController { node: String, detail: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Internal(#[from] InternalError),
}

/// Invariant violations that indicate a bug in graph construction itself
/// rather than a misconfigured system.
#[derive(Debug, Error, Diagnostic)]
pub enum InternalError {
    #[error("execution graph retained a cycle through: {nodes}")]
    #[diagnostic(code(neurograph::graph::residual_cycle))]
    ResidualCycle { nodes: String },

    #[error("role contradiction at '{node}': {detail}")]
    #[diagnostic(code(neurograph::graph::role_contradiction))]
    RoleContradiction { node: String, detail: String },
}

/// One projection as declared on the builder. The receiver may address a
/// projection weight by its endpoints, resolved once all pathway
/// projections exist.
struct ProjectionSpec {
    name: Option<String>,
    kind: ProjectionKind,
    binding: PortBinding,
    weight_of: Option<(NodeId, NodeId)>,
    weight: Option<Value>,
}

/// Collects the pieces of a system ahead of graph compilation.
pub struct SystemBuilder {
    name: String,
    nodes: FxHashMap<NodeId, NodeSpec>,
    pathways: Vec<Pathway>,
    specs: Vec<ProjectionSpec>,
    controller: Option<NodeId>,
    initial_values: Vec<(NodeId, Vec<Value>)>,
    registry: NameRegistry,
    pending_errors: Vec<GraphBuildError>,
}

impl SystemBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        SystemBuilder {
            name: name.into(),
            nodes: FxHashMap::default(),
            pathways: Vec::new(),
            specs: Vec::new(),
            controller: None,
            initial_values: Vec::new(),
            registry: NameRegistry::default(),
            pending_errors: Vec::new(),
        }
    }

    /// Register a mechanism with explicit class, input port widths, and
    /// output port count.
    #[must_use]
    pub fn add_node(
        mut self,
        id: impl Into<NodeId>,
        class: NodeClass,
        input_widths: Vec<usize>,
        output_ports: usize,
        mechanism: impl Mechanism + 'static,
    ) -> Self {
        let id = id.into();
        if self.nodes.contains_key(&id) {
            self.pending_errors.push(GraphBuildError::DuplicateNode {
                node: id.as_str().to_owned(),
            });
            return self;
        }
        self.nodes.insert(
            id.clone(),
            NodeSpec {
                id,
                class,
                input_widths,
                output_ports,
                mechanism: Arc::new(mechanism),
            },
        );
        self
    }

    /// Register an ordinary processing mechanism.
    #[must_use]
    pub fn add_processing(
        self,
        id: impl Into<NodeId>,
        input_widths: Vec<usize>,
        output_ports: usize,
        mechanism: impl Mechanism + 'static,
    ) -> Self {
        self.add_node(id, NodeClass::Processing, input_widths, output_ports, mechanism)
    }

    /// Register an objective mechanism. Input 0 is the sample, input 1 the
    /// target; both have width `width`. Output 0 carries the error signal.
    #[must_use]
    pub fn add_objective(
        self,
        id: impl Into<NodeId>,
        width: usize,
        mechanism: impl Mechanism + 'static,
    ) -> Self {
        self.add_node(id, NodeClass::Objective, vec![width, width], 1, mechanism)
    }

    /// Register a learning mechanism. Input 0 is the activation, input 1
    /// the error signal; output 0 is the weight delta, output 1 the
    /// propagated error signal.
    #[must_use]
    pub fn add_learning(
        self,
        id: impl Into<NodeId>,
        activation_width: usize,
        error_width: usize,
        mechanism: impl Mechanism + 'static,
    ) -> Self {
        self.add_node(
            id,
            NodeClass::Learning,
            vec![activation_width, error_width],
            2,
            mechanism,
        )
    }

    /// Register a control mechanism.
    #[must_use]
    pub fn add_control(
        self,
        id: impl Into<NodeId>,
        input_widths: Vec<usize>,
        output_ports: usize,
        mechanism: impl Mechanism + 'static,
    ) -> Self {
        self.add_node(id, NodeClass::Control, input_widths, output_ports, mechanism)
    }

    #[must_use]
    pub fn add_pathway(mut self, pathway: Pathway) -> Self {
        if self.pathways.iter().any(|p| p.name() == pathway.name()) {
            self.pending_errors.push(GraphBuildError::DuplicatePathway {
                pathway: pathway.name().to_owned(),
            });
            return self;
        }
        self.pathways.push(pathway);
        self
    }

    /// Connect two mechanism ports with an ordinary pathway projection.
    #[must_use]
    pub fn connect(
        self,
        from: (impl Into<NodeId>, usize),
        to: (impl Into<NodeId>, usize),
    ) -> Self {
        self.connect_weighted(from, to, None)
    }

    /// Connect two mechanism ports with an initial elementwise weight.
    #[must_use]
    pub fn connect_weighted(
        mut self,
        from: (impl Into<NodeId>, usize),
        to: (impl Into<NodeId>, usize),
        weight: Option<Value>,
    ) -> Self {
        self.specs.push(ProjectionSpec {
            name: None,
            kind: ProjectionKind::Pathway,
            binding: PortBinding::bound(
                SenderPort::NodeOutput {
                    node: from.0.into(),
                    port: from.1,
                },
                ReceiverPort::NodeInput {
                    node: to.0.into(),
                    port: to.1,
                },
            ),
            weight_of: None,
            weight,
        });
        self
    }

    /// Connect an error-signal edge between learning components.
    #[must_use]
    pub fn connect_learning(
        mut self,
        from: (impl Into<NodeId>, usize),
        to: (impl Into<NodeId>, usize),
    ) -> Self {
        self.specs.push(ProjectionSpec {
            name: None,
            kind: ProjectionKind::Learning,
            binding: PortBinding::bound(
                SenderPort::NodeOutput {
                    node: from.0.into(),
                    port: from.1,
                },
                ReceiverPort::NodeInput {
                    node: to.0.into(),
                    port: to.1,
                },
            ),
            weight_of: None,
            weight: None,
        });
        self
    }

    /// Route a learning node's weight-delta output onto the weight of the
    /// pathway projection running from `trained.0` to `trained.1`.
    #[must_use]
    pub fn connect_weight_update(
        mut self,
        from: (impl Into<NodeId>, usize),
        trained: (impl Into<NodeId>, impl Into<NodeId>),
    ) -> Self {
        self.specs.push(ProjectionSpec {
            name: None,
            kind: ProjectionKind::Learning,
            binding: PortBinding::deferred().bind_sender(SenderPort::NodeOutput {
                node: from.0.into(),
                port: from.1,
            }),
            weight_of: Some((trained.0.into(), trained.1.into())),
            weight: None,
        });
        self
    }

    /// Route a controller output onto the weight of the pathway projection
    /// running from `trained.0` to `trained.1`. The modulated weight takes
    /// effect on the following trial.
    #[must_use]
    pub fn connect_control(
        mut self,
        from: (impl Into<NodeId>, usize),
        trained: (impl Into<NodeId>, impl Into<NodeId>),
    ) -> Self {
        self.specs.push(ProjectionSpec {
            name: None,
            kind: ProjectionKind::Control,
            binding: PortBinding::deferred().bind_sender(SenderPort::NodeOutput {
                node: from.0.into(),
                port: from.1,
            }),
            weight_of: Some((trained.0.into(), trained.1.into())),
            weight: None,
        });
        self
    }

    /// Add a projection with full control over name, kind, and binding.
    /// A binding still pending at compile time is rejected.
    #[must_use]
    pub fn add_projection(
        mut self,
        name: impl Into<String>,
        kind: ProjectionKind,
        binding: PortBinding,
        weight: Option<Value>,
    ) -> Self {
        self.specs.push(ProjectionSpec {
            name: Some(name.into()),
            kind,
            binding,
            weight_of: None,
            weight,
        });
        self
    }

    #[must_use]
    pub fn with_controller(mut self, id: impl Into<NodeId>) -> Self {
        self.controller = Some(id.into());
        self
    }

    /// Seed a node's output ports ahead of the first trial. Intended for
    /// senders of broken cycle edges.
    #[must_use]
    pub fn with_initial_value(mut self, node: impl Into<NodeId>, outputs: Vec<Value>) -> Self {
        self.initial_values.push((node.into(), outputs));
        self
    }

    /// Build the processing and learning graphs and freeze the system.
    #[instrument(skip(self), fields(system = %self.name))]
    pub fn compile(mut self) -> Result<System, GraphBuildError> {
        if let Some(err) = self.pending_errors.drain(..).next() {
            return Err(err);
        }
        if self.pathways.is_empty() {
            return Err(GraphBuildError::EmptySystem { system: self.name });
        }
        self.validate_pathways()?;

        let mut projections = self.materialize_projections()?;

        let mut roles: FxHashMap<NodeId, Role> = FxHashMap::default();
        let processing = {
            let topo = Topology {
                nodes: &self.nodes,
                projections: &projections,
                pathways: &self.pathways,
                system_name: &self.name,
            };
            construction::build_processing_graph(&topo, &mut roles)?
        };

        let learning_layout = if self.pathways.iter().any(Pathway::learning_enabled) {
            Some(learning::build_learning_graph(
                &self.nodes,
                &mut projections,
                &self.pathways,
                &self.name,
                &mut roles,
                &mut self.registry,
            )?)
        } else {
            None
        };

        let origin_nodes = nodes_in_execution_order(&processing.execution_list, &roles, &[
            Role::Origin,
            Role::Singleton,
        ]);
        let terminal_nodes = nodes_in_execution_order(&processing.execution_list, &roles, &[
            Role::Terminal,
            Role::Singleton,
        ]);
        // Only senders classified for cycle initialization need a seed; a
        // broken-edge sender that ended up origin-like is fed externally.
        let recurrent_init_nodes = {
            let mut seen = Vec::new();
            for (sender, _) in &processing.broken_edges {
                if roles.get(sender) == Some(&Role::InitializeCycle) && !seen.contains(sender) {
                    seen.push(sender.clone());
                }
            }
            seen
        };

        // One external-input slot per origin input port, one target slot
        // per surviving objective.
        let mut system_input_slots = Vec::new();
        let mut system_input_projections = Vec::new();
        for origin in &origin_nodes {
            let ports = self
                .nodes
                .get(origin)
                .map(|spec| spec.input_widths.len())
                .unwrap_or_default();
            for port in 0..ports {
                let slot = system_input_slots.len();
                system_input_slots.push((origin.clone(), port));
                let name = self
                    .registry
                    .uniquify(&format!("{} input {} to {}", self.name, slot, origin.as_str()));
                system_input_projections.push(ProjectionId(projections.len()));
                projections.push(Projection {
                    name,
                    kind: ProjectionKind::SystemInput,
                    sender: SenderPort::SystemInput { slot },
                    receiver: ReceiverPort::NodeInput {
                        node: origin.clone(),
                        port,
                    },
                    weight: None,
                });
            }
        }

        let mut system_target_slots = Vec::new();
        let mut system_target_projections = Vec::new();
        if let Some(layout) = &learning_layout {
            for target in &layout.target_nodes {
                let slot = system_target_slots.len();
                system_target_slots.push(target.clone());
                let name = self
                    .registry
                    .uniquify(&format!("{} target {} to {}", self.name, slot, target.as_str()));
                system_target_projections.push(ProjectionId(projections.len()));
                projections.push(Projection {
                    name,
                    kind: ProjectionKind::SystemTarget,
                    sender: SenderPort::SystemTarget { slot },
                    receiver: ReceiverPort::NodeInput {
                        node: target.clone(),
                        port: TARGET_PORT,
                    },
                    weight: None,
                });
            }
        }

        self.validate_initial_values(&processing.execution_list)?;
        if let Some(controller) = &self.controller {
            match self.nodes.get(controller) {
                None => {
                    return Err(GraphBuildError::InvalidController {
                        node: controller.as_str().to_owned(),
                        detail: "not a registered node".to_owned(),
                    });
                }
                Some(spec) if spec.class != NodeClass::Control => {
                    return Err(GraphBuildError::InvalidController {
                        node: controller.as_str().to_owned(),
                        detail: format!("registered as {:?}, not a control node", spec.class),
                    });
                }
                Some(_) => {}
            }
        }

        Ok(System::assemble(
            self.name,
            self.nodes,
            projections,
            self.pathways,
            roles,
            processing,
            learning_layout,
            origin_nodes,
            terminal_nodes,
            recurrent_init_nodes,
            system_input_slots,
            system_input_projections,
            system_target_slots,
            system_target_projections,
            self.controller,
            self.initial_values.into_iter().collect(),
        ))
    }

    fn validate_pathways(&self) -> Result<(), GraphBuildError> {
        for pathway in &self.pathways {
            for node in pathway.nodes().iter().chain(pathway.learning_nodes()) {
                if !self.nodes.contains_key(node) {
                    return Err(GraphBuildError::UnknownNode {
                        node: node.as_str().to_owned(),
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_initial_values(&self, execution_list: &[NodeId]) -> Result<(), GraphBuildError> {
        for (node, outputs) in &self.initial_values {
            let spec = self.nodes.get(node).ok_or_else(|| {
                GraphBuildError::InvalidInitialValue {
                    node: node.as_str().to_owned(),
                    detail: "not a registered node".to_owned(),
                }
            })?;
            if !execution_list.contains(node) {
                return Err(GraphBuildError::InvalidInitialValue {
                    node: node.as_str().to_owned(),
                    detail: "not part of the execution graph".to_owned(),
                });
            }
            if outputs.len() != spec.output_ports {
                return Err(GraphBuildError::InvalidInitialValue {
                    node: node.as_str().to_owned(),
                    detail: format!(
                        "{} output values supplied, node declares {} ports",
                        outputs.len(),
                        spec.output_ports
                    ),
                });
            }
        }
        Ok(())
    }

    /// Turn declared specs plus pathway-implied wiring into the final
    /// projection table.
    fn materialize_projections(&mut self) -> Result<Vec<Projection>, GraphBuildError> {
        let mut projections: Vec<Projection> = Vec::new();
        let mut deferred: Vec<ProjectionSpec> = Vec::new();

        for spec in std::mem::take(&mut self.specs) {
            if spec.weight_of.is_some() {
                deferred.push(spec);
                continue;
            }
            let projection = self.resolve_spec(spec, &projections)?;
            projections.push(projection);
        }

        // Pathway chain edges, skipping pairs already wired explicitly.
        for pathway in &self.pathways {
            let nodes = pathway.nodes();
            for pair in nodes.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                let exists = projections.iter().any(|p| {
                    p.kind == ProjectionKind::Pathway
                        && p.sender.node() == Some(a)
                        && p.receiver.node() == Some(b)
                });
                if exists {
                    continue;
                }
                check_node_port(&self.nodes, a, 0, PortDirection::Output)?;
                check_node_port(&self.nodes, b, 0, PortDirection::Input)?;
                let name = self
                    .registry
                    .uniquify(&format!("{} to {}", a.as_str(), b.as_str()));
                projections.push(Projection {
                    name,
                    kind: ProjectionKind::Pathway,
                    sender: SenderPort::NodeOutput {
                        node: a.clone(),
                        port: 0,
                    },
                    receiver: ReceiverPort::NodeInput {
                        node: b.clone(),
                        port: 0,
                    },
                    weight: None,
                });
            }

            // Stimulus stub feeding every input port of the entry node.
            let first = pathway.first_node();
            let ports = self
                .nodes
                .get(first)
                .map(|spec| spec.input_widths.len())
                .unwrap_or_default();
            for port in 0..ports {
                let name = self.registry.uniquify(&format!(
                    "{} input to {}",
                    pathway.name(),
                    first.as_str()
                ));
                projections.push(Projection {
                    name,
                    kind: ProjectionKind::PathwayInput,
                    sender: SenderPort::PathwayInput {
                        pathway: pathway.name().to_owned(),
                    },
                    receiver: ReceiverPort::NodeInput {
                        node: first.clone(),
                        port,
                    },
                    weight: None,
                });
            }
        }

        self.wire_learning_chains(&mut projections)?;

        for spec in deferred {
            let projection = self.resolve_spec(spec, &projections)?;
            projections.push(projection);
        }

        Ok(projections)
    }

    /// Standard learning wiring for a pathway whose learning-node list has
    /// exactly one component per pathway node: the objective first, then
    /// one learning node per trained projection walking backwards. Edges
    /// already declared explicitly are left alone.
    fn wire_learning_chains(
        &mut self,
        projections: &mut Vec<Projection>,
    ) -> Result<(), GraphBuildError> {
        for pathway in &self.pathways {
            if !pathway.learning_enabled() {
                continue;
            }
            let chain = pathway.learning_nodes();
            let nodes = pathway.nodes();
            if chain.is_empty() || chain.len() != nodes.len() {
                continue;
            }
            let objective = &chain[0];
            if self
                .nodes
                .get(objective)
                .map(|spec| spec.class)
                != Some(NodeClass::Objective)
            {
                return Err(GraphBuildError::ObjectiveWithoutLearner {
                    objective: objective.as_str().to_owned(),
                    pathway: pathway.name().to_owned(),
                });
            }

            let last = pathway.last_node();
            push_if_absent(
                projections,
                &mut self.registry,
                ProjectionKind::Pathway,
                (last.clone(), 0),
                (objective.clone(), SAMPLE_PORT),
            );

            // chain[1] learns the deepest projection, chain[n-1] the first.
            for (i, learner) in chain.iter().enumerate().skip(1) {
                let trained_from = &nodes[nodes.len() - 1 - i];
                let trained_to = &nodes[nodes.len() - i];
                let error_sender = &chain[i - 1];
                let error_out = if i == 1 { 0 } else { ERROR_SIGNAL_PORT };
                push_if_absent(
                    projections,
                    &mut self.registry,
                    ProjectionKind::Learning,
                    (error_sender.clone(), error_out),
                    (learner.clone(), ERROR_SIGNAL_PORT),
                );
                push_if_absent(
                    projections,
                    &mut self.registry,
                    ProjectionKind::Pathway,
                    (trained_from.clone(), 0),
                    (learner.clone(), ACTIVATION_PORT),
                );

                let trained = projections
                    .iter()
                    .position(|p| {
                        p.kind == ProjectionKind::Pathway
                            && p.sender.node() == Some(trained_from)
                            && p.receiver.node() == Some(trained_to)
                    })
                    .map(ProjectionId)
                    .ok_or_else(|| GraphBuildError::UnknownProjection {
                        from: trained_from.as_str().to_owned(),
                        to: trained_to.as_str().to_owned(),
                    })?;
                let already = projections.iter().any(|p| {
                    p.sender.node() == Some(learner)
                        && p.receiver == ReceiverPort::ProjectionWeight { projection: trained }
                });
                if !already {
                    let name = self.registry.uniquify(&format!(
                        "{} weight update for {} to {}",
                        learner.as_str(),
                        trained_from.as_str(),
                        trained_to.as_str()
                    ));
                    projections.push(Projection {
                        name,
                        kind: ProjectionKind::Learning,
                        sender: SenderPort::NodeOutput {
                            node: learner.clone(),
                            port: 0,
                        },
                        receiver: ReceiverPort::ProjectionWeight { projection: trained },
                        weight: None,
                    });
                }
            }
        }
        Ok(())
    }

    fn resolve_spec(
        &mut self,
        spec: ProjectionSpec,
        projections: &[Projection],
    ) -> Result<Projection, GraphBuildError> {
        let binding = match spec.weight_of {
            Some((from, to)) => {
                let trained = projections
                    .iter()
                    .position(|p| {
                        p.kind == ProjectionKind::Pathway
                            && p.sender.node() == Some(&from)
                            && p.receiver.node() == Some(&to)
                    })
                    .map(ProjectionId)
                    .ok_or(GraphBuildError::UnknownProjection {
                        from: from.as_str().to_owned(),
                        to: to.as_str().to_owned(),
                    })?;
                spec.binding
                    .bind_receiver(ReceiverPort::ProjectionWeight { projection: trained })
            }
            None => spec.binding,
        };

        let PortBinding::Bound { sender, receiver } = binding else {
            let name = spec.name.unwrap_or_else(|| "<unnamed>".to_owned());
            return Err(GraphBuildError::UnboundProjection { name });
        };

        if let SenderPort::NodeOutput { node, port } = &sender {
            check_node_port(&self.nodes, node, *port, PortDirection::Output)?;
        }
        if let ReceiverPort::NodeInput { node, port } = &receiver {
            check_node_port(&self.nodes, node, *port, PortDirection::Input)?;
        }

        let name = match spec.name {
            Some(name) => {
                if self.registry.claim(&name) {
                    name
                } else {
                    let renamed = self.registry.uniquify(&name);
                    warn!(requested = %name, assigned = %renamed, "projection name taken");
                    renamed
                }
            }
            None => {
                let base = default_projection_name(&sender, &receiver);
                self.registry.uniquify(&base)
            }
        };

        Ok(Projection {
            name,
            kind: spec.kind,
            sender,
            receiver,
            weight: spec.weight,
        })
    }
}

enum PortDirection {
    Input,
    Output,
}

fn check_node_port(
    nodes: &FxHashMap<NodeId, NodeSpec>,
    node: &NodeId,
    port: usize,
    direction: PortDirection,
) -> Result<(), GraphBuildError> {
    let spec = nodes.get(node).ok_or_else(|| GraphBuildError::UnknownNode {
        node: node.as_str().to_owned(),
    })?;
    let available = match direction {
        PortDirection::Input => spec.input_widths.len(),
        PortDirection::Output => spec.output_ports,
    };
    if port >= available {
        return Err(GraphBuildError::PortOutOfRange {
            node: node.as_str().to_owned(),
            port,
            available,
        });
    }
    Ok(())
}

fn push_if_absent(
    projections: &mut Vec<Projection>,
    registry: &mut NameRegistry,
    kind: ProjectionKind,
    from: (NodeId, usize),
    to: (NodeId, usize),
) {
    let exists = projections.iter().any(|p| {
        p.kind == kind
            && p.sender
                == SenderPort::NodeOutput {
                    node: from.0.clone(),
                    port: from.1,
                }
            && matches!(
                &p.receiver,
                ReceiverPort::NodeInput { node, port } if node == &to.0 && *port == to.1
            )
    });
    if exists {
        return;
    }
    let name = registry.uniquify(&format!("{} to {}", from.0.as_str(), to.0.as_str()));
    projections.push(Projection {
        name,
        kind,
        sender: SenderPort::NodeOutput {
            node: from.0,
            port: from.1,
        },
        receiver: ReceiverPort::NodeInput {
            node: to.0,
            port: to.1,
        },
        weight: None,
    });
}

fn default_projection_name(sender: &SenderPort, receiver: &ReceiverPort) -> String {
    let from = match sender {
        SenderPort::NodeOutput { node, .. } => node.as_str().to_owned(),
        SenderPort::PathwayInput { pathway } => format!("{pathway} input"),
        SenderPort::SystemInput { slot } => format!("system input {slot}"),
        SenderPort::SystemTarget { slot } => format!("system target {slot}"),
    };
    let to = match receiver {
        ReceiverPort::NodeInput { node, .. } => node.as_str().to_owned(),
        ReceiverPort::ProjectionWeight { projection } => format!("{projection} weight"),
    };
    format!("{from} to {to}")
}

fn nodes_in_execution_order(
    execution_list: &[NodeId],
    roles: &FxHashMap<NodeId, Role>,
    wanted: &[Role],
) -> Vec<NodeId> {
    execution_list
        .iter()
        .filter(|node| roles.get(node).is_some_and(|role| wanted.contains(role)))
        .cloned()
        .collect()
}
