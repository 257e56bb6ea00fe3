//! Trial execution.
//!
//! [`TrialRunner`] drives a compiled [`System`] through trials. All mutable
//! run state lives here: the last value carried by each projection, the
//! working copy of each trained weight, and the most recent outputs of each
//! node. The system itself stays immutable for the whole run.
//!
//! A trial proceeds in three phases. The processing phase walks the
//! execution sets in order; every member of a set executes concurrently,
//! and outputs are pushed through efferent projections only at the barrier
//! after the whole set completes. A projection whose edge was broken out of
//! the execution graph therefore still holds its sender's *previous-trial*
//! value when the receiver reads it, which is the lazy-evaluation rule that
//! makes cycles well-defined. The learning phase walks the learning
//! execution sets the same way, then applies weight-delta outputs to the
//! trained projections in a second pass. The control phase executes the
//! controller, if any.
//!
//! External inputs are deposited into the system input slots at the start
//! of every trial and, by default, zeroed again after the first execution
//! set so that a multi-set trial does not re-feed the stimulus
//! ([`ClampInput::Clamp`](crate::types::ClampInput::Clamp) keeps them live
//! instead). Shapes of all inputs and targets are validated up front, so a
//! malformed run executes zero nodes.

use futures_util::future::join_all;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::event_bus::{Event, EventBus, EventSink};
use crate::graphs::TARGET_PORT;
use crate::mechanism::{ExecutionContext, MechanismError};
use crate::projection::{ProjectionKind, ReceiverPort, SenderPort};
use crate::system::System;
use crate::types::{ClampInput, NodeId, Phase, Value};
use crate::utils::collections::accumulate;

use super::config::RunConfig;

/// External input for one trial: each origin node mapped to one value per
/// input port.
pub type TrialInputs = FxHashMap<NodeId, Vec<Value>>;

/// Targets for one trial: each target node mapped to its target value.
pub type TrialTargets = FxHashMap<NodeId, Value>;

/// Terminal outputs of one trial: terminal node mapped to one value per
/// output port.
pub type TrialOutputs = FxHashMap<NodeId, Vec<Value>>;

/// Errors surfaced while validating or executing a run.
#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    #[error("run would execute zero trials")]
    #[diagnostic(
        code(neurograph::run::empty),
        help("supply at least one input set or an explicit trial count")
    )]
    EmptyRun,

    #[error("trial {trial} is missing input for origin '{node}'")]
    #[diagnostic(code(neurograph::run::missing_origin_input))]
    MissingOriginInput { trial: usize, node: String },

    #[error("trial {trial} supplies input for '{node}', which is not an origin of the system")]
    #[diagnostic(code(neurograph::run::unknown_origin))]
    UnknownOriginInput { trial: usize, node: String },

    #[error("trial {trial} supplies {got} input values for '{node}', which has {expected} input ports")]
    #[diagnostic(code(neurograph::run::input_arity))]
    InputArity {
        trial: usize,
        node: String,
        expected: usize,
        got: usize,
    },

    #[error("trial {trial} input for '{node}' port {port} has width {got}, expected {expected}")]
    #[diagnostic(code(neurograph::run::input_shape))]
    InputShape {
        trial: usize,
        node: String,
        port: usize,
        expected: usize,
        got: usize,
    },

    #[error("learning is enabled but no targets were supplied")]
    #[diagnostic(
        code(neurograph::run::missing_targets),
        help("supply targets, disable learning, or opt into default targets")
    )]
    MissingTargets,

    #[error("trial {trial} is missing a target for '{node}'")]
    #[diagnostic(code(neurograph::run::missing_target))]
    MissingTarget { trial: usize, node: String },

    #[error("trial {trial} supplies a target for '{node}', which is not a target node")]
    #[diagnostic(code(neurograph::run::unknown_target))]
    UnknownTarget { trial: usize, node: String },

    #[error("trial {trial} target for '{node}' has width {got}, expected {expected}")]
    #[diagnostic(code(neurograph::run::target_shape))]
    TargetShape {
        trial: usize,
        node: String,
        expected: usize,
        got: usize,
    },

    #[error("mechanism '{node}' failed during the {phase} phase of trial {trial}")]
    #[diagnostic(code(neurograph::run::mechanism))]
    Mechanism {
        node: String,
        phase: Phase,
        trial: usize,
        #[source]
        #[diagnostic_source]
        source: MechanismError,
    },

    #[error("mechanism '{node}' returned {got} outputs, declares {expected} output ports")]
    #[diagnostic(code(neurograph::run::output_arity))]
    OutputArity {
        node: String,
        expected: usize,
        got: usize,
    },

    #[error("'{node}' is not a node of the system")]
    #[diagnostic(code(neurograph::run::unknown_node))]
    UnknownNode { node: String },

    #[error("initial value for '{node}' supplies {got} outputs, node declares {expected} ports")]
    #[diagnostic(code(neurograph::run::initial_value_shape))]
    InitialValueShape {
        node: String,
        expected: usize,
        got: usize,
    },
}

/// Outcome of a run: terminal outputs per trial, keyed back to the system
/// by name and run id.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub system: String,
    pub trials: Vec<TrialOutputs>,
}

impl RunReport {
    /// Render the report as pretty-printed JSON, for logs and fixtures.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Terminal outputs of the final trial.
    #[must_use]
    pub fn last(&self) -> Option<&TrialOutputs> {
        self.trials.last()
    }

    /// One node's outputs from one trial.
    #[must_use]
    pub fn output(&self, trial: usize, node: &NodeId) -> Option<&Vec<Value>> {
        self.trials.get(trial).and_then(|t| t.get(node))
    }
}

/// Mutable state of one run.
struct RunState {
    /// Last value pushed through each projection; `None` until the sender
    /// first executes. Indexed by projection id.
    projection_values: Vec<Option<Value>>,
    /// Working weight per projection; starts from the declared initial
    /// weight and absorbs learning deltas.
    weights: Vec<Option<Value>>,
    /// Most recent outputs per node.
    outputs: FxHashMap<NodeId, Vec<Value>>,
}

/// Drives trials over a borrowed [`System`].
pub struct TrialRunner<'a> {
    system: &'a System,
    config: RunConfig,
    bus: EventBus,
    run_id: Uuid,
    state: RunState,
}

impl<'a> TrialRunner<'a> {
    /// Create a runner with a fresh event bus, seeding the run state from
    /// the system's initial values.
    #[must_use]
    pub fn new(system: &'a System, config: RunConfig) -> Self {
        let mut runner = TrialRunner {
            system,
            config,
            bus: EventBus::default(),
            run_id: Uuid::new_v4(),
            state: RunState {
                projection_values: vec![None; system.projections().len()],
                weights: system.projections().iter().map(|p| p.weight.clone()).collect(),
                outputs: FxHashMap::default(),
            },
        };
        runner.apply_initial_values();
        runner
    }

    /// Attach a sink to the runner's event bus.
    pub fn attach_sink(&self, sink: impl EventSink + 'static) {
        self.bus.add_sink(sink);
    }

    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Seed recurrent senders' outputs and push them through their
    /// efferents, so broken cycle edges carry a defined value in trial 0.
    fn apply_initial_values(&mut self) {
        let system = self.system;
        for (node, outputs) in system.initial_values() {
            for pid in system.efferents(node) {
                let projection = &system.projections()[pid.0];
                if let SenderPort::NodeOutput { port, .. } = &projection.sender {
                    if let Some(value) = outputs.get(*port) {
                        let sent = projection.transmit(value, self.state.weights[pid.0].as_ref());
                        self.state.projection_values[pid.0] = Some(sent);
                    }
                }
            }
            self.state.outputs.insert(node.clone(), outputs.clone());
        }
    }

    /// Execute the run. `targets` is required whenever the learning phase
    /// will actually run, unless default targets were opted into.
    pub async fn run(
        &mut self,
        inputs: &[TrialInputs],
        targets: Option<&[TrialTargets]>,
    ) -> Result<RunReport, RunnerError> {
        let num_trials = self.validate(inputs, targets)?;
        let learning_active = self.learning_active();

        info!(
            run_id = %self.run_id,
            system = self.system.name(),
            trials = num_trials,
            learning = learning_active,
            "run starting"
        );
        let _ = self
            .bus
            .sender()
            .send(Event::diagnostic("runner", format!("run of {num_trials} trial(s) starting")));

        let mut trials = Vec::with_capacity(num_trials);
        for trial in 0..num_trials {
            let trial_inputs = if inputs.is_empty() {
                None
            } else {
                Some(&inputs[trial % inputs.len()])
            };
            self.deposit_inputs(trial_inputs);

            for (set_index, set) in self.system.execution_sets().iter().enumerate() {
                self.execute_set(set, Phase::Processing, trial).await?;
                if set_index == 0 && self.config.clamp_input == ClampInput::Zero {
                    self.zero_system_inputs();
                }
            }

            if learning_active {
                self.deposit_targets(targets, trial);
                let sets = self
                    .system
                    .learning_layout()
                    .map(|l| l.learning_execution_sets.clone())
                    .unwrap_or_default();
                for set in &sets {
                    self.execute_set(set, Phase::Learning, trial).await?;
                }
                self.apply_weight_updates(&sets);
            }

            if self.config.control && !self.config.simulation {
                self.run_control_phase(trial).await?;
            }

            let outputs: TrialOutputs = self
                .system
                .terminal_nodes()
                .iter()
                .filter_map(|node| {
                    self.state
                        .outputs
                        .get(node)
                        .map(|out| (node.clone(), out.clone()))
                })
                .collect();
            trials.push(outputs);

            let drained = self.bus.drain();
            debug!(trial, events = drained, "trial complete");
        }

        info!(run_id = %self.run_id, "run finished");
        Ok(RunReport {
            run_id: self.run_id,
            system: self.system.name().to_owned(),
            trials,
        })
    }

    fn learning_active(&self) -> bool {
        self.system.learning_layout().is_some() && self.config.learning && !self.config.simulation
    }

    /// Reject malformed inputs and targets before anything executes.
    fn validate(
        &self,
        inputs: &[TrialInputs],
        targets: Option<&[TrialTargets]>,
    ) -> Result<usize, RunnerError> {
        let num_trials = self.config.num_trials.unwrap_or(inputs.len());
        if num_trials == 0 {
            return Err(RunnerError::EmptyRun);
        }

        let system = self.system;
        for (trial, set) in inputs.iter().enumerate() {
            // Unknown keys first, so input for a non-origin is named as
            // such rather than surfacing as a missing origin.
            for node in set.keys() {
                if !system.origin_nodes().contains(node) {
                    return Err(RunnerError::UnknownOriginInput {
                        trial,
                        node: node.as_str().to_owned(),
                    });
                }
            }
            for origin in system.origin_nodes() {
                let spec = system.node(origin).ok_or_else(|| RunnerError::UnknownNode {
                    node: origin.as_str().to_owned(),
                })?;
                let values = set.get(origin).ok_or_else(|| RunnerError::MissingOriginInput {
                    trial,
                    node: origin.as_str().to_owned(),
                })?;
                if values.len() != spec.input_widths.len() {
                    return Err(RunnerError::InputArity {
                        trial,
                        node: origin.as_str().to_owned(),
                        expected: spec.input_widths.len(),
                        got: values.len(),
                    });
                }
                for (port, value) in values.iter().enumerate() {
                    if value.len() != spec.input_widths[port] {
                        return Err(RunnerError::InputShape {
                            trial,
                            node: origin.as_str().to_owned(),
                            port,
                            expected: spec.input_widths[port],
                            got: value.len(),
                        });
                    }
                }
            }
        }

        if self.learning_active() {
            match targets {
                None if !self.config.allow_default_targets => {
                    return Err(RunnerError::MissingTargets);
                }
                None => {
                    warn!(
                        system = system.name(),
                        "no targets supplied; zero vectors will be used for every target node"
                    );
                }
                Some(sets) => {
                    for (trial, set) in sets.iter().enumerate() {
                        for node in set.keys() {
                            if !system.target_nodes().contains(node) {
                                return Err(RunnerError::UnknownTarget {
                                    trial,
                                    node: node.as_str().to_owned(),
                                });
                            }
                        }
                        for target in system.target_nodes() {
                            let spec =
                                system.node(target).ok_or_else(|| RunnerError::UnknownNode {
                                    node: target.as_str().to_owned(),
                                })?;
                            let expected = spec.input_widths[TARGET_PORT];
                            match set.get(target) {
                                None if self.config.allow_default_targets => {}
                                None => {
                                    return Err(RunnerError::MissingTarget {
                                        trial,
                                        node: target.as_str().to_owned(),
                                    });
                                }
                                Some(value) if value.len() != expected => {
                                    return Err(RunnerError::TargetShape {
                                        trial,
                                        node: target.as_str().to_owned(),
                                        expected,
                                        got: value.len(),
                                    });
                                }
                                Some(_) => {}
                            }
                        }
                    }
                }
            }
        }

        Ok(num_trials)
    }

    /// Load one trial's external inputs into the system input projections.
    fn deposit_inputs(&mut self, trial_inputs: Option<&TrialInputs>) {
        let system = self.system;
        for (slot, (node, port)) in system.system_input_slots().iter().enumerate() {
            let pid = system.system_input_projections()[slot];
            let value = trial_inputs
                .and_then(|set| set.get(node))
                .and_then(|values| values.get(*port))
                .cloned()
                .unwrap_or_else(|| zero_for_port(system, node, *port));
            self.state.projection_values[pid.0] = Some(value);
        }
    }

    /// Zero every system input projection; applied after the first
    /// execution set unless inputs are clamped.
    fn zero_system_inputs(&mut self) {
        let system = self.system;
        for (slot, (node, port)) in system.system_input_slots().iter().enumerate() {
            let pid = system.system_input_projections()[slot];
            self.state.projection_values[pid.0] = Some(zero_for_port(system, node, *port));
        }
    }

    /// Load one trial's targets (or zero defaults) into the system target
    /// projections.
    fn deposit_targets(&mut self, targets: Option<&[TrialTargets]>, trial: usize) {
        let system = self.system;
        let set = targets.and_then(|sets| {
            if sets.is_empty() {
                None
            } else {
                Some(&sets[trial % sets.len()])
            }
        });
        for (slot, node) in system.system_target_slots().iter().enumerate() {
            let pid = system.system_target_projections()[slot];
            let value = set
                .and_then(|s| s.get(node))
                .cloned()
                .unwrap_or_else(|| zero_for_port(system, node, TARGET_PORT));
            self.state.projection_values[pid.0] = Some(value);
        }
    }

    /// Execute one set concurrently, then propagate all outputs at the
    /// barrier in name order.
    async fn execute_set(
        &mut self,
        set: &[NodeId],
        phase: Phase,
        trial: usize,
    ) -> Result<(), RunnerError> {
        let system = self.system;
        let mut jobs = Vec::with_capacity(set.len());
        for node in set {
            let Some(spec) = system.node(node) else {
                return Err(RunnerError::UnknownNode {
                    node: node.as_str().to_owned(),
                });
            };
            let inputs = self.gather_inputs(node);
            let ctx = ExecutionContext {
                node: node.clone(),
                trial: trial as u64,
                phase,
                event_tx: self.bus.sender(),
            };
            let mechanism = Arc::clone(&spec.mechanism);
            let node = node.clone();
            jobs.push(async move {
                let result = mechanism.execute(inputs, ctx).await;
                (node, result)
            });
        }

        for (node, result) in join_all(jobs).await {
            let outputs = result.map_err(|source| RunnerError::Mechanism {
                node: node.as_str().to_owned(),
                phase,
                trial,
                source,
            })?;
            let spec = system.node(&node).ok_or_else(|| RunnerError::UnknownNode {
                node: node.as_str().to_owned(),
            })?;
            if outputs.len() != spec.output_ports {
                return Err(RunnerError::OutputArity {
                    node: node.as_str().to_owned(),
                    expected: spec.output_ports,
                    got: outputs.len(),
                });
            }
            self.propagate(&node, &outputs);
            let _ = self.bus.sender().send(Event::node(
                node.clone(),
                trial as u64,
                phase,
                "runner",
                "executed",
            ));
            self.state.outputs.insert(node, outputs);
        }
        Ok(())
    }

    /// Sum afferent projection values per input port, zero-padded to the
    /// declared widths. Projections that never transmitted contribute
    /// nothing.
    fn gather_inputs(&self, node: &NodeId) -> Vec<Value> {
        let system = self.system;
        let Some(spec) = system.node(node) else {
            return Vec::new();
        };
        let mut inputs: Vec<Value> = spec.input_widths.iter().map(|w| vec![0.0; *w]).collect();
        for pid in system.afferents(node) {
            let projection = &system.projections()[pid.0];
            let ReceiverPort::NodeInput { port, .. } = &projection.receiver else {
                continue;
            };
            if let Some(value) = &self.state.projection_values[pid.0] {
                if let Some(acc) = inputs.get_mut(*port) {
                    accumulate(acc, value);
                }
            }
        }
        inputs
    }

    /// Push a node's fresh outputs through its efferent projections.
    fn propagate(&mut self, node: &NodeId, outputs: &[Value]) {
        let system = self.system;
        for pid in system.efferents(node) {
            let projection = &system.projections()[pid.0];
            if let SenderPort::NodeOutput { port, .. } = &projection.sender {
                if let Some(value) = outputs.get(*port) {
                    let sent = projection.transmit(value, self.state.weights[pid.0].as_ref());
                    self.state.projection_values[pid.0] = Some(sent);
                }
            }
        }
    }

    /// Second learning pass: fold weight-delta outputs into the working
    /// weights of the trained projections.
    fn apply_weight_updates(&mut self, sets: &[Vec<NodeId>]) {
        let system = self.system;
        for node in sets.iter().flatten() {
            for pid in system.efferents(node) {
                let projection = &system.projections()[pid.0];
                if projection.kind != ProjectionKind::Learning {
                    continue;
                }
                let ReceiverPort::ProjectionWeight { projection: trained } = &projection.receiver
                else {
                    continue;
                };
                let Some(delta) = self.state.projection_values[pid.0].clone() else {
                    continue;
                };
                let weight = self.state.weights[trained.0]
                    .get_or_insert_with(|| vec![1.0; delta.len()]);
                if weight.len() < delta.len() {
                    weight.resize(delta.len(), 1.0);
                }
                for (i, d) in delta.iter().enumerate() {
                    weight[i] += d;
                }
                debug!(
                    learner = node.as_str(),
                    trained = %trained,
                    "weight updated"
                );
            }
        }
    }

    /// Execute the controller, if configured. Failures are fatal unless
    /// the run is an initialization probe.
    async fn run_control_phase(&mut self, trial: usize) -> Result<(), RunnerError> {
        let system = self.system;
        let Some(controller) = system.controller() else {
            return Ok(());
        };
        let controller = controller.clone();
        let result = self
            .execute_set(std::slice::from_ref(&controller), Phase::Control, trial)
            .await;
        match result {
            Ok(()) => {
                // Control values addressed at projection weights replace
                // the working weight outright; effective from next trial.
                for pid in system.efferents(&controller) {
                    let projection = &system.projections()[pid.0];
                    if projection.kind != ProjectionKind::Control {
                        continue;
                    }
                    let ReceiverPort::ProjectionWeight { projection: target } =
                        &projection.receiver
                    else {
                        continue;
                    };
                    if let Some(value) = self.state.projection_values[pid.0].clone() {
                        self.state.weights[target.0] = Some(value);
                    }
                }
                Ok(())
            }
            Err(err) if self.config.init_probe => {
                warn!(
                    controller = controller.as_str(),
                    error = %err,
                    "controller failed during initialization probe; continuing"
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

fn zero_for_port(system: &System, node: &NodeId, port: usize) -> Value {
    let width = system
        .node(node)
        .and_then(|spec| spec.input_widths.get(port).copied())
        .unwrap_or_default();
    vec![0.0; width]
}
