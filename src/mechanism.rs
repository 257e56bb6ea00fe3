//! Mechanism execution contract.
//!
//! This module provides the core abstraction for executable processing
//! units: the [`Mechanism`] trait, the per-execution [`ExecutionContext`],
//! and the error types a mechanism can surface.
//!
//! The engine is deliberately agnostic of mechanism numerics. A mechanism is
//! anything that maps one ordered sequence of input-port values to one
//! ordered sequence of output-port values; transfer functions, integrators,
//! comparators, and controllers all live behind this one trait. Port counts
//! and widths are declared at registration time on the
//! [`SystemBuilder`](crate::graphs::SystemBuilder), not on the trait, so the
//! graph machinery can validate shapes without executing anything.

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::event_bus::Event;
use crate::types::{NodeId, Phase, Value};

/// Core trait for executable mechanisms.
///
/// Mechanisms should be stateless with respect to the graph: every value
/// they need arrives through `inputs`, and everything they produce leaves
/// through the returned outputs. Stored previous outputs, lazy projection
/// values, and initialization are the runner's business, not the
/// mechanism's.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use neurograph::mechanism::{ExecutionContext, Mechanism, MechanismError};
/// use neurograph::types::Value;
///
/// /// Doubles every element of its single input port.
/// struct Doubler;
///
/// #[async_trait]
/// impl Mechanism for Doubler {
///     async fn execute(
///         &self,
///         inputs: Vec<Value>,
///         _ctx: ExecutionContext,
///     ) -> Result<Vec<Value>, MechanismError> {
///         let port = inputs
///             .into_iter()
///             .next()
///             .ok_or(MechanismError::MissingInput { what: "port 0" })?;
///         Ok(vec![port.into_iter().map(|x| x * 2.0).collect()])
///     }
/// }
/// ```
#[async_trait]
pub trait Mechanism: Send + Sync {
    /// Execute with one value per input port; return one value per output
    /// port.
    async fn execute(
        &self,
        inputs: Vec<Value>,
        ctx: ExecutionContext,
    ) -> Result<Vec<Value>, MechanismError>;
}

/// Execution context handed to a mechanism for one call.
///
/// Carries the mechanism's identity, the trial and phase being run, and a
/// sender for the system's diagnostic [`EventBus`](crate::event_bus::EventBus).
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    /// Id of the mechanism being executed.
    pub node: NodeId,
    /// Zero-based trial index within the current run.
    pub trial: u64,
    /// Which phase of the trial this call belongs to.
    pub phase: Phase,
    /// Channel for emitting diagnostic events.
    pub event_tx: flume::Sender<Event>,
}

impl ExecutionContext {
    /// Emit a node-scoped diagnostic event enriched with this context's
    /// trial and phase metadata.
    pub fn emit(
        &self,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), ContextError> {
        self.event_tx
            .send(Event::node(
                self.node.clone(),
                self.trial,
                self.phase,
                scope,
                message,
            ))
            .map_err(|_| ContextError::EventBusUnavailable)
    }
}

/// Errors from [`ExecutionContext`] methods.
#[derive(Debug, Error, Diagnostic)]
pub enum ContextError {
    /// The event channel is disconnected.
    #[error("failed to emit event: event bus unavailable")]
    #[diagnostic(
        code(neurograph::mechanism::event_bus_unavailable),
        help("The owning system's event bus was dropped while a trial was running.")
    )]
    EventBusUnavailable,
}

/// Fatal errors from a mechanism's `execute`.
///
/// A mechanism error aborts the trial: the runner propagates it unchanged to
/// the caller of the run entry point, with no partial-result buffering.
#[derive(Debug, Error, Diagnostic)]
pub enum MechanismError {
    /// An expected input port value was absent.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(neurograph::mechanism::missing_input),
        help("Check the mechanism's declared input ports against its afferent projections.")
    )]
    MissingInput { what: &'static str },

    /// An input arrived with the wrong width.
    #[error("shape mismatch on {what}: expected {expected}, got {got}")]
    #[diagnostic(code(neurograph::mechanism::shape))]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// A numeric failure inside the mechanism's function.
    #[error("numeric error: {message}")]
    #[diagnostic(code(neurograph::mechanism::numeric))]
    Numeric { message: String },

    /// Event bus communication failure.
    #[error("event bus error: {0}")]
    #[diagnostic(code(neurograph::mechanism::event_bus))]
    EventBus(#[from] ContextError),
}
