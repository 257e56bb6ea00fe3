//! Canned mechanisms for tests, demos, and doc examples.
//!
//! Real models supply their own [`Mechanism`] implementations; these cover
//! the shapes the engine's own tests need: pass-throughs, simple transfer
//! functions, a comparator-style objective, a delta-rule learner, and a
//! probe that records what it was fed.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::mechanism::{ExecutionContext, Mechanism, MechanismError};
use crate::types::Value;
use crate::utils::collections::{diff, hadamard, scale};

/// Passes every input port through unchanged. Declare equal input and
/// output port counts.
pub struct Identity;

#[async_trait]
impl Mechanism for Identity {
    async fn execute(
        &self,
        inputs: Vec<Value>,
        _ctx: ExecutionContext,
    ) -> Result<Vec<Value>, MechanismError> {
        Ok(inputs)
    }
}

/// An identity mechanism.
#[must_use]
pub fn identity() -> Identity {
    Identity
}

/// Doubles its single input port.
pub struct Doubler;

#[async_trait]
impl Mechanism for Doubler {
    async fn execute(
        &self,
        inputs: Vec<Value>,
        _ctx: ExecutionContext,
    ) -> Result<Vec<Value>, MechanismError> {
        let port = inputs
            .into_iter()
            .next()
            .ok_or(MechanismError::MissingInput { what: "port 0" })?;
        Ok(vec![scale(&port, 2.0)])
    }
}

/// A doubling mechanism.
#[must_use]
pub fn doubler() -> Doubler {
    Doubler
}

/// Sums all input ports elementwise into one output.
pub struct Adder;

#[async_trait]
impl Mechanism for Adder {
    async fn execute(
        &self,
        inputs: Vec<Value>,
        _ctx: ExecutionContext,
    ) -> Result<Vec<Value>, MechanismError> {
        let mut iter = inputs.into_iter();
        let mut acc = iter
            .next()
            .ok_or(MechanismError::MissingInput { what: "port 0" })?;
        for port in iter {
            for (slot, x) in acc.iter_mut().zip(&port) {
                *slot += x;
            }
        }
        Ok(vec![acc])
    }
}

/// A summing mechanism.
#[must_use]
pub fn adder() -> Adder {
    Adder
}

/// Ignores its inputs and emits a fixed value on one output port.
pub struct Constant(pub Value);

#[async_trait]
impl Mechanism for Constant {
    async fn execute(
        &self,
        _inputs: Vec<Value>,
        _ctx: ExecutionContext,
    ) -> Result<Vec<Value>, MechanismError> {
        Ok(vec![self.0.clone()])
    }
}

/// A constant-output mechanism.
#[must_use]
pub fn constant(value: Value) -> Constant {
    Constant(value)
}

/// Always fails with a numeric error.
pub struct Failing(pub String);

#[async_trait]
impl Mechanism for Failing {
    async fn execute(
        &self,
        _inputs: Vec<Value>,
        _ctx: ExecutionContext,
    ) -> Result<Vec<Value>, MechanismError> {
        Err(MechanismError::Numeric {
            message: self.0.clone(),
        })
    }
}

/// A mechanism that fails every execution.
#[must_use]
pub fn failing(message: impl Into<String>) -> Failing {
    Failing(message.into())
}

/// Objective-style comparator: emits `target - sample` on output 0.
/// Register with [`add_objective`](crate::graphs::SystemBuilder::add_objective).
pub struct Comparator;

#[async_trait]
impl Mechanism for Comparator {
    async fn execute(
        &self,
        inputs: Vec<Value>,
        ctx: ExecutionContext,
    ) -> Result<Vec<Value>, MechanismError> {
        let [sample, target] = <[Value; 2]>::try_from(inputs)
            .map_err(|_| MechanismError::MissingInput { what: "sample and target ports" })?;
        let error = diff(&target, &sample);
        ctx.emit("comparator", format!("error {error:?}"))?;
        Ok(vec![error])
    }
}

/// A comparator objective mechanism.
#[must_use]
pub fn comparator() -> Comparator {
    Comparator
}

/// Delta-rule learner: output 0 is `rate * error * activation` (the weight
/// delta), output 1 the error signal passed through.
/// Register with [`add_learning`](crate::graphs::SystemBuilder::add_learning).
pub struct DeltaRule(pub f64);

#[async_trait]
impl Mechanism for DeltaRule {
    async fn execute(
        &self,
        inputs: Vec<Value>,
        _ctx: ExecutionContext,
    ) -> Result<Vec<Value>, MechanismError> {
        let [activation, error] = <[Value; 2]>::try_from(inputs)
            .map_err(|_| MechanismError::MissingInput { what: "activation and error ports" })?;
        let delta = scale(&hadamard(&error, &activation), self.0);
        Ok(vec![delta, error])
    }
}

/// A delta-rule learning mechanism.
#[must_use]
pub fn delta_rule(rate: f64) -> DeltaRule {
    DeltaRule(rate)
}

/// Identity pass-through that records the inputs of every execution.
/// Cloning shares the log.
#[derive(Clone, Default)]
pub struct Probe {
    log: Arc<Mutex<Vec<Vec<Value>>>>,
}

impl Probe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inputs received so far, one entry per execution.
    #[must_use]
    pub fn received(&self) -> Vec<Vec<Value>> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl Mechanism for Probe {
    async fn execute(
        &self,
        inputs: Vec<Value>,
        _ctx: ExecutionContext,
    ) -> Result<Vec<Value>, MechanismError> {
        self.log.lock().push(inputs.clone());
        Ok(inputs)
    }
}
