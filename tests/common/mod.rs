//! Shared helpers for the integration suites.
//!
//! Each suite uses a different subset of these.
#![allow(dead_code)]

use neurograph::graphs::SystemBuilder;
use neurograph::pathway::Pathway;
use neurograph::runtime::{TrialInputs, TrialTargets};
use neurograph::system::System;
use neurograph::types::{NodeId, Value};
use neurograph::utils::testing::doubler;

/// A single-pathway chain of doublers named after `names`.
pub fn doubling_chain(names: &[&str]) -> System {
    let mut builder = SystemBuilder::new("chain");
    for name in names {
        builder = builder.add_processing(*name, vec![1], 1, doubler());
    }
    builder
        .add_pathway(Pathway::new("main", names.iter().copied()))
        .compile()
        .expect("chain compiles")
}

/// One trial's inputs: a single origin with a single input port.
pub fn single_input(node: &str, value: Value) -> TrialInputs {
    TrialInputs::from_iter([(NodeId::from(node), vec![value])])
}

/// One trial's targets for a single target node.
pub fn single_target(node: &str, value: Value) -> TrialTargets {
    TrialTargets::from_iter([(NodeId::from(node), value)])
}
