//! Trial execution: run configuration, the trial runner, and its report.

pub mod config;
pub mod runner;

pub use config::RunConfig;
pub use runner::{
    RunReport, RunnerError, TrialInputs, TrialOutputs, TrialRunner, TrialTargets,
};
