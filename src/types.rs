//! Core types for the neurograph modeling engine.
//!
//! This module defines the fundamental vocabulary used throughout the crate
//! for identifying mechanisms, classifying their structural roles, and
//! labelling the phases of a trial.
//!
//! # Key Types
//!
//! - [`NodeId`]: unique identifier of a mechanism within a system
//! - [`NodeClass`]: what kind of component a mechanism is (processing,
//!   objective, learning, control)
//! - [`Role`]: structural role a mechanism plays in one system's graph
//! - [`Phase`]: which of the three per-trial execution phases is running
//! - [`Value`]: the payload carried by one port
//!
//! # Examples
//!
//! ```rust
//! use neurograph::types::{NodeId, Role};
//!
//! let id = NodeId::from("decision");
//! assert_eq!(id.as_str(), "decision");
//! assert_eq!(Role::InitializeCycle.to_string(), "INITIALIZE_CYCLE");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// The payload carried by a single input or output port.
///
/// Multiple afferent projections converging on the same input port combine
/// by elementwise sum, padding a never-transmitted projection with zeros.
pub type Value = Vec<f64>;

/// Identifies a mechanism within a system.
///
/// Names are unique per system (enforced by the
/// [`NameRegistry`](crate::registry::NameRegistry) at registration time) and
/// double as the deterministic tie-break key wherever ordering matters:
/// execution-set flattening, barrier merges, and diagnostic output.
///
/// # Examples
///
/// ```rust
/// use neurograph::types::NodeId;
///
/// let a = NodeId::from("A");
/// let b: NodeId = "B".into();
/// assert!(a < b);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Create a new id from anything string-like.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The mechanism name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of component a registered mechanism is.
///
/// The graph builder uses the class to decide which nodes belong to the
/// processing graph and which belong to the learning graph: anything other
/// than [`Processing`](Self::Processing) is treated as a monitoring component
/// and excluded from processing-graph recursion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeClass {
    /// An ordinary processing mechanism on a pathway.
    Processing,
    /// An error-computing (target/comparator) mechanism.
    Objective,
    /// A mechanism that computes weight updates from error signals.
    Learning,
    /// A mechanism that modulates parameters from monitored values.
    Control,
}

impl NodeClass {
    /// Returns `true` for any class the processing-graph traversal must not
    /// recurse into (objective, learning, and control mechanisms).
    #[must_use]
    pub fn is_monitoring(self) -> bool {
        !matches!(self, NodeClass::Processing)
    }
}

/// Structural role of a mechanism within one system's graph.
///
/// Roles are recomputed from scratch on every graph build and owned by the
/// [`System`](crate::system::System) that built them; mechanisms themselves
/// stay agnostic of the systems that reference them. Each mechanism holds
/// exactly one primary role per system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// No processing predecessors within the system.
    Origin,
    /// Ordinary interior node of the processing graph.
    Internal,
    /// No processing successors within the system.
    Terminal,
    /// Simultaneously an origin and a terminal (sole node of its pathway).
    Singleton,
    /// Receiver endpoint of a projection excluded from the execution graph
    /// because it would close a cycle.
    Cycle,
    /// Sender endpoint of such an excluded projection; eligible for explicit
    /// initial-value seeding.
    InitializeCycle,
    /// A monitoring component (objective/learning/control) reached from the
    /// processing graph.
    Learning,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Origin => "ORIGIN",
            Role::Internal => "INTERNAL",
            Role::Terminal => "TERMINAL",
            Role::Singleton => "SINGLETON",
            Role::Cycle => "CYCLE",
            Role::InitializeCycle => "INITIALIZE_CYCLE",
            Role::Learning => "LEARNING",
        };
        write!(f, "{s}")
    }
}

/// The three phases of a trial, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Mechanisms run in execution-set order, values flow along pathway
    /// projections.
    Processing,
    /// Objective and learning mechanisms run, then weight deltas are pushed
    /// into the trained projections.
    Learning,
    /// The controller runs; its modulation takes effect next trial.
    Control,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Processing => "processing",
            Phase::Learning => "learning",
            Phase::Control => "control",
        };
        write!(f, "{s}")
    }
}

/// Policy for external input after the first execution set of a trial.
///
/// By default the system input slots are zeroed once the first set has run,
/// so a stimulus is presented exactly once per trial. `Clamp` keeps the
/// stimulus applied for every set of the trial.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClampInput {
    /// Zero the system inputs after the first execution set (default).
    #[default]
    Zero,
    /// Keep reapplying the trial's external input for every set.
    Clamp,
}
