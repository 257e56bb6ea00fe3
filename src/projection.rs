//! Projections: directed, value-carrying connections between ports.
//!
//! A projection joins one sender port to one receiver port. Senders are
//! mechanism output ports or one of the system-owned input slots; receivers
//! are mechanism input ports or, for learning and control modulation, the
//! *weight* of another projection (the parameter-port equivalent).
//!
//! Projection values are runtime state: they are owned by the
//! [`TrialRunner`](crate::runtime::TrialRunner)'s run state and updated only
//! at the barrier after the sender's owner executes. That update discipline
//! is what produces lazy evaluation: a receiver that already ran this trial
//! will not observe the new value until its next execution.
//!
//! Construction-time endpoints use [`PortBinding`], an explicit two-state
//! union: a projection may be created with one or both ends unresolved and
//! bound later, instead of patching attributes after the fact.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{NodeId, Value};

/// Index of a projection within its owning system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectionId(pub usize);

impl fmt::Display for ProjectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proj#{}", self.0)
    }
}

/// What a projection is for. The graph builders filter edges by kind:
/// the processing pass traverses `Pathway`, the learning pass traverses
/// `Learning`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectionKind {
    /// Ordinary value flow between processing mechanisms.
    Pathway,
    /// Error-signal flow between learning components, or a weight update
    /// onto a trained projection.
    Learning,
    /// Modulation from a controller.
    Control,
    /// Per-trial external stimulus into an origin mechanism's input port.
    SystemInput,
    /// Per-trial target value into an objective mechanism's target port.
    SystemTarget,
    /// The default stimulus source a pathway owns for its first mechanism.
    PathwayInput,
}

/// The sending end of a projection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SenderPort {
    /// Output port `port` of mechanism `node`.
    NodeOutput { node: NodeId, port: usize },
    /// The input slot a pathway owns for its first mechanism.
    PathwayInput { pathway: String },
    /// System-owned external-input slot (one per origin input port).
    SystemInput { slot: usize },
    /// System-owned target slot (one per surviving objective mechanism).
    SystemTarget { slot: usize },
}

impl SenderPort {
    /// The owning mechanism, when the sender is a mechanism port.
    #[must_use]
    pub fn node(&self) -> Option<&NodeId> {
        match self {
            SenderPort::NodeOutput { node, .. } => Some(node),
            _ => None,
        }
    }
}

/// The receiving end of a projection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReceiverPort {
    /// Input port `port` of mechanism `node`.
    NodeInput { node: NodeId, port: usize },
    /// The weight of another projection (modulated by learning/control).
    ProjectionWeight { projection: ProjectionId },
}

impl ReceiverPort {
    /// The owning mechanism, when the receiver is a mechanism port.
    #[must_use]
    pub fn node(&self) -> Option<&NodeId> {
        match self {
            ReceiverPort::NodeInput { node, .. } => Some(node),
            ReceiverPort::ProjectionWeight { .. } => None,
        }
    }
}

/// Endpoint state of a projection under construction.
///
/// `Pending` carries whichever ends are known so far; [`bind_sender`] and
/// [`bind_receiver`] move the binding toward `Bound`. Compilation rejects
/// any projection still pending.
///
/// [`bind_sender`]: PortBinding::bind_sender
/// [`bind_receiver`]: PortBinding::bind_receiver
#[derive(Clone, Debug, PartialEq)]
pub enum PortBinding {
    /// Both endpoints resolved.
    Bound {
        sender: SenderPort,
        receiver: ReceiverPort,
    },
    /// At least one endpoint still unknown.
    Pending {
        sender: Option<SenderPort>,
        receiver: Option<ReceiverPort>,
    },
}

impl PortBinding {
    /// A fully bound endpoint pair.
    #[must_use]
    pub fn bound(sender: SenderPort, receiver: ReceiverPort) -> Self {
        PortBinding::Bound { sender, receiver }
    }

    /// An empty pending binding.
    #[must_use]
    pub fn deferred() -> Self {
        PortBinding::Pending {
            sender: None,
            receiver: None,
        }
    }

    /// Supply the sender end, promoting to `Bound` if the receiver is known.
    #[must_use]
    pub fn bind_sender(self, sender: SenderPort) -> Self {
        match self {
            PortBinding::Bound { receiver, .. }
            | PortBinding::Pending {
                receiver: Some(receiver),
                ..
            } => PortBinding::Bound { sender, receiver },
            PortBinding::Pending { receiver: None, .. } => PortBinding::Pending {
                sender: Some(sender),
                receiver: None,
            },
        }
    }

    /// Supply the receiver end, promoting to `Bound` if the sender is known.
    #[must_use]
    pub fn bind_receiver(self, receiver: ReceiverPort) -> Self {
        match self {
            PortBinding::Bound { sender, .. }
            | PortBinding::Pending {
                sender: Some(sender),
                ..
            } => PortBinding::Bound { sender, receiver },
            PortBinding::Pending { sender: None, .. } => PortBinding::Pending {
                sender: None,
                receiver: Some(receiver),
            },
        }
    }

    /// Returns `true` once both ends are resolved.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        matches!(self, PortBinding::Bound { .. })
    }
}

/// A compiled projection: topology plus the optional trained weight.
///
/// The last-transmitted value lives in the runner's per-run state, keyed by
/// [`ProjectionId`]; the weight recorded here is only the *initial* weight.
/// Learning updates are applied to the run state's working copy.
#[derive(Clone, Debug)]
pub struct Projection {
    /// Unique display name, assigned through the system's name registry.
    pub name: String,
    pub kind: ProjectionKind,
    pub sender: SenderPort,
    pub receiver: ReceiverPort,
    /// Elementwise multiplier applied when the sender's value is pushed
    /// through; `None` transmits the value unchanged.
    pub weight: Option<Value>,
}

impl Projection {
    /// Apply this projection's weight to an outgoing value.
    #[must_use]
    pub fn transmit(&self, value: &Value, weight_override: Option<&Value>) -> Value {
        match weight_override.or(self.weight.as_ref()) {
            None => value.clone(),
            Some(w) => value
                .iter()
                .enumerate()
                .map(|(i, x)| x * w.get(i).copied().unwrap_or(1.0))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_promotes_when_both_ends_known() {
        let binding = PortBinding::deferred()
            .bind_receiver(ReceiverPort::NodeInput {
                node: "B".into(),
                port: 0,
            })
            .bind_sender(SenderPort::NodeOutput {
                node: "A".into(),
                port: 0,
            });
        assert!(binding.is_bound());
    }

    #[test]
    fn binding_stays_pending_with_one_end() {
        let binding = PortBinding::deferred().bind_sender(SenderPort::NodeOutput {
            node: "A".into(),
            port: 0,
        });
        assert!(!binding.is_bound());
    }

    #[test]
    fn transmit_applies_weight_elementwise() {
        let proj = Projection {
            name: "p".into(),
            kind: ProjectionKind::Pathway,
            sender: SenderPort::NodeOutput {
                node: "A".into(),
                port: 0,
            },
            receiver: ReceiverPort::NodeInput {
                node: "B".into(),
                port: 0,
            },
            weight: Some(vec![2.0, 0.5]),
        };
        assert_eq!(proj.transmit(&vec![1.0, 4.0], None), vec![2.0, 2.0]);
        // A run-state override wins over the initial weight.
        assert_eq!(
            proj.transmit(&vec![1.0, 4.0], Some(&vec![1.0, 1.0])),
            vec![1.0, 4.0]
        );
    }
}
