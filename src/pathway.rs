//! Pathways: ordered linear chains of mechanisms.
//!
//! A pathway names a route through the model: a sequence of registered
//! mechanisms, connected in order. During compilation the builder inserts an
//! implicit pathway projection between each consecutive pair that lacks an
//! explicit one, and wires the pathway's own input slot to its first
//! mechanism. Explicit projections added by the caller may skip nodes or
//! loop backwards; repetition of a mechanism within the chain (`[a, b, a]`)
//! is legal and induces a feedback connection.
//!
//! A pathway can also declare a learning chain: the ordered learning
//! components that propagate its error signal, listed with the component
//! nearest the error source (the objective mechanism) first. The learning
//! graph is seeded from that first entry, because learning signals flow
//! backward relative to processing.

use crate::types::NodeId;

/// One declared route through the model.
///
/// # Examples
///
/// ```rust
/// use neurograph::pathway::Pathway;
///
/// let p = Pathway::new("color-naming", ["input", "hidden", "output"]);
/// assert_eq!(p.first_node().as_str(), "input");
/// assert_eq!(p.last_node().as_str(), "output");
/// assert!(!p.learning_enabled());
/// ```
#[derive(Clone, Debug)]
pub struct Pathway {
    name: String,
    nodes: Vec<NodeId>,
    learning_nodes: Vec<NodeId>,
    learning_enabled: bool,
}

impl Pathway {
    /// Create a pathway from an ordered, non-empty node list.
    ///
    /// # Panics
    ///
    /// Panics if `nodes` is empty; a pathway with no mechanisms has no
    /// meaning and the builder could not derive its endpoints.
    pub fn new<I, N>(name: impl Into<String>, nodes: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NodeId>,
    {
        let nodes: Vec<NodeId> = nodes.into_iter().map(Into::into).collect();
        assert!(!nodes.is_empty(), "a pathway requires at least one node");
        Self {
            name: name.into(),
            nodes,
            learning_nodes: Vec::new(),
            learning_enabled: false,
        }
    }

    /// Declare this pathway's learning chain and enable learning for it.
    ///
    /// `chain` lists learning components ordered from the error source
    /// outward: the objective (comparator) mechanism first, then each
    /// learning mechanism progressively further from the output.
    #[must_use]
    pub fn with_learning<I, N>(mut self, chain: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NodeId>,
    {
        self.learning_nodes = chain.into_iter().map(Into::into).collect();
        self.learning_enabled = !self.learning_nodes.is_empty();
        self
    }

    /// Disable learning while keeping the declared chain (mirrors toggling
    /// a pathway's learning off without tearing down its components).
    #[must_use]
    pub fn learning_disabled(mut self) -> Self {
        self.learning_enabled = false;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ordered mechanisms of the chain.
    #[must_use]
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// First mechanism in the chain; candidate system origin.
    #[must_use]
    pub fn first_node(&self) -> &NodeId {
        &self.nodes[0]
    }

    /// Last mechanism in the chain; candidate system terminal.
    #[must_use]
    pub fn last_node(&self) -> &NodeId {
        &self.nodes[self.nodes.len() - 1]
    }

    /// Whether `node` appears anywhere in the chain.
    #[must_use]
    pub fn contains(&self, node: &NodeId) -> bool {
        self.nodes.contains(node)
    }

    /// The declared learning chain (error source first). Empty when no
    /// learning was declared.
    #[must_use]
    pub fn learning_nodes(&self) -> &[NodeId] {
        &self.learning_nodes
    }

    /// The learning component the learning-graph traversal seeds from.
    #[must_use]
    pub fn learning_seed(&self) -> Option<&NodeId> {
        self.learning_nodes.first()
    }

    #[must_use]
    pub fn learning_enabled(&self) -> bool {
        self.learning_enabled
    }
}
