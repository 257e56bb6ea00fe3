//! Cross-module topology properties: layering, cycle breaking, and
//! deterministic compilation over generated graphs.

use neurograph::graphs::SystemBuilder;
use neurograph::pathway::Pathway;
use neurograph::system::System;
use neurograph::types::{NodeId, Role};
use neurograph::utils::testing::identity;
use proptest::prelude::*;

/// A chain n0 -> n1 -> ... plus one explicit feedback edge.
fn chain_with_feedback(len: usize, from: usize, to: usize) -> System {
    let names: Vec<String> = (0..len).map(|i| format!("n{i}")).collect();
    let mut builder = SystemBuilder::new("feedback");
    for name in &names {
        builder = builder.add_processing(name.as_str(), vec![1], 1, identity());
    }
    builder
        .add_pathway(Pathway::new("main", names.iter().map(String::as_str)))
        .connect((names[from].as_str(), 0), (names[to].as_str(), 0))
        .compile()
        .expect("feedback chain compiles")
}

#[test]
fn bypass_edge_orders_the_receiver_after_both_senders() {
    let system = SystemBuilder::new("bypass")
        .add_processing("a", vec![1], 1, identity())
        .add_processing("b", vec![1], 1, identity())
        .add_processing("c", vec![1], 1, identity())
        .add_pathway(Pathway::new("main", ["a", "b", "c"]))
        .connect(("a", 0), ("c", 0))
        .compile()
        .expect("compiles");

    assert_eq!(
        system.execution_sets(),
        &[
            vec![NodeId::from("a")],
            vec![NodeId::from("b")],
            vec![NodeId::from("c")],
        ]
    );
    assert!(system.processing_layout().broken_edges.is_empty());
}

#[test]
fn pathways_are_layered_together() {
    let system = SystemBuilder::new("parallel")
        .add_processing("a", vec![1], 1, identity())
        .add_processing("b", vec![1], 1, identity())
        .add_processing("x", vec![1], 1, identity())
        .add_processing("y", vec![1], 1, identity())
        .add_pathway(Pathway::new("one", ["a", "b"]))
        .add_pathway(Pathway::new("two", ["x", "y"]))
        .compile()
        .expect("compiles");

    assert_eq!(
        system.execution_sets(),
        &[
            vec![NodeId::from("a"), NodeId::from("x")],
            vec![NodeId::from("b"), NodeId::from("y")],
        ]
    );
    assert_eq!(
        system.origin_nodes(),
        &[NodeId::from("a"), NodeId::from("x")]
    );
    assert_eq!(
        system.terminal_nodes(),
        &[NodeId::from("b"), NodeId::from("y")]
    );
}

/// Two pathways sharing a two-node prefix fan out into two terminals.
#[test]
fn branching_pathways_share_a_prefix_and_fan_out() {
    let system = SystemBuilder::new("branch")
        .add_processing("a", vec![1], 1, identity())
        .add_processing("b", vec![1], 1, identity())
        .add_processing("c", vec![1], 1, identity())
        .add_processing("d", vec![1], 1, identity())
        .add_pathway(Pathway::new("upper", ["a", "b", "c"]))
        .add_pathway(Pathway::new("lower", ["a", "b", "d"]))
        .compile()
        .expect("compiles");

    assert_eq!(system.origin_nodes(), &[NodeId::from("a")]);
    assert_eq!(
        system.terminal_nodes(),
        &[NodeId::from("c"), NodeId::from("d")]
    );
    assert_eq!(system.roles_for(&NodeId::from("b")), Some(Role::Internal));
    assert_eq!(
        system.execution_sets(),
        &[
            vec![NodeId::from("a")],
            vec![NodeId::from("b")],
            vec![NodeId::from("c"), NodeId::from("d")],
        ]
    );
}

/// Pathways joined end to start form one long chain; the joint node enters
/// a second pathway first but is fed from the first pathway, so it is
/// internal rather than a second origin.
#[test]
fn chained_pathways_form_one_long_chain() {
    let system = SystemBuilder::new("chained")
        .add_processing("a", vec![1], 1, identity())
        .add_processing("b", vec![1], 1, identity())
        .add_processing("c", vec![1], 1, identity())
        .add_processing("d", vec![1], 1, identity())
        .add_processing("e", vec![1], 1, identity())
        .add_pathway(Pathway::new("front", ["a", "b", "c"]))
        .add_pathway(Pathway::new("back", ["c", "d", "e"]))
        .compile()
        .expect("compiles");

    assert_eq!(system.origin_nodes(), &[NodeId::from("a")]);
    assert_eq!(system.terminal_nodes(), &[NodeId::from("e")]);
    assert_eq!(system.roles_for(&NodeId::from("c")), Some(Role::Internal));
    assert_eq!(system.roles_for(&NodeId::from("d")), Some(Role::Internal));
    let expected: Vec<NodeId> = ["a", "b", "c", "d", "e"].map(NodeId::from).to_vec();
    assert_eq!(system.execution_list(), expected.as_slice());
}

/// A cycle edge reachable through two pathways is still one broken edge
/// and one seeded sender.
#[test]
fn re_offered_cycle_edge_is_recorded_once() {
    let system = SystemBuilder::new("relisted")
        .add_processing("a", vec![1], 1, identity())
        .add_processing("b", vec![1], 1, identity())
        .add_pathway(Pathway::new("one", ["a", "b"]))
        .add_pathway(Pathway::new("two", ["b"]))
        .connect(("b", 0), ("a", 0))
        .compile()
        .expect("compiles");

    assert_eq!(
        system.processing_layout().broken_edges,
        vec![(NodeId::from("b"), NodeId::from("a"))]
    );
    assert_eq!(system.recurrent_init_nodes(), &[NodeId::from("b")]);
}

#[test]
fn convergent_pathways_share_one_terminal() {
    let system = SystemBuilder::new("convergent")
        .add_processing("a", vec![1], 1, identity())
        .add_processing("b", vec![1], 1, identity())
        .add_processing("c", vec![1], 1, identity())
        .add_processing("d", vec![1], 1, identity())
        .add_processing("e", vec![1], 1, identity())
        .add_pathway(Pathway::new("left", ["a", "b", "e"]))
        .add_pathway(Pathway::new("right", ["c", "d", "e"]))
        .compile()
        .expect("compiles");

    assert_eq!(system.origin_nodes(), &[NodeId::from("a"), NodeId::from("c")]);
    assert_eq!(system.terminal_nodes(), &[NodeId::from("e")]);
    assert_eq!(system.roles_for(&NodeId::from("b")), Some(Role::Internal));
    assert_eq!(system.roles_for(&NodeId::from("d")), Some(Role::Internal));
}

fn feedback_topologies() -> impl Strategy<Value = (usize, usize, usize)> {
    (2usize..8)
        .prop_flat_map(|len| (Just(len), 0..len - 1))
        .prop_flat_map(|(len, to)| (Just(len), to + 1..len, Just(to)))
}

proptest! {
    /// Exactly the feedback edge is broken, the chain keeps its order,
    /// and both endpoints carry cycle roles.
    #[test]
    fn one_feedback_edge_breaks_exactly_one_dependency((len, from, to) in feedback_topologies()) {
        let system = chain_with_feedback(len, from, to);

        let expected: Vec<NodeId> = (0..len).map(|i| NodeId::from(format!("n{i}"))).collect();
        prop_assert_eq!(system.execution_list(), expected.as_slice());

        let sender = NodeId::from(format!("n{from}"));
        let receiver = NodeId::from(format!("n{to}"));
        prop_assert_eq!(
            system.processing_layout().broken_edges.as_slice(),
            &[(sender.clone(), receiver.clone())]
        );
        prop_assert_eq!(system.recurrent_init_nodes(), &[sender.clone()]);

        prop_assert_eq!(system.roles_for(&sender), Some(Role::InitializeCycle));
        let receiver_role = if to == 0 { Role::Origin } else { Role::Cycle };
        prop_assert_eq!(system.roles_for(&receiver), Some(receiver_role));
    }

    /// Compiling the same topology twice yields identical layouts.
    #[test]
    fn compilation_is_deterministic((len, from, to) in feedback_topologies()) {
        let first = chain_with_feedback(len, from, to);
        let second = chain_with_feedback(len, from, to);

        prop_assert_eq!(first.execution_sets(), second.execution_sets());
        prop_assert_eq!(
            &first.processing_layout().broken_edges,
            &second.processing_layout().broken_edges
        );
        for node in first.execution_list() {
            prop_assert_eq!(first.roles_for(node), second.roles_for(node));
        }
    }
}
