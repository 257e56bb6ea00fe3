use rustc_hash::FxHashMap;

use crate::pathway::Pathway;
use crate::projection::{ProjectionKind, ReceiverPort, SenderPort};
use crate::system::System;
use crate::types::{NodeId, Role};
use crate::utils::testing::{comparator, delta_rule, doubler, identity};

use super::builder::{GraphBuildError, SystemBuilder};

fn node(name: &str) -> NodeId {
    NodeId::from(name)
}

fn chain_system(names: &[&str]) -> System {
    let mut builder = SystemBuilder::new("chain");
    for name in names {
        builder = builder.add_processing(*name, vec![1], 1, doubler());
    }
    builder
        .add_pathway(Pathway::new("main", names.iter().copied()))
        .compile()
        .unwrap()
}

#[test]
fn linear_chain_roles_and_sets() {
    let system = chain_system(&["a", "b", "c"]);
    assert_eq!(system.roles_for(&node("a")), Some(Role::Origin));
    assert_eq!(system.roles_for(&node("b")), Some(Role::Internal));
    assert_eq!(system.roles_for(&node("c")), Some(Role::Terminal));
    assert_eq!(
        system.execution_sets(),
        &[vec![node("a")], vec![node("b")], vec![node("c")]]
    );
    assert!(system.processing_layout().broken_edges.is_empty());
}

#[test]
fn branching_pathways_share_an_internal_node() {
    let system = SystemBuilder::new("branch")
        .add_processing("a", vec![1], 1, doubler())
        .add_processing("b", vec![1], 1, doubler())
        .add_processing("c", vec![1], 1, doubler())
        .add_processing("d", vec![1], 1, doubler())
        .add_processing("e", vec![1], 1, doubler())
        .add_pathway(Pathway::new("p1", ["a", "b", "c"]))
        .add_pathway(Pathway::new("p2", ["d", "b", "e"]))
        .compile()
        .unwrap();

    assert_eq!(system.origin_nodes(), &[node("a"), node("d")]);
    assert_eq!(system.terminal_nodes(), &[node("c"), node("e")]);
    assert_eq!(system.roles_for(&node("b")), Some(Role::Internal));
    // b waits for both origins; c and e wait for b.
    assert_eq!(system.execution_sets()[0], vec![node("a"), node("d")]);
    assert_eq!(system.execution_sets()[1], vec![node("b")]);
    assert_eq!(system.execution_sets()[2], vec![node("c"), node("e")]);
}

#[test]
fn feedback_edge_is_broken_out_of_the_execution_graph() {
    let system = SystemBuilder::new("loop")
        .add_processing("a", vec![1], 1, doubler())
        .add_processing("b", vec![1], 1, doubler())
        .add_pathway(Pathway::new("main", ["a", "b"]))
        .connect(("b", 0), ("a", 0))
        .compile()
        .unwrap();

    let layout = system.processing_layout();
    assert_eq!(layout.broken_edges, vec![(node("b"), node("a"))]);
    // The full graph keeps the cycle; the execution graph does not.
    assert!(layout.full_graph[&node("a")].contains(&node("b")));
    assert!(!layout.execution_graph[&node("a")].contains(&node("b")));
    assert_eq!(system.roles_for(&node("a")), Some(Role::Origin));
    assert_eq!(system.roles_for(&node("b")), Some(Role::InitializeCycle));
    assert_eq!(system.recurrent_init_nodes(), &[node("b")]);
}

#[test]
fn mid_chain_cycle_marks_both_endpoints() {
    let system = SystemBuilder::new("loop")
        .add_processing("a", vec![1], 1, doubler())
        .add_processing("b", vec![1], 1, doubler())
        .add_processing("c", vec![1], 1, doubler())
        .add_pathway(Pathway::new("main", ["a", "b", "c"]))
        .connect(("c", 0), ("b", 0))
        .compile()
        .unwrap();

    assert_eq!(system.roles_for(&node("b")), Some(Role::Cycle));
    assert_eq!(system.roles_for(&node("c")), Some(Role::InitializeCycle));
    assert_eq!(
        system.processing_layout().broken_edges,
        vec![(node("c"), node("b"))]
    );
    assert_eq!(
        system.execution_sets(),
        &[vec![node("a")], vec![node("b")], vec![node("c")]]
    );
}

#[test]
fn self_projection_makes_a_singleton() {
    let system = SystemBuilder::new("self")
        .add_processing("a", vec![1], 1, doubler())
        .add_pathway(Pathway::new("main", ["a"]))
        .connect(("a", 0), ("a", 0))
        .compile()
        .unwrap();

    assert_eq!(system.roles_for(&node("a")), Some(Role::Singleton));
    assert_eq!(system.origin_nodes(), &[node("a")]);
    assert_eq!(system.terminal_nodes(), &[node("a")]);
}

#[test]
fn entry_node_fed_by_another_pathway_is_not_an_origin() {
    let system = SystemBuilder::new("feed")
        .add_processing("a", vec![1], 1, doubler())
        .add_processing("b", vec![1], 1, doubler())
        .add_processing("c", vec![1], 1, doubler())
        .add_pathway(Pathway::new("p1", ["a", "b"]))
        .add_pathway(Pathway::new("p2", ["c", "a"]))
        .compile()
        .unwrap();

    assert_eq!(system.origin_nodes(), &[node("c")]);
    assert_ne!(system.roles_for(&node("a")), Some(Role::Origin));
}

#[test]
fn shared_entry_node_stays_an_origin() {
    // A node may open several pathways at once and still be the origin.
    let system = SystemBuilder::new("shared")
        .add_processing("a", vec![1], 1, doubler())
        .add_processing("b", vec![1], 1, doubler())
        .add_processing("c", vec![1], 1, doubler())
        .add_pathway(Pathway::new("p1", ["a", "b"]))
        .add_pathway(Pathway::new("p2", ["a", "c"]))
        .compile()
        .unwrap();

    assert_eq!(system.origin_nodes(), &[node("a")]);
    assert_eq!(system.terminal_nodes(), &[node("b"), node("c")]);
}

#[test]
fn compile_is_deterministic() {
    let build = || chain_system(&["m", "a", "z"]);
    let first = build();
    let second = build();
    assert_eq!(first.execution_sets(), second.execution_sets());
    assert_eq!(first.origin_nodes(), second.origin_nodes());
    assert_eq!(
        first.processing_layout().execution_list,
        second.processing_layout().execution_list
    );
}

#[test]
fn empty_system_is_rejected() {
    let err = SystemBuilder::new("empty").compile().unwrap_err();
    assert!(matches!(err, GraphBuildError::EmptySystem { .. }));
}

#[test]
fn duplicate_node_is_rejected() {
    let err = SystemBuilder::new("dup")
        .add_processing("a", vec![1], 1, doubler())
        .add_processing("a", vec![1], 1, doubler())
        .add_pathway(Pathway::new("main", ["a"]))
        .compile()
        .unwrap_err();
    assert!(matches!(err, GraphBuildError::DuplicateNode { node } if node == "a"));
}

#[test]
fn pathway_with_unregistered_node_is_rejected() {
    let err = SystemBuilder::new("missing")
        .add_processing("a", vec![1], 1, doubler())
        .add_pathway(Pathway::new("main", ["a", "ghost"]))
        .compile()
        .unwrap_err();
    assert!(matches!(err, GraphBuildError::UnknownNode { node } if node == "ghost"));
}

#[test]
fn node_fed_only_from_outside_any_pathway_is_rejected() {
    let err = SystemBuilder::new("dangling")
        .add_processing("ghost", vec![1], 1, doubler())
        .add_processing("x", vec![1], 1, doubler())
        .add_pathway(Pathway::new("main", ["x"]))
        .connect(("ghost", 0), ("x", 0))
        .compile()
        .unwrap_err();
    assert!(matches!(err, GraphBuildError::OrphanedNode { node, .. } if node == "x"));
}

#[test]
fn pathwayless_feeder_is_pruned_when_a_pathway_anchor_exists() {
    let system = SystemBuilder::new("pruned")
        .add_processing("ghost", vec![1], 1, doubler())
        .add_processing("a", vec![1], 1, doubler())
        .add_processing("b", vec![1], 1, doubler())
        .add_pathway(Pathway::new("main", ["a", "b"]))
        .connect(("ghost", 0), ("b", 0))
        .compile()
        .expect("compiles");

    assert_eq!(system.roles_for(&node("ghost")), None);
    assert_eq!(system.processing_layout().execution_list, vec![
        node("a"),
        node("b")
    ]);
}

#[test]
fn out_of_range_port_is_rejected() {
    let err = SystemBuilder::new("port")
        .add_processing("a", vec![1], 1, doubler())
        .add_processing("b", vec![1], 1, doubler())
        .add_pathway(Pathway::new("main", ["a", "b"]))
        .connect(("a", 3), ("b", 0))
        .compile()
        .unwrap_err();
    assert!(matches!(
        err,
        GraphBuildError::PortOutOfRange { node, port: 3, .. } if node == "a"
    ));
}

#[test]
fn initial_value_arity_is_validated() {
    let err = SystemBuilder::new("init")
        .add_processing("a", vec![1], 1, doubler())
        .add_processing("b", vec![1], 1, doubler())
        .add_pathway(Pathway::new("main", ["a", "b"]))
        .with_initial_value("b", vec![vec![0.0], vec![0.0]])
        .compile()
        .unwrap_err();
    assert!(matches!(err, GraphBuildError::InvalidInitialValue { .. }));
}

fn learning_chain() -> SystemBuilder {
    SystemBuilder::new("learn")
        .add_processing("a", vec![1], 1, doubler())
        .add_processing("b", vec![1], 1, doubler())
        .add_processing("c", vec![1], 1, doubler())
        .add_objective("obj", 1, comparator())
        .add_learning("l_bc", 1, 1, delta_rule(0.1))
        .add_learning("l_ab", 1, 1, delta_rule(0.1))
        .add_pathway(
            Pathway::new("main", ["a", "b", "c"]).with_learning(["obj", "l_bc", "l_ab"]),
        )
}

#[test]
fn learning_chain_builds_a_backwards_graph() {
    let system = learning_chain().compile().unwrap();
    let layout = system.learning_layout().expect("learning layout");

    assert_eq!(
        layout.learning_execution_list,
        vec![node("obj"), node("l_bc"), node("l_ab")]
    );
    assert_eq!(system.target_nodes(), &[node("obj")]);
    for learner in ["obj", "l_bc", "l_ab"] {
        assert_eq!(system.roles_for(&node(learner)), Some(Role::Learning));
    }

    // Each learner ends in a weight-update edge onto its trained projection.
    for (learner, from, to) in [("l_bc", "b", "c"), ("l_ab", "a", "b")] {
        let trained = system
            .projections()
            .iter()
            .position(|p| {
                p.kind == ProjectionKind::Pathway
                    && p.sender.node() == Some(&node(from))
                    && p.receiver.node() == Some(&node(to))
            })
            .unwrap();
        assert!(system.projections().iter().any(|p| {
            p.kind == ProjectionKind::Learning
                && p.sender.node() == Some(&node(learner))
                && matches!(
                    &p.receiver,
                    ReceiverPort::ProjectionWeight { projection } if projection.0 == trained
                )
        }));
    }
}

#[test]
fn target_slots_follow_surviving_objectives() {
    let system = learning_chain().compile().unwrap();
    assert_eq!(system.system_target_slots(), &[node("obj")]);
    let pid = system.system_target_projections()[0];
    let projection = system.projection(pid).unwrap();
    assert_eq!(projection.kind, ProjectionKind::SystemTarget);
    assert!(matches!(
        &projection.receiver,
        ReceiverPort::NodeInput { node, port: 1 } if node == &NodeId::from("obj")
    ));
}

#[test]
fn internal_convergence_elides_the_second_objective() {
    let system = SystemBuilder::new("converge")
        .add_processing("a", vec![1], 1, doubler())
        .add_processing("b", vec![1], 1, doubler())
        .add_processing("c", vec![1], 1, doubler())
        .add_processing("d", vec![1], 1, doubler())
        .add_objective("obj1", 1, comparator())
        .add_objective("obj2", 1, comparator())
        .add_learning("l_bc", 1, 1, delta_rule(0.1))
        .add_learning("l_ab", 1, 1, delta_rule(0.1))
        .add_learning("l_db", 1, 1, delta_rule(0.1))
        .add_pathway(
            Pathway::new("p1", ["a", "b", "c"]).with_learning(["obj1", "l_bc", "l_ab"]),
        )
        .add_pathway(Pathway::new("p2", ["d", "b"]).with_learning(["obj2", "l_db"]))
        .compile()
        .unwrap();

    let layout = system.learning_layout().expect("learning layout");

    // obj2 samples b, an internal node, so it is replaced by l_bc.
    assert!(!layout.learning_nodes.contains(&node("obj2")));
    assert_eq!(system.target_nodes(), &[node("obj1")]);
    assert!(layout.learning_graph[&node("l_db")].contains(&node("l_bc")));

    // The substitute error-signal projection was created...
    assert!(system.projections().iter().any(|p| {
        p.kind == ProjectionKind::Learning
            && p.sender == SenderPort::NodeOutput { node: node("l_bc"), port: 1 }
            && matches!(
                &p.receiver,
                ReceiverPort::NodeInput { node, port: 1 } if node == &NodeId::from("l_db")
            )
    }));

    // ...and l_db now trains against the downstream b->c projection.
    let trained = system.error_matrix().unwrap()[&node("l_db")];
    let projection = system.projection(trained).unwrap();
    assert_eq!(projection.sender.node(), Some(&node("b")));
    assert_eq!(projection.receiver.node(), Some(&node("c")));
}

#[test]
fn learning_chain_with_non_objective_head_is_rejected() {
    let err = SystemBuilder::new("bad")
        .add_processing("a", vec![1], 1, doubler())
        .add_processing("b", vec![1], 1, doubler())
        .add_learning("l", 1, 1, delta_rule(0.1))
        .add_objective("obj", 1, comparator())
        .add_pathway(Pathway::new("main", ["a", "b"]).with_learning(["l", "obj"]))
        .compile()
        .unwrap_err();
    assert!(matches!(err, GraphBuildError::ObjectiveWithoutLearner { .. }));
}

#[test]
fn roles_are_queryable_in_both_directions() {
    let system = chain_system(&["a", "b"]);
    assert_eq!(system.nodes_with_role(Role::Origin), vec![node("a")]);
    assert_eq!(system.nodes_with_role(Role::Terminal), vec![node("b")]);
    assert!(system.nodes_with_role(Role::Cycle).is_empty());
    assert_eq!(system.roles_for(&node("ghost")), None);
}

#[test]
fn monitoring_nodes_stay_out_of_the_processing_graph() {
    let system = learning_chain().compile().unwrap();
    for learner in ["obj", "l_bc", "l_ab"] {
        assert!(!system.execution_list().contains(&node(learner)));
    }
    // c keeps its terminal role even though it projects to the objective.
    assert_eq!(system.roles_for(&node("c")), Some(Role::Terminal));
}

#[test]
fn initial_values_recorded_for_recurrent_senders() {
    let system = SystemBuilder::new("seeded")
        .add_processing("a", vec![1], 1, identity())
        .add_processing("b", vec![1], 1, identity())
        .add_pathway(Pathway::new("main", ["a", "b"]))
        .connect(("b", 0), ("a", 0))
        .with_initial_value("b", vec![vec![7.0]])
        .compile()
        .unwrap();
    let values: &FxHashMap<_, _> = system.initial_values();
    assert_eq!(values[&node("b")], vec![vec![7.0]]);
}
