//! Property tests for node identity, deltas, cascades and debouncing.

use codesage_graph::incremental::ChangeTracker;
use codesage_graph::model::{FunctionNode, NodeKind};
use codesage_graph::{create_node_id, ChangeType, Edge, EdgeType, Graph, GraphDelta, Node, NodeType};
use proptest::prelude::*;
use std::path::PathBuf;
use std::time::Duration;

fn function(index: usize, complexity: i64) -> Node {
    let name = format!("f{index}");
    Node::from_kind(
        NodeKind::Function(FunctionNode::new(name.clone(), name, 1, 2).with_complexity(complexity)),
        Some("p.py"),
    )
}

fn edge_type() -> impl Strategy<Value = EdgeType> {
    prop::sample::select(EdgeType::ALL.to_vec())
}

/// Up to 12 functions with random complexity and up to 30 random edges.
fn graph() -> impl Strategy<Value = Graph> {
    (
        prop::collection::vec(0i64..20, 1..12),
        prop::collection::vec((any::<prop::sample::Index>(), any::<prop::sample::Index>(), edge_type()), 0..30),
    )
        .prop_map(|(complexities, edges)| {
            let mut graph = Graph::new();
            let nodes: Vec<Node> = complexities
                .iter()
                .enumerate()
                .map(|(i, c)| function(i, *c))
                .collect();
            for node in &nodes {
                graph.add_node(node.clone());
            }
            for (from, to, edge_type) in edges {
                let (from, to) = (from.get(&nodes), to.get(&nodes));
                graph
                    .add_edge(Edge::of_type(from.id.clone(), to.id.clone(), edge_type))
                    .unwrap();
            }
            graph
        })
}

fn change_type() -> impl Strategy<Value = ChangeType> {
    prop_oneof![
        Just(ChangeType::Create),
        Just(ChangeType::Modify),
        Just(ChangeType::Delete),
    ]
}

proptest! {
    #[test]
    fn prop_node_id_is_deterministic_and_typed(
        name in "[a-zA-Z_][a-zA-Z0-9_.]{0,300}",
        path in prop::option::of("[a-z/]{1,40}\\.py"),
    ) {
        let a = create_node_id(NodeType::Function, &name, path.as_deref());
        let b = create_node_id(NodeType::Function, &name, path.as_deref());
        prop_assert_eq!(&a, &b);
        prop_assert!(a.starts_with("function:"));
        prop_assert!(a.chars().count() <= "function:".len() + 200);
        prop_assert_ne!(a, create_node_id(NodeType::Class, &name, path.as_deref()));
    }

    #[test]
    fn prop_delta_between_reproduces_target(old in graph(), new in graph()) {
        let delta = GraphDelta::between(&old, &new);
        let mut patched = old.clone();
        delta.apply_to(&mut patched);

        prop_assert_eq!(patched.node_ids(), new.node_ids());
        prop_assert_eq!(patched.edge_keys(), new.edge_keys());
        for node in new.nodes() {
            prop_assert!(patched.get_node(&node.id).unwrap().same_content(node));
        }
    }

    #[test]
    fn prop_delta_of_identical_graphs_is_empty(g in graph()) {
        prop_assert!(GraphDelta::between(&g, &g).is_empty());
    }

    #[test]
    fn prop_removing_a_node_cascades_its_edges(mut g in graph(), pick in any::<prop::sample::Index>()) {
        let ids: Vec<String> = g.nodes().map(|n| n.id.clone()).collect();
        let victim = pick.get(&ids).clone();
        let untouched = g
            .edges()
            .filter(|e| e.source != victim && e.target != victim)
            .count();

        g.remove_node(&victim);
        prop_assert!(g.edges().all(|e| e.source != victim && e.target != victim));
        prop_assert_eq!(g.edge_count(), untouched);
    }

    #[test]
    fn prop_events_in_window_merge_to_one_change(first in change_type(), rest in prop::collection::vec(change_type(), 0..10)) {
        let tracker = ChangeTracker::new(Duration::from_secs(60), 16);
        let path = PathBuf::from("same.py");
        tracker.record(path.clone(), first);
        for change in &rest {
            tracker.record(path.clone(), *change);
        }

        let expected = rest.iter().fold(first, |merged, later| merged.merge(*later));
        prop_assert_eq!(tracker.queue_len(), 1);
        prop_assert_eq!(tracker.pending_change(&path), Some(expected));
        if rest.contains(&ChangeType::Delete) || first == ChangeType::Delete {
            prop_assert_eq!(expected, ChangeType::Delete);
        }
    }

    #[test]
    fn prop_graph_json_round_trip(g in graph()) {
        let back = Graph::from_json(&g.to_json().unwrap()).unwrap();
        prop_assert_eq!(back.node_ids(), g.node_ids());
        prop_assert_eq!(back.edge_keys(), g.edge_keys());
    }
}
