// tests/scheduler_properties.rs
//
// Stage assignment over random acyclic graphs.

use std::collections::HashMap;

use proptest::prelude::*;

use emk::dag::{check_acyclic, compute_stages, transitive_reduction, Edges, NodeId};
use emk::errors::EmkError;

fn id(i: usize) -> NodeId {
    NodeId::from(format!("n{i:02}").as_str())
}

/// Edges only point from a higher index to a lower one, so the graph is
/// acyclic by construction.
fn acyclic_edges() -> impl Strategy<Value = Edges> {
    (1usize..24).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<bool>(), n), n).prop_map(
            move |matrix| {
                let mut edges = Edges::new();
                for (i, row) in matrix.iter().enumerate() {
                    let deps: Vec<NodeId> = row
                        .iter()
                        .enumerate()
                        .filter(|&(j, &on)| on && j < i)
                        .map(|(j, _)| id(j))
                        .collect();
                    edges.insert(id(i), deps);
                }
                edges
            },
        )
    })
}

fn ranks(stages: &[Vec<NodeId>]) -> HashMap<NodeId, usize> {
    let mut out = HashMap::new();
    for (rank, stage) in stages.iter().enumerate() {
        for node in stage {
            assert!(
                out.insert(node.clone(), rank).is_none(),
                "{node} appears in two stages"
            );
        }
    }
    out
}

proptest! {
    #[test]
    fn every_node_lands_in_exactly_one_stage(edges in acyclic_edges()) {
        let stages = compute_stages(&edges).unwrap();
        let rank = ranks(&stages);
        prop_assert_eq!(rank.len(), edges.len());
        prop_assert!(stages.iter().all(|s| !s.is_empty()));
    }

    #[test]
    fn dependencies_run_in_earlier_stages(edges in acyclic_edges()) {
        let stages = compute_stages(&edges).unwrap();
        let rank = ranks(&stages);
        for (node, deps) in &edges {
            for dep in deps {
                prop_assert!(rank[dep] < rank[node], "{} not before {}", dep, node);
            }
        }
    }

    #[test]
    fn rank_is_the_longest_chain_below(edges in acyclic_edges()) {
        let stages = compute_stages(&edges).unwrap();
        let rank = ranks(&stages);
        for (node, deps) in &edges {
            let expected = deps.iter().map(|d| rank[d] + 1).max().unwrap_or(0);
            prop_assert_eq!(rank[node], expected);
        }
    }

    #[test]
    fn reduction_keeps_the_staging(edges in acyclic_edges()) {
        let reduced = transitive_reduction(&edges);
        prop_assert_eq!(compute_stages(&reduced).unwrap(), compute_stages(&edges).unwrap());
    }

    #[test]
    fn a_back_edge_is_always_a_cycle(edges in acyclic_edges()) {
        let mut edges = edges;
        let last = edges.len() - 1;
        // two-node loop, or a self-loop when there is only one node
        edges.entry(id(last)).or_default().push(id(0));
        edges.entry(id(0)).or_default().push(id(last));
        let cyclic = matches!(check_acyclic(&edges), Err(EmkError::CycleDetected { .. }));
        prop_assert!(cyclic, "expected CycleDetected");
        prop_assert!(compute_stages(&edges).is_err());
    }
}
