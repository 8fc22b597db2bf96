//! Black-box scenario tests against the public API, covering the concrete
//! scenarios worked out by hand: trivial chains, symmetric and asymmetric
//! diamonds, nested diamonds, irrelevant sources, and interval uncertainty.

use std::collections::BTreeMap;

use diamond_reach::{reachability, Config, NodeId, Probability, UncertaintyMode};
use pretty_assertions::assert_eq;

fn scalars(pairs: &[(NodeId, f64)]) -> BTreeMap<NodeId, Probability> {
    pairs
        .iter()
        .map(|&(n, v)| (n, Probability::scalar(v).unwrap()))
        .collect()
}

fn uniform_edges(
    edges: &[(NodeId, NodeId)],
    value: f64,
) -> BTreeMap<(NodeId, NodeId), Probability> {
    edges
        .iter()
        .map(|&e| (e, Probability::scalar(value).unwrap()))
        .collect()
}

fn scalar(p: &Probability) -> f64 {
    match p {
        Probability::Scalar(v) => *v,
        other => panic!("expected scalar, got {other:?}"),
    }
}

#[test]
fn s1_trivial_chain() {
    let edges = [(1, 2), (2, 3)];
    let node_priors = scalars(&[(1, 1.0), (2, 1.0), (3, 1.0)]);
    let edge_probs = uniform_edges(&edges, 0.5);

    let beliefs = reachability(edges, node_priors, edge_probs, &Config::default(), None).unwrap();

    assert_eq!(scalar(&beliefs[&1]), 1.0);
    assert_eq!(scalar(&beliefs[&2]), 0.5);
    assert_eq!(scalar(&beliefs[&3]), 0.25);
}

#[test]
fn s2_symmetric_diamond() {
    let edges = [(1, 2), (1, 3), (2, 4), (3, 4)];
    let node_priors = scalars(&[(1, 1.0), (2, 1.0), (3, 1.0), (4, 1.0)]);
    let edge_probs = uniform_edges(&edges, 0.5);

    let beliefs = reachability(edges, node_priors, edge_probs, &Config::default(), None).unwrap();

    assert!((scalar(&beliefs[&4]) - 0.4375).abs() < 1e-12);
}

#[test]
fn s3_asymmetric_diamond() {
    let edges = [(1, 2), (1, 3), (2, 4), (3, 4)];
    let node_priors = scalars(&[(1, 1.0), (2, 1.0), (3, 1.0), (4, 1.0)]);
    let edge_probs: BTreeMap<(NodeId, NodeId), Probability> = [
        ((1, 2), Probability::scalar(0.9).unwrap()),
        ((1, 3), Probability::scalar(0.3).unwrap()),
        ((2, 4), Probability::scalar(0.8).unwrap()),
        ((3, 4), Probability::scalar(0.8).unwrap()),
    ]
    .into_iter()
    .collect();

    let beliefs = reachability(edges, node_priors, edge_probs, &Config::default(), None).unwrap();

    assert!((scalar(&beliefs[&4]) - 0.7872).abs() < 1e-9);
}

#[test]
fn s4_nested_diamond() {
    // 1 -> {2,3} -> 4 -> {5,6} -> 7
    let edges = [
        (1, 2),
        (1, 3),
        (2, 4),
        (3, 4),
        (4, 5),
        (4, 6),
        (5, 7),
        (6, 7),
    ];
    let node_priors = scalars(&[
        (1, 1.0),
        (2, 1.0),
        (3, 1.0),
        (4, 1.0),
        (5, 1.0),
        (6, 1.0),
        (7, 1.0),
    ]);
    let edge_probs = uniform_edges(&edges, 0.9);

    let beliefs = reachability(edges, node_priors, edge_probs, &Config::default(), None).unwrap();

    // Independently-derived oracle: with node 1 deterministic (prior 1.0),
    // each stage's fan-in reduces to inclusion-exclusion of two equal,
    // independent terms.
    let ie = |a: f64, b: f64| a + b - a * b;
    let b2 = 0.9;
    let b3 = 0.9;
    let b4 = ie(b2 * 0.9, b3 * 0.9);
    let b5 = b4 * 0.9;
    let b6 = b4 * 0.9;
    let b7 = ie(b5 * 0.9, b6 * 0.9);

    assert!((scalar(&beliefs[&4]) - b4).abs() < 1e-12);
    assert!((scalar(&beliefs[&7]) - b7).abs() < 1e-12);
}

#[test]
fn s5_irrelevant_source_matches_fused_graph() {
    // 0 -> 1, 0 -> 2, 1 -> 3, 2 -> 3: node 0 is a constant (prior 1.0, all
    // outgoing edges 1.0) and must behave exactly as if fused into 1 and 2.
    let edges = [(0, 1), (0, 2), (1, 3), (2, 3)];
    let node_priors = scalars(&[(0, 1.0), (1, 0.6), (2, 0.4), (3, 1.0)]);
    let edge_probs: BTreeMap<(NodeId, NodeId), Probability> = [
        ((0, 1), Probability::scalar(1.0).unwrap()),
        ((0, 2), Probability::scalar(1.0).unwrap()),
        ((1, 3), Probability::scalar(0.7).unwrap()),
        ((2, 3), Probability::scalar(0.8).unwrap()),
    ]
    .into_iter()
    .collect();
    let with_source = reachability(edges, node_priors, edge_probs, &Config::default(), None).unwrap();

    // The fused graph: 1 and 2 are sources directly, same priors/edges to 3.
    let fused_edges = [(1, 3), (2, 3)];
    let fused_priors = scalars(&[(1, 0.6), (2, 0.4), (3, 1.0)]);
    let fused_edge_probs: BTreeMap<(NodeId, NodeId), Probability> = [
        ((1, 3), Probability::scalar(0.7).unwrap()),
        ((2, 3), Probability::scalar(0.8).unwrap()),
    ]
    .into_iter()
    .collect();
    let fused = reachability(
        fused_edges,
        fused_priors,
        fused_edge_probs,
        &Config::default(),
        None,
    )
    .unwrap();

    assert_eq!(scalar(&with_source[&1]), scalar(&fused[&1]));
    assert_eq!(scalar(&with_source[&2]), scalar(&fused[&2]));
    assert!((scalar(&with_source[&3]) - scalar(&fused[&3])).abs() < 1e-12);
}

#[test]
fn s6_interval_uncertainty() {
    let edges = [(1, 2), (2, 3)];
    let node_priors: BTreeMap<NodeId, Probability> = [
        (1, Probability::interval(1.0, 1.0).unwrap()),
        (2, Probability::interval(1.0, 1.0).unwrap()),
        (3, Probability::interval(1.0, 1.0).unwrap()),
    ]
    .into_iter()
    .collect();
    let edge_probs: BTreeMap<(NodeId, NodeId), Probability> = [
        ((1, 2), Probability::interval(0.4, 0.6).unwrap()),
        ((2, 3), Probability::interval(0.4, 0.6).unwrap()),
    ]
    .into_iter()
    .collect();

    let config = Config {
        uncertainty_mode: UncertaintyMode::Interval,
        ..Config::default()
    };
    let beliefs = reachability(edges, node_priors, edge_probs, &config, None).unwrap();

    assert_eq!(beliefs[&3], Probability::Interval(0.16, 0.36));
}
