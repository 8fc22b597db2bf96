//! Exact probabilistic reachability and diamond-conditioned belief
//! propagation over directed acyclic graphs.
//!
//! Given a DAG whose nodes carry prior activation probabilities and whose
//! edges carry transmission probabilities, [`reachability`] computes the
//! exact marginal probability that each node becomes active, assuming
//! independent Bernoulli events throughout. The hard part — correctly
//! handling nodes reachable by more than one path from a common ancestor —
//! is handled by detecting "diamonds" and conditioning on their minimal
//! source sets rather than naively applying inclusion-exclusion across
//! dependent paths.

pub mod cancel;
pub mod diamond;
pub mod engine;
pub mod error;
pub mod graph;
pub mod probability;

use std::collections::BTreeMap;

pub use cancel::CancellationToken;
pub use error::{ReachabilityError, Result};
pub use graph::{Graph, NodeId};
pub use probability::{PBox, Probability, UncertaintyMode};

/// Options recognized by the core.
///
/// `path_reconstruction`, `max_paths`, and `tolerance` exist only so a
/// caller can build one `Config` and share it with the separable
/// critical-path/capacity subsystem; the reachability core accepts and
/// stores them but never reads them.
#[derive(Clone, Debug)]
pub struct Config {
    /// Chooses the `Probability` variant every input value must use.
    pub uncertainty_mode: UncertaintyMode,
    /// Raises the engine's own tracing events from `debug` to `trace`; has
    /// no semantic effect and installs no subscriber.
    pub verbose: bool,
    /// Critical-path subsystem only.
    pub path_reconstruction: PathReconstruction,
    /// Critical-path subsystem only.
    pub max_paths: usize,
    /// Critical-path subsystem only; the reachability core always uses
    /// exact comparisons.
    pub tolerance: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            uncertainty_mode: UncertaintyMode::Scalar,
            verbose: false,
            path_reconstruction: PathReconstruction::Optimal,
            max_paths: 1,
            tolerance: 1e-9,
        }
    }
}

/// Critical-path subsystem configuration; inert here, see [`Config`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathReconstruction {
    Optimal,
    Greedy,
    AllPaths,
}

/// Compute exact marginal activation beliefs for every node of a DAG.
///
/// `node_priors` and `edge_probs` must be total over the built graph's
/// nodes and edges respectively, and every value must match
/// `config.uncertainty_mode`; see [`validate_totality`].
pub fn reachability(
    edges: impl IntoIterator<Item = (NodeId, NodeId)>,
    node_priors: BTreeMap<NodeId, Probability>,
    edge_probs: BTreeMap<(NodeId, NodeId), Probability>,
    config: &Config,
    cancel: Option<&CancellationToken>,
) -> Result<BTreeMap<NodeId, Probability>> {
    let graph = Graph::build(edges)?;
    validate_totality(&graph, &node_priors, &edge_probs, config.uncertainty_mode)?;

    tracing::debug!(
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        "preprocessed graph"
    );

    let catalog = diamond::build(&graph, &node_priors, config.uncertainty_mode)?;
    tracing::debug!(diamonds = catalog.unique.len(), "diamond catalog built");

    let mut cache = engine::ConditioningCache::default();
    engine::compute_beliefs(
        &graph,
        &node_priors,
        &edge_probs,
        &catalog,
        config.uncertainty_mode,
        &mut cache,
        cancel,
    )
}

/// Verify the input bundle is total (every node has a prior, every edge has
/// a transmission probability) and mode-consistent, failing fast before any
/// propagation starts, per the boundary's "Structural" error policy.
pub fn validate_totality(
    graph: &Graph,
    node_priors: &BTreeMap<NodeId, Probability>,
    edge_probs: &BTreeMap<(NodeId, NodeId), Probability>,
    mode: UncertaintyMode,
) -> Result<()> {
    for &n in &graph.nodes {
        match node_priors.get(&n) {
            Some(p) if p.mode() == mode => {}
            Some(p) => {
                return Err(ReachabilityError::InvalidProbability {
                    where_: format!("node_prior[{n}]"),
                    value: format!("{p:?} does not match configured mode {mode:?}"),
                });
            }
            None => return Err(ReachabilityError::MissingPrior(n)),
        }
    }
    for &(u, v) in &graph.edges {
        match edge_probs.get(&(u, v)) {
            Some(p) if p.mode() == mode => {}
            Some(p) => {
                return Err(ReachabilityError::InvalidProbability {
                    where_: format!("edge_prob[({u}, {v})]"),
                    value: format!("{p:?} does not match configured mode {mode:?}"),
                });
            }
            None => return Err(ReachabilityError::MissingEdgeProbability(u, v)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scalars(pairs: &[(NodeId, f64)]) -> BTreeMap<NodeId, Probability> {
        pairs
            .iter()
            .map(|&(n, v)| (n, Probability::scalar(v).unwrap()))
            .collect()
    }

    #[test]
    fn trivial_chain_end_to_end() {
        let node_priors = scalars(&[(1, 1.0), (2, 1.0), (3, 1.0)]);
        let edge_probs: BTreeMap<(NodeId, NodeId), Probability> = [
            ((1, 2), Probability::scalar(0.5).unwrap()),
            ((2, 3), Probability::scalar(0.5).unwrap()),
        ]
        .into_iter()
        .collect();

        let beliefs = reachability(
            [(1, 2), (2, 3)],
            node_priors,
            edge_probs,
            &Config::default(),
            None,
        )
        .unwrap();

        assert_eq!(beliefs[&1], Probability::Scalar(1.0));
        assert_eq!(beliefs[&2], Probability::Scalar(0.5));
        assert_eq!(beliefs[&3], Probability::Scalar(0.25));
    }

    #[test]
    fn missing_prior_fails_fast() {
        let node_priors = scalars(&[(1, 1.0)]);
        let edge_probs: BTreeMap<(NodeId, NodeId), Probability> =
            [((1, 2), Probability::scalar(0.5).unwrap())].into_iter().collect();

        let err = reachability(
            [(1, 2)],
            node_priors,
            edge_probs,
            &Config::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ReachabilityError::MissingPrior(2)));
    }

    #[test]
    fn cyclic_graph_fails_fast() {
        let node_priors = scalars(&[(1, 1.0), (2, 1.0)]);
        let edge_probs: BTreeMap<(NodeId, NodeId), Probability> = [
            ((1, 2), Probability::scalar(0.5).unwrap()),
            ((2, 1), Probability::scalar(0.5).unwrap()),
        ]
        .into_iter()
        .collect();

        let err = reachability(
            [(1, 2), (2, 1)],
            node_priors,
            edge_probs,
            &Config::default(),
            None,
        )
        .unwrap_err();
        assert_eq!(err, ReachabilityError::CycleDetected);
    }

    #[test]
    fn cancellation_aborts_before_completion() {
        let node_priors = scalars(&[(1, 1.0), (2, 1.0)]);
        let edge_probs: BTreeMap<(NodeId, NodeId), Probability> =
            [((1, 2), Probability::scalar(0.5).unwrap())].into_iter().collect();

        let token = CancellationToken::new();
        token.cancel();

        let err = reachability(
            [(1, 2)],
            node_priors,
            edge_probs,
            &Config::default(),
            Some(&token),
        )
        .unwrap_err();
        assert_eq!(err, ReachabilityError::Cancelled);
    }
}
