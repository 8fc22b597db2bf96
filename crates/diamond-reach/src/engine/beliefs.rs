//! The belief propagation engine: topologically walk a graph, combining
//! parent contributions by inclusion-exclusion and recursing into the
//! diamond conditioner at diamond joins.

use std::collections::BTreeMap;

use crate::cancel::CancellationToken;
use crate::diamond::{DiamondCatalog, DiamondsAtNode};
use crate::engine::cache::ConditioningCache;
use crate::engine::conditioner::condition_diamond;
use crate::error::{ReachabilityError, Result};
use crate::graph::{Graph, NodeId};
use crate::probability::{Probability, UncertaintyMode};

/// Compute exact marginal beliefs for every node of `graph`.
#[allow(clippy::too_many_arguments)]
pub fn compute_beliefs(
    graph: &Graph,
    node_priors: &BTreeMap<NodeId, Probability>,
    edge_probs: &BTreeMap<(NodeId, NodeId), Probability>,
    catalog: &DiamondCatalog,
    mode: UncertaintyMode,
    cache: &mut ConditioningCache,
    cancel: Option<&CancellationToken>,
) -> Result<BTreeMap<NodeId, Probability>> {
    compute_beliefs_with_cache(
        graph,
        node_priors,
        edge_probs,
        &catalog.at_node,
        catalog,
        mode,
        cache,
        cancel,
    )
}

/// The actual walk, parameterized by which `at_node` table to consult: the
/// global one at the top level, or a diamond's own `internal_diamonds` map
/// when re-entering on an induced sub-DAG (never the global table there, or
/// a diamond's own join node would try to recursively condition itself).
#[allow(clippy::too_many_arguments)]
pub(crate) fn compute_beliefs_with_cache(
    graph: &Graph,
    node_priors: &BTreeMap<NodeId, Probability>,
    edge_probs: &BTreeMap<(NodeId, NodeId), Probability>,
    at_node: &BTreeMap<NodeId, DiamondsAtNode>,
    catalog: &DiamondCatalog,
    mode: UncertaintyMode,
    cache: &mut ConditioningCache,
    cancel: Option<&CancellationToken>,
) -> Result<BTreeMap<NodeId, Probability>> {
    let mut beliefs: BTreeMap<NodeId, Probability> = BTreeMap::new();

    for level in &graph.iteration_sets {
        for &n in level {
            if let Some(token) = cancel {
                token.check()?;
            }

            if graph.source_nodes.contains(&n) {
                let prior = node_priors
                    .get(&n)
                    .cloned()
                    .ok_or(ReachabilityError::MissingPrior(n))?;
                beliefs.insert(n, prior);
                continue;
            }

            let mut contributions: Vec<Probability> = Vec::new();
            let has_diamond = at_node.contains_key(&n);

            if let Some(dan) = at_node.get(&n) {
                let diamond_contribution = condition_diamond(
                    &dan.diamond,
                    catalog,
                    &beliefs,
                    edge_probs,
                    mode,
                    cache,
                    cancel,
                )?;
                contributions.push(diamond_contribution);

                let terms = collect_parent_terms(&dan.non_diamond_parents, &beliefs, edge_probs, n)?;
                push_terms(
                    &mut contributions,
                    terms,
                    should_separate_contributions(graph, n, has_diamond),
                    mode,
                )?;
            } else {
                let terms = collect_parent_terms(&graph.parents(n), &beliefs, edge_probs, n)?;
                push_terms(
                    &mut contributions,
                    terms,
                    should_separate_contributions(graph, n, has_diamond),
                    mode,
                )?;
            }

            let combined = if contributions.len() == 1 {
                contributions.into_iter().next().unwrap()
            } else {
                inclusion_exclusion(&contributions)?
            };

            let prior = node_priors
                .get(&n)
                .cloned()
                .ok_or(ReachabilityError::MissingPrior(n))?;
            beliefs.insert(n, prior.mul(&combined)?);
        }
    }

    Ok(beliefs)
}

/// `belief[p] * edge_prob[(p, n)]` for each parent `p` of `n`.
pub(crate) fn collect_parent_terms(
    parents: &std::collections::BTreeSet<NodeId>,
    beliefs: &BTreeMap<NodeId, Probability>,
    edge_probs: &BTreeMap<(NodeId, NodeId), Probability>,
    child: NodeId,
) -> Result<Vec<Probability>> {
    parents
        .iter()
        .map(|&p| {
            let belief = beliefs
                .get(&p)
                .cloned()
                .ok_or(ReachabilityError::ProcessingOrderError(child))?;
            let edge_prob = edge_probs
                .get(&(p, child))
                .cloned()
                .ok_or(ReachabilityError::MissingEdgeProbability(p, child))?;
            belief.mul(&edge_prob)
        })
        .collect()
}

/// Append `terms` to `contributions`: individually if `separate`, as one
/// summed term otherwise.
pub(crate) fn push_terms(
    contributions: &mut Vec<Probability>,
    terms: Vec<Probability>,
    separate: bool,
    mode: UncertaintyMode,
) -> Result<()> {
    if terms.is_empty() {
        return Ok(());
    }
    if separate {
        contributions.extend(terms);
    } else if terms.len() == 1 {
        contributions.push(terms.into_iter().next().unwrap());
    } else {
        let _ = mode;
        contributions.push(Probability::sum(&terms)?);
    }
    Ok(())
}

fn should_separate_contributions(graph: &Graph, n: NodeId, has_diamond: bool) -> bool {
    let is_join = graph.join_nodes.contains(&n);
    if has_diamond {
        is_join
    } else {
        is_join
            || graph
                .ancestors
                .get(&n)
                .is_some_and(|a| a.intersection(&graph.source_nodes).count() >= 2)
    }
}

/// Exact inclusion-exclusion over independent events:
/// `IE(b) = sum_{S subset of {1..m}, S != empty} (-1)^(|S|+1) * prod_{i in S} b_i`.
///
/// Enumerates every non-empty subset; this is intentionally exponential in
/// `m`, per the caller's contract to keep join fan-in small.
pub(crate) fn inclusion_exclusion(contributions: &[Probability]) -> Result<Probability> {
    let m = contributions.len();
    if m == 0 {
        return Err(ReachabilityError::DomainError(
            "inclusion_exclusion_of_empty_list".to_string(),
        ));
    }
    if m > 20 {
        tracing::warn!(
            contributions = m,
            "node accumulated more than 20 inclusion-exclusion contributions; enumeration will dominate runtime"
        );
    }

    let mode = contributions[0].mode();
    let mut total = Probability::zero(mode);
    for mask in 1u64..(1u64 << m) {
        let mut product = Probability::one(mode);
        for (i, contribution) in contributions.iter().enumerate() {
            if mask & (1 << i) != 0 {
                product = product.mul(contribution)?;
            }
        }
        total = if mask.count_ones() % 2 == 1 {
            total.add(&product)?
        } else {
            total.sub(&product)?
        };
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diamond;
    use pretty_assertions::assert_eq;

    fn all_scalar(nodes: &[NodeId], value: f64) -> BTreeMap<NodeId, Probability> {
        nodes
            .iter()
            .map(|&n| (n, Probability::scalar(value).unwrap()))
            .collect()
    }

    #[test]
    fn inclusion_exclusion_of_two_independent_terms() {
        let a = Probability::scalar(0.5).unwrap();
        let b = Probability::scalar(0.4).unwrap();
        let result = inclusion_exclusion(&[a, b]).unwrap();
        match result {
            Probability::Scalar(v) => assert!((v - (0.5 + 0.4 - 0.5 * 0.4)).abs() < 1e-12),
            _ => panic!("expected scalar"),
        }
    }

    #[test]
    fn trivial_chain_s1() {
        let g = Graph::build([(1, 2), (2, 3)]).unwrap();
        let priors = all_scalar(&[1, 2, 3], 1.0);
        let mut edges = BTreeMap::new();
        edges.insert((1, 2), Probability::scalar(0.5).unwrap());
        edges.insert((2, 3), Probability::scalar(0.5).unwrap());

        let catalog = diamond::build(&g, &priors, UncertaintyMode::Scalar).unwrap();
        let mut cache = ConditioningCache::default();
        let beliefs = compute_beliefs(
            &g,
            &priors,
            &edges,
            &catalog,
            UncertaintyMode::Scalar,
            &mut cache,
            None,
        )
        .unwrap();

        assert_eq!(beliefs[&1], Probability::Scalar(1.0));
        assert_eq!(beliefs[&2], Probability::Scalar(0.5));
        assert_eq!(beliefs[&3], Probability::Scalar(0.25));
    }
}
