//! The diamond-join conditioner: enumerate the 2^k joint Bernoulli states of
//! a diamond's conditioning nodes, recurse into the induced sub-DAG per
//! state, and weight-sum the results.

use std::collections::BTreeMap;

use crate::cancel::CancellationToken;
use crate::diamond::{diamond_hash, Diamond, DiamondCatalog};
use crate::engine::beliefs::compute_beliefs_with_cache;
use crate::engine::cache::{prior_vector_hash, ConditioningCache};
use crate::error::{ReachabilityError, Result};
use crate::graph::NodeId;
use crate::probability::{Probability, UncertaintyMode};

/// Exact total-probability conditioning over the Bernoulli states of a
/// diamond's conditioning set, returning the resulting belief at the
/// diamond's own join node.
#[allow(clippy::too_many_arguments)]
pub(crate) fn condition_diamond(
    diamond: &Diamond,
    catalog: &DiamondCatalog,
    outer_beliefs: &BTreeMap<NodeId, Probability>,
    edge_probs: &BTreeMap<(NodeId, NodeId), Probability>,
    mode: UncertaintyMode,
    cache: &mut ConditioningCache,
    cancel: Option<&CancellationToken>,
) -> Result<Probability> {
    let hash = diamond_hash(diamond);
    let data = catalog.unique.get(&hash).ok_or_else(|| {
        ReachabilityError::IndexInconsistency(format!("diamond {hash} missing from catalog"))
    })?;

    // Step 2: induced sub-node-prior template. The join and conditioning
    // placeholders are already `one` in `node_prior_template`; induced
    // non-conditioning sources inherit their belief from the outer engine.
    let mut template = data.node_prior_template.clone();
    for &n in &data.sub_graph.source_nodes {
        if n != diamond.join_node && !diamond.conditioning_nodes.contains(&n) {
            if let Some(belief) = outer_beliefs.get(&n) {
                template.insert(n, belief.clone());
            }
        }
    }

    let ordered_conditioning: Vec<NodeId> = diamond.conditioning_nodes.iter().copied().collect();
    let k = ordered_conditioning.len();
    let mut final_belief = Probability::zero(mode);

    for mask in 0u64..(1u64 << k) {
        if let Some(token) = cancel {
            token.check()?;
        }

        let mut state_prob = Probability::one(mode);
        let mut state_template = template.clone();
        for (i, &c) in ordered_conditioning.iter().enumerate() {
            let belief_c = outer_beliefs
                .get(&c)
                .cloned()
                .ok_or(ReachabilityError::ProcessingOrderError(c))?;
            let active = (mask >> i) & 1 == 1;
            let factor = if active {
                belief_c
            } else {
                belief_c.complement()?
            };
            state_prob = state_prob.mul(&factor)?;
            state_template.insert(
                c,
                if active {
                    Probability::one(mode)
                } else {
                    Probability::zero(mode)
                },
            );
        }

        let cache_key = (hash, prior_vector_hash(&state_template));
        let state_beliefs = if let Some(cached) = cache.get(&cache_key) {
            cached
        } else {
            let computed = compute_beliefs_with_cache(
                &data.sub_graph,
                &state_template,
                edge_probs,
                &data.internal_diamonds,
                catalog,
                mode,
                cache,
                cancel,
            )?;
            cache.insert(cache_key, computed.clone());
            computed
        };

        let join_belief = state_beliefs.get(&diamond.join_node).cloned().ok_or_else(|| {
            ReachabilityError::IndexInconsistency(format!(
                "diamond sub-engine missing join node {}",
                diamond.join_node
            ))
        })?;
        final_belief = final_belief.add(&join_belief.mul(&state_prob)?)?;
    }

    Ok(final_belief)
}
