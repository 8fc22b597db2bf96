//! Unique-diamond storage: dedupe discovered diamonds by structural hash,
//! precompute each diamond's induced-subgraph artefacts, and discover
//! nested sub-diamonds iteratively.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;

use crate::diamond::detect::{detect_diamond_at_join, Diamond, DiamondsAtNode};
use crate::error::{ReachabilityError, Result};
use crate::graph::{Graph, NodeId};
use crate::probability::{Probability, UncertaintyMode};

/// Above this many total sibling-candidate entries the hybrid-lookup table
/// is flushed outright rather than LRU-trimmed; it is a pure speed
/// optimization so losing it costs nothing but a few fresh detections.
pub const SIBLING_CACHE_LIMIT: usize = 10_000;

/// Everything needed to re-enter the belief engine on one diamond's induced
/// sub-DAG: the induced graph itself, a node-prior template with
/// placeholders at the join and at conditioning nodes, and the diamond
/// structures discovered at its own internal join nodes.
#[derive(Clone, Debug)]
pub struct DiamondComputationData {
    pub diamond: Diamond,
    pub sub_graph: Graph,
    pub node_prior_template: BTreeMap<NodeId, Probability>,
    pub internal_diamonds: BTreeMap<NodeId, DiamondsAtNode>,
}

/// All diamonds discovered for one top-level query: a flat table keyed by
/// structural hash (so identical shapes anywhere in the recursion share one
/// entry) plus the per-join-node top-level detection results.
#[derive(Default)]
pub struct DiamondCatalog {
    pub unique: HashMap<u64, DiamondComputationData>,
    pub at_node: BTreeMap<NodeId, DiamondsAtNode>,
    join_candidates: IndexMap<NodeId, Vec<Diamond>>,
    sibling_entry_count: usize,
}

/// A 64-bit hash of `(sorted edgelist, sorted conditioning_nodes)`, stable
/// across identical structural shapes regardless of node labelling order
/// (the edgelist and conditioning set are already canonical node-id
/// orderings, so sorting them is enough).
pub fn diamond_hash(diamond: &Diamond) -> u64 {
    let mut hasher = DefaultHasher::new();
    let mut edges = diamond.edgelist.clone();
    edges.sort_unstable();
    edges.hash(&mut hasher);
    let conditioning: Vec<NodeId> = diamond.conditioning_nodes.iter().copied().collect();
    conditioning.hash(&mut hasher);
    hasher.finish()
}

impl DiamondCatalog {
    /// Consult the sibling table built from previously-processed diamonds
    /// at the same join node: a candidate is accepted only if its entire
    /// edgelist is a subset of `available_edges` (the edges actually present
    /// in the current induced sub-graph) and its conditioning nodes don't
    /// intersect the accumulated exclusion set. Skipping the edge check
    /// would let a candidate discovered in a structurally different outer
    /// context reference nodes/edges absent here.
    fn hybrid_lookup(
        &self,
        join: NodeId,
        excluded: &BTreeSet<NodeId>,
        available_edges: &HashSet<(NodeId, NodeId)>,
    ) -> Option<Diamond> {
        let candidates = self.join_candidates.get(&join)?;
        candidates
            .iter()
            .find(|c| {
                c.conditioning_nodes.is_disjoint(excluded)
                    && c.edgelist.iter().all(|e| available_edges.contains(e))
            })
            .cloned()
    }

    fn register_sibling(&mut self, join: NodeId, diamond: Diamond) {
        self.join_candidates.entry(join).or_default().push(diamond);
        self.sibling_entry_count += 1;
        if self.sibling_entry_count > SIBLING_CACHE_LIMIT {
            tracing::debug!("sibling hybrid-lookup table exceeded capacity; flushing");
            self.join_candidates.clear();
            self.sibling_entry_count = 0;
        }
    }

    /// All discovered diamonds' join nodes, in ascending global-graph
    /// iteration-set order; used by the engine to know where to invoke the
    /// conditioner.
    pub fn joins_in_iteration_order(&self, graph: &Graph) -> Vec<NodeId> {
        let mut order = Vec::new();
        for level in &graph.iteration_sets {
            for &n in level {
                if self.at_node.contains_key(&n) {
                    order.push(n);
                }
            }
        }
        order
    }
}

/// Detect diamonds at every join node of `graph` and build the unique
/// diamond catalog for one top-level query.
pub fn build(
    graph: &Graph,
    node_priors: &BTreeMap<NodeId, Probability>,
    mode: UncertaintyMode,
) -> Result<DiamondCatalog> {
    let mut catalog = DiamondCatalog::default();

    for level in &graph.iteration_sets {
        for &j in level {
            if !graph.join_nodes.contains(&j) {
                continue;
            }
            if let Some(dan) = detect_diamond_at_join(graph, j, node_priors, &BTreeSet::new())? {
                catalog.at_node.insert(j, dan);
            }
        }
    }

    let mut processed: HashSet<u64> = HashSet::new();
    let mut work: Vec<(Diamond, BTreeSet<NodeId>)> = Vec::new();
    for level in &graph.iteration_sets {
        for &j in level {
            if let Some(dan) = catalog.at_node.get(&j) {
                work.push((dan.diamond.clone(), BTreeSet::new()));
            }
        }
    }

    while let Some((diamond, excluded_outer)) = work.pop() {
        let hash = diamond_hash(&diamond);
        if processed.contains(&hash) {
            continue;
        }
        processed.insert(hash);

        let data = build_computation_data(graph, &diamond, node_priors, &excluded_outer, mode, &mut catalog)?;

        catalog.register_sibling(diamond.join_node, diamond.clone());

        let mut new_excluded = excluded_outer;
        new_excluded.extend(diamond.conditioning_nodes.iter().copied());
        for dan in data.internal_diamonds.values() {
            work.push((dan.diamond.clone(), new_excluded.clone()));
        }

        catalog.unique.insert(hash, data);
    }

    Ok(catalog)
}

fn build_computation_data(
    graph: &Graph,
    diamond: &Diamond,
    node_priors: &BTreeMap<NodeId, Probability>,
    excluded_outer: &BTreeSet<NodeId>,
    mode: UncertaintyMode,
    catalog: &mut DiamondCatalog,
) -> Result<DiamondComputationData> {
    let sub_graph = graph.induced_subgraph(&diamond.relevant_nodes)?;

    let mut node_prior_template = BTreeMap::new();
    for &n in &diamond.relevant_nodes {
        let prior = if n == diamond.join_node || diamond.conditioning_nodes.contains(&n) {
            Probability::one(mode)
        } else {
            node_priors
                .get(&n)
                .cloned()
                .ok_or(ReachabilityError::MissingPrior(n))?
        };
        node_prior_template.insert(n, prior);
    }

    let excluded: BTreeSet<NodeId> = excluded_outer
        .union(&diamond.conditioning_nodes)
        .copied()
        .collect();

    let available_edges: HashSet<(NodeId, NodeId)> = sub_graph.edges.iter().copied().collect();

    let mut internal_diamonds = BTreeMap::new();
    for &j in &sub_graph.join_nodes {
        if j == diamond.join_node {
            continue;
        }
        if let Some(candidate) = catalog.hybrid_lookup(j, &excluded, &available_edges) {
            let non_diamond_parents = sub_graph
                .parents(j)
                .difference(&candidate.relevant_nodes)
                .copied()
                .collect();
            internal_diamonds.insert(
                j,
                DiamondsAtNode {
                    diamond: candidate,
                    non_diamond_parents,
                },
            );
            continue;
        }
        if let Some(dan) = detect_diamond_at_join(&sub_graph, j, node_priors, &excluded)? {
            internal_diamonds.insert(j, dan);
        }
    }

    Ok(DiamondComputationData {
        diamond: diamond.clone(),
        sub_graph,
        node_prior_template,
        internal_diamonds,
    })
}
