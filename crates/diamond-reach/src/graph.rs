//! Graph preprocessing: adjacency indices, source/fork/join classification,
//! topological iteration sets, and ancestor/descendant closures.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::{ReachabilityError, Result};

/// Stable integer identifier for a graph node.
pub type NodeId = u64;

/// An immutable, preprocessed DAG: adjacency indices, node classification,
/// a topological layering, and transitive-closure relatives.
///
/// Everything here is computed once at construction time; nothing about a
/// `Graph` changes after [`Graph::build`] returns.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    pub nodes: BTreeSet<NodeId>,
    pub edges: Vec<(NodeId, NodeId)>,
    pub outgoing: BTreeMap<NodeId, BTreeSet<NodeId>>,
    pub incoming: BTreeMap<NodeId, BTreeSet<NodeId>>,
    pub source_nodes: BTreeSet<NodeId>,
    pub fork_nodes: BTreeSet<NodeId>,
    pub join_nodes: BTreeSet<NodeId>,
    /// Finest Kahn-style level partition: every edge (u, v) has u in an
    /// earlier set than v. Every node appears in exactly one set.
    pub iteration_sets: Vec<Vec<NodeId>>,
    pub ancestors: BTreeMap<NodeId, BTreeSet<NodeId>>,
    pub descendants: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl Graph {
    /// Build a graph from an edge list, inferring the node set from the
    /// edges themselves.
    pub fn build(edges: impl IntoIterator<Item = (NodeId, NodeId)>) -> Result<Self> {
        let edges: Vec<(NodeId, NodeId)> = edges.into_iter().collect();
        let mut nodes = BTreeSet::new();
        for &(u, v) in &edges {
            nodes.insert(u);
            nodes.insert(v);
        }
        Self::build_with_nodes(nodes, edges)
    }

    /// Build a graph from an explicit node set plus an edge list; the node
    /// set may include isolated nodes absent from every edge.
    pub fn build_with_nodes(
        nodes: impl IntoIterator<Item = NodeId>,
        edges: impl IntoIterator<Item = (NodeId, NodeId)>,
    ) -> Result<Self> {
        let nodes: BTreeSet<NodeId> = nodes.into_iter().collect();
        let edges: Vec<(NodeId, NodeId)> = edges.into_iter().collect();

        let (outgoing, incoming) = build_indices(&nodes, &edges);

        assert_acyclic(&nodes, &edges)?;

        let source_nodes = nodes
            .iter()
            .copied()
            .filter(|n| incoming.get(n).is_none_or(BTreeSet::is_empty))
            .collect();
        let fork_nodes = nodes
            .iter()
            .copied()
            .filter(|n| outgoing.get(n).is_some_and(|s| s.len() > 1))
            .collect();
        let join_nodes = nodes
            .iter()
            .copied()
            .filter(|n| incoming.get(n).is_some_and(|s| s.len() > 1))
            .collect();

        let iteration_sets = topological_iteration_sets(&nodes, &outgoing, &incoming)?;
        let (ancestors, descendants) = transitive_closure(&nodes, &outgoing, &incoming);

        Ok(Self {
            nodes,
            edges,
            outgoing,
            incoming,
            source_nodes,
            fork_nodes,
            join_nodes,
            iteration_sets,
            ancestors,
            descendants,
        })
    }

    /// Build the induced subgraph on `keep`: only nodes in `keep` survive,
    /// and only edges whose both endpoints survive.
    pub fn induced_subgraph(&self, keep: &BTreeSet<NodeId>) -> Result<Self> {
        let nodes: BTreeSet<NodeId> = self.nodes.intersection(keep).copied().collect();
        let edges: Vec<(NodeId, NodeId)> = self
            .edges
            .iter()
            .copied()
            .filter(|(u, v)| nodes.contains(u) && nodes.contains(v))
            .collect();
        Self::build_with_nodes(nodes, edges)
    }

    /// Parents of `n` that are themselves ancestors of another parent of
    /// `n` — used by the diamond detector's asymmetric-diamond check.
    pub fn parents(&self, n: NodeId) -> BTreeSet<NodeId> {
        self.incoming.get(&n).cloned().unwrap_or_default()
    }
}

fn build_indices(
    nodes: &BTreeSet<NodeId>,
    edges: &[(NodeId, NodeId)],
) -> (
    BTreeMap<NodeId, BTreeSet<NodeId>>,
    BTreeMap<NodeId, BTreeSet<NodeId>>,
) {
    let mut outgoing: BTreeMap<NodeId, BTreeSet<NodeId>> =
        nodes.iter().map(|&n| (n, BTreeSet::new())).collect();
    let mut incoming: BTreeMap<NodeId, BTreeSet<NodeId>> =
        nodes.iter().map(|&n| (n, BTreeSet::new())).collect();
    for &(u, v) in edges {
        outgoing.entry(u).or_default().insert(v);
        incoming.entry(v).or_default().insert(u);
    }
    (outgoing, incoming)
}

fn assert_acyclic(nodes: &BTreeSet<NodeId>, edges: &[(NodeId, NodeId)]) -> Result<()> {
    let mut pg: DiGraph<(), ()> = DiGraph::new();
    let mut idx: IndexMap<NodeId, NodeIndex> = IndexMap::new();
    for &n in nodes {
        idx.insert(n, pg.add_node(()));
    }
    for &(u, v) in edges {
        if u == v {
            return Err(ReachabilityError::CycleDetected);
        }
        pg.add_edge(idx[&u], idx[&v], ());
    }
    toposort(&pg, None)
        .map(|_| ())
        .map_err(|_| ReachabilityError::CycleDetected)
}

/// Kahn's algorithm, but grouped by level rather than flattened into one
/// order: every node whose remaining in-degree hits zero in the same round
/// lands in the same iteration set.
fn topological_iteration_sets(
    nodes: &BTreeSet<NodeId>,
    outgoing: &BTreeMap<NodeId, BTreeSet<NodeId>>,
    incoming: &BTreeMap<NodeId, BTreeSet<NodeId>>,
) -> Result<Vec<Vec<NodeId>>> {
    let mut remaining: BTreeMap<NodeId, usize> = nodes
        .iter()
        .map(|&n| (n, incoming.get(&n).map_or(0, BTreeSet::len)))
        .collect();

    let mut sets = Vec::new();
    let mut seen = 0usize;
    loop {
        let frontier: Vec<NodeId> = remaining
            .iter()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(&n, _)| n)
            .collect();
        if frontier.is_empty() {
            break;
        }
        for &n in &frontier {
            remaining.remove(&n);
        }
        for &n in &frontier {
            for &child in outgoing.get(&n).into_iter().flatten() {
                if let Some(deg) = remaining.get_mut(&child) {
                    *deg = deg.saturating_sub(1);
                }
            }
        }
        seen += frontier.len();
        sets.push(frontier);
    }

    if seen != nodes.len() {
        return Err(ReachabilityError::CycleDetected);
    }
    Ok(sets)
}

/// BFS-based transitive closure; O(V^2) worst case, matching the resource
/// bound the engine is built around.
fn transitive_closure(
    nodes: &BTreeSet<NodeId>,
    outgoing: &BTreeMap<NodeId, BTreeSet<NodeId>>,
    incoming: &BTreeMap<NodeId, BTreeSet<NodeId>>,
) -> (
    BTreeMap<NodeId, BTreeSet<NodeId>>,
    BTreeMap<NodeId, BTreeSet<NodeId>>,
) {
    let mut ancestors = BTreeMap::new();
    let mut descendants = BTreeMap::new();
    for &n in nodes {
        ancestors.insert(n, bfs_closure(n, incoming));
        descendants.insert(n, bfs_closure(n, outgoing));
    }
    (ancestors, descendants)
}

/// BFS from `seed` following `adjacency`, excluding `seed` itself from the
/// result.
pub fn bfs_closure(
    seed: NodeId,
    adjacency: &BTreeMap<NodeId, BTreeSet<NodeId>>,
) -> BTreeSet<NodeId> {
    let mut visited = BTreeSet::new();
    let mut queue: VecDeque<NodeId> = VecDeque::new();
    queue.push_back(seed);
    let mut first = true;
    while let Some(node) = queue.pop_front() {
        for &neighbor in adjacency.get(&node).into_iter().flatten() {
            if visited.insert(neighbor) {
                queue.push_back(neighbor);
            }
        }
        if first {
            first = false;
        }
    }
    visited
}
