//! Error taxonomy for the reachability core.
//!
//! Mirrors the boundary error taxonomy directly: every failure mode is a
//! distinct, matchable variant rather than an opaque string, since callers
//! are expected to branch on *which* structural guarantee broke.

use thiserror::Error;

use crate::graph::NodeId;

/// Shorthand `Result` type used throughout this crate.
pub type Result<T> = std::result::Result<T, ReachabilityError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReachabilityError {
    /// The input edge set is not acyclic.
    #[error("graph contains a cycle")]
    CycleDetected,

    /// A node has no entry in the node-prior table.
    #[error("node {0} has no prior activation probability")]
    MissingPrior(NodeId),

    /// An edge has no entry in the edge-probability table.
    #[error("edge ({0}, {1}) has no transmission probability")]
    MissingEdgeProbability(NodeId, NodeId),

    /// A probability value failed its own `[0, 1]`-bounds validation.
    #[error("invalid probability at {where_}: {value}")]
    InvalidProbability { where_: String, value: String },

    /// An internal index (adjacency map, iteration set, ...) is inconsistent
    /// with the graph it was built from. Indicates a bug, not a bad input.
    #[error("index inconsistency at {0}")]
    IndexInconsistency(String),

    /// A node was visited before all of its parents had a recorded belief.
    /// Indicates a bug in iteration-set construction, not a bad input.
    #[error("node {0} was visited before all of its parents had beliefs")]
    ProcessingOrderError(NodeId),

    /// Diamond detection or sub-source expansion did not reach a fixpoint
    /// within the hard iteration bound.
    #[error("diamond detection at join node {0} exceeded the recursion bound")]
    RecursionDepthExceeded(NodeId),

    /// An arithmetic operation in the probability algebra hit an undefined
    /// case (e.g. division by an interval straddling zero).
    #[error("domain error in operation {0}")]
    DomainError(String),

    /// A cooperative cancellation token was observed between processing
    /// steps; the caller asked the query to stop.
    #[error("query was cancelled")]
    Cancelled,
}
