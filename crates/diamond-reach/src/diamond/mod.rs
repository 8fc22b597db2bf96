mod detect;
mod storage;

pub use detect::{detect_diamond_at_join, Diamond, DiamondsAtNode, MAX_EXPANSION_ITERATIONS};
pub use storage::{build, diamond_hash, DiamondCatalog, DiamondComputationData, SIBLING_CACHE_LIMIT};
