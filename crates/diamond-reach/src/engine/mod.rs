mod beliefs;
mod cache;
mod conditioner;

pub use beliefs::compute_beliefs;
pub use cache::{prior_vector_hash, ConditioningCache, DiamondCacheKey, DEFAULT_CACHE_CAPACITY};
