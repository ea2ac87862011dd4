// Caching tiers: content-keyed results and element-keyed successes

mod result_cache;
mod success_cache;

pub use result_cache::{CacheStatus, ResultCache, ResultCacheMetrics};
pub use success_cache::{EvictionKind, SuccessCacheMetrics, SuccessResultCache};
