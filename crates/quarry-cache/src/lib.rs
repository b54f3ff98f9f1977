mod fingerprint;
mod query_cache;

pub use fingerprint::{Fingerprint, FingerprintBuilder};
pub use query_cache::{CacheOutcome, CacheStatistics, QueryCache};
