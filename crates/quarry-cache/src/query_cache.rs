use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use quarry_common::config::CacheConfig;
use quarry_common::spec::RowBatch;

use crate::Fingerprint;

/// How a batch was obtained from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// The batch was already cached, or another caller computed it concurrently.
    Hit,
    /// The batch was computed by this caller and retained.
    Miss,
    /// The batch was computed by this caller but was too large to retain.
    Oversize,
}

#[derive(Debug, Default)]
pub struct CacheStatistics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub oversize: AtomicU64,
}

/// A read-through cache of materialized row batches keyed by fingerprint.
///
/// Concurrent requests for one fingerprint are coalesced so that the compute
/// future runs at most once, while unrelated fingerprints compute in parallel.
/// A failed computation leaves no entry behind.
pub struct QueryCache {
    entries: Cache<Fingerprint, Arc<RowBatch>>,
    max_entry_rows: usize,
    statistics: CacheStatistics,
}

impl QueryCache {
    const NAME: &'static str = "QueryCache";

    pub fn new(ttl: Duration, max_entries: u64, max_entry_rows: usize) -> Self {
        debug!(
            "Setting TTL for {} to {ttl:?} and maximum number of entries to {max_entries}",
            Self::NAME
        );
        let entries = Cache::builder()
            .eviction_policy(EvictionPolicy::lru())
            .time_to_live(ttl)
            .max_capacity(max_entries)
            .build();
        Self {
            entries,
            max_entry_rows,
            statistics: CacheStatistics::default(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl(), config.max_entries, config.max_entry_rows)
    }

    /// Returns the cached batch for the fingerprint, or runs `compute` and caches its result.
    pub async fn get_or_compute<F, E>(
        &self,
        fingerprint: Fingerprint,
        compute: F,
    ) -> Result<(Arc<RowBatch>, CacheOutcome), Arc<E>>
    where
        F: Future<Output = Result<RowBatch, E>>,
        E: Send + Sync + 'static,
    {
        let computed = AtomicBool::new(false);
        let batch = self
            .entries
            .try_get_with(fingerprint, async {
                computed.store(true, Ordering::Relaxed);
                compute.await.map(Arc::new)
            })
            .await?;

        if !computed.load(Ordering::Relaxed) {
            debug!("{} hit for {fingerprint}", Self::NAME);
            self.statistics.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((batch, CacheOutcome::Hit));
        }
        if batch.num_rows() > self.max_entry_rows {
            debug!(
                "{} entry {fingerprint} has {} rows and is not retained",
                Self::NAME,
                batch.num_rows()
            );
            self.entries.invalidate(&fingerprint).await;
            self.statistics.oversize.fetch_add(1, Ordering::Relaxed);
            return Ok((batch, CacheOutcome::Oversize));
        }
        debug!("{} miss for {fingerprint}", Self::NAME);
        self.statistics.misses.fetch_add(1, Ordering::Relaxed);
        Ok((batch, CacheOutcome::Miss))
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.contains_key(fingerprint)
    }

    pub async fn invalidate(&self, fingerprint: &Fingerprint) {
        self.entries.invalidate(fingerprint).await
    }

    pub fn clear(&self) {
        self.entries.invalidate_all()
    }

    /// The approximate number of retained entries.
    pub async fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    pub fn statistics(&self) -> &CacheStatistics {
        &self.statistics
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use quarry_common::spec::{DataType, Field, Schema};
    use tokio::sync::Barrier;

    use super::*;

    fn batch(count: i64) -> RowBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Integer)]));
        RowBatch::try_from_values(schema, (0..count).map(|i| vec![i.into()]).collect()).unwrap()
    }

    fn fingerprint(name: &str) -> Fingerprint {
        Fingerprint::builder().with_str(name).build()
    }

    fn cache() -> QueryCache {
        QueryCache::new(Duration::from_secs(60), 16, 100)
    }

    #[tokio::test]
    async fn test_sequential_calls_compute_once() {
        let cache = cache();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let (value, _) = cache
                .get_or_compute(fingerprint("a"), async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(batch(3))
                })
                .await
                .unwrap();
            assert_eq!(value.num_rows(), 3);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.statistics().misses.load(Ordering::SeqCst), 1);
        assert_eq!(cache.statistics().hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_compute_once() {
        let cache = Arc::new(cache());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut tasks = vec![];
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_compute(fingerprint("shared"), async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, String>(batch(2))
                    })
                    .await
                    .map(|(b, _)| b.num_rows())
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 2);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unrelated_fingerprints_compute_in_parallel() {
        let cache = Arc::new(cache());
        let barrier = Arc::new(Barrier::new(2));
        let mut tasks = vec![];
        for name in ["left", "right"] {
            let cache = cache.clone();
            let barrier = barrier.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_compute(fingerprint(name), async move {
                        // both computations must be in flight for either to finish
                        barrier.wait().await;
                        Ok::<_, String>(batch(1))
                    })
                    .await
                    .is_ok()
            }));
        }
        let all = futures_join(tasks);
        let results = tokio::time::timeout(Duration::from_secs(5), all)
            .await
            .unwrap();
        assert!(results.into_iter().all(|x| x));
    }

    async fn futures_join(tasks: Vec<tokio::task::JoinHandle<bool>>) -> Vec<bool> {
        let mut results = vec![];
        for task in tasks {
            results.push(task.await.unwrap());
        }
        results
    }

    #[tokio::test]
    async fn test_failure_does_not_poison() {
        let cache = cache();
        let error = cache
            .get_or_compute(fingerprint("flaky"), async {
                Err::<RowBatch, _>("backend unavailable".to_string())
            })
            .await
            .unwrap_err();
        assert_eq!(error.as_str(), "backend unavailable");
        assert!(!cache.contains(&fingerprint("flaky")));

        let (value, outcome) = cache
            .get_or_compute(fingerprint("flaky"), async { Ok::<_, String>(batch(1)) })
            .await
            .unwrap();
        assert_eq!(value.num_rows(), 1);
        assert_eq!(outcome, CacheOutcome::Miss);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = QueryCache::new(Duration::from_millis(100), 16, 100);
        let calls = AtomicUsize::new(0);
        let compute = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(batch(1))
        };
        cache
            .get_or_compute(fingerprint("ttl"), compute())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        let (_, outcome) = cache
            .get_or_compute(fingerprint("ttl"), compute())
            .await
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Miss);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_capacity_is_bounded() {
        let cache = QueryCache::new(Duration::from_secs(60), 2, 100);
        for name in ["a", "b", "c", "d", "e"] {
            cache
                .get_or_compute(fingerprint(name), async { Ok::<_, String>(batch(1)) })
                .await
                .unwrap();
        }
        assert!(cache.entry_count().await <= 2);
    }

    #[tokio::test]
    async fn test_oversize_batches_are_not_retained() {
        let cache = QueryCache::new(Duration::from_secs(60), 16, 2);
        let (value, outcome) = cache
            .get_or_compute(fingerprint("big"), async { Ok::<_, String>(batch(5)) })
            .await
            .unwrap();
        assert_eq!(value.num_rows(), 5);
        assert_eq!(outcome, CacheOutcome::Oversize);
        assert!(!cache.contains(&fingerprint("big")));
        assert_eq!(cache.statistics().oversize.load(Ordering::SeqCst), 1);
    }
}
