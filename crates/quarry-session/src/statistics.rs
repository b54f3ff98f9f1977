use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use quarry_cache::CacheOutcome;
use quarry_connector::ScanMetrics;

/// Counters describing how one execution obtained its rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStatistics {
    pub relations_read: Vec<String>,
    /// Scans issued against backends other than the built-in datasets.
    pub external_calls: u64,
    pub rows_read: u64,
    pub blobs_read: u64,
    pub blobs_ignored: u64,
    pub bytes_read: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_oversize: u64,
    /// Time spent in `execute` and the fetch calls that followed it.
    pub elapsed: Duration,
}

impl QueryStatistics {
    pub(crate) fn record_cache(&mut self, outcome: CacheOutcome) {
        match outcome {
            CacheOutcome::Hit => self.cache_hits += 1,
            CacheOutcome::Miss => self.cache_misses += 1,
            CacheOutcome::Oversize => self.cache_oversize += 1,
        }
    }

    /// Pairs of metric names and values, in display order.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("relations_read", self.relations_read.join(", ")),
            ("external_calls", self.external_calls.to_string()),
            ("rows_read", self.rows_read.to_string()),
            ("blobs_read", self.blobs_read.to_string()),
            ("blobs_ignored", self.blobs_ignored.to_string()),
            ("bytes_read", self.bytes_read.to_string()),
            ("cache_hits", self.cache_hits.to_string()),
            ("cache_misses", self.cache_misses.to_string()),
            ("cache_oversize", self.cache_oversize.to_string()),
            ("elapsed", format!("{:?}", self.elapsed)),
        ]
    }
}

impl fmt::Display for QueryStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self
            .entries()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>();
        write!(f, "{}", entries.join(" "))
    }
}

/// Statistics of an execution whose connector may still be reading.
#[derive(Debug, Default)]
pub(crate) struct ExecutionStatistics {
    base: QueryStatistics,
    scan: Option<Arc<ScanMetrics>>,
}

impl ExecutionStatistics {
    pub fn new(base: QueryStatistics, scan: Option<Arc<ScanMetrics>>) -> Self {
        Self { base, scan }
    }

    pub fn add_elapsed(&mut self, elapsed: Duration) {
        self.base.elapsed += elapsed;
    }

    pub fn snapshot(&self) -> QueryStatistics {
        let mut output = self.base.clone();
        if let Some(scan) = &self.scan {
            output.rows_read += scan.rows_read.load(Ordering::Relaxed);
            output.blobs_read += scan.blobs_read.load(Ordering::Relaxed);
            output.blobs_ignored += scan.blobs_ignored.load(Ordering::Relaxed);
            output.bytes_read += scan.bytes_read.load(Ordering::Relaxed);
        }
        output
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reads_live_scan_metrics() {
        let scan = Arc::new(ScanMetrics::default());
        let mut base = QueryStatistics::default();
        base.record_cache(CacheOutcome::Miss);
        let mut statistics = ExecutionStatistics::new(base, Some(scan.clone()));
        scan.rows_read.fetch_add(9, Ordering::Relaxed);
        statistics.add_elapsed(Duration::from_millis(5));

        let snapshot = statistics.snapshot();
        assert_eq!(snapshot.rows_read, 9);
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.elapsed, Duration::from_millis(5));
        assert!(snapshot.to_string().contains("rows_read=9"));
    }
}
