//! Metric series registration. The crate only uses the `metrics` facade;
//! the embedding application decides whether a recorder is installed.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration so series carry help text when exported.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("aggregate_runs_total", "Aggregation runs started.");
        describe_counter!(
            "aggregate_source_errors_total",
            "Connector fetch/parse errors across all attempts."
        );
        describe_counter!(
            "aggregate_fallback_total",
            "Sources served from sample fallback data."
        );
        describe_counter!("aggregate_cache_hits_total", "Fresh cache entries served.");
        describe_counter!(
            "aggregate_cache_misses_total",
            "Cache misses (absent, stale, corrupt, or forced refresh)."
        );
        describe_counter!(
            "aggregate_records_total",
            "Canonical records produced by successful sources."
        );
        describe_histogram!("fetch_ms", "Per-source fetch+normalize time in milliseconds.");
        describe_gauge!("aggregate_last_run_ts", "Unix ts of the last aggregation run.");
    });
}
