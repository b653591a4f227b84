//! Engine-level behavior: one result per source, partial failure isolation,
//! fallback accounting, and deadline handling.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use localpulse_aggregator::connector::{
    Feature, FeatureSet, RawPayload, SourceConnector, SourceKind,
};
use localpulse_aggregator::{
    Aggregator, AggregatorConfig, BoundingBox, ConnectorError, Query, SampleGenerator, Source,
};

fn test_config(cache_dir: PathBuf) -> AggregatorConfig {
    AggregatorConfig {
        cache_dir,
        retry_attempts: 0,
        retry_backoff_ms: 1,
        max_total_backoff_ms: 5,
        source_timeout_secs: 5,
        aggregate_timeout_secs: 10,
        ..Default::default()
    }
}

/// Returns `count` point features; counts outbound calls.
struct StaticConnector {
    name: &'static str,
    count: usize,
    calls: Arc<AtomicUsize>,
}

impl StaticConnector {
    fn new(name: &'static str, count: usize) -> Self {
        Self {
            name,
            count,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl SourceConnector for StaticConnector {
    async fn fetch(&self, _query: &Query) -> Result<RawPayload, ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let features = (0..self.count)
            .map(|i| Feature {
                attributes: json!({
                    "OBJECTID": i,
                    "INCIDENT_TYPE": "THEFT",
                })
                .as_object()
                .cloned()
                .unwrap(),
                geometry: None,
            })
            .collect();
        Ok(RawPayload::FeatureSet(FeatureSet { features }))
    }
    fn name(&self) -> &str {
        self.name
    }
    fn kind(&self) -> SourceKind {
        SourceKind::Crime
    }
}

/// Always fails with a transient error.
struct DownConnector {
    name: &'static str,
    calls: Arc<AtomicUsize>,
}

impl DownConnector {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl SourceConnector for DownConnector {
    async fn fetch(&self, _query: &Query) -> Result<RawPayload, ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ConnectorError::Transient("connection timed out".into()))
    }
    fn name(&self) -> &str {
        self.name
    }
    fn kind(&self) -> SourceKind {
        SourceKind::Traffic
    }
}

/// Never answers within any reasonable deadline.
struct HangingConnector {
    name: &'static str,
}

#[async_trait]
impl SourceConnector for HangingConnector {
    async fn fetch(&self, _query: &Query) -> Result<RawPayload, ConnectorError> {
        tokio::time::sleep(Duration::from_secs(300)).await;
        Ok(RawPayload::FeatureSet(FeatureSet::default()))
    }
    fn name(&self) -> &str {
        self.name
    }
    fn kind(&self) -> SourceKind {
        SourceKind::Traffic
    }
}

#[tokio::test]
async fn partial_failure_scenario_matches_expected_summary() {
    let tmp = tempfile::tempdir().unwrap();
    let mut agg = Aggregator::new(test_config(tmp.path().join("cache"))).unwrap();
    agg.register(Source::new(StaticConnector::new("source_a", 50)));
    agg.register(Source::new(DownConnector::new("source_b")));
    agg.register(
        Source::new(DownConnector::new("source_c"))
            .with_fallback(SampleGenerator::CrimeIncidents { count: 10 }),
    );

    let out = agg
        .aggregate(&Query::for_bbox(BoundingBox::coral_gables()))
        .await;

    assert_eq!(out.summary.total_records, 60);
    assert_eq!(out.summary.successful_sources, 2);
    assert_eq!(out.summary.total_sources, 3);

    let b = &out.per_source["source_b"];
    assert!(!b.success);
    assert!(b.records.is_empty());
    assert!(!b.error.as_deref().unwrap_or_default().is_empty());

    let c = &out.per_source["source_c"];
    assert!(c.success);
    assert!(c.sample_data);
    assert_eq!(c.record_count, 10);
}

#[tokio::test]
async fn exactly_one_result_per_registered_source() {
    let tmp = tempfile::tempdir().unwrap();
    let mut agg = Aggregator::new(test_config(tmp.path().join("cache"))).unwrap();
    agg.register(Source::new(StaticConnector::new("a", 1)));
    agg.register(Source::new(StaticConnector::new("b", 2)));
    // Re-registering the same id replaces the earlier source.
    agg.register(Source::new(StaticConnector::new("b", 3)));

    let out = agg.aggregate(&Query::default()).await;
    assert_eq!(out.per_source.len(), 2);
    assert_eq!(out.per_source["b"].record_count, 3);
}

#[tokio::test]
async fn source_result_invariants_hold_for_every_outcome() {
    let tmp = tempfile::tempdir().unwrap();
    let mut agg = Aggregator::new(test_config(tmp.path().join("cache"))).unwrap();
    agg.register(Source::new(StaticConnector::new("live", 4)));
    agg.register(Source::new(DownConnector::new("dead")));
    agg.register(
        Source::new(DownConnector::new("sampled"))
            .with_fallback(SampleGenerator::ServiceRequests { count: 3 }),
    );

    let out = agg.aggregate(&Query::default()).await;
    for result in out.per_source.values() {
        if result.success {
            assert!(result.error.is_none());
            assert_eq!(result.record_count, result.records.len());
        } else {
            assert!(result.records.is_empty());
            assert_eq!(result.record_count, 0);
        }
        for r in &result.records {
            assert_eq!(r.latitude.is_some(), r.longitude.is_some());
            if let (Some(lat), Some(lon)) = (r.latitude, r.longitude) {
                assert!((-90.0..=90.0).contains(&lat));
                assert!((-180.0..=180.0).contains(&lon));
            }
        }
    }
}

#[tokio::test]
async fn invalid_query_fails_every_source_without_outbound_calls() {
    let tmp = tempfile::tempdir().unwrap();
    let mut agg = Aggregator::new(test_config(tmp.path().join("cache"))).unwrap();
    let live = StaticConnector::new("live", 3);
    let calls = Arc::clone(&live.calls);
    agg.register(Source::new(live));

    // xmin > xmax
    let q = Query::for_bbox(BoundingBox::new(-80.25, 25.70, -80.30, 25.75));
    let out = agg.aggregate(&q).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(out.summary.successful_sources, 0);
    assert_eq!(out.per_source.len(), 1);
    let r = &out.per_source["live"];
    assert!(!r.success);
    assert!(r.error.as_deref().unwrap_or_default().contains("invalid query"));
}

#[tokio::test]
async fn slow_source_is_cut_off_without_delaying_the_others() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = test_config(tmp.path().join("cache"));
    config.source_timeout_secs = 1;
    config.aggregate_timeout_secs = 5;
    let mut agg = Aggregator::new(config).unwrap();
    agg.register(Source::new(StaticConnector::new("fast", 5)));
    agg.register(Source::new(HangingConnector { name: "hung" }));

    let started = std::time::Instant::now();
    let out = agg.aggregate(&Query::default()).await;
    assert!(started.elapsed() < Duration::from_secs(4));

    assert!(out.per_source["fast"].success);
    let hung = &out.per_source["hung"];
    assert!(!hung.success);
    assert!(hung.error.as_deref().unwrap_or_default().contains("timed out"));
    assert_eq!(out.summary.successful_sources, 1);
}

#[tokio::test]
async fn aggregate_deadline_abandons_pending_sources() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = test_config(tmp.path().join("cache"));
    config.source_timeout_secs = 60;
    config.aggregate_timeout_secs = 1;
    let mut agg = Aggregator::new(config).unwrap();
    agg.register(Source::new(StaticConnector::new("fast", 2)));
    agg.register(Source::new(HangingConnector { name: "hung" }));

    let out = agg.aggregate(&Query::default()).await;
    assert_eq!(out.per_source.len(), 2);
    assert!(out.per_source["fast"].success);
    assert!(!out.per_source["hung"].success);
    assert!(out.per_source["hung"]
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("deadline"));
}
