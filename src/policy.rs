//! # Retry/fallback policy
//!
//! Wraps a connector call so the engine always gets a [`SourceResult`],
//! never an error. Transient failures get a bounded linear backoff; on
//! exhaustion a registered fallback generator serves tagged sample data,
//! otherwise the failure is recorded as-is. This runs in a foreground
//! refresh path, so total backoff is capped at a few seconds.

use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};

use crate::connector::SourceConnector;
use crate::fallback::SampleGenerator;
use crate::normalize;
use crate::types::{Query, SourceResult};

/// Bounded retry configuration for one connector call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts after the first (0 = single try).
    pub attempts: u32,
    /// Base backoff; attempt `n` waits `n * backoff`.
    pub backoff: Duration,
    /// Hard cap on the summed backoff.
    pub max_total_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff: Duration::from_millis(500),
            max_total_backoff: Duration::from_secs(3),
        }
    }
}

/// Fetch through a connector under the retry policy, normalize, and always
/// return a result. This function never returns an error and never panics.
pub async fn fetch_with_policy(
    connector: &dyn SourceConnector,
    fallback: Option<&SampleGenerator>,
    query: &Query,
    policy: &RetryPolicy,
) -> SourceResult {
    let source_id = connector.name().to_string();
    let t0 = Instant::now();
    let mut waited = Duration::ZERO;
    let mut last_error = String::new();

    for attempt in 0..=policy.attempts {
        if attempt > 0 {
            let remaining = policy.max_total_backoff.saturating_sub(waited);
            let delay = (policy.backoff * attempt).min(remaining);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
                waited += delay;
            }
        }

        match connector.fetch(query).await {
            Ok(payload) => {
                let records = normalize::normalize(&source_id, connector.kind(), &payload);
                histogram!("fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
                tracing::debug!(
                    source = %source_id,
                    raw = payload.len(),
                    records = records.len(),
                    attempt,
                    "source fetch ok"
                );
                return SourceResult::ok(source_id, records);
            }
            Err(e) => {
                counter!("aggregate_source_errors_total").increment(1);
                tracing::warn!(source = %source_id, error = %e, attempt, "source fetch failed");
                last_error = e.to_string();
                if !e.is_retryable() || waited >= policy.max_total_backoff {
                    break;
                }
            }
        }
    }

    if let Some(generator) = fallback {
        counter!("aggregate_fallback_total").increment(1);
        tracing::info!(source = %source_id, "serving sample fallback data");
        return SourceResult::sample(source_id, generator.generate());
    }
    SourceResult::failed(source_id, last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{FeatureSet, RawPayload, SourceKind};
    use crate::error::ConnectorError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails `failures` times with the given error kind, then succeeds with
    /// an empty feature set.
    struct FlakyConnector {
        failures: usize,
        permanent: bool,
        calls: AtomicUsize,
    }

    impl FlakyConnector {
        fn transient(failures: usize) -> Self {
            Self {
                failures,
                permanent: false,
                calls: AtomicUsize::new(0),
            }
        }
        fn permanent() -> Self {
            Self {
                failures: usize::MAX,
                permanent: true,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SourceConnector for FlakyConnector {
        async fn fetch(&self, _query: &Query) -> Result<RawPayload, ConnectorError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                if self.permanent {
                    return Err(ConnectorError::Permanent {
                        status: 400,
                        message: "bad query".into(),
                    });
                }
                return Err(ConnectorError::Transient("connection refused".into()));
            }
            Ok(RawPayload::FeatureSet(FeatureSet::default()))
        }
        fn name(&self) -> &str {
            "flaky"
        }
        fn kind(&self) -> SourceKind {
            SourceKind::Traffic
        }
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            backoff: Duration::from_millis(1),
            max_total_backoff: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn transient_error_is_retried_then_succeeds() {
        let c = FlakyConnector::transient(1);
        let r = fetch_with_policy(&c, None, &Query::default(), &fast_policy(1)).await;
        assert!(r.success);
        assert!(!r.sample_data);
        assert_eq!(c.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let c = FlakyConnector::permanent();
        let r = fetch_with_policy(&c, None, &Query::default(), &fast_policy(3)).await;
        assert!(!r.success);
        assert_eq!(c.calls.load(Ordering::SeqCst), 1);
        assert!(r.error.as_deref().unwrap().contains("400"));
    }

    #[tokio::test]
    async fn exhausted_retries_without_fallback_fail_cleanly() {
        let c = FlakyConnector::transient(10);
        let r = fetch_with_policy(&c, None, &Query::default(), &fast_policy(1)).await;
        assert!(!r.success);
        assert!(r.records.is_empty());
        assert!(r.error.is_some());
        assert_eq!(c.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_with_fallback_serve_tagged_samples() {
        let c = FlakyConnector::transient(10);
        let fallback = SampleGenerator::TrafficStations { count: 10 };
        let r = fetch_with_policy(&c, Some(&fallback), &Query::default(), &fast_policy(1)).await;
        assert!(r.success);
        assert!(r.sample_data);
        assert_eq!(r.record_count, 10);
        assert!(r.error.is_none());
    }

    #[tokio::test]
    async fn zero_features_is_success_with_zero_records() {
        let c = FlakyConnector::transient(0);
        let r = fetch_with_policy(&c, None, &Query::default(), &fast_policy(0)).await;
        assert!(r.success);
        assert_eq!(r.record_count, 0);
        assert!(r.error.is_none());
    }
}
