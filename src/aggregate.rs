//! # Aggregation engine
//!
//! Orchestrates every registered source for one request: cache check, then
//! a concurrent fetch-with-policy per miss, then one merged result with a
//! derived summary. An engine instance owns its cache store and connector
//! registry; there is no ambient global state.
//!
//! Partial results are the expected common case: one source failing,
//! timing out, or serving fallback data never aborts the run.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use metrics::{counter, gauge};
use tokio::task::JoinSet;

use crate::cache::CacheStore;
use crate::config::AggregatorConfig;
use crate::connector::SourceConnector;
use crate::fallback::SampleGenerator;
use crate::metrics::ensure_metrics_described;
use crate::policy::{fetch_with_policy, RetryPolicy};
use crate::types::{AggregateResult, Query, SourceResult, Summary};

/// One registered provider: connector plus optional fallback generator.
/// The connector's name doubles as the source id and cache namespace.
pub struct Source {
    connector: Arc<dyn SourceConnector>,
    fallback: Option<SampleGenerator>,
}

impl Source {
    pub fn new(connector: impl SourceConnector + 'static) -> Self {
        Self {
            connector: Arc::new(connector),
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, generator: SampleGenerator) -> Self {
        self.fallback = Some(generator);
        self
    }

    pub fn id(&self) -> &str {
        self.connector.name()
    }
}

/// The aggregation engine. Construct once, register sources, call
/// [`Aggregator::aggregate`] as often as needed. The cache is the only
/// state that persists across calls.
pub struct Aggregator {
    cache: Arc<CacheStore>,
    sources: Vec<Arc<Source>>,
    policy: RetryPolicy,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> anyhow::Result<Self> {
        let cache = CacheStore::open(&config.cache_dir)?;
        Ok(Self {
            cache: Arc::new(cache),
            sources: Vec::new(),
            policy: config.retry_policy(),
            config,
        })
    }

    /// Register a source. A source registered twice under the same id
    /// replaces the earlier registration.
    pub fn register(&mut self, source: Source) {
        self.sources.retain(|s| s.id() != source.id());
        self.sources.push(Arc::new(source));
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.id().to_string()).collect()
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Query scoped to the configured default area of interest.
    pub fn default_query(&self) -> Query {
        Query::for_bbox(self.config.default_bbox)
    }

    /// Aggregate with default options (cache honored).
    pub async fn aggregate(&self, query: &Query) -> AggregateResult {
        self.aggregate_opts(query, false).await
    }

    /// Run one aggregation. Always returns exactly one [`SourceResult`] per
    /// registered source; never raises.
    pub async fn aggregate_opts(&self, query: &Query, force_refresh: bool) -> AggregateResult {
        ensure_metrics_described();
        counter!("aggregate_runs_total").increment(1);
        let queried_at = Utc::now();

        // An invalid query is reported per source, not raised, so callers
        // see the same shape as any other failed run.
        if let Err(e) = query.validate() {
            tracing::warn!(error = %e, "rejecting invalid query");
            let per_source: HashMap<String, SourceResult> = self
                .sources
                .iter()
                .map(|s| {
                    (
                        s.id().to_string(),
                        SourceResult::failed(s.id(), format!("invalid query: {e}")),
                    )
                })
                .collect();
            let summary = Summary::from_sources(&per_source);
            return AggregateResult {
                queried_at,
                per_source,
                summary,
            };
        }

        let mut per_source: HashMap<String, SourceResult> = HashMap::new();
        let mut tasks: JoinSet<(String, String, SourceResult)> = JoinSet::new();

        for source in &self.sources {
            let key = CacheStore::key(source.id(), query);
            if !force_refresh {
                if let Some(hit) = self.cache.get(&key, self.config.freshness()) {
                    counter!("aggregate_cache_hits_total").increment(1);
                    tracing::debug!(source = source.id(), "serving cached result");
                    per_source.insert(hit.source_id.clone(), hit);
                    continue;
                }
            }
            counter!("aggregate_cache_misses_total").increment(1);

            let source = Arc::clone(source);
            let query = query.clone();
            let policy = self.policy;
            let source_timeout = self.config.source_timeout();
            tasks.spawn(async move {
                let id = source.id().to_string();
                let result = match tokio::time::timeout(
                    source_timeout,
                    fetch_with_policy(
                        source.connector.as_ref(),
                        source.fallback.as_ref(),
                        &query,
                        &policy,
                    ),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => SourceResult::failed(
                        id.clone(),
                        format!("source timed out after {}s", source_timeout.as_secs()),
                    ),
                };
                (id, key, result)
            });
        }

        // Join everything under the whole-call deadline; whatever has not
        // resolved by then is abandoned and reported as failed.
        let deadline = tokio::time::Instant::now() + self.config.aggregate_timeout();
        while !tasks.is_empty() {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((id, key, result)))) => {
                    if result.success && !result.sample_data {
                        if let Err(e) = self.cache.put(&key, &result) {
                            tracing::warn!(source = %id, error = %e, "cache write failed");
                        }
                    }
                    per_source.insert(id, result);
                }
                Ok(Some(Err(join_err))) => {
                    tracing::warn!(error = %join_err, "source task aborted");
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!("aggregate deadline exceeded; abandoning pending sources");
                    tasks.abort_all();
                    break;
                }
            }
        }

        // Anything still missing (deadline hit or task panic) gets an
        // explicit failed result so the caller sees every source.
        for source in &self.sources {
            if !per_source.contains_key(source.id()) {
                per_source.insert(
                    source.id().to_string(),
                    SourceResult::failed(
                        source.id(),
                        "aggregate deadline exceeded before source completed",
                    ),
                );
            }
        }

        let summary = Summary::from_sources(&per_source);
        counter!("aggregate_records_total").increment(summary.total_records as u64);
        gauge!("aggregate_last_run_ts").set(queried_at.timestamp() as f64);
        tracing::info!(
            total_records = summary.total_records,
            successful = summary.successful_sources,
            total = summary.total_sources,
            force_refresh,
            "aggregation run complete"
        );

        AggregateResult {
            queried_at,
            per_source,
            summary,
        }
    }
}
