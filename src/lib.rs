//! # LocalPulse Aggregator
//!
//! Resilient aggregation of Miami-area civic and geospatial open data.
//! Fetches traffic, crime, 311, and infrastructure datasets from
//! independently-operated portals (ArcGIS feature services, open-data
//! catalogs, Socrata bulk downloads), normalizes the heterogeneous payloads
//! into one canonical record shape, and caches per-source responses with a
//! bounded-staleness window.
//!
//! Design in one paragraph: each provider gets a [`connector`] that speaks
//! its query style; the [`policy`] layer wraps every fetch in bounded retry
//! plus optional sample-data fallback so the engine always gets a
//! `SourceResult`; the [`aggregate`] engine runs all sources concurrently,
//! serves fresh entries from the [`cache`], and derives a summary per run.
//! Partial failure is the normal case, not an exception path.
//!
//! This is an outbound client library only. Dashboards, maps, and CLIs
//! live elsewhere and consume [`types::AggregateResult`] (or the flat
//! [`tabular`] projection).

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod connector;
pub mod error;
pub mod fallback;
pub mod metrics;
pub mod normalize;
pub mod policy;
pub mod sources;
pub mod tabular;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::aggregate::{Aggregator, Source};
pub use crate::cache::CacheStore;
pub use crate::config::AggregatorConfig;
pub use crate::error::ConnectorError;
pub use crate::fallback::SampleGenerator;
pub use crate::policy::{fetch_with_policy, RetryPolicy};
pub use crate::types::{
    AggregateResult, BoundingBox, DateWindow, Query, Record, Scalar, SourceResult, Summary,
};

/// Build an engine with the default Miami source registry and configuration
/// loaded from the usual config locations.
pub fn default_aggregator() -> anyhow::Result<Aggregator> {
    let config = AggregatorConfig::load_default()?;
    let sources = sources::default_sources(&config);
    let mut agg = Aggregator::new(config)?;
    for source in sources {
        agg.register(source);
    }
    Ok(agg)
}
