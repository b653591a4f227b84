//! # Source connectors
//!
//! One connector per upstream query style: spatial feature-service query,
//! catalog keyword search, and static bulk download. Each knows exactly one
//! provider, carries its own timeout, and returns a tagged `RawPayload` for
//! the normalizer. No shared state beyond the HTTP call.

pub mod bulk_download;
pub mod feature_service;
pub mod open_data;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ConnectorError;
use crate::types::Query;

pub use bulk_download::BulkDownloadConnector;
pub use feature_service::FeatureServiceConnector;
pub use open_data::OpenDataSearchConnector;

/// What kind of entity a source yields. Used as the category fallback when
/// a record has no category attribute of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SourceKind {
    Traffic,
    Crime,
    ServiceRequests,
    Infrastructure,
    Catalog,
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Traffic => "TRAFFIC",
            SourceKind::Crime => "CRIME",
            SourceKind::ServiceRequests => "SERVICE_REQUEST",
            SourceKind::Infrastructure => "INFRASTRUCTURE",
            SourceKind::Catalog => "DATASET",
        }
    }
}

/// Point geometry as Esri feature services return it. Line/polygon payloads
/// deserialize too (extra keys ignored); their coordinates simply fail to
/// resolve to a point and the record keeps no location.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Geometry {
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub coordinates: Option<Value>,
}

impl Geometry {
    /// Resolve to `(lat, lon)` from explicit x/y first, then a
    /// coordinate-pair array (`[lon, lat]`).
    pub fn point(&self) -> Option<(f64, f64)> {
        if let (Some(x), Some(y)) = (self.x, self.y) {
            return Some((y, x));
        }
        let coords = self.coordinates.as_ref()?.as_array()?;
        if coords.len() >= 2 {
            let lon = coords[0].as_f64()?;
            let lat = coords[1].as_f64()?;
            return Some((lat, lon));
        }
        None
    }
}

/// One feature: free-form attributes plus optional geometry.
#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

/// Parsed feature-service response body.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    pub features: Vec<Feature>,
}

/// One dataset entry from a catalog search.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// Parsed catalog search response body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogPage {
    #[serde(default)]
    pub data: Vec<CatalogEntry>,
}

/// Parsed bulk CSV download: header row plus string cells.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// The three payload shapes providers hand back, tagged so the normalizer
/// never has to probe for structure.
#[derive(Debug, Clone)]
pub enum RawPayload {
    FeatureSet(FeatureSet),
    Catalog(CatalogPage),
    Table(Table),
}

impl RawPayload {
    /// Number of raw items before normalization.
    pub fn len(&self) -> usize {
        match self {
            RawPayload::FeatureSet(fs) => fs.features.len(),
            RawPayload::Catalog(c) => c.data.len(),
            RawPayload::Table(t) => t.rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Contract for a single upstream provider.
///
/// A fetch either yields a payload or a classified error; it must never
/// panic and must respect a bounded timeout. Callers go through the
/// retry/fallback policy, never through the connector directly.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    async fn fetch(&self, query: &Query) -> Result<RawPayload, ConnectorError>;

    /// Stable source identifier, also the cache namespace.
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;
}
