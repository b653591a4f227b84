//! # Canonical data model
//!
//! Provider-agnostic shapes shared by the whole crate: the query that goes
//! out, the records that come back, and the per-run aggregate. Everything is
//! serde-serializable because cache entries and downstream consumers both
//! read these as JSON.

use std::collections::{BTreeMap, HashMap};

use anyhow::{ensure, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Rectangular geographic filter in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BoundingBox {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Default area of interest: Coral Gables.
    pub fn coral_gables() -> Self {
        Self::new(-80.30, 25.70, -80.25, 25.75)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.xmin < self.xmax, "bbox xmin must be < xmax");
        ensure!(self.ymin < self.ymax, "bbox ymin must be < ymax");
        Ok(())
    }

    /// Esri envelope parameter: `xmin,ymin,xmax,ymax`.
    pub fn envelope_param(&self) -> String {
        format!("{},{},{},{}", self.xmin, self.ymin, self.xmax, self.ymax)
    }
}

/// Inclusive date window applied to providers that support date filtering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// One aggregation request: optional spatial filter, optional time window,
/// optional result limit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    #[serde(default)]
    pub window: Option<DateWindow>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl Query {
    pub fn for_bbox(bbox: BoundingBox) -> Self {
        Self {
            bbox: Some(bbox),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(b) = &self.bbox {
            b.validate()?;
        }
        if let Some(w) = &self.window {
            ensure!(w.start <= w.end, "date window start must be <= end");
        }
        Ok(())
    }

    /// Canonical string used for cache keying. Coordinates are fixed to six
    /// decimal places so float formatting noise cannot split equivalent
    /// queries into separate entries.
    pub fn cache_fingerprint(&self) -> String {
        let bbox = self.bbox.map(|b| {
            format!(
                "{:.6},{:.6},{:.6},{:.6}",
                b.xmin, b.ymin, b.xmax, b.ymax
            )
        });
        let window = self
            .window
            .map(|w| format!("{}..{}", w.start, w.end));
        format!(
            "bbox={};window={};limit={}",
            bbox.as_deref().unwrap_or("none"),
            window.as_deref().unwrap_or("none"),
            self.limit.map_or("none".to_string(), |l| l.to_string()),
        )
    }
}

/// A single attribute value. Providers hand back mixed JSON and CSV cells;
/// everything collapses to one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Null,
}

impl Scalar {
    /// Numeric view, including numeric strings from CSV payloads.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::Str(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(i) => Some(*i),
            Scalar::Str(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Textual rendering for ids and tabular cells.
    pub fn display(&self) -> String {
        match self {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Str(s) => s.clone(),
            Scalar::Null => String::new(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

/// Canonical, provider-agnostic representation of one data item.
///
/// Invariant: `latitude` and `longitude` are present together or not at all,
/// and range-valid when present. The normalizer enforces this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub category: String,
    pub attributes: BTreeMap<String, Scalar>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
}

impl Record {
    pub fn has_location(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Outcome of one source for one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResult {
    pub source_id: String,
    pub success: bool,
    /// True when the records are deterministic fallback data, not live.
    #[serde(default)]
    pub sample_data: bool,
    pub records: Vec<Record>,
    pub error: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub record_count: usize,
}

impl SourceResult {
    pub fn ok(source_id: impl Into<String>, records: Vec<Record>) -> Self {
        let record_count = records.len();
        Self {
            source_id: source_id.into(),
            success: true,
            sample_data: false,
            records,
            error: None,
            fetched_at: Utc::now(),
            record_count,
        }
    }

    pub fn sample(source_id: impl Into<String>, records: Vec<Record>) -> Self {
        let mut r = Self::ok(source_id, records);
        r.sample_data = true;
        r
    }

    pub fn failed(source_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            success: false,
            sample_data: false,
            records: Vec::new(),
            error: Some(error.into()),
            fetched_at: Utc::now(),
            record_count: 0,
        }
    }
}

/// Run-level roll-up, fully derived from `per_source` each call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_records: usize,
    pub successful_sources: usize,
    pub total_sources: usize,
}

impl Summary {
    pub fn from_sources(per_source: &HashMap<String, SourceResult>) -> Self {
        let mut total_records = 0;
        let mut successful_sources = 0;
        for r in per_source.values() {
            if r.success {
                successful_sources += 1;
                total_records += r.record_count;
            }
        }
        Self {
            total_records,
            successful_sources,
            total_sources: per_source.len(),
        }
    }

    /// Percentage string in the dashboard's format, e.g. `"66.7%"`.
    pub fn success_rate(&self) -> String {
        if self.total_sources == 0 {
            return "0.0%".to_string();
        }
        format!(
            "{:.1}%",
            self.successful_sources as f64 / self.total_sources as f64 * 100.0
        )
    }
}

/// The unified output of one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub queried_at: DateTime<Utc>,
    pub per_source: HashMap<String, SourceResult>,
    pub summary: Summary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_validation_rejects_inverted_corners() {
        assert!(BoundingBox::new(-80.25, 25.70, -80.30, 25.75)
            .validate()
            .is_err());
        assert!(BoundingBox::coral_gables().validate().is_ok());
    }

    #[test]
    fn fingerprint_is_stable_across_equivalent_queries() {
        let a = Query::for_bbox(BoundingBox::new(-80.30, 25.70, -80.25, 25.75));
        let b = Query::for_bbox(BoundingBox::new(-80.3, 25.7, -80.25, 25.75));
        assert_eq!(a.cache_fingerprint(), b.cache_fingerprint());
    }

    #[test]
    fn fingerprint_separates_distinct_bboxes() {
        let a = Query::for_bbox(BoundingBox::new(-80.30, 25.70, -80.25, 25.75));
        let b = Query::for_bbox(BoundingBox::new(-80.31, 25.70, -80.25, 25.75));
        assert_ne!(a.cache_fingerprint(), b.cache_fingerprint());
    }

    #[test]
    fn summary_counts_only_successes() {
        let mut per_source = HashMap::new();
        per_source.insert("a".to_string(), SourceResult::ok("a", Vec::new()));
        per_source.insert(
            "b".to_string(),
            SourceResult::failed("b", "connection refused"),
        );
        let s = Summary::from_sources(&per_source);
        assert_eq!(s.successful_sources, 1);
        assert_eq!(s.total_sources, 2);
        assert_eq!(s.total_records, 0);
        assert_eq!(s.success_rate(), "50.0%");
    }

    #[test]
    fn failed_result_has_empty_records_and_error() {
        let r = SourceResult::failed("fdot_traffic", "timed out");
        assert!(!r.success);
        assert!(r.records.is_empty());
        assert_eq!(r.record_count, 0);
        assert!(r.error.as_deref().unwrap_or("").contains("timed out"));
    }

    #[test]
    fn scalar_roundtrips_and_parses_numeric_strings() {
        let s: Scalar = serde_json::from_str("42").unwrap();
        assert_eq!(s, Scalar::Int(42));
        let s: Scalar = serde_json::from_str("null").unwrap();
        assert!(s.is_null());
        assert_eq!(Scalar::Str(" 25.72 ".into()).as_f64(), Some(25.72));
    }
}
