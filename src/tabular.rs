//! Tabular projection for the visualization layer.
//!
//! Groups canonical records by source into flat tables whose columns are
//! the fixed record fields plus the union of attribute keys seen in that
//! source. A thin transform over [`AggregateResult`]; the aggregation core
//! does not depend on it.

use serde::{Deserialize, Serialize};

use crate::types::{AggregateResult, Record, Scalar};

/// Column names always present, before the per-source attribute union.
const FIXED_COLUMNS: &[&str] = &["id", "category", "latitude", "longitude", "observed_at"];

/// One source's records as a flat table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularDataset {
    pub source_id: String,
    pub sample_data: bool,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

/// Project every successful source into a table. Sources are ordered by id
/// so the output is stable; failed sources are skipped (they have no rows).
pub fn by_source(result: &AggregateResult) -> Vec<TabularDataset> {
    let mut sources: Vec<_> = result
        .per_source
        .values()
        .filter(|r| r.success)
        .collect();
    sources.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    sources
        .into_iter()
        .map(|sr| {
            let mut attr_keys: Vec<String> = sr
                .records
                .iter()
                .flat_map(|r| r.attributes.keys().cloned())
                .collect();
            attr_keys.sort_unstable();
            attr_keys.dedup();

            let columns: Vec<String> = FIXED_COLUMNS
                .iter()
                .map(|c| c.to_string())
                .chain(attr_keys.iter().cloned())
                .collect();

            let rows = sr
                .records
                .iter()
                .map(|r| row_for(r, &attr_keys))
                .collect();

            TabularDataset {
                source_id: sr.source_id.clone(),
                sample_data: sr.sample_data,
                columns,
                rows,
            }
        })
        .collect()
}

fn row_for(record: &Record, attr_keys: &[String]) -> Vec<Scalar> {
    let mut row = Vec::with_capacity(FIXED_COLUMNS.len() + attr_keys.len());
    row.push(Scalar::Str(record.id.clone()));
    row.push(Scalar::Str(record.category.clone()));
    row.push(record.latitude.map_or(Scalar::Null, Scalar::Float));
    row.push(record.longitude.map_or(Scalar::Null, Scalar::Float));
    row.push(
        record
            .observed_at
            .map_or(Scalar::Null, |t| Scalar::Str(t.to_rfc3339())),
    );
    for key in attr_keys {
        row.push(record.attributes.get(key).cloned().unwrap_or(Scalar::Null));
    }
    row
}
