//! # Normalizer
//!
//! Flattens the three provider payload shapes into canonical [`Record`]s.
//! All alias probing is confined here: connectors stay statically typed and
//! the engine never inspects provider fields.
//!
//! Geometry resolution order per record:
//! 1. explicit point geometry x/y,
//! 2. coordinate-pair array `[lon, lat]`,
//! 3. named attribute aliases (case-insensitive).
//!
//! A record that resolves no geometry is kept with coordinates absent;
//! attribute-only analytics remain valid downstream.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::connector::{RawPayload, SourceKind};
use crate::types::{Record, Scalar};

const LAT_ALIASES: &[&str] = &["lat", "latitude", "y"];
const LON_ALIASES: &[&str] = &["lon", "long", "longitude", "x"];
const ID_ALIASES: &[&str] = &[
    "objectid",
    "incident_id",
    "request_id",
    "station_id",
    "permit_number",
    "id",
];
const CATEGORY_ALIASES: &[&str] = &[
    "incident_type",
    "service_type",
    "permit_type",
    "type",
    "category",
];
const DATE_ALIASES: &[&str] = &[
    "incident_date",
    "request_date",
    "issue_date",
    "last_updated",
    "modified",
    "observed_at",
    "date",
];

/// Convert one provider payload into canonical records. Provider order is
/// preserved; nothing is dropped.
pub fn normalize(source_id: &str, kind: SourceKind, payload: &RawPayload) -> Vec<Record> {
    match payload {
        RawPayload::FeatureSet(fs) => fs
            .features
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let attrs = lower_attrs(&f.attributes);
                let point = f
                    .geometry
                    .as_ref()
                    .and_then(|g| g.point())
                    .filter(|&(lat, lon)| valid_pair(lat, lon))
                    .or_else(|| alias_point(&attrs));
                build_record(source_id, kind, i, attrs, point)
            })
            .collect(),
        RawPayload::Catalog(page) => page
            .data
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let mut attrs = lower_attrs(&entry.attributes);
                if let Some(id) = &entry.id {
                    attrs
                        .entry("id".to_string())
                        .or_insert_with(|| Scalar::Str(id.clone()));
                }
                let point = alias_point(&attrs);
                build_record(source_id, kind, i, attrs, point)
            })
            .collect(),
        RawPayload::Table(table) => table
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let mut attrs = BTreeMap::new();
                for (h, cell) in table.headers.iter().zip(row.iter()) {
                    let key = h.trim().to_lowercase();
                    if key.is_empty() {
                        continue;
                    }
                    attrs.insert(key, Scalar::Str(cell.clone()));
                }
                let point = alias_point(&attrs);
                build_record(source_id, kind, i, attrs, point)
            })
            .collect(),
    }
}

fn build_record(
    source_id: &str,
    kind: SourceKind,
    index: usize,
    attributes: BTreeMap<String, Scalar>,
    point: Option<(f64, f64)>,
) -> Record {
    let id = probe(&attributes, ID_ALIASES)
        .map(|s| s.display())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("{source_id}-{index}"));
    let category = probe(&attributes, CATEGORY_ALIASES)
        .map(|s| s.display())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| kind.label().to_string());
    let observed_at = probe(&attributes, DATE_ALIASES).and_then(parse_observed_at);
    let (latitude, longitude) = match point {
        Some((lat, lon)) => (Some(lat), Some(lon)),
        None => (None, None),
    };
    Record {
        id,
        category,
        attributes,
        latitude,
        longitude,
        observed_at,
    }
}

fn lower_attrs(attrs: &serde_json::Map<String, Value>) -> BTreeMap<String, Scalar> {
    attrs
        .iter()
        .map(|(k, v)| (k.trim().to_lowercase(), scalar_from_value(v)))
        .collect()
}

/// Nested structures flatten to their JSON text; everything analytic stays
/// a typed scalar.
fn scalar_from_value(v: &Value) -> Scalar {
    match v {
        Value::Null => Scalar::Null,
        Value::Bool(b) => Scalar::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Scalar::Int(i)
            } else {
                Scalar::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => Scalar::Str(s.clone()),
        other => Scalar::Str(other.to_string()),
    }
}

fn probe<'a>(attrs: &'a BTreeMap<String, Scalar>, aliases: &[&str]) -> Option<&'a Scalar> {
    aliases
        .iter()
        .find_map(|a| attrs.get(*a))
        .filter(|s| !s.is_null())
}

/// Step 3 of geometry resolution: lat/lon attribute aliases.
fn alias_point(attrs: &BTreeMap<String, Scalar>) -> Option<(f64, f64)> {
    let lat = probe(attrs, LAT_ALIASES)?.as_f64()?;
    let lon = probe(attrs, LON_ALIASES)?.as_f64()?;
    if valid_pair(lat, lon) {
        Some((lat, lon))
    } else {
        None
    }
}

/// Range-valid and not the (0, 0) null-island placeholder providers emit
/// for unknown locations.
fn valid_pair(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
        && !(lat == 0.0 && lon == 0.0)
}

fn parse_observed_at(s: &Scalar) -> Option<DateTime<Utc>> {
    match s {
        // Feature services encode dates as epoch milliseconds.
        Scalar::Int(i) => {
            let ms = if *i > 100_000_000_000 {
                *i
            } else {
                i.checked_mul(1000)?
            };
            Utc.timestamp_millis_opt(ms).single()
        }
        Scalar::Str(text) => {
            let t = text.trim();
            if t.is_empty() {
                return None;
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(ndt) = NaiveDateTime::parse_from_str(t, "%Y-%m-%d %H:%M:%S") {
                return Some(Utc.from_utc_datetime(&ndt));
            }
            for fmt in ["%Y-%m-%d", "%m/%d/%Y"] {
                if let Ok(d) = NaiveDate::parse_from_str(t, fmt) {
                    return d.and_hms_opt(0, 0, 0).map(|ndt| Utc.from_utc_datetime(&ndt));
                }
            }
            // Numeric strings from CSV cells.
            t.parse::<i64>()
                .ok()
                .and_then(|i| parse_observed_at(&Scalar::Int(i)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{Feature, FeatureSet, Geometry, Table};
    use serde_json::json;

    fn feature(attrs: Value, geometry: Option<Geometry>) -> Feature {
        Feature {
            attributes: attrs.as_object().cloned().unwrap_or_default(),
            geometry,
        }
    }

    fn one_feature(attrs: Value, geometry: Option<Geometry>) -> Record {
        let payload = RawPayload::FeatureSet(FeatureSet {
            features: vec![feature(attrs, geometry)],
        });
        normalize("test_src", SourceKind::Crime, &payload).remove(0)
    }

    #[test]
    fn explicit_xy_beats_attribute_aliases() {
        let r = one_feature(
            json!({"OBJECTID": 7, "LATITUDE": 10.0, "LONGITUDE": 10.0}),
            Some(Geometry {
                x: Some(-80.27),
                y: Some(25.72),
                coordinates: None,
            }),
        );
        assert_eq!(r.latitude, Some(25.72));
        assert_eq!(r.longitude, Some(-80.27));
    }

    #[test]
    fn attribute_aliases_resolve_case_insensitively() {
        let r = one_feature(json!({"Lat": "25.71", "LONG": "-80.26"}), None);
        assert_eq!(r.latitude, Some(25.71));
        assert_eq!(r.longitude, Some(-80.26));
    }

    #[test]
    fn record_without_geometry_is_kept() {
        let r = one_feature(json!({"INCIDENT_TYPE": "THEFT"}), None);
        assert_eq!(r.latitude, None);
        assert_eq!(r.longitude, None);
        assert_eq!(r.category, "THEFT");
    }

    #[test]
    fn half_present_pair_clears_both() {
        let r = one_feature(json!({"LATITUDE": 25.72}), None);
        assert!(!r.has_location());
    }

    #[test]
    fn out_of_range_coordinates_are_dropped() {
        let r = one_feature(json!({"LATITUDE": 95.0, "LONGITUDE": -80.26}), None);
        assert!(!r.has_location());
    }

    #[test]
    fn zero_zero_is_treated_as_absent() {
        let r = one_feature(
            json!({}),
            Some(Geometry {
                x: Some(0.0),
                y: Some(0.0),
                coordinates: None,
            }),
        );
        assert!(!r.has_location());
    }

    #[test]
    fn attribute_keys_are_lowercased_and_values_typed() {
        let r = one_feature(
            json!({"INCIDENT_TYPE": "THEFT", "DISTRICT": 3, "Closed": true}),
            None,
        );
        assert_eq!(r.attributes.get("incident_type"), Some(&Scalar::Str("THEFT".into())));
        assert_eq!(r.attributes.get("district"), Some(&Scalar::Int(3)));
        assert_eq!(r.attributes.get("closed"), Some(&Scalar::Bool(true)));
    }

    #[test]
    fn id_falls_back_to_source_and_index() {
        let r = one_feature(json!({"foo": "bar"}), None);
        assert_eq!(r.id, "test_src-0");
    }

    #[test]
    fn epoch_millis_date_parses() {
        let r = one_feature(json!({"INCIDENT_DATE": 1704067200000_i64}), None);
        assert_eq!(
            r.observed_at.unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn extreme_epoch_values_yield_no_timestamp() {
        let r = one_feature(json!({"INCIDENT_DATE": i64::MIN}), None);
        assert!(r.observed_at.is_none());
        let r = one_feature(json!({"INCIDENT_DATE": i64::MAX}), None);
        assert!(r.observed_at.is_none());
    }

    #[test]
    fn csv_rows_normalize_and_preserve_order() {
        let payload = RawPayload::Table(Table {
            headers: vec!["REQUEST_ID".into(), "SERVICE_TYPE".into(), "LATITUDE".into(), "LONGITUDE".into()],
            rows: vec![
                vec!["311001".into(), "POTHOLE".into(), "25.721".into(), "-80.268".into()],
                vec!["311002".into(), "GRAFFITI".into(), "".into(), "".into()],
            ],
        });
        let recs = normalize("miami_311", SourceKind::ServiceRequests, &payload);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].id, "311001");
        assert_eq!(recs[0].category, "POTHOLE");
        assert!(recs[0].has_location());
        assert_eq!(recs[1].id, "311002");
        assert!(!recs[1].has_location());
    }

    #[test]
    fn catalog_entries_use_portal_id_and_kind_label() {
        let payload = RawPayload::Catalog(crate::connector::CatalogPage {
            data: vec![crate::connector::CatalogEntry {
                id: Some("abc1".into()),
                attributes: json!({"name": "Crime Incidents", "modified": "2024-03-01"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            }],
        });
        let recs = normalize("mdade_datasets", SourceKind::Catalog, &payload);
        assert_eq!(recs[0].id, "abc1");
        assert_eq!(recs[0].category, "DATASET");
        assert!(recs[0].observed_at.is_some());
    }
}
