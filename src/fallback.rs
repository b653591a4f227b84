//! # Fallback sample data
//!
//! Deterministic synthetic record sets served when a live source stays
//! unreachable after retries. Every record carries a `sample` attribute and
//! the serving `SourceResult` is flagged `sample_data`, so dashboards can
//! tell live, sample, and failed sources apart.
//!
//! The shapes mirror the real datasets: crime incidents, 311 service
//! requests, and traffic count stations around Coral Gables.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Record, Scalar};

const CRIME_TYPES: &[&str] = &["THEFT", "BURGLARY", "ASSAULT", "VANDALISM", "ROBBERY"];
const CRIME_STATUSES: &[&str] = &["CLOSED", "OPEN", "PENDING"];
const SERVICE_TYPES: &[&str] = &[
    "POTHOLE",
    "STREETLIGHT_OUT",
    "GRAFFITI",
    "TRASH_COLLECTION",
    "NOISE_COMPLAINT",
];
const SERVICE_STATUSES: &[&str] = &["OPEN", "IN_PROGRESS", "CLOSED", "PENDING"];
const PRIORITIES: &[&str] = &["HIGH", "MEDIUM", "LOW"];
const DEPARTMENTS: &[&str] = &["PUBLIC_WORKS", "UTILITIES", "POLICE", "FIRE"];
const ROUTES: &[&str] = &["US-1", "I-95", "SR-826", "US-41"];
const SPEED_LIMITS: &[i64] = &[35, 45, 55, 65];

/// Deterministic generator for one source's synthetic records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleGenerator {
    CrimeIncidents { count: usize },
    ServiceRequests { count: usize },
    TrafficStations { count: usize },
}

impl SampleGenerator {
    /// Same input, same output; cache comparisons and tests rely on it.
    pub fn generate(&self) -> Vec<Record> {
        match self {
            SampleGenerator::CrimeIncidents { count } => (0..*count).map(crime_record).collect(),
            SampleGenerator::ServiceRequests { count } => {
                (0..*count).map(service_record).collect()
            }
            SampleGenerator::TrafficStations { count } => {
                (0..*count).map(traffic_record).collect()
            }
        }
    }
}

fn observed(i: usize) -> Option<chrono::DateTime<Utc>> {
    NaiveDate::from_ymd_opt(2024, 1, 1)?
        .checked_add_days(Days::new(i as u64))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| Utc.from_utc_datetime(&ndt))
}

fn tagged(mut attrs: BTreeMap<String, Scalar>) -> BTreeMap<String, Scalar> {
    attrs.insert("sample".to_string(), Scalar::Bool(true));
    attrs
}

fn crime_record(i: usize) -> Record {
    let mut attrs = BTreeMap::new();
    attrs.insert(
        "location".to_string(),
        Scalar::Str(format!("CORAL GABLES AREA {}", i % 50)),
    );
    attrs.insert(
        "status".to_string(),
        Scalar::Str(CRIME_STATUSES[i % CRIME_STATUSES.len()].to_string()),
    );
    attrs.insert(
        "district".to_string(),
        Scalar::Str(format!("DISTRICT_{}", (i % 5) + 1)),
    );
    Record {
        id: format!("CRM{}", 2024000001 + i),
        category: CRIME_TYPES[i % CRIME_TYPES.len()].to_string(),
        attributes: tagged(attrs),
        latitude: Some(25.721 + (i % 100) as f64 * 0.001),
        longitude: Some(-80.268 + (i % 100) as f64 * 0.001),
        observed_at: observed(i),
    }
}

fn service_record(i: usize) -> Record {
    let service_type = SERVICE_TYPES[i % SERVICE_TYPES.len()];
    let mut attrs = BTreeMap::new();
    attrs.insert(
        "description".to_string(),
        Scalar::Str(format!("Service request for {service_type}")),
    );
    attrs.insert(
        "status".to_string(),
        Scalar::Str(SERVICE_STATUSES[i % SERVICE_STATUSES.len()].to_string()),
    );
    attrs.insert(
        "priority".to_string(),
        Scalar::Str(PRIORITIES[i % PRIORITIES.len()].to_string()),
    );
    attrs.insert(
        "assigned_dept".to_string(),
        Scalar::Str(DEPARTMENTS[i % DEPARTMENTS.len()].to_string()),
    );
    Record {
        id: format!("311{}", 202400001 + i),
        category: service_type.to_string(),
        attributes: tagged(attrs),
        latitude: Some(25.721 + (i % 50) as f64 * 0.002),
        longitude: Some(-80.268 + (i % 50) as f64 * 0.002),
        observed_at: observed(i),
    }
}

fn traffic_record(i: usize) -> Record {
    let mut attrs = BTreeMap::new();
    attrs.insert(
        "route".to_string(),
        Scalar::Str(ROUTES[i % ROUTES.len()].to_string()),
    );
    attrs.insert(
        "location_desc".to_string(),
        Scalar::Str(format!("Mile Marker {i}")),
    );
    attrs.insert(
        "daily_traffic".to_string(),
        Scalar::Int(15_000 + i as i64 * 100),
    );
    attrs.insert(
        "peak_hour_volume".to_string(),
        Scalar::Int(1_200 + i as i64 * 10),
    );
    attrs.insert(
        "speed_limit".to_string(),
        Scalar::Int(SPEED_LIMITS[i % SPEED_LIMITS.len()]),
    );
    Record {
        id: format!("FDOT_{}", 1000 + i),
        category: "TRAFFIC_COUNT".to_string(),
        attributes: tagged(attrs),
        latitude: Some(25.721 + (i % 20) as f64 * 0.005),
        longitude: Some(-80.268 + (i % 20) as f64 * 0.005),
        observed_at: observed(i),
    }
}
