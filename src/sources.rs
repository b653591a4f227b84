//! # Provider registry
//!
//! The statically-known table of Miami-area providers: which endpoint each
//! source hits, which query style it speaks, and which fallback generator
//! covers it when the portal is down. Everything provider-specific lives
//! here or in the connectors; the engine only sees the registry.

use crate::aggregate::Source;
use crate::config::AggregatorConfig;
use crate::connector::{
    BulkDownloadConnector, FeatureServiceConnector, OpenDataSearchConnector, SourceKind,
};
use crate::fallback::SampleGenerator;

/// FDOT ArcGIS services root (traffic, signals, state roads).
pub const FDOT_SERVICES: &str =
    "https://services1.arcgis.com/O1JpcwDW8sjYuddV/arcgis/rest/services";

/// City of Miami ArcGIS services root (311, permits, parks).
pub const MIAMI_SERVICES: &str =
    "https://services1.arcgis.com/ORK0LGJlxR5Ek1d1/arcgis/rest/services";

/// Miami-Dade County ArcGIS services root (crime, emergency services).
pub const MDC_SERVICES: &str =
    "https://services1.arcgis.com/BjXcEDGHQhcNGHoP/arcgis/rest/services";

/// Miami-Dade open-data portal catalog API.
pub const MDC_PORTAL: &str = "https://gis-mdc.opendata.arcgis.com/api/v3";

/// Miami-Dade Socrata bulk CSV: crime incidents.
pub const MDC_CRIME_CSV: &str =
    "https://opendata.miamidade.gov/api/views/3t7d-5gn3/rows.csv?accessType=DOWNLOAD";

/// Miami-Dade Socrata bulk CSV: 311 service requests.
pub const MDC_311_CSV: &str =
    "https://opendata.miamidade.gov/api/views/dj6j-qg5t/rows.csv?accessType=DOWNLOAD";

fn feature_layer(root: &str, service: &str) -> String {
    format!("{root}/{service}/FeatureServer/0/query")
}

/// Build the default Miami source set with the configured HTTP timeouts.
/// Fallback generators are registered for the sources the dashboard cannot
/// do without (traffic counts, crime, 311); catalog search and
/// infrastructure layers fail plainly.
pub fn default_sources(config: &AggregatorConfig) -> Vec<Source> {
    let request = config.request_timeout();
    let bulk = config.bulk_timeout();
    vec![
        Source::new(
            FeatureServiceConnector::from_url(
                "fdot_traffic",
                SourceKind::Traffic,
                feature_layer(
                    FDOT_SERVICES,
                    "Real_Time_Traffic_Volume_and_Speed_Current_All_Directions_TDA",
                ),
            )
            .with_timeout(request),
        )
        .with_fallback(SampleGenerator::TrafficStations { count: 100 }),
        Source::new(
            FeatureServiceConnector::from_url(
                "fdot_signals",
                SourceKind::Infrastructure,
                feature_layer(FDOT_SERVICES, "Traffic_Signal_Locations_TDA"),
            )
            .with_timeout(request),
        ),
        Source::new(
            FeatureServiceConnector::from_url(
                "fdot_roads",
                SourceKind::Infrastructure,
                feature_layer(FDOT_SERVICES, "State_Roads_TDA"),
            )
            .with_timeout(request),
        ),
        Source::new(
            FeatureServiceConnector::from_url(
                "miami_311",
                SourceKind::ServiceRequests,
                feature_layer(MIAMI_SERVICES, "Miami_311_Service_Requests"),
            )
            .with_timeout(request),
        )
        .with_fallback(SampleGenerator::ServiceRequests { count: 300 }),
        Source::new(
            FeatureServiceConnector::from_url(
                "miami_permits",
                SourceKind::Infrastructure,
                feature_layer(MIAMI_SERVICES, "Building_Permits"),
            )
            .with_date_field("ISSUE_DATE")
            .with_timeout(request),
        ),
        Source::new(
            FeatureServiceConnector::from_url(
                "mdade_crime",
                SourceKind::Crime,
                feature_layer(MDC_SERVICES, "Crime_Data"),
            )
            .with_date_field("INCIDENT_DATE")
            .with_timeout(request),
        )
        .with_fallback(SampleGenerator::CrimeIncidents { count: 500 }),
        Source::new(
            OpenDataSearchConnector::from_url(
                "mdade_datasets",
                format!("{MDC_PORTAL}/datasets"),
                "crime",
            )
            .with_match_terms(["crime", "emergency", "police", "fire", "ems", "incident"])
            .with_timeout(request),
        ),
        Source::new(
            BulkDownloadConnector::from_url(
                "mdade_crime_archive",
                SourceKind::Crime,
                MDC_CRIME_CSV,
            )
            .with_timeout(bulk),
        ),
        Source::new(
            BulkDownloadConnector::from_url(
                "mdade_311_archive",
                SourceKind::ServiceRequests,
                MDC_311_CSV,
            )
            .with_timeout(bulk),
        ),
    ]
}
