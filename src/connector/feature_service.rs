//! ArcGIS FeatureServer connector: spatial envelope query against one layer.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::connector::{Feature, FeatureSet, RawPayload, SourceConnector, SourceKind};
use crate::error::ConnectorError;
use crate::types::Query;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Queries one feature-service layer (`.../FeatureServer/0/query`) with an
/// envelope filter and optional date-window clause on a configured field.
pub struct FeatureServiceConnector {
    name: String,
    kind: SourceKind,
    mode: Mode,
    /// Attribute used for `where` date filtering, e.g. `INCIDENT_DATE`.
    date_field: Option<String>,
}

enum Mode {
    /// Literal response body, for parser tests and offline runs.
    Fixture(String),
    Http {
        url: String,
        client: reqwest::Client,
        timeout: Duration,
    },
}

impl FeatureServiceConnector {
    pub fn from_url(name: impl Into<String>, kind: SourceKind, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            mode: Mode::Http {
                url: url.into(),
                client: reqwest::Client::new(),
                timeout: DEFAULT_TIMEOUT,
            },
            date_field: None,
        }
    }

    pub fn from_fixture(name: impl Into<String>, kind: SourceKind, body: &str) -> Self {
        Self {
            name: name.into(),
            kind,
            mode: Mode::Fixture(body.to_string()),
            date_field: None,
        }
    }

    pub fn with_date_field(mut self, field: impl Into<String>) -> Self {
        self.date_field = Some(field.into());
        self
    }

    pub fn with_timeout(mut self, t: Duration) -> Self {
        if let Mode::Http { timeout, .. } = &mut self.mode {
            *timeout = t;
        }
        self
    }

    fn query_params(&self, query: &Query) -> Vec<(String, String)> {
        let where_clause = match (&self.date_field, &query.window) {
            (Some(field), Some(w)) => format!(
                "{field} >= '{}' AND {field} <= '{}'",
                w.start.format("%Y-%m-%d"),
                w.end.format("%Y-%m-%d"),
            ),
            _ => "1=1".to_string(),
        };

        let mut params = vec![
            ("where".to_string(), where_clause),
            ("outFields".to_string(), "*".to_string()),
            ("f".to_string(), "json".to_string()),
            ("returnGeometry".to_string(), "true".to_string()),
        ];
        if let Some(bbox) = &query.bbox {
            params.push(("geometry".to_string(), bbox.envelope_param()));
            params.push(("geometryType".to_string(), "esriGeometryEnvelope".to_string()));
            params.push((
                "spatialRel".to_string(),
                "esriSpatialRelIntersects".to_string(),
            ));
        }
        if let Some(limit) = query.limit {
            params.push(("resultRecordCount".to_string(), limit.to_string()));
        }
        params
    }

    /// Feature services report their own errors inside a 200 body, so both
    /// paths are handled here.
    fn parse_body(body: &str) -> Result<RawPayload, ConnectorError> {
        #[derive(Deserialize)]
        struct EsriError {
            #[serde(default)]
            code: Option<u16>,
            #[serde(default)]
            message: Option<String>,
        }
        #[derive(Deserialize)]
        struct EsriResponse {
            #[serde(default)]
            error: Option<EsriError>,
            #[serde(default)]
            features: Option<Vec<Feature>>,
        }

        let resp: EsriResponse = serde_json::from_str(body)
            .map_err(|e| ConnectorError::Parse(format!("feature service json: {e}")))?;

        if let Some(err) = resp.error {
            let message = err.message.unwrap_or_else(|| "feature service error".into());
            return Err(ConnectorError::from_status(err.code.unwrap_or(500), message));
        }

        // A present-but-empty feature array is a legitimate "no data in
        // range" answer, not a failure.
        let features = resp
            .features
            .ok_or_else(|| ConnectorError::Parse("response has no features array".into()))?;
        Ok(RawPayload::FeatureSet(FeatureSet { features }))
    }
}

#[async_trait]
impl SourceConnector for FeatureServiceConnector {
    async fn fetch(&self, query: &Query) -> Result<RawPayload, ConnectorError> {
        match &self.mode {
            Mode::Fixture(body) => Self::parse_body(body),
            Mode::Http {
                url,
                client,
                timeout,
            } => {
                let resp = client
                    .get(url)
                    .query(&self.query_params(query))
                    .timeout(*timeout)
                    .send()
                    .await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(ConnectorError::from_status(
                        status.as_u16(),
                        format!("{} query failed", self.name),
                    ));
                }
                let body = resp.text().await?;
                Self::parse_body(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }
}
