//! Open-data portal connector: keyword search over a dataset catalog.

use std::time::Duration;

use async_trait::async_trait;

use crate::connector::{CatalogPage, RawPayload, SourceConnector, SourceKind};
use crate::error::ConnectorError;
use crate::types::Query;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PAGE_SIZE: u32 = 10;

/// Searches a portal catalog API (`/datasets?q=...`) and keeps only the
/// entries whose name matches one of the configured terms. This mirrors how
/// the county portal is queried: a broad search, then a name filter.
pub struct OpenDataSearchConnector {
    name: String,
    mode: Mode,
    search_term: String,
    /// Case-insensitive substrings an entry name must contain to be kept.
    /// Empty means keep everything the search returned.
    match_terms: Vec<String>,
}

enum Mode {
    Fixture(String),
    Http {
        url: String,
        client: reqwest::Client,
        timeout: Duration,
    },
}

impl OpenDataSearchConnector {
    pub fn from_url(
        name: impl Into<String>,
        url: impl Into<String>,
        search_term: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Http {
                url: url.into(),
                client: reqwest::Client::new(),
                timeout: DEFAULT_TIMEOUT,
            },
            search_term: search_term.into(),
            match_terms: Vec::new(),
        }
    }

    pub fn from_fixture(
        name: impl Into<String>,
        search_term: impl Into<String>,
        body: &str,
    ) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Fixture(body.to_string()),
            search_term: search_term.into(),
            match_terms: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, t: Duration) -> Self {
        if let Mode::Http { timeout, .. } = &mut self.mode {
            *timeout = t;
        }
        self
    }

    pub fn with_match_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.match_terms = terms.into_iter().map(|t| t.into().to_lowercase()).collect();
        self
    }

    fn parse_and_filter(&self, body: &str) -> Result<RawPayload, ConnectorError> {
        let mut page: CatalogPage = serde_json::from_str(body)
            .map_err(|e| ConnectorError::Parse(format!("catalog json: {e}")))?;

        if !self.match_terms.is_empty() {
            page.data.retain(|entry| {
                let name = entry
                    .attributes
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_lowercase();
                self.match_terms.iter().any(|t| name.contains(t))
            });
        }
        Ok(RawPayload::Catalog(page))
    }
}

#[async_trait]
impl SourceConnector for OpenDataSearchConnector {
    async fn fetch(&self, query: &Query) -> Result<RawPayload, ConnectorError> {
        match &self.mode {
            Mode::Fixture(body) => self.parse_and_filter(body),
            Mode::Http {
                url,
                client,
                timeout,
            } => {
                let page_size = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
                let resp = client
                    .get(url)
                    .query(&[
                        ("q", self.search_term.as_str()),
                        ("page[size]", &page_size.to_string()),
                    ])
                    .timeout(*timeout)
                    .send()
                    .await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(ConnectorError::from_status(
                        status.as_u16(),
                        format!("{} search failed", self.name),
                    ));
                }
                let body = resp.text().await?;
                self.parse_and_filter(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Catalog
    }
}
