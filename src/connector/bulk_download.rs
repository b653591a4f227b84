//! Static bulk-download connector: one CSV file per fetch.

use std::time::Duration;

use async_trait::async_trait;

use crate::connector::{RawPayload, SourceConnector, SourceKind, Table};
use crate::error::ConnectorError;
use crate::types::Query;

// Full-file downloads are slow; the portal allows up to a minute.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Downloads a whole dataset as CSV (Socrata `rows.csv` style). There is no
/// server-side spatial filter; the bbox is applied later, after
/// normalization, by whoever consumes the records. The result limit is
/// honored here to keep huge files bounded.
pub struct BulkDownloadConnector {
    name: String,
    kind: SourceKind,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        url: String,
        client: reqwest::Client,
        timeout: Duration,
    },
}

impl BulkDownloadConnector {
    pub fn from_url(name: impl Into<String>, kind: SourceKind, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            mode: Mode::Http {
                url: url.into(),
                client: reqwest::Client::new(),
                timeout: DEFAULT_TIMEOUT,
            },
        }
    }

    pub fn from_fixture(name: impl Into<String>, kind: SourceKind, body: &str) -> Self {
        Self {
            name: name.into(),
            kind,
            mode: Mode::Fixture(body.to_string()),
        }
    }

    pub fn with_timeout(mut self, t: Duration) -> Self {
        if let Mode::Http { timeout, .. } = &mut self.mode {
            *timeout = t;
        }
        self
    }

    fn parse_csv(text: &str, limit: Option<u32>) -> Result<RawPayload, ConnectorError> {
        let mut lines = parse_csv_records(text);
        if lines.is_empty() {
            return Err(ConnectorError::Parse("empty CSV body".into()));
        }
        let headers = lines.remove(0);
        if headers.iter().all(|h| h.trim().is_empty()) {
            return Err(ConnectorError::Parse("CSV has no header row".into()));
        }
        if let Some(limit) = limit {
            lines.truncate(limit as usize);
        }
        Ok(RawPayload::Table(Table {
            headers,
            rows: lines,
        }))
    }
}

#[async_trait]
impl SourceConnector for BulkDownloadConnector {
    async fn fetch(&self, query: &Query) -> Result<RawPayload, ConnectorError> {
        match &self.mode {
            Mode::Fixture(body) => Self::parse_csv(body, query.limit),
            Mode::Http {
                url,
                client,
                timeout,
            } => {
                let resp = client.get(url).timeout(*timeout).send().await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(ConnectorError::from_status(
                        status.as_u16(),
                        format!("{} download failed", self.name),
                    ));
                }
                let body = resp.text().await?;
                Self::parse_csv(&body, query.limit)
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

/// Minimal RFC 4180 reader: quoted fields, doubled-quote escapes, CR/LF
/// line ends, newlines inside quotes. Blank records are skipped.
fn parse_csv_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => {
                record.push(std::mem::take(&mut field));
            }
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                if !(record.len() == 1 && record[0].is_empty()) {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}
