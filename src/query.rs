use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::GastoreError;

/// One calendar date range in the wire format of the reporting API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: String,
    pub end_date: String,
}

impl DateRange {
    pub fn new(start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        Self {
            start_date: start_date.into(),
            end_date: end_date.into(),
        }
    }

    /// `start-end`, the form date ranges take inside a cache key.
    pub fn as_key_part(&self) -> String {
        format!("{}-{}", self.start_date, self.end_date)
    }
}

/// A single report request. Fields the pipeline inspects are typed; everything
/// else the caller put in the document rides along in `extra` untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub view_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub date_ranges: Vec<DateRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A reporting API query: the request body of a `batchGet` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub report_requests: Vec<ReportRequest>,
}

impl Query {
    pub fn from_json(text: &str) -> Result<Self, GastoreError> {
        serde_json::from_str(text).map_err(|err| GastoreError::QueryParse(err.to_string()))
    }

    /// The single report request this query must carry.
    pub fn single_request(&self) -> Result<&ReportRequest, GastoreError> {
        match self.report_requests.as_slice() {
            [request] => Ok(request),
            other => Err(GastoreError::MultiReportQuery(other.len())),
        }
    }

    pub fn single_request_mut(&mut self) -> Result<&mut ReportRequest, GastoreError> {
        let len = self.report_requests.len();
        match self.report_requests.as_mut_slice() {
            [request] => Ok(request),
            _ => Err(GastoreError::MultiReportQuery(len)),
        }
    }

    /// Derives the deterministic cache key for this query.
    ///
    /// The key is `viewId-hash-dates`: the hex SHA-256 of the query with its
    /// date ranges removed, bracketed by the view id and the joined date range
    /// strings. Canonical JSON (sorted object keys) makes the hash insensitive
    /// to field order in the source document, so identical queries always land
    /// on the same key.
    pub fn cache_key(&self) -> Result<String, GastoreError> {
        let request = self.single_request()?;

        let mut undated = self.clone();
        for report_request in &mut undated.report_requests {
            report_request.date_ranges.clear();
        }
        let canonical = serde_json::to_value(&undated)
            .and_then(|value| serde_json::to_string(&value))
            .map_err(|err| GastoreError::Serialize(err.to_string()))?;
        let digest = Sha256::digest(canonical.as_bytes());

        let all_dates = request
            .date_ranges
            .iter()
            .map(DateRange::as_key_part)
            .collect::<Vec<_>>()
            .join("_");

        Ok(format!(
            "{}-{}-{}",
            request.view_id,
            hex::encode(digest),
            all_dates
        ))
    }
}
