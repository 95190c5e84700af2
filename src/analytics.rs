use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GastoreError;
use crate::query::Query;

pub const TOKEN_ENV: &str = "GA_ACCESS_TOKEN";

/// Column header of a report: dimension names plus metric header entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnHeader {
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub metric_header: MetricHeader,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricHeader {
    #[serde(default)]
    pub metric_header_entries: Vec<MetricHeaderEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricHeaderEntry {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRow {
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<MetricValues>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricValues {
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
    #[serde(default)]
    pub rows: Vec<ReportRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_data_golden: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiReport {
    #[serde(default)]
    pub column_header: ColumnHeader,
    #[serde(default)]
    pub data: ReportData,
}

/// One page of a `batchGet` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetReportsResponse {
    #[serde(default)]
    pub reports: Vec<ApiReport>,
}

pub trait AnalyticsClient: Send + Sync {
    fn batch_get(&self, query: &Query) -> Result<GetReportsResponse, GastoreError>;
}

#[derive(Clone)]
pub struct AnalyticsHttpClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl AnalyticsHttpClient {
    pub fn new() -> Result<Self, GastoreError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("gastore/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| GastoreError::AnalyticsHttp(err.to_string()))?,
        );

        let token = std::env::var(TOKEN_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| GastoreError::AnalyticsHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: "https://analyticsreporting.googleapis.com/v4".to_string(),
            token,
        })
    }

    fn token(&self) -> Result<&str, GastoreError> {
        self.token
            .as_deref()
            .ok_or(GastoreError::MissingCredentials(TOKEN_ENV))
    }
}

impl AnalyticsClient for AnalyticsHttpClient {
    fn batch_get(&self, query: &Query) -> Result<GetReportsResponse, GastoreError> {
        let token = self.token()?;
        let url = format!("{}/reports:batchGet", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(query)
            .send()
            .map_err(|err| {
                if err.is_timeout() || err.is_connect() {
                    GastoreError::AnalyticsTimeout(err.to_string())
                } else {
                    GastoreError::AnalyticsHttp(err.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .unwrap_or_else(|_| "analytics request failed".to_string());
            let (reason, message) = parse_error_body(&body);
            return Err(GastoreError::AnalyticsStatus {
                status,
                reason,
                message,
            });
        }

        response
            .json()
            .map_err(|err| GastoreError::AnalyticsHttp(err.to_string()))
    }
}

/// Pulls `error.errors[0].reason` and `error.message` out of an API error
/// body. Unknown shapes fall back to the raw body text.
fn parse_error_body(body: &str) -> (String, String) {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return (String::new(), body.to_string());
    };
    let error = value.get("error");
    let reason = error
        .and_then(|v| v.get("errors"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|v| v.get("reason"))
        .and_then(|v| v.as_str())
        .or_else(|| {
            error
                .and_then(|v| v.get("status"))
                .and_then(|v| v.as_str())
        })
        .unwrap_or_default()
        .to_string();
    let message = error
        .and_then(|v| v.get("message"))
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .unwrap_or_else(|| body.to_string());
    (reason, message)
}
