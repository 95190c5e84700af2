use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GastoreError {
    #[error("query must contain exactly one report request, found {0}")]
    MultiReportQuery(usize),

    #[error("unsupported URI scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URI: {0}")]
    InvalidUri(String),

    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("unsupported split frequency: {0}")]
    UnsupportedFrequency(String),

    #[error("invalid date {value} for format {format}")]
    InvalidDate { value: String, format: String },

    #[error("invalid week start: {0}")]
    InvalidWeekStart(String),

    #[error("report data is not golden")]
    DataNotGolden,

    #[error("analytics request failed: {0}")]
    AnalyticsHttp(String),

    #[error("analytics request timed out: {0}")]
    AnalyticsTimeout(String),

    #[error("analytics returned status {status} ({reason}): {message}")]
    AnalyticsStatus {
        status: u16,
        reason: String,
        message: String,
    },

    #[error("analytics response contained no report")]
    EmptyResponse,

    #[error("object store request failed: {0}")]
    ObjectStoreHttp(String),

    #[error("object store returned status {status}: {message}")]
    ObjectStoreStatus { status: u16, message: String },

    #[error("missing access token: set {0}")]
    MissingCredentials(&'static str),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to parse query document: {0}")]
    QueryParse(String),

    #[error("failed to serialize report: {0}")]
    Serialize(String),

    #[error("missing config file gastore.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}
