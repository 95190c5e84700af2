use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::analytics::{ApiReport, ColumnHeader, GetReportsResponse, ReportData, ReportRow};
use crate::error::GastoreError;

/// Default CSV delimiter. A control character keeps it out of the way of any
/// printable field content.
pub const DEFAULT_DELIMITER: char = '\u{1}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = GastoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            _ => Err(GastoreError::UnsupportedFormat(value.to_string())),
        }
    }
}

/// A fully accumulated report: every row of every page, the column header of
/// the last page, and whether all pages were golden.
#[derive(Debug, Clone)]
pub struct Report {
    pub column_header: ColumnHeader,
    pub rows: Vec<ReportRow>,
    pub is_data_golden: bool,
}

impl Report {
    /// Column names in output order: dimensions, then metrics, with a leading
    /// `ga:` namespace prefix stripped.
    pub fn column_names(&self) -> Vec<String> {
        self.column_header
            .dimensions
            .iter()
            .map(String::as_str)
            .chain(
                self.column_header
                    .metric_header
                    .metric_header_entries
                    .iter()
                    .map(|entry| entry.name.as_str()),
            )
            .map(|name| name.strip_prefix("ga:").unwrap_or(name).to_string())
            .collect()
    }

    pub fn to_csv(&self, delimiter: char) -> String {
        let sep = delimiter.to_string();
        let mut out = self.column_names().join(&sep);
        out.push('\n');
        for row in &self.rows {
            let fields = row
                .dimensions
                .iter()
                .map(String::as_str)
                .chain(
                    row.metrics
                        .iter()
                        .flat_map(|metric| metric.values.iter().map(String::as_str)),
                )
                .collect::<Vec<_>>();
            out.push_str(&fields.join(&sep));
            out.push('\n');
        }
        out
    }

    /// Pretty-prints the wire-shaped report with sorted keys, so stored JSON
    /// diffs cleanly between runs.
    pub fn to_json(&self) -> Result<String, GastoreError> {
        let response = GetReportsResponse {
            reports: vec![ApiReport {
                column_header: self.column_header.clone(),
                data: ReportData {
                    rows: self.rows.clone(),
                    is_data_golden: Some(self.is_data_golden),
                    next_page_token: None,
                },
            }],
        };
        serde_json::to_value(&response)
            .and_then(|value| serde_json::to_string_pretty(&value))
            .map_err(|err| GastoreError::Serialize(err.to_string()))
    }

    pub fn render(&self, format: OutputFormat, delimiter: char) -> Result<String, GastoreError> {
        match format {
            OutputFormat::Csv => Ok(self.to_csv(delimiter)),
            OutputFormat::Json => self.to_json(),
        }
    }
}
