use chrono::Weekday;
use serde::Serialize;
use tracing::info;

use crate::analytics::AnalyticsClient;
use crate::error::GastoreError;
use crate::fetch::{self, FetchOptions};
use crate::query::Query;
use crate::report::{DEFAULT_DELIMITER, OutputFormat};
use crate::split::{self, Frequency};
use crate::store::{ObjectStoreClient, UriStore};

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub format: OutputFormat,
    pub delimiter: char,
    /// Refuse to persist sampled or incomplete data.
    pub only_golden: bool,
    /// Alternate folder for non-golden output when `only_golden` is off.
    pub non_golden_folder_uri: Option<String>,
    pub fetch: FetchOptions,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Csv,
            delimiter: DEFAULT_DELIMITER,
            only_golden: true,
            non_golden_folder_uri: None,
            fetch: FetchOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SplitOptions {
    pub start_date: String,
    pub end_date: String,
    pub frequency: Frequency,
    pub date_format: String,
    pub week_start: Weekday,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreAction {
    /// The target URI already existed; the remote API was not contacted.
    Cached,
    Written,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreOutcome {
    pub uri: String,
    pub action: StoreAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_data_golden: Option<bool>,
}

/// Ties cache key, existence check, fetch, serialization and write into one
/// idempotent store operation.
pub struct App<A: AnalyticsClient, O: ObjectStoreClient> {
    analytics: A,
    store: UriStore<O>,
}

impl<A: AnalyticsClient, O: ObjectStoreClient> App<A, O> {
    pub fn new(analytics: A, store: UriStore<O>) -> Self {
        Self { analytics, store }
    }

    /// Fetches the query and stores the serialized report under
    /// `folderUri/cacheKey.fmt`, unless that URI already exists, in which case
    /// it is returned as-is without touching the remote API.
    pub fn store_query(
        &self,
        query: &Query,
        folder_uri: &str,
        options: &StoreOptions,
    ) -> Result<StoreOutcome, GastoreError> {
        let cache_key = query.cache_key()?;
        let file_uri = target_uri(folder_uri, &cache_key, options.format);

        if self.store.exists(&file_uri)? {
            info!(uri = %file_uri, "already stored, skipping fetch");
            return Ok(StoreOutcome {
                uri: file_uri,
                action: StoreAction::Cached,
                is_data_golden: None,
            });
        }

        let report = fetch::execute(&self.analytics, query, &options.fetch)?;

        let mut target = file_uri;
        if !report.is_data_golden {
            if options.only_golden {
                return Err(GastoreError::DataNotGolden);
            }
            if let Some(fallback) = &options.non_golden_folder_uri {
                target = target_uri(fallback, &cache_key, options.format);
            }
        }

        let data = report.render(options.format, options.delimiter)?;
        self.store.write(&data, &target)?;
        info!(
            uri = %target,
            rows = report.rows.len(),
            golden = report.is_data_golden,
            "stored report"
        );

        Ok(StoreOutcome {
            uri: target,
            action: StoreAction::Written,
            is_data_golden: Some(report.is_data_golden),
        })
    }

    /// Splits the date range into calendar periods and stores one report per
    /// sub-query, in period order.
    pub fn store_range(
        &self,
        query: &Query,
        folder_uri: &str,
        split: &SplitOptions,
        options: &StoreOptions,
    ) -> Result<Vec<StoreOutcome>, GastoreError> {
        let queries = split::split_query(
            query,
            &split.start_date,
            &split.end_date,
            split.frequency,
            &split.date_format,
            split.week_start,
        )?;
        info!(
            periods = queries.len(),
            frequency = %split.frequency,
            "split date range"
        );
        queries
            .iter()
            .map(|sub_query| self.store_query(sub_query, folder_uri, options))
            .collect()
    }
}

fn target_uri(folder_uri: &str, cache_key: &str, format: OutputFormat) -> String {
    format!(
        "{}/{}.{}",
        folder_uri.trim_end_matches('/'),
        cache_key,
        format.extension()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_uri_joins_folder_key_and_extension() {
        assert_eq!(
            target_uri("file:///data/ga/", "123-abc-2021", OutputFormat::Csv),
            "file:///data/ga/123-abc-2021.csv"
        );
        assert_eq!(
            target_uri("gs://bucket/reports", "123-abc-2021", OutputFormat::Json),
            "gs://bucket/reports/123-abc-2021.json"
        );
    }
}
