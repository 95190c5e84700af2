use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::analytics::{AnalyticsClient, GetReportsResponse};
use crate::error::GastoreError;
use crate::query::Query;
use crate::report::Report;

/// API error reasons worth retrying: quota and transient server conditions.
const QUOTA_RELATED_REASONS: [&str; 4] = [
    "userRateLimitExceeded",
    "quotaExceeded",
    "internalServerError",
    "backendError",
];

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Per-page retry budget. Zero bypasses the retry wrapper entirely.
    pub max_retries: u32,
    pub page_size: Option<u32>,
    pub sampling_level: Option<String>,
    /// Overrides the built-in retriable reason set when present.
    pub retriable_reasons: Option<Vec<String>>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_retries: 5,
            page_size: None,
            sampling_level: None,
            retriable_reasons: None,
        }
    }
}

/// Fetches every page of a single-request query and accumulates the result.
///
/// The caller's query is never mutated: pagination tokens and page options are
/// injected into a working copy. The accumulated report is golden only if
/// every page reported golden data (an absent flag counts as not golden), and
/// its column header comes from the last page.
pub fn execute<C: AnalyticsClient>(
    client: &C,
    query: &Query,
    options: &FetchOptions,
) -> Result<Report, GastoreError> {
    query.single_request()?;

    let mut working = query.clone();
    {
        let request = working.single_request_mut()?;
        if let Some(page_size) = options.page_size {
            request.page_size = Some(page_size);
        }
        if let Some(sampling_level) = &options.sampling_level {
            request.sampling_level = Some(sampling_level.clone());
        }
    }

    let mut rows = Vec::new();
    let mut is_data_golden = true;
    let mut column_header = Default::default();
    let mut page = 0u32;

    loop {
        let response = if options.max_retries > 0 {
            batch_get_with_backoff(client, &working, options)?
        } else {
            client.batch_get(&working)?
        };

        let report = response
            .reports
            .into_iter()
            .next()
            .ok_or(GastoreError::EmptyResponse)?;

        if !report.data.is_data_golden.unwrap_or(false) {
            is_data_golden = false;
        }

        page += 1;
        debug!(page, rows = report.data.rows.len(), "fetched report page");

        rows.extend(report.data.rows);
        column_header = report.column_header;

        match report.data.next_page_token {
            Some(token) if !token.is_empty() => {
                working.single_request_mut()?.page_token = Some(token);
            }
            _ => break,
        }
    }

    Ok(Report {
        column_header,
        rows,
        is_data_golden,
    })
}

/// One page fetch under a jittered exponential-backoff budget. Only quota and
/// timeout conditions are retried; anything else propagates immediately.
fn batch_get_with_backoff<C: AnalyticsClient>(
    client: &C,
    query: &Query,
    options: &FetchOptions,
) -> Result<GetReportsResponse, GastoreError> {
    let retriable = options.retriable_reasons.as_deref();
    let mut attempt = 0u32;
    loop {
        match client.batch_get(query) {
            Ok(response) => return Ok(response),
            Err(err) => {
                let last = attempt + 1 >= options.max_retries;
                if last || !is_retriable(&err, retriable) {
                    return Err(err);
                }
                let delay = backoff_delay(attempt);
                warn!(
                    attempt,
                    delay_secs = delay.as_secs_f64(),
                    error = %err,
                    "retrying report page fetch"
                );
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

/// `2^attempt` seconds plus up to one second of jitter.
fn backoff_delay(attempt: u32) -> Duration {
    let jitter: f64 = rand::rng().random();
    Duration::from_secs_f64(2f64.powi(attempt as i32) + jitter)
}

fn is_retriable(err: &GastoreError, retriable: Option<&[String]>) -> bool {
    match err {
        GastoreError::AnalyticsStatus { reason, .. } => match retriable {
            Some(reasons) => reasons.iter().any(|r| reason.contains(r.as_str())),
            None => QUOTA_RELATED_REASONS.iter().any(|r| reason.contains(r)),
        },
        // Transport timeouts retry under the same budget; a dropped page
        // would truncate the accumulated report.
        GastoreError::AnalyticsTimeout(_) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::analytics::GetReportsResponse;

    struct ScriptedClient {
        outcomes: Mutex<Vec<Result<GetReportsResponse, GastoreError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedClient {
        fn new(outcomes: Vec<Result<GetReportsResponse, GastoreError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    impl AnalyticsClient for ScriptedClient {
        fn batch_get(&self, _query: &Query) -> Result<GetReportsResponse, GastoreError> {
            *self.calls.lock().unwrap() += 1;
            self.outcomes.lock().unwrap().remove(0)
        }
    }

    fn page(rows: &[&str], golden: Option<bool>, token: Option<&str>) -> GetReportsResponse {
        let rows = rows
            .iter()
            .map(|dim| {
                json!({"dimensions": [dim], "metrics": [{"values": ["1"]}]})
            })
            .collect::<Vec<_>>();
        let mut data = json!({"rows": rows});
        if let Some(golden) = golden {
            data["isDataGolden"] = json!(golden);
        }
        if let Some(token) = token {
            data["nextPageToken"] = json!(token);
        }
        serde_json::from_value(json!({
            "reports": [{
                "columnHeader": {
                    "dimensions": ["ga:country"],
                    "metricHeader": {"metricHeaderEntries": [{"name": "ga:sessions"}]}
                },
                "data": data
            }]
        }))
        .unwrap()
    }

    fn query() -> Query {
        Query::from_json(
            &json!({
                "reportRequests": [{
                    "viewId": "123456",
                    "dateRanges": [{"startDate": "2021-01-01", "endDate": "2021-01-31"}]
                }]
            })
            .to_string(),
        )
        .unwrap()
    }

    #[test]
    fn accumulates_pages_in_order() {
        let client = ScriptedClient::new(vec![
            Ok(page(&["a", "b"], Some(true), Some("token-1"))),
            Ok(page(&["c"], Some(true), None)),
        ]);
        let report = execute(&client, &query(), &FetchOptions::default()).unwrap();
        assert_eq!(client.calls(), 2);
        assert_eq!(report.rows.len(), 3);
        let dims = report
            .rows
            .iter()
            .map(|row| row.dimensions[0].as_str())
            .collect::<Vec<_>>();
        assert_eq!(dims, ["a", "b", "c"]);
        assert!(report.is_data_golden);
    }

    #[test]
    fn golden_is_and_of_all_pages() {
        let client = ScriptedClient::new(vec![
            Ok(page(&["a"], Some(true), Some("token-1"))),
            Ok(page(&["b"], Some(false), None)),
        ]);
        let report = execute(&client, &query(), &FetchOptions::default()).unwrap();
        assert!(!report.is_data_golden);
    }

    #[test]
    fn absent_golden_flag_counts_as_not_golden() {
        let client = ScriptedClient::new(vec![Ok(page(&["a"], None, None))]);
        let report = execute(&client, &query(), &FetchOptions::default()).unwrap();
        assert!(!report.is_data_golden);
    }

    #[test]
    fn original_query_is_not_mutated() {
        let q = query();
        let client = ScriptedClient::new(vec![
            Ok(page(&["a"], Some(true), Some("token-1"))),
            Ok(page(&["b"], Some(true), None)),
        ]);
        let options = FetchOptions {
            page_size: Some(500),
            ..FetchOptions::default()
        };
        execute(&client, &q, &options).unwrap();
        let request = q.single_request().unwrap();
        assert!(request.page_token.is_none());
        assert!(request.page_size.is_none());
    }

    #[test]
    fn fatal_error_propagates_without_retry() {
        let client = ScriptedClient::new(vec![Err(GastoreError::AnalyticsStatus {
            status: 400,
            reason: "invalidParameter".to_string(),
            message: "bad query".to_string(),
        })]);
        let err = execute(&client, &query(), &FetchOptions::default()).unwrap_err();
        assert_eq!(client.calls(), 1);
        assert_matches!(err, GastoreError::AnalyticsStatus { status: 400, .. });
    }

    #[test]
    fn transient_error_is_retried_then_succeeds() {
        let client = ScriptedClient::new(vec![
            Err(GastoreError::AnalyticsStatus {
                status: 429,
                reason: "userRateLimitExceeded".to_string(),
                message: "slow down".to_string(),
            }),
            Ok(page(&["a"], Some(true), None)),
        ]);
        let report = execute(&client, &query(), &FetchOptions::default()).unwrap();
        assert_eq!(client.calls(), 2);
        assert_eq!(report.rows.len(), 1);
    }

    #[test]
    fn retry_budget_exhaustion_surfaces_last_error() {
        let quota_err = || {
            Err(GastoreError::AnalyticsStatus {
                status: 403,
                reason: "quotaExceeded".to_string(),
                message: "quota".to_string(),
            })
        };
        let client = ScriptedClient::new(vec![quota_err(), quota_err()]);
        let options = FetchOptions {
            max_retries: 2,
            ..FetchOptions::default()
        };
        let err = execute(&client, &query(), &options).unwrap_err();
        assert_eq!(client.calls(), 2);
        assert_matches!(err, GastoreError::AnalyticsStatus { status: 403, .. });
    }

    #[test]
    fn zero_retries_bypasses_wrapper() {
        let client = ScriptedClient::new(vec![Err(GastoreError::AnalyticsStatus {
            status: 403,
            reason: "quotaExceeded".to_string(),
            message: "quota".to_string(),
        })]);
        let options = FetchOptions {
            max_retries: 0,
            ..FetchOptions::default()
        };
        let err = execute(&client, &query(), &options).unwrap_err();
        assert_eq!(client.calls(), 1);
        assert_matches!(err, GastoreError::AnalyticsStatus { .. });
    }

    #[test]
    fn timeout_is_retried() {
        let client = ScriptedClient::new(vec![
            Err(GastoreError::AnalyticsTimeout("read timed out".to_string())),
            Ok(page(&["a"], Some(true), None)),
        ]);
        let report = execute(&client, &query(), &FetchOptions::default()).unwrap();
        assert_eq!(client.calls(), 2);
        assert_eq!(report.rows.len(), 1);
    }

    #[test]
    fn custom_retriable_reason_list_is_honored() {
        let client = ScriptedClient::new(vec![Err(GastoreError::AnalyticsStatus {
            status: 403,
            reason: "quotaExceeded".to_string(),
            message: "quota".to_string(),
        })]);
        let options = FetchOptions {
            retriable_reasons: Some(vec!["somethingElse".to_string()]),
            ..FetchOptions::default()
        };
        let err = execute(&client, &query(), &options).unwrap_err();
        assert_eq!(client.calls(), 1);
        assert_matches!(err, GastoreError::AnalyticsStatus { .. });
    }

    #[test]
    fn multi_request_query_rejected_before_any_call() {
        let mut q = query();
        let dup = q.report_requests[0].clone();
        q.report_requests.push(dup);
        let client = ScriptedClient::new(vec![]);
        let err = execute(&client, &q, &FetchOptions::default()).unwrap_err();
        assert_eq!(client.calls(), 0);
        assert_matches!(err, GastoreError::MultiReportQuery(2));
    }
}
