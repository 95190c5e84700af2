use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::GastoreError;
use crate::query::{DateRange, Query};

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly => write!(f, "weekly"),
            Frequency::Monthly => write!(f, "monthly"),
        }
    }
}

impl FromStr for Frequency {
    type Err = GastoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "d" | "daily" => Ok(Frequency::Daily),
            "w" | "weekly" => Ok(Frequency::Weekly),
            "m" | "monthly" => Ok(Frequency::Monthly),
            _ => Err(GastoreError::UnsupportedFrequency(value.to_string())),
        }
    }
}

pub fn parse_week_start(value: &str) -> Result<Weekday, GastoreError> {
    value
        .parse::<Weekday>()
        .map_err(|_| GastoreError::InvalidWeekStart(value.to_string()))
}

/// Splits `query` into one query per calendar period between `start_date` and
/// `end_date`.
///
/// Daily periods are single days. Weekly boundaries fall on `week_start`,
/// monthly boundaries on the first of the month; in both cases periods pair
/// consecutive boundaries, so a trailing stretch beyond the last boundary is
/// dropped. Each returned query is a clone of the input with every report
/// request's date ranges replaced by its period; all other fields carry over.
pub fn split_query(
    query: &Query,
    start_date: &str,
    end_date: &str,
    frequency: Frequency,
    date_format: &str,
    week_start: Weekday,
) -> Result<Vec<Query>, GastoreError> {
    let start = parse_date(start_date, date_format)?;
    let end = parse_date(end_date, date_format)?;

    let periods = match frequency {
        Frequency::Daily => day_boundaries(start, end)
            .into_iter()
            .map(|day| (day, day))
            .collect::<Vec<_>>(),
        Frequency::Weekly => pair_boundaries(week_boundaries(start, end, week_start)),
        Frequency::Monthly => pair_boundaries(month_boundaries(start, end)),
    };

    let queries = periods
        .into_iter()
        .map(|(period_start, period_end)| {
            let mut sub_query = query.clone();
            let range = DateRange::new(
                period_start.format(date_format).to_string(),
                period_end.format(date_format).to_string(),
            );
            for request in &mut sub_query.report_requests {
                request.date_ranges = vec![range.clone()];
            }
            sub_query
        })
        .collect();

    Ok(queries)
}

fn parse_date(value: &str, format: &str) -> Result<NaiveDate, GastoreError> {
    NaiveDate::parse_from_str(value, format).map_err(|_| GastoreError::InvalidDate {
        value: value.to_string(),
        format: format.to_string(),
    })
}

fn day_boundaries(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut boundaries = Vec::new();
    let mut day = start;
    while day <= end {
        boundaries.push(day);
        match day.checked_add_days(Days::new(1)) {
            Some(next) => day = next,
            None => break,
        }
    }
    boundaries
}

fn week_boundaries(start: NaiveDate, end: NaiveDate, week_start: Weekday) -> Vec<NaiveDate> {
    let mut boundaries = Vec::new();
    let mut day = start;
    while day.weekday() != week_start {
        match day.checked_add_days(Days::new(1)) {
            Some(next) => day = next,
            None => return boundaries,
        }
    }
    while day <= end {
        boundaries.push(day);
        match day.checked_add_days(Days::new(7)) {
            Some(next) => day = next,
            None => break,
        }
    }
    boundaries
}

fn month_boundaries(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut boundaries = Vec::new();
    let first = if start.day() == 1 {
        Some(start)
    } else {
        start
            .with_day(1)
            .and_then(|d| d.checked_add_months(Months::new(1)))
    };
    let mut day = match first {
        Some(day) => day,
        None => return boundaries,
    };
    while day <= end {
        boundaries.push(day);
        match day.checked_add_months(Months::new(1)) {
            Some(next) => day = next,
            None => break,
        }
    }
    boundaries
}

/// Consecutive boundary pairs; the stretch past the last boundary is dropped.
fn pair_boundaries(boundaries: Vec<NaiveDate>) -> Vec<(NaiveDate, NaiveDate)> {
    boundaries
        .windows(2)
        .map(|pair| (pair[0], pair[1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn sample_query() -> Query {
        Query::from_json(
            &json!({
                "reportRequests": [{
                    "viewId": "123456",
                    "dateRanges": [{"startDate": "2020-01-01", "endDate": "2020-12-31"}],
                    "filtersExpression": "ga:country==DE"
                }]
            })
            .to_string(),
        )
        .unwrap()
    }

    fn ranges(queries: &[Query]) -> Vec<(String, String)> {
        queries
            .iter()
            .map(|q| {
                let range = &q.report_requests[0].date_ranges[0];
                (range.start_date.clone(), range.end_date.clone())
            })
            .collect()
    }

    #[test]
    fn monthly_split_drops_trailing_partial() {
        let queries = split_query(
            &sample_query(),
            "2021-01-01",
            "2021-03-01",
            Frequency::Monthly,
            DEFAULT_DATE_FORMAT,
            Weekday::Mon,
        )
        .unwrap();
        assert_eq!(
            ranges(&queries),
            vec![
                ("2021-01-01".to_string(), "2021-02-01".to_string()),
                ("2021-02-01".to_string(), "2021-03-01".to_string()),
            ]
        );
    }

    #[test]
    fn monthly_split_starts_at_first_full_boundary() {
        let queries = split_query(
            &sample_query(),
            "2021-01-15",
            "2021-04-10",
            Frequency::Monthly,
            DEFAULT_DATE_FORMAT,
            Weekday::Mon,
        )
        .unwrap();
        assert_eq!(
            ranges(&queries),
            vec![
                ("2021-02-01".to_string(), "2021-03-01".to_string()),
                ("2021-03-01".to_string(), "2021-04-01".to_string()),
            ]
        );
    }

    #[test]
    fn daily_split_of_single_day_yields_one_period() {
        let queries = split_query(
            &sample_query(),
            "2021-06-15",
            "2021-06-15",
            Frequency::Daily,
            DEFAULT_DATE_FORMAT,
            Weekday::Mon,
        )
        .unwrap();
        assert_eq!(
            ranges(&queries),
            vec![("2021-06-15".to_string(), "2021-06-15".to_string())]
        );
    }

    #[test]
    fn daily_split_covers_every_day() {
        let queries = split_query(
            &sample_query(),
            "2021-06-14",
            "2021-06-16",
            Frequency::Daily,
            DEFAULT_DATE_FORMAT,
            Weekday::Mon,
        )
        .unwrap();
        assert_eq!(queries.len(), 3);
        assert_eq!(
            ranges(&queries)[2],
            ("2021-06-16".to_string(), "2021-06-16".to_string())
        );
    }

    #[test]
    fn weekly_split_aligns_to_week_start() {
        // 2021-06-01 is a Tuesday; the first Monday inside the range is the 7th.
        let queries = split_query(
            &sample_query(),
            "2021-06-01",
            "2021-06-22",
            Frequency::Weekly,
            DEFAULT_DATE_FORMAT,
            Weekday::Mon,
        )
        .unwrap();
        assert_eq!(
            ranges(&queries),
            vec![
                ("2021-06-07".to_string(), "2021-06-14".to_string()),
                ("2021-06-14".to_string(), "2021-06-21".to_string()),
            ]
        );
    }

    #[test]
    fn split_preserves_opaque_fields() {
        let queries = split_query(
            &sample_query(),
            "2021-01-01",
            "2021-03-01",
            Frequency::Monthly,
            DEFAULT_DATE_FORMAT,
            Weekday::Mon,
        )
        .unwrap();
        let value = serde_json::to_value(&queries[0]).unwrap();
        assert_eq!(
            value["reportRequests"][0]["filtersExpression"],
            "ga:country==DE"
        );
    }

    #[test]
    fn empty_when_range_is_inverted() {
        let queries = split_query(
            &sample_query(),
            "2021-03-01",
            "2021-01-01",
            Frequency::Daily,
            DEFAULT_DATE_FORMAT,
            Weekday::Mon,
        )
        .unwrap();
        assert!(queries.is_empty());
    }

    #[test]
    fn custom_date_format_round_trips() {
        let queries = split_query(
            &sample_query(),
            "01/06/2021",
            "03/06/2021",
            Frequency::Daily,
            "%d/%m/%Y",
            Weekday::Mon,
        )
        .unwrap();
        assert_eq!(queries.len(), 3);
        assert_eq!(
            ranges(&queries)[0],
            ("01/06/2021".to_string(), "01/06/2021".to_string())
        );
    }

    #[test]
    fn frequency_tokens_parse() {
        assert_eq!("D".parse::<Frequency>().unwrap(), Frequency::Daily);
        assert_eq!("w".parse::<Frequency>().unwrap(), Frequency::Weekly);
        assert_eq!("monthly".parse::<Frequency>().unwrap(), Frequency::Monthly);
    }

    #[test]
    fn unknown_frequency_rejected() {
        assert_matches!(
            "yearly".parse::<Frequency>().unwrap_err(),
            GastoreError::UnsupportedFrequency(_)
        );
    }

    #[test]
    fn invalid_date_rejected() {
        let err = split_query(
            &sample_query(),
            "not-a-date",
            "2021-01-01",
            Frequency::Daily,
            DEFAULT_DATE_FORMAT,
            Weekday::Mon,
        )
        .unwrap_err();
        assert_matches!(err, GastoreError::InvalidDate { .. });
    }
}
