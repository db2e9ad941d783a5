//! Month-over-month comparison with the aging shift.
//!
//! A receivable that sat in a bucket last month has aged by thirty days since,
//! so each current-month bucket is compared against the bucket it would have
//! come from:
//!
//! | current   | previous month        |
//! |-----------|-----------------------|
//! | `current` | `current`             |
//! | `0_30`    | `0_30`                |
//! | `31_60`   | `0_30`                |
//! | `61_90`   | `31_60`               |
//! | `90_plus` | `61_90` + `90_plus`   |
//! | `total`   | `total`               |
//!
//! Percentages against a zero previous value are reported as `0`. That is a
//! display simplification (the true ratio is undefined), kept so that a new
//! balance never renders as an infinite change.

use crate::aggregator::{aggregate, BucketTotals};
use crate::matcher::DescriptionMatcher;
use crate::schema::{
    AgingBucket, AgingValues, ClientHistory, ForecastRow, MonthlyRecord, MonthlySnapshot,
};
use crate::utils::round_amount;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketChange {
    pub absolute: f64,
    pub percentage: f64,
    pub previous_value: f64,
}

impl BucketChange {
    pub fn between(current: f64, previous: f64) -> Self {
        let absolute = current - previous;
        let percentage = if previous != 0.0 {
            absolute / previous * 100.0
        } else {
            0.0
        };
        Self {
            absolute,
            percentage,
            previous_value: previous,
        }
    }

    pub fn is_increase(&self) -> bool {
        self.absolute >= 0.0
    }

    /// True when the change is too small to show as an increase or decrease.
    pub fn is_negligible(&self, tolerance: f64, negligible_percentage: f64) -> bool {
        self.absolute.abs() < tolerance && self.percentage.abs() < negligible_percentage
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgingComparison {
    pub current: BucketChange,
    #[serde(rename = "0_30")]
    pub days_0_30: BucketChange,
    #[serde(rename = "31_60")]
    pub days_31_60: BucketChange,
    #[serde(rename = "61_90")]
    pub days_61_90: BucketChange,
    #[serde(rename = "90_plus")]
    pub days_90_plus: BucketChange,
    pub total: BucketChange,
}

impl AgingComparison {
    pub fn get(&self, bucket: AgingBucket) -> BucketChange {
        match bucket {
            AgingBucket::Current => self.current,
            AgingBucket::Days0To30 => self.days_0_30,
            AgingBucket::Days31To60 => self.days_31_60,
            AgingBucket::Days61To90 => self.days_61_90,
            AgingBucket::Days90Plus => self.days_90_plus,
            AgingBucket::Total => self.total,
        }
    }
}

/// Previous-month value that `bucket` is compared against.
pub fn shifted_previous_value<P: AgingValues + ?Sized>(bucket: AgingBucket, previous: &P) -> f64 {
    match bucket {
        AgingBucket::Current => previous.bucket_value(AgingBucket::Current),
        AgingBucket::Days0To30 => previous.bucket_value(AgingBucket::Days0To30),
        AgingBucket::Days31To60 => previous.bucket_value(AgingBucket::Days0To30),
        AgingBucket::Days61To90 => previous.bucket_value(AgingBucket::Days31To60),
        AgingBucket::Days90Plus => {
            previous.bucket_value(AgingBucket::Days61To90)
                + previous.bucket_value(AgingBucket::Days90Plus)
        }
        AgingBucket::Total => previous.bucket_value(AgingBucket::Total),
    }
}

pub fn compare_bucket<C, P>(bucket: AgingBucket, current: &C, previous: &P) -> BucketChange
where
    C: AgingValues + ?Sized,
    P: AgingValues + ?Sized,
{
    BucketChange::between(
        current.bucket_value(bucket),
        shifted_previous_value(bucket, previous),
    )
}

pub fn compare_values<C, P>(current: &C, previous: &P) -> AgingComparison
where
    C: AgingValues + ?Sized,
    P: AgingValues + ?Sized,
{
    AgingComparison {
        current: compare_bucket(AgingBucket::Current, current, previous),
        days_0_30: compare_bucket(AgingBucket::Days0To30, current, previous),
        days_31_60: compare_bucket(AgingBucket::Days31To60, current, previous),
        days_61_90: compare_bucket(AgingBucket::Days61To90, current, previous),
        days_90_plus: compare_bucket(AgingBucket::Days90Plus, current, previous),
        total: compare_bucket(AgingBucket::Total, current, previous),
    }
}

pub fn compare_records(
    current: &MonthlyRecord,
    previous: Option<&MonthlyRecord>,
) -> Option<AgingComparison> {
    previous.map(|previous| compare_values(current, previous))
}

/// Compares the column totals of two months (table footers).
pub fn compare_months(current: &MonthlySnapshot, previous: &MonthlySnapshot) -> AgingComparison {
    let current_totals = aggregate(&current.records);
    let previous_totals = aggregate(&previous.records);
    compare_values(&current_totals, &previous_totals)
}

/// The snapshot for `month` and the one chronologically before it.
/// `None` for the first month or a month not present.
pub fn previous_month_snapshot<'h>(
    history: &'h ClientHistory,
    month: &str,
) -> Option<(&'h MonthlySnapshot, &'h MonthlySnapshot)> {
    let current = history.history.iter().find(|s| s.month == month)?;
    let previous = history
        .history
        .iter()
        .filter(|s| s.month.as_str() < month)
        .max_by(|a, b| a.month.cmp(&b.month))?;
    Some((current, previous))
}

/// Footer comparison of `month` against the month before it in `history`.
/// `None` for the first month or a month not present.
pub fn month_comparison(history: &ClientHistory, month: &str) -> Option<AgingComparison> {
    let (current, previous) = previous_month_snapshot(history, month)?;
    Some(compare_months(current, previous))
}

/// Comparison of `record` against its counterpart in `previous`, located
/// with `matcher`.
pub fn matched_record_comparison(
    record: &MonthlyRecord,
    previous: &MonthlySnapshot,
    matcher: &DescriptionMatcher,
) -> Option<AgingComparison> {
    let counterpart = matcher.find_match(&record.description, &previous.records);
    if counterpart.is_none() {
        debug!(
            "No previous-month counterpart for '{}' in {}",
            record.description, previous.month
        );
    }
    compare_records(record, counterpart)
}

/// Per-record comparison of `record` (in `month`) against its counterpart in
/// the previous month, located with `matcher`.
pub fn record_comparison(
    history: &ClientHistory,
    month: &str,
    record: &MonthlyRecord,
    matcher: &DescriptionMatcher,
) -> Option<AgingComparison> {
    let (_, previous) = previous_month_snapshot(history, month)?;
    matched_record_comparison(record, previous, matcher)
}

/// Previous-month column totals already shifted into the current month's
/// columns, rounded to whole units.
pub fn shifted_column_totals<P: AgingValues>(previous_rows: &[P]) -> BucketTotals {
    let totals = aggregate(previous_rows);
    BucketTotals {
        current: shifted_previous_value(AgingBucket::Current, &totals),
        days_0_30: shifted_previous_value(AgingBucket::Days0To30, &totals),
        days_31_60: shifted_previous_value(AgingBucket::Days31To60, &totals),
        days_61_90: shifted_previous_value(AgingBucket::Days61To90, &totals),
        days_90_plus: shifted_previous_value(AgingBucket::Days90Plus, &totals),
        total: shifted_previous_value(AgingBucket::Total, &totals),
    }
    .rounded()
}

/// Change shown under one forecast cell. `None` when there is no previous
/// month data or the row has no counterpart in it.
pub fn forecast_cell_change(
    row: &ForecastRow,
    bucket: AgingBucket,
    previous_rows: &[ForecastRow],
    matcher: &DescriptionMatcher,
) -> Option<BucketChange> {
    if previous_rows.is_empty() {
        return None;
    }
    let counterpart = matcher.find_match(&row.description, previous_rows)?;
    Some(compare_bucket(bucket, row, counterpart))
}

/// Change shown under a forecast footer cell.
pub fn forecast_footer_change(
    rows: &[ForecastRow],
    bucket: AgingBucket,
    previous_rows: &[ForecastRow],
) -> Option<BucketChange> {
    if previous_rows.is_empty() {
        return None;
    }
    let current = round_amount(rows.iter().map(|r| r.bucket_value(bucket)).sum());
    let previous = shifted_column_totals(previous_rows).get(bucket);
    Some(BucketChange::between(current, previous))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonPoint {
    pub name: String,
    pub current: f64,
    pub previous: f64,
}

fn index_by_description(records: &[MonthlyRecord]) -> (Vec<&str>, HashMap<&str, &MonthlyRecord>) {
    let mut order = Vec::new();
    let mut by_description = HashMap::new();
    for record in records {
        if by_description
            .insert(record.description.as_str(), record)
            .is_none()
        {
            order.push(record.description.as_str());
        }
    }
    (order, by_description)
}

/// Per-description series for the month comparison chart of one bucket.
/// Descriptions are keyed exactly; the later record wins on duplicates.
/// Sorted by current value, largest first.
pub fn comparison_series(
    current: &MonthlySnapshot,
    previous: Option<&MonthlySnapshot>,
    bucket: AgingBucket,
) -> Vec<ComparisonPoint> {
    let (mut names, current_map) = index_by_description(&current.records);
    let previous_records: &[MonthlyRecord] =
        previous.map(|p| p.records.as_slice()).unwrap_or(&[]);
    let (previous_names, previous_map) = index_by_description(previous_records);

    for name in previous_names {
        if !current_map.contains_key(name) {
            names.push(name);
        }
    }

    let mut points: Vec<ComparisonPoint> = names
        .into_iter()
        .map(|name| ComparisonPoint {
            name: name.to_string(),
            current: current_map
                .get(name)
                .map(|r| r.bucket_value(bucket))
                .unwrap_or(0.0),
            previous: previous_map
                .get(name)
                .map(|r| shifted_previous_value(bucket, *r))
                .unwrap_or(0.0),
        })
        .collect();

    points.sort_by(|a, b| b.current.total_cmp(&a.current));
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AgingBuckets;

    fn record(description: &str, b0: f64, b31: f64, b61: f64, b90: f64) -> MonthlyRecord {
        MonthlyRecord::new(description, AgingBuckets::new(b0, b31, b61, b90))
    }

    #[test]
    fn test_bucket_shift() {
        let previous = record("Acme", 100.0, 50.0, 30.0, 20.0);
        let current = record("Acme", 0.0, 100.0, 50.0, 45.0);

        let comparison = compare_records(&current, Some(&previous)).unwrap();
        assert_eq!(comparison.days_31_60.absolute, 0.0);
        assert_eq!(comparison.days_61_90.absolute, 0.0);
        assert_eq!(comparison.days_90_plus.absolute, -5.0);
        assert_eq!(comparison.days_90_plus.previous_value, 50.0);
        assert!((comparison.days_90_plus.percentage - -10.0).abs() < 1e-9);
        assert_eq!(comparison.total.absolute, -5.0);
    }

    #[test]
    fn test_zero_previous_value_reports_zero_percentage() {
        let change = BucketChange::between(50.0, 0.0);
        assert_eq!(change.absolute, 50.0);
        assert_eq!(change.percentage, 0.0);
        assert_eq!(change.previous_value, 0.0);
    }

    #[test]
    fn test_no_previous_record() {
        let current = record("Acme", 10.0, 0.0, 0.0, 0.0);
        assert!(compare_records(&current, None).is_none());
    }

    #[test]
    fn test_compare_months_uses_aggregates() {
        let previous = MonthlySnapshot::from_records(
            "2024-01",
            vec![
                record("A", 100.0, 0.0, 0.0, 0.0),
                record("B", 50.0, 40.0, 0.0, 0.0),
            ],
        );
        let current = MonthlySnapshot::from_records(
            "2024-02",
            vec![
                record("A", 20.0, 90.0, 0.0, 0.0),
                record("B", 0.0, 30.0, 40.0, 0.0),
            ],
        );

        let comparison = compare_months(&current, &previous);
        assert_eq!(comparison.days_31_60.previous_value, 150.0);
        assert_eq!(comparison.days_31_60.absolute, -30.0);
        assert!((comparison.days_31_60.percentage - -20.0).abs() < 1e-9);
        assert_eq!(comparison.days_61_90.previous_value, 40.0);
        assert_eq!(comparison.days_61_90.absolute, 0.0);
        assert_eq!(comparison.total.absolute, -10.0);
    }

    #[test]
    fn test_month_comparison_sorts_history() {
        let history = ClientHistory::new(vec![
            MonthlySnapshot::from_records("2024-03", vec![record("A", 30.0, 0.0, 0.0, 0.0)]),
            MonthlySnapshot::from_records("2024-01", vec![record("A", 10.0, 0.0, 0.0, 0.0)]),
            MonthlySnapshot::from_records("2024-02", vec![record("A", 20.0, 0.0, 0.0, 0.0)]),
        ]);

        assert!(month_comparison(&history, "2024-01").is_none());
        assert!(month_comparison(&history, "2023-12").is_none());

        let march = month_comparison(&history, "2024-03").unwrap();
        assert_eq!(march.days_0_30.previous_value, 20.0);
        assert_eq!(march.days_0_30.absolute, 10.0);
    }

    #[test]
    fn test_record_comparison_uses_matcher() {
        let history = ClientHistory::new(vec![
            MonthlySnapshot::from_records(
                "2024-01",
                vec![record("Apex Sloutions", 100.0, 0.0, 0.0, 0.0)],
            ),
            MonthlySnapshot::from_records(
                "2024-02",
                vec![record("Apex Solutions", 20.0, 100.0, 0.0, 0.0)],
            ),
        ]);
        let matcher = DescriptionMatcher::default();
        let current = &history.history[1].records[0];

        let comparison = record_comparison(&history, "2024-02", current, &matcher).unwrap();
        assert_eq!(comparison.days_31_60.absolute, 0.0);

        let stranger = record("Unknown Co", 5.0, 0.0, 0.0, 0.0);
        assert!(record_comparison(&history, "2024-02", &stranger, &matcher).is_none());
    }

    #[test]
    fn test_shifted_column_totals() {
        let mut first = ForecastRow::new("A", 100.0, 50.0, 30.0, 20.0);
        first.current = 0.0;
        let previous = vec![first, ForecastRow::new("B", 10.4, 0.0, 0.0, 0.0)];

        let shifted = shifted_column_totals(&previous);
        assert_eq!(shifted.current, 110.0);
        assert_eq!(shifted.days_31_60, 110.0);
        assert_eq!(shifted.days_61_90, 50.0);
        assert_eq!(shifted.days_90_plus, 50.0);
        assert_eq!(shifted.total, 210.0);
    }

    #[test]
    fn test_forecast_cell_change() {
        let previous = vec![ForecastRow::new("Acme Inc.", 100.0, 40.0, 0.0, 0.0)];
        let row = ForecastRow::new("acme inc", 60.0, 90.0, 40.0, 0.0);
        let matcher = DescriptionMatcher::default();

        let change =
            forecast_cell_change(&row, AgingBucket::Days31To60, &previous, &matcher).unwrap();
        assert_eq!(change.previous_value, 100.0);
        assert_eq!(change.absolute, -10.0);

        assert!(forecast_cell_change(&row, AgingBucket::Total, &[], &matcher).is_none());

        let newcomer = ForecastRow::new("Brand New", 10.0, 0.0, 0.0, 0.0);
        assert!(
            forecast_cell_change(&newcomer, AgingBucket::Total, &previous, &matcher).is_none()
        );
    }

    #[test]
    fn test_previous_month_snapshot_borrows_from_unsorted_history() {
        let history = ClientHistory::new(vec![
            MonthlySnapshot::from_records("2024-03", vec![record("A", 30.0, 0.0, 0.0, 0.0)]),
            MonthlySnapshot::from_records("2024-01", vec![record("A", 10.0, 0.0, 0.0, 0.0)]),
            MonthlySnapshot::from_records("2024-02", vec![record("A", 20.0, 0.0, 0.0, 0.0)]),
        ]);

        let (current, previous) = previous_month_snapshot(&history, "2024-03").unwrap();
        assert!(std::ptr::eq(current, &history.history[0]));
        assert!(std::ptr::eq(previous, &history.history[2]));
        assert!(previous_month_snapshot(&history, "2024-01").is_none());
        assert!(previous_month_snapshot(&history, "2024-04").is_none());
    }

    #[test]
    fn test_matched_record_comparison() {
        let previous = MonthlySnapshot::from_records(
            "2024-01",
            vec![record("ACME INC", 100.0, 0.0, 0.0, 0.0)],
        );
        let matcher = DescriptionMatcher::default();

        let acme = record("Acme Inc.", 0.0, 120.0, 0.0, 0.0);
        let comparison = matched_record_comparison(&acme, &previous, &matcher).unwrap();
        assert_eq!(comparison.days_31_60.absolute, 20.0);
        assert!(comparison.days_31_60.is_increase());

        let globex = record("Globex", 5.0, 0.0, 0.0, 0.0);
        assert!(matched_record_comparison(&globex, &previous, &matcher).is_none());
    }

    #[test]
    fn test_forecast_footer_change() {
        let mut aged = ForecastRow::new("A", 100.0, 50.0, 30.0, 20.0);
        aged.current = 0.0;
        let previous = vec![aged, ForecastRow::new("B", 10.4, 0.0, 0.0, 0.0)];
        let rows = vec![
            ForecastRow::new("A", 10.4, 60.0, 0.0, 0.0),
            ForecastRow::new("B", 10.4, 50.0, 0.0, 0.0),
        ];

        assert!(forecast_footer_change(&rows, AgingBucket::Total, &[]).is_none());

        let days_0_30 = forecast_footer_change(&rows, AgingBucket::Days0To30, &previous).unwrap();
        assert_eq!(days_0_30.absolute, 21.0 - 110.0);
        assert!(!days_0_30.is_increase());

        let days_31_60 =
            forecast_footer_change(&rows, AgingBucket::Days31To60, &previous).unwrap();
        assert_eq!(days_31_60.previous_value, 110.0);
        assert_eq!(days_31_60.absolute, 0.0);
        assert!(days_31_60.is_increase());

        // Row A last month had no `current`, so its 0-30 value stands in.
        let current = forecast_footer_change(&rows, AgingBucket::Current, &previous).unwrap();
        assert_eq!(current.previous_value, 110.0);
        assert_eq!(current.absolute, 131.0 - 110.0);
    }

    #[test]
    fn test_negligible_change() {
        assert!(BucketChange::between(100.0, 100.0).is_negligible(0.01, 0.1));
        assert!(!BucketChange::between(101.0, 100.0).is_negligible(0.01, 0.1));
    }

    #[test]
    fn test_comparison_series_union_and_order() {
        let previous = MonthlySnapshot::from_records(
            "2024-01",
            vec![
                record("A", 0.0, 0.0, 30.0, 20.0),
                record("Gone", 0.0, 0.0, 5.0, 5.0),
            ],
        );
        let current = MonthlySnapshot::from_records(
            "2024-02",
            vec![
                record("A", 0.0, 0.0, 0.0, 45.0),
                record("New", 0.0, 0.0, 0.0, 80.0),
            ],
        );

        let series = comparison_series(&current, Some(&previous), AgingBucket::Days90Plus);
        let names: Vec<&str> = series.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["New", "A", "Gone"]);
        assert_eq!(series[1].previous, 50.0);
        assert_eq!(series[2].current, 0.0);
        assert_eq!(series[2].previous, 10.0);
    }
}
