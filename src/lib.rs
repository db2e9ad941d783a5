//! # AR Aging Forecast
//!
//! Month-over-month reconciliation and analytics for accounts-receivable
//! aging reports, plus review of model-generated forecasts before approval.
//!
//! ## Core Concepts
//!
//! - **Aging buckets**: `current`, `0_30`, `31_60`, `61_90` and `90_plus` days outstanding
//! - **Bucket shift**: a receivable ages one bucket per month, so this month's
//!   `31_60` is compared with last month's `0_30`, and `90_plus` with last
//!   month's `61_90 + 90_plus`
//! - **Description matching**: the same customer is found across months
//!   despite case, punctuation and known spelling drift
//! - **Target reconciliation**: forecast edits keep rows consistent and
//!   disagreement with the target total is reported, never silently fixed
//!
//! ## Example
//!
//! ```rust,ignore
//! use ar_aging_forecast::*;
//!
//! let history: ClientHistory = serde_json::from_str(&payload)?;
//! let report = ClientReport::build(history, &ReconciliationConfig::default())?;
//!
//! println!("Growth: {}", format_currency(report.analytics().total_growth));
//! if let Some(change) = report.month_comparison("2024-03") {
//!     println!("31-60 vs aged 0-30: {}", format_signed_currency(change.days_31_60.absolute));
//! }
//! ```

pub mod aggregator;
pub mod analytics;
pub mod comparator;
pub mod config;
pub mod error;
pub mod export;
pub mod ingestion;
pub mod matcher;
pub mod reconciliation;
pub mod schema;
pub mod selection;
pub mod utils;

#[cfg(feature = "backend")]
pub mod backend;

pub use aggregator::{aggregate, aggregate_snapshot, column_total, BucketTotals};
pub use analytics::{
    chart_points, chart_years, compute_analytics, AgingTrend, AnalyticsSummary, ChartPoint,
    MonthlyStat, YearFilter,
};
pub use comparator::*;
pub use config::{
    default_corrections, CorrectionRule, ReconciliationConfig, DEFAULT_NEGLIGIBLE_PERCENTAGE,
    DEFAULT_TOLERANCE,
};
pub use error::{AgingError, Result};
pub use export::*;
pub use ingestion::*;
pub use matcher::{DescriptionMatcher, MatchKind};
pub use reconciliation::*;
pub use schema::*;
pub use selection::{SelectionGuard, Ticket};
pub use utils::*;

use log::{debug, info, warn};

/// Checks that every snapshot's `total_amount` equals the sum of its record
/// totals within `tolerance`.
pub fn verify_snapshot_totals(history: &ClientHistory, tolerance: f64) -> Result<()> {
    for snapshot in &history.history {
        let computed = snapshot.records_total();
        if (snapshot.total_amount - computed).abs() > tolerance {
            return Err(AgingError::SnapshotTotalMismatch {
                month: snapshot.month.clone(),
                reported: snapshot.total_amount,
                computed,
            });
        }
    }
    Ok(())
}

/// A client's history prepared for display: validated, sorted
/// chronologically and analysed once.
#[derive(Debug, Clone)]
pub struct ClientReport {
    history: ClientHistory,
    analytics: AnalyticsSummary,
    matcher: DescriptionMatcher,
    config: ReconciliationConfig,
}

impl ClientReport {
    pub fn build(mut history: ClientHistory, config: &ReconciliationConfig) -> Result<Self> {
        for snapshot in &history.history {
            parse_month(&snapshot.month)?;
        }
        sort_history(&mut history.history);

        info!(
            "Building report for {} months ({} records)",
            history.history.len(),
            history.summary.total_records
        );

        for snapshot in &history.history {
            let computed = snapshot.records_total();
            if (snapshot.total_amount - computed).abs() > config.tolerance {
                warn!(
                    "Snapshot {} reports total {} but its records sum to {}",
                    snapshot.month, snapshot.total_amount, computed
                );
            }
        }

        let matcher = config.matcher()?;
        let analytics = compute_analytics(&history);
        debug!(
            "Analytics: growth {}, volatility {}, peak {:?}",
            analytics.total_growth, analytics.volatility, analytics.peak_month
        );

        Ok(Self {
            history,
            analytics,
            matcher,
            config: config.clone(),
        })
    }

    pub fn from_json(json: &str, config: &ReconciliationConfig) -> Result<Self> {
        let history: ClientHistory = serde_json::from_str(json)?;
        Self::build(history, config)
    }

    /// Like [`ClientReport::build`] but rejects snapshots whose
    /// `total_amount` disagrees with their records.
    pub fn build_verified(history: ClientHistory, config: &ReconciliationConfig) -> Result<Self> {
        verify_snapshot_totals(&history, config.tolerance)?;
        Self::build(history, config)
    }

    pub fn history(&self) -> &ClientHistory {
        &self.history
    }

    pub fn analytics(&self) -> &AnalyticsSummary {
        &self.analytics
    }

    pub fn matcher(&self) -> &DescriptionMatcher {
        &self.matcher
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    pub fn months(&self) -> Vec<&str> {
        self.history.history.iter().map(|s| s.month.as_str()).collect()
    }

    pub fn years(&self) -> Vec<i32> {
        available_years(self.months())
    }

    pub fn latest(&self) -> Option<&MonthlySnapshot> {
        self.history.history.last()
    }

    /// First month a new forecast may target: the month after the latest data.
    pub fn minimum_target_month(&self) -> Result<Option<String>> {
        self.latest().map(|s| next_month(&s.month)).transpose()
    }

    pub fn month_comparison(&self, month: &str) -> Option<AgingComparison> {
        month_comparison(&self.history, month)
    }

    /// Each record of `month` with its comparison against the previous month.
    pub fn record_comparisons(
        &self,
        month: &str,
    ) -> Vec<(&MonthlyRecord, Option<AgingComparison>)> {
        let Some(index) = self.history.history.iter().position(|s| s.month == month) else {
            return Vec::new();
        };
        let previous = index
            .checked_sub(1)
            .and_then(|i| self.history.history.get(i));
        self.history.history[index]
            .records
            .iter()
            .map(|record| {
                let comparison =
                    previous.and_then(|p| matched_record_comparison(record, p, &self.matcher));
                (record, comparison)
            })
            .collect()
    }

    pub fn comparison_series(&self, month: &str, bucket: AgingBucket) -> Vec<ComparisonPoint> {
        let Some(index) = self.history.history.iter().position(|s| s.month == month) else {
            return Vec::new();
        };
        let previous = index
            .checked_sub(1)
            .and_then(|i| self.history.history.get(i));
        comparison_series(&self.history.history[index], previous, bucket)
    }

    pub fn chart_points(&self, filter: YearFilter) -> Vec<ChartPoint> {
        chart_points(&self.analytics.monthly_stats, filter)
    }

    /// Whether `change` is small enough to display as "no change".
    pub fn is_negligible(&self, change: &BucketChange) -> bool {
        change.is_negligible(self.config.tolerance, self.config.negligible_percentage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> ClientHistory {
        ClientHistory::new(vec![
            MonthlySnapshot::from_records(
                "2024-02",
                vec![
                    MonthlyRecord::new("Acme Inc.", AgingBuckets::new(0.0, 100.0, 50.0, 45.0)),
                    MonthlyRecord::new("Globex", AgingBuckets::new(300.0, 0.0, 0.0, 0.0)),
                ],
            ),
            MonthlySnapshot::from_records(
                "2024-01",
                vec![MonthlyRecord::new(
                    "ACME INC",
                    AgingBuckets::new(100.0, 50.0, 30.0, 20.0),
                )],
            ),
        ])
    }

    #[test]
    fn test_build_sorts_and_analyses() {
        let report = ClientReport::build(history(), &ReconciliationConfig::default()).unwrap();

        assert_eq!(report.months(), vec!["2024-01", "2024-02"]);
        assert_eq!(report.years(), vec![2024]);
        assert_eq!(report.analytics().total_months, 2);
        assert!(
            (report.analytics().total_growth - (495.0 - 200.0)).abs() < 0.01,
            "growth was {}",
            report.analytics().total_growth
        );
        assert_eq!(
            report.minimum_target_month().unwrap(),
            Some("2024-03".to_string())
        );
    }

    #[test]
    fn test_record_comparisons_use_matcher_and_shift() {
        let report = ClientReport::build(history(), &ReconciliationConfig::default()).unwrap();
        let rows = report.record_comparisons("2024-02");
        assert_eq!(rows.len(), 2);

        let acme = rows[0].1.expect("Acme should match ACME INC");
        assert_eq!(acme.days_31_60.absolute, 0.0);
        assert_eq!(acme.days_61_90.absolute, 0.0);
        assert_eq!(acme.days_90_plus.absolute, -5.0);

        assert!(rows[1].1.is_none());
        assert!(report.record_comparisons("2023-12").is_empty());
    }

    #[test]
    fn test_first_month_has_no_comparison() {
        let report = ClientReport::build(history(), &ReconciliationConfig::default()).unwrap();
        assert!(report.month_comparison("2024-01").is_none());
        assert!(report.month_comparison("2024-02").is_some());

        let first = report.record_comparisons("2024-01");
        assert_eq!(first.len(), 1);
        assert!(first.iter().all(|(_, comparison)| comparison.is_none()));
    }

    #[test]
    fn test_invalid_month_rejected() {
        let mut bad = history();
        bad.history[0].month = "Feb 2024".to_string();
        let result = ClientReport::build(bad, &ReconciliationConfig::default());
        assert!(matches!(result, Err(AgingError::InvalidMonth(_))));
    }

    #[test]
    fn test_verified_build_rejects_drifted_totals() {
        let mut drifted = history();
        drifted.history[0].total_amount += 10.0;

        assert!(ClientReport::build(drifted.clone(), &ReconciliationConfig::default()).is_ok());
        assert!(matches!(
            ClientReport::build_verified(drifted, &ReconciliationConfig::default()),
            Err(AgingError::SnapshotTotalMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_history() {
        let config = ReconciliationConfig::default();
        let report = ClientReport::from_json(r#"{"history": []}"#, &config).unwrap();
        assert_eq!(report.analytics().total_growth, 0.0);
        assert!(report.analytics().peak_month.is_none());
        assert_eq!(report.minimum_target_month().unwrap(), None);
        assert!(report.comparison_series("2024-01", AgingBucket::Total).is_empty());
    }
}
