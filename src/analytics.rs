//! Historical analytics for one client: growth, volatility, peak/low months
//! and per-bucket trends. Everything is derived on demand from a
//! [`ClientHistory`] and never stored.
//!
//! Snapshots are consumed in the order given. Callers that did not receive a
//! chronologically sorted history should run [`crate::utils::sort_history`]
//! first (or go through [`crate::ClientReport`], which does).

use crate::schema::{AgingBucket, AgingValues, ClientHistory, MonthlySnapshot};
use crate::utils::{format_month_short, month_year};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyStat {
    pub month: String,
    pub total: f64,
    pub historical_count: usize,
    pub predicted_count: usize,
    pub has_predictions: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgingTrend {
    pub avg: f64,
    /// OLS slope of value against position in the flattened record sequence.
    pub trend: f64,
    pub values: Vec<f64>,
}

impl AgingTrend {
    fn from_values(values: Vec<f64>) -> Self {
        let avg = if values.is_empty() {
            0.0
        } else {
            values.iter().mean()
        };
        Self {
            avg,
            trend: linear_trend(&values),
            values,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_growth: f64,
    pub avg_monthly_growth: f64,
    pub growth_rate: f64,
    pub volatility: f64,
    pub peak_month: Option<String>,
    pub low_month: Option<String>,
    pub aging_trends: BTreeMap<AgingBucket, AgingTrend>,
    pub prediction_accuracy: f64,
    pub monthly_stats: Vec<MonthlyStat>,
    pub total_months: usize,
    pub avg_monthly_total: f64,
}

/// Ordinary-least-squares slope of `values` against their index, using the
/// closed-form index sums. Fewer than two values have no trend.
pub fn linear_trend(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let n = n as f64;
    let x_sum = n * (n - 1.0) / 2.0;
    let x_squared_sum = n * (n - 1.0) * (2.0 * n - 1.0) / 6.0;
    let y_sum: f64 = values.iter().sum();
    let xy_sum: f64 = values
        .iter()
        .enumerate()
        .map(|(i, v)| i as f64 * v)
        .sum();

    let denominator = n * x_squared_sum - x_sum * x_sum;
    if denominator == 0.0 {
        return 0.0;
    }
    (n * xy_sum - x_sum * y_sum) / denominator
}

/// Population standard deviation of consecutive month-over-month deltas.
pub fn volatility(totals: &[f64]) -> f64 {
    let deltas: Vec<f64> = totals.windows(2).map(|w| w[1] - w[0]).collect();
    if deltas.len() < 2 {
        return 0.0;
    }
    deltas.iter().population_std_dev()
}

fn first_extreme<F>(stats: &[MonthlyStat], better: F) -> Option<String>
where
    F: Fn(f64, f64) -> bool,
{
    let mut best: Option<&MonthlyStat> = None;
    for stat in stats {
        let replace = match best {
            None => true,
            Some(current) => better(stat.total, current.total),
        };
        if replace {
            best = Some(stat);
        }
    }
    best.map(|s| s.month.clone())
}

/// A month counts as predicted when it is flagged or any record is.
fn contains_predictions(snapshot: &MonthlySnapshot) -> bool {
    snapshot.has_predictions || snapshot.records.iter().any(|r| r.predicted)
}

pub fn compute_analytics(history: &ClientHistory) -> AnalyticsSummary {
    let snapshots = &history.history;
    if snapshots.is_empty() {
        return AnalyticsSummary::default();
    }

    let monthly_stats: Vec<MonthlyStat> = snapshots
        .iter()
        .map(|s| MonthlyStat {
            month: s.month.clone(),
            total: s.total_amount,
            historical_count: s.historical_count,
            predicted_count: s.predicted_count,
            has_predictions: contains_predictions(s),
        })
        .collect();

    let totals: Vec<f64> = monthly_stats.iter().map(|m| m.total).collect();
    let first_total = totals.first().copied().unwrap_or(0.0);
    let last_total = totals.last().copied().unwrap_or(0.0);
    let total_growth = last_total - first_total;
    let avg_monthly_growth = if totals.len() > 1 {
        total_growth / (totals.len() - 1) as f64
    } else {
        0.0
    };
    let growth_rate = if first_total != 0.0 {
        total_growth / first_total * 100.0
    } else {
        0.0
    };

    let mut aging_trends = BTreeMap::new();
    for bucket in AgingBucket::BALANCES {
        let values: Vec<f64> = snapshots
            .iter()
            .flat_map(|s| s.records.iter())
            .map(|r| r.bucket_value(bucket))
            .collect();
        aging_trends.insert(bucket, AgingTrend::from_values(values));
    }

    let months_with_predictions = snapshots.iter().filter(|s| contains_predictions(s)).count();
    let prediction_accuracy = months_with_predictions as f64 / snapshots.len() as f64 * 100.0;

    AnalyticsSummary {
        total_growth,
        avg_monthly_growth,
        growth_rate,
        volatility: volatility(&totals),
        peak_month: first_extreme(&monthly_stats, |candidate, best| candidate > best),
        low_month: first_extreme(&monthly_stats, |candidate, best| candidate < best),
        aging_trends,
        prediction_accuracy,
        total_months: snapshots.len(),
        avg_monthly_total: totals.iter().mean(),
        monthly_stats,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum YearFilter {
    #[default]
    All,
    Year(i32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub month: String,
    pub month_name: String,
    pub year: Option<i32>,
    pub total: f64,
    pub is_prediction: bool,
}

/// Points for the monthly totals chart, optionally restricted to one year.
pub fn chart_points(stats: &[MonthlyStat], filter: YearFilter) -> Vec<ChartPoint> {
    stats
        .iter()
        .filter(|s| match filter {
            YearFilter::All => true,
            YearFilter::Year(year) => month_year(&s.month) == Some(year),
        })
        .map(|s| ChartPoint {
            month: s.month.clone(),
            month_name: format_month_short(&s.month),
            year: month_year(&s.month),
            total: s.total,
            is_prediction: s.has_predictions,
        })
        .collect()
}

/// Years with data, most recent first (for the chart's year selector).
pub fn chart_years(stats: &[MonthlyStat]) -> Vec<i32> {
    crate::utils::available_years(stats.iter().map(|s| s.month.as_str()))
}
