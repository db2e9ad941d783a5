//! Review of a generated forecast before approval.
//!
//! The forecast is edited in place by [`ForecastEditor`]. Every edit keeps the
//! row internally consistent: `total` is derived from the four aged buckets
//! and `current` is forced to equal `total`. The editor never adjusts amounts
//! to hit the target; a grand total that disagrees with the target is only
//! reported, through [`TargetStatus`] and [`MismatchTracker`], until the user
//! edits the rows or regenerates the forecast.

use crate::aggregator::column_total;
use crate::config::DEFAULT_TOLERANCE;
use crate::error::{AgingError, Result};
use crate::matcher::DescriptionMatcher;
use crate::schema::{
    AdditionalEntry, AgingBucket, ApproveRequest, ColumnTargets, ForecastRow, PredictRequest,
};
use crate::utils::{parse_month, round_amount};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    /// `total` is derived and cannot be typed into.
    IgnoredDerivedTotal,
    /// Override rows keep `current` derived from their buckets.
    IgnoredOverrideCurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowProvenance {
    CarriedOver,
    UserAdded,
    UserSet,
    AutoGenerated,
}

impl RowProvenance {
    pub fn classify(is_override: bool, has_prior_match: bool) -> Self {
        match (is_override, has_prior_match) {
            (true, true) => RowProvenance::UserSet,
            (true, false) => RowProvenance::UserAdded,
            (false, true) => RowProvenance::CarriedOver,
            (false, false) => RowProvenance::AutoGenerated,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RowProvenance::CarriedOver => "Carried Over",
            RowProvenance::UserAdded => "User Added",
            RowProvenance::UserSet => "User Set",
            RowProvenance::AutoGenerated => "Auto Generated",
        }
    }

    pub fn tooltip(self) -> &'static str {
        match self {
            RowProvenance::CarriedOver => "Existing client from previous month with ML aging applied",
            RowProvenance::UserAdded => "New client added by user (0-30 days only)",
            RowProvenance::UserSet => "User provided amount for existing client",
            RowProvenance::AutoGenerated => "Automatically generated by model to meet target",
        }
    }
}

pub fn classify_row(
    row: &ForecastRow,
    previous_rows: &[ForecastRow],
    matcher: &DescriptionMatcher,
) -> RowProvenance {
    let has_prior = matcher.find_match(&row.description, previous_rows).is_some();
    RowProvenance::classify(row.is_override, has_prior)
}

/// Whether the forecast grand total disagrees with the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetStatus {
    pub show: bool,
    pub grand_total: f64,
    pub target_total: f64,
}

impl TargetStatus {
    pub fn check(grand_total: f64, target_total: f64, tolerance: f64) -> Self {
        Self {
            show: (grand_total - target_total).abs() >= tolerance,
            grand_total,
            target_total,
        }
    }

    pub fn is_matched(&self) -> bool {
        !self.show
    }
}

/// Forwards mismatch state to an observer only when it actually changes.
///
/// Re-observing the same status (within tolerance) yields `None`, so a
/// dependent effect driven by the returned value cannot loop.
#[derive(Debug, Clone)]
pub struct MismatchTracker {
    tolerance: f64,
    last: TargetStatus,
}

impl Default for MismatchTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl MismatchTracker {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            last: TargetStatus::default(),
        }
    }

    pub fn current(&self) -> TargetStatus {
        self.last
    }

    pub fn observe(&mut self, status: TargetStatus) -> Option<TargetStatus> {
        let unchanged = self.last.show == status.show
            && (self.last.grand_total - status.grand_total).abs() < self.tolerance
            && (self.last.target_total - status.target_total).abs() < self.tolerance;
        if unchanged {
            return None;
        }
        self.last = status;
        Some(status)
    }

    /// Hides the warning until the next change is observed.
    pub fn dismiss(&mut self) {
        self.last = TargetStatus::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnMismatch {
    pub bucket: AgingBucket,
    pub actual: f64,
    pub target: f64,
    pub difference: f64,
}

/// The editable forecast table. Owned by the review session and discarded
/// after approval.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastEditor {
    rows: Vec<ForecastRow>,
}

impl ForecastEditor {
    pub fn new(rows: Vec<ForecastRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[ForecastRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<ForecastRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn edit(&mut self, index: usize, bucket: AgingBucket, value: f64) -> Result<EditOutcome> {
        let len = self.rows.len();
        let row = self
            .rows
            .get_mut(index)
            .ok_or(AgingError::RowOutOfRange { index, len })?;

        let value = if value.is_finite() {
            round_amount(value)
        } else {
            0.0
        };

        match bucket {
            AgingBucket::Total => {
                debug!("Ignoring direct edit of derived total on row {}", index);
                return Ok(EditOutcome::IgnoredDerivedTotal);
            }
            AgingBucket::Current if row.is_override => {
                debug!("Ignoring current edit on override row {}", index);
                return Ok(EditOutcome::IgnoredOverrideCurrent);
            }
            AgingBucket::Current => {
                row.current = value;
                row.days_0_30 = value;
            }
            aged => *row.slot_mut(aged) = value,
        }

        row.total = round_amount(row.aged_sum());
        row.current = row.total;
        Ok(EditOutcome::Applied)
    }

    /// Edits from raw cell text; unparseable input counts as `0`.
    pub fn edit_raw(
        &mut self,
        index: usize,
        bucket: AgingBucket,
        raw: &str,
    ) -> Result<EditOutcome> {
        let value = raw.trim().parse::<f64>().unwrap_or(0.0);
        self.edit(index, bucket, value)
    }

    pub fn column_total(&self, bucket: AgingBucket) -> f64 {
        column_total(&self.rows, bucket)
    }

    pub fn grand_total(&self) -> f64 {
        self.column_total(AgingBucket::Total)
    }

    pub fn target_status(&self, target_total: f64, tolerance: f64) -> TargetStatus {
        TargetStatus::check(self.grand_total(), target_total, tolerance)
    }

    /// Aged columns whose sum disagrees with its column target.
    pub fn column_mismatches(
        &self,
        targets: &ColumnTargets,
        tolerance: f64,
    ) -> Vec<ColumnMismatch> {
        AgingBucket::AGED
            .into_iter()
            .filter_map(|bucket| {
                let target = targets.for_bucket(bucket)?;
                let actual = self.column_total(bucket);
                let difference = actual - target;
                (difference.abs() >= tolerance).then_some(ColumnMismatch {
                    bucket,
                    actual,
                    target,
                    difference,
                })
            })
            .collect()
    }

    pub fn provenance(
        &self,
        previous_rows: &[ForecastRow],
        matcher: &DescriptionMatcher,
    ) -> Vec<RowProvenance> {
        self.rows
            .iter()
            .map(|row| classify_row(row, previous_rows, matcher))
            .collect()
    }

    pub fn provenance_counts(
        &self,
        previous_rows: &[ForecastRow],
        matcher: &DescriptionMatcher,
    ) -> BTreeMap<RowProvenance, usize> {
        let mut counts = BTreeMap::new();
        for tag in self.provenance(previous_rows, matcher) {
            *counts.entry(tag).or_insert(0) += 1;
        }
        counts
    }

    /// Consumes the reviewed rows into an approval payload.
    pub fn into_approval(
        self,
        client_id: impl Into<String>,
        target_month: impl Into<String>,
        model_version: impl Into<String>,
        retrain: bool,
        comment: impl Into<String>,
    ) -> Result<ApproveRequest> {
        let target_month = target_month.into();
        parse_month(&target_month)?;
        if self.rows.is_empty() {
            return Err(AgingError::InvalidTargets("nothing to approve".to_string()));
        }
        info!(
            "Approving {} forecast rows for {} (grand total {})",
            self.rows.len(),
            target_month,
            self.grand_total()
        );
        Ok(ApproveRequest {
            client_id: client_id.into(),
            target_month,
            predictions: self.rows,
            model_version: model_version.into(),
            retrain,
            comment: comment.into(),
        })
    }
}

impl ColumnTargets {
    /// A forecast needs at least one positive column target.
    pub fn validate(&self) -> Result<()> {
        for bucket in AgingBucket::AGED {
            if let Some(value) = self.for_bucket(bucket) {
                if value < 0.0 || !value.is_finite() {
                    return Err(AgingError::InvalidTargets(format!(
                        "{} target must be a non-negative amount, got {}",
                        bucket.label(),
                        value
                    )));
                }
            }
        }
        if self.total() <= 0.0 {
            return Err(AgingError::InvalidTargets(
                "enter a value for at least one column target".to_string(),
            ));
        }
        Ok(())
    }
}

impl PredictRequest {
    /// Builds a `/predict` payload. Additional entries are trimmed and
    /// dropped unless they carry both a description and a positive amount.
    pub fn new(
        client_id: impl Into<String>,
        target_month: impl Into<String>,
        column_targets: ColumnTargets,
        carry_threshold: f64,
        additional_entries: Vec<AdditionalEntry>,
    ) -> Result<Self> {
        let target_month = target_month.into();
        parse_month(&target_month)?;
        column_targets.validate()?;
        if !(0.0..=1.0).contains(&carry_threshold) {
            return Err(AgingError::InvalidCarryThreshold(carry_threshold));
        }

        let additional_entries = additional_entries
            .into_iter()
            .map(|e| AdditionalEntry {
                description: e.description.trim().to_string(),
                amount: e.amount,
            })
            .filter(|e| !e.description.is_empty() && e.amount > 0.0)
            .collect();

        Ok(Self {
            client_id: client_id.into(),
            target_month,
            target_total: column_targets.total(),
            carry_threshold,
            additional_entries,
            column_targets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor() -> ForecastEditor {
        ForecastEditor::new(vec![
            ForecastRow::new("Acme", 100.0, 50.0, 30.0, 20.0),
            ForecastRow::new("Globex", 400.0, 0.0, 0.0, 0.0).with_override(),
        ])
    }

    #[test]
    fn test_bucket_edit_recomputes_total_and_current() {
        let mut editor = editor();
        let outcome = editor.edit(0, AgingBucket::Days0To30, 250.4).unwrap();
        assert_eq!(outcome, EditOutcome::Applied);

        let row = &editor.rows()[0];
        assert_eq!(row.days_0_30, 250.0);
        assert_eq!(row.total, 250.0 + 50.0 + 30.0 + 20.0);
        assert_eq!(row.current, row.total);
    }

    #[test]
    fn test_current_edit_mirrors_into_0_30() {
        let mut editor = editor();
        editor.edit_raw(0, AgingBucket::Current, "75").unwrap();

        let row = &editor.rows()[0];
        assert_eq!(row.days_0_30, 75.0);
        assert_eq!(row.total, 175.0);
        assert_eq!(row.current, 175.0);
    }

    #[test]
    fn test_current_edit_rejected_on_override_rows() {
        let mut editor = editor();
        let before = editor.rows()[1].clone();
        let outcome = editor.edit(1, AgingBucket::Current, 999.0).unwrap();
        assert_eq!(outcome, EditOutcome::IgnoredOverrideCurrent);
        assert_eq!(editor.rows()[1], before);
    }

    #[test]
    fn test_total_is_not_editable() {
        let mut editor = editor();
        let before = editor.clone();
        let outcome = editor.edit(0, AgingBucket::Total, 1.0).unwrap();
        assert_eq!(outcome, EditOutcome::IgnoredDerivedTotal);
        assert_eq!(editor, before);
    }

    #[test]
    fn test_garbage_input_counts_as_zero() {
        let mut editor = editor();
        editor.edit_raw(0, AgingBucket::Days31To60, "abc").unwrap();
        assert_eq!(editor.rows()[0].days_31_60, 0.0);
        assert_eq!(editor.rows()[0].total, 150.0);
    }

    #[test]
    fn test_out_of_range_row() {
        let mut editor = editor();
        assert!(matches!(
            editor.edit(5, AgingBucket::Days0To30, 1.0),
            Err(AgingError::RowOutOfRange { index: 5, len: 2 })
        ));
    }

    #[test]
    fn test_mismatch_reported_not_corrected() {
        let editor = ForecastEditor::new(vec![
            ForecastRow::new("A", 500.0, 0.0, 0.0, 0.0),
            ForecastRow::new("B", 498.0, 0.0, 0.0, 0.0),
        ]);
        let status = editor.target_status(1000.0, 0.01);
        assert!(status.show);
        assert_eq!(status.grand_total, 998.0);
        assert_eq!(editor.grand_total(), 998.0);

        let matched = editor.target_status(998.0, 0.01);
        assert!(matched.is_matched());
    }

    #[test]
    fn test_tracker_is_idempotent() {
        let mut tracker = MismatchTracker::default();
        let status = TargetStatus::check(998.0, 1000.0, 0.01);

        assert_eq!(tracker.observe(status), Some(status));
        assert_eq!(tracker.observe(status), None);
        assert_eq!(tracker.observe(TargetStatus::check(998.001, 1000.0, 0.01)), None);

        let fixed = TargetStatus::check(1000.0, 1000.0, 0.01);
        assert_eq!(tracker.observe(fixed), Some(fixed));
        assert_eq!(tracker.observe(fixed), None);
    }

    #[test]
    fn test_tracker_initial_state_is_hidden() {
        let mut tracker = MismatchTracker::default();
        assert_eq!(tracker.observe(TargetStatus::check(0.0, 0.0, 0.01)), None);

        let status = TargetStatus::check(10.0, 20.0, 0.01);
        tracker.observe(status);
        tracker.dismiss();
        assert!(!tracker.current().show);
        assert_eq!(tracker.observe(status), Some(status));
    }

    #[test]
    fn test_column_mismatches() {
        let editor = editor();
        let targets = ColumnTargets::new(500.0, 40.0, 30.0, 20.0);
        let mismatches = editor.column_mismatches(&targets, 0.01);

        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].bucket, AgingBucket::Days31To60);
        assert_eq!(mismatches[0].actual, 50.0);
        assert_eq!(mismatches[0].difference, 10.0);
    }

    #[test]
    fn test_provenance() {
        let previous = vec![
            ForecastRow::new("Acme Inc.", 10.0, 0.0, 0.0, 0.0),
            ForecastRow::new("Initech", 10.0, 0.0, 0.0, 0.0),
        ];
        let editor = ForecastEditor::new(vec![
            ForecastRow::new("acme inc", 10.0, 0.0, 0.0, 0.0),
            ForecastRow::new("Initech", 99.0, 0.0, 0.0, 0.0).with_override(),
            ForecastRow::new("Hooli", 5.0, 0.0, 0.0, 0.0).with_override(),
            ForecastRow::new("Model Filler", 5.0, 0.0, 0.0, 0.0),
        ]);
        let matcher = DescriptionMatcher::default();

        assert_eq!(
            editor.provenance(&previous, &matcher),
            vec![
                RowProvenance::CarriedOver,
                RowProvenance::UserSet,
                RowProvenance::UserAdded,
                RowProvenance::AutoGenerated,
            ]
        );
        let counts = editor.provenance_counts(&previous, &matcher);
        assert_eq!(counts[&RowProvenance::CarriedOver], 1);
        assert_eq!(RowProvenance::UserSet.label(), "User Set");
    }

    #[test]
    fn test_predict_request_filters_entries() {
        let request = PredictRequest::new(
            "42",
            "2024-06",
            ColumnTargets::new(1000.0, 500.0, 0.0, 0.0),
            0.5,
            vec![
                AdditionalEntry {
                    description: "  New Client  ".to_string(),
                    amount: 200.0,
                },
                AdditionalEntry {
                    description: "".to_string(),
                    amount: 50.0,
                },
                AdditionalEntry {
                    description: "Zero".to_string(),
                    amount: 0.0,
                },
            ],
        )
        .unwrap();

        assert_eq!(request.target_total, 1500.0);
        assert_eq!(request.additional_entries.len(), 1);
        assert_eq!(request.additional_entries[0].description, "New Client");
    }

    #[test]
    fn test_predict_request_validation() {
        let empty = ColumnTargets::default();
        assert!(matches!(
            PredictRequest::new("1", "2024-06", empty, 0.5, vec![]),
            Err(AgingError::InvalidTargets(_))
        ));

        let targets = ColumnTargets::new(10.0, 0.0, 0.0, 0.0);
        assert!(matches!(
            PredictRequest::new("1", "2024-06", targets.clone(), 1.5, vec![]),
            Err(AgingError::InvalidCarryThreshold(_))
        ));
        assert!(matches!(
            PredictRequest::new("1", "June", targets.clone(), 0.5, vec![]),
            Err(AgingError::InvalidMonth(_))
        ));
        assert!(matches!(
            PredictRequest::new("1", "2024-6 ", targets, 0.5, vec![]),
            Err(AgingError::InvalidMonth(_))
        ));
    }

    #[test]
    fn test_into_approval() {
        let approval = editor()
            .into_approval("42", "2024-06", "v3", false, "looks right")
            .unwrap();
        assert_eq!(approval.predictions.len(), 2);
        assert_eq!(approval.model_version, "v3");

        assert!(ForecastEditor::default()
            .into_approval("42", "2024-06", "v3", false, "")
            .is_err());
    }
}
