use crate::schema::{AgingBucket, AgingValues, MonthlySnapshot};
use crate::utils::round_amount;
use serde::{Deserialize, Serialize};

/// Column sums for one month (or one forecast table).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketTotals {
    pub current: f64,
    #[serde(rename = "0_30")]
    pub days_0_30: f64,
    #[serde(rename = "31_60")]
    pub days_31_60: f64,
    #[serde(rename = "61_90")]
    pub days_61_90: f64,
    #[serde(rename = "90_plus")]
    pub days_90_plus: f64,
    pub total: f64,
}

impl BucketTotals {
    pub fn get(&self, bucket: AgingBucket) -> f64 {
        match bucket {
            AgingBucket::Current => self.current,
            AgingBucket::Days0To30 => self.days_0_30,
            AgingBucket::Days31To60 => self.days_31_60,
            AgingBucket::Days61To90 => self.days_61_90,
            AgingBucket::Days90Plus => self.days_90_plus,
            AgingBucket::Total => self.total,
        }
    }

    fn slot_mut(&mut self, bucket: AgingBucket) -> &mut f64 {
        match bucket {
            AgingBucket::Current => &mut self.current,
            AgingBucket::Days0To30 => &mut self.days_0_30,
            AgingBucket::Days31To60 => &mut self.days_31_60,
            AgingBucket::Days61To90 => &mut self.days_61_90,
            AgingBucket::Days90Plus => &mut self.days_90_plus,
            AgingBucket::Total => &mut self.total,
        }
    }

    #[must_use]
    pub fn rounded(&self) -> Self {
        let mut out = *self;
        for bucket in AgingBucket::ALL {
            let slot = out.slot_mut(bucket);
            *slot = round_amount(*slot);
        }
        out
    }
}

impl AgingValues for BucketTotals {
    fn bucket_value(&self, bucket: AgingBucket) -> f64 {
        self.get(bucket)
    }
}

/// Sums every column across `records`. The `total` column is the sum of the
/// records' own totals, not a re-summation of their buckets.
pub fn aggregate<T: AgingValues>(records: &[T]) -> BucketTotals {
    let mut totals = BucketTotals::default();
    for record in records {
        for bucket in AgingBucket::ALL {
            *totals.slot_mut(bucket) += record.bucket_value(bucket);
        }
    }
    totals
}

pub fn aggregate_snapshot(snapshot: &MonthlySnapshot) -> BucketTotals {
    aggregate(&snapshot.records)
}

/// Column sum rounded to whole units, as shown in table footers.
pub fn column_total<T: AgingValues>(records: &[T], bucket: AgingBucket) -> f64 {
    round_amount(records.iter().map(|r| r.bucket_value(bucket)).sum())
}
