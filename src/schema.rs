use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// An aging column. `Total` is not a bucket of its own but is compared and
/// aggregated alongside the buckets everywhere, so it shares the enum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum AgingBucket {
    #[serde(rename = "current")]
    Current,
    #[serde(rename = "0_30")]
    Days0To30,
    #[serde(rename = "31_60")]
    Days31To60,
    #[serde(rename = "61_90")]
    Days61To90,
    #[serde(rename = "90_plus")]
    Days90Plus,
    #[serde(rename = "total")]
    Total,
}

impl AgingBucket {
    /// The four buckets that make up a record's total.
    pub const AGED: [AgingBucket; 4] = [
        AgingBucket::Days0To30,
        AgingBucket::Days31To60,
        AgingBucket::Days61To90,
        AgingBucket::Days90Plus,
    ];

    /// Every balance bucket (`current` included), without `total`.
    pub const BALANCES: [AgingBucket; 5] = [
        AgingBucket::Current,
        AgingBucket::Days0To30,
        AgingBucket::Days31To60,
        AgingBucket::Days61To90,
        AgingBucket::Days90Plus,
    ];

    pub const ALL: [AgingBucket; 6] = [
        AgingBucket::Current,
        AgingBucket::Days0To30,
        AgingBucket::Days31To60,
        AgingBucket::Days61To90,
        AgingBucket::Days90Plus,
        AgingBucket::Total,
    ];

    /// Wire key as used by the backend payloads.
    pub fn key(self) -> &'static str {
        match self {
            AgingBucket::Current => "current",
            AgingBucket::Days0To30 => "0_30",
            AgingBucket::Days31To60 => "31_60",
            AgingBucket::Days61To90 => "61_90",
            AgingBucket::Days90Plus => "90_plus",
            AgingBucket::Total => "total",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.key() == key)
    }

    pub fn label(self) -> &'static str {
        match self {
            AgingBucket::Current => "Current",
            AgingBucket::Days0To30 => "0-30 Days",
            AgingBucket::Days31To60 => "31-60 Days",
            AgingBucket::Days61To90 => "61-90 Days",
            AgingBucket::Days90Plus => "90+ Days",
            AgingBucket::Total => "Total",
        }
    }

    /// Label of the previous-month column a value in this column is compared against.
    pub fn previous_label(self) -> &'static str {
        match self {
            AgingBucket::Current => "Current",
            AgingBucket::Days0To30 => "0-30 Days",
            AgingBucket::Days31To60 => "0-30 Days (aged)",
            AgingBucket::Days61To90 => "31-60 Days (aged)",
            AgingBucket::Days90Plus => "61-90+ Days (aged)",
            AgingBucket::Total => "Total",
        }
    }
}

/// Anything that exposes a value per aging column.
pub trait AgingValues {
    fn bucket_value(&self, bucket: AgingBucket) -> f64;
}

/// Anything carrying a free-text description that can be matched across months.
pub trait Described {
    fn description(&self) -> &str;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AgingBuckets {
    #[serde(default)]
    pub current: f64,

    #[serde(rename = "0_30", default)]
    pub days_0_30: f64,

    #[serde(rename = "31_60", default)]
    pub days_31_60: f64,

    #[serde(rename = "61_90", default)]
    pub days_61_90: f64,

    #[serde(rename = "90_plus", default)]
    pub days_90_plus: f64,
}

impl AgingBuckets {
    pub fn new(days_0_30: f64, days_31_60: f64, days_61_90: f64, days_90_plus: f64) -> Self {
        Self {
            current: days_0_30,
            days_0_30,
            days_31_60,
            days_61_90,
            days_90_plus,
        }
    }

    /// Sum of the four aged buckets. `current` mirrors `0_30` and is excluded.
    pub fn aged_sum(&self) -> f64 {
        self.days_0_30 + self.days_31_60 + self.days_61_90 + self.days_90_plus
    }

    pub fn get(&self, bucket: AgingBucket) -> f64 {
        match bucket {
            AgingBucket::Current => self.current,
            AgingBucket::Days0To30 => self.days_0_30,
            AgingBucket::Days31To60 => self.days_31_60,
            AgingBucket::Days61To90 => self.days_61_90,
            AgingBucket::Days90Plus => self.days_90_plus,
            AgingBucket::Total => self.aged_sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MonthlyRecord {
    #[schemars(description = "Free-text client description; spelling may drift between months")]
    pub description: String,

    #[serde(default)]
    pub aging: AgingBuckets,

    #[serde(default)]
    #[schemars(description = "Sum of the 0_30, 31_60, 61_90 and 90_plus buckets")]
    pub total: f64,

    #[serde(default)]
    #[schemars(description = "True if the record came from the forecasting service")]
    pub predicted: bool,
}

impl MonthlyRecord {
    pub fn new(description: impl Into<String>, aging: AgingBuckets) -> Self {
        let total = aging.aged_sum();
        Self {
            description: description.into(),
            aging,
            total,
            predicted: false,
        }
    }

    #[must_use]
    pub fn predicted(mut self) -> Self {
        self.predicted = true;
        self
    }
}

impl AgingValues for MonthlyRecord {
    fn bucket_value(&self, bucket: AgingBucket) -> f64 {
        match bucket {
            AgingBucket::Total => self.total,
            other => self.aging.get(other),
        }
    }
}

impl Described for MonthlyRecord {
    fn description(&self) -> &str {
        &self.description
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MonthlySnapshot {
    #[schemars(description = "Year-month in YYYY-MM format")]
    pub month: String,

    #[serde(default)]
    pub records: Vec<MonthlyRecord>,

    #[serde(default)]
    pub total_amount: f64,

    #[serde(default)]
    pub historical_count: usize,

    #[serde(default)]
    pub predicted_count: usize,

    #[serde(default)]
    pub has_predictions: bool,
}

impl MonthlySnapshot {
    /// Builds a snapshot whose derived fields are consistent with `records`.
    pub fn from_records(month: impl Into<String>, records: Vec<MonthlyRecord>) -> Self {
        let predicted_count = records.iter().filter(|r| r.predicted).count();
        let historical_count = records.len() - predicted_count;
        let total_amount = records.iter().map(|r| r.total).sum();

        Self {
            month: month.into(),
            records,
            total_amount,
            historical_count,
            predicted_count,
            has_predictions: predicted_count > 0,
        }
    }

    pub fn records_total(&self) -> f64 {
        self.records.iter().map(|r| r.total).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HistorySummary {
    #[serde(default)]
    pub total_months: usize,

    #[serde(default)]
    pub total_records: usize,

    #[serde(default)]
    pub historical_records: usize,

    #[serde(default)]
    pub predicted_records: usize,
}

impl HistorySummary {
    pub fn from_snapshots(snapshots: &[MonthlySnapshot]) -> Self {
        Self {
            total_months: snapshots.len(),
            total_records: snapshots.iter().map(|s| s.records.len()).sum(),
            historical_records: snapshots.iter().map(|s| s.historical_count).sum(),
            predicted_records: snapshots.iter().map(|s| s.predicted_count).sum(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClientHistory {
    #[serde(default)]
    pub history: Vec<MonthlySnapshot>,

    #[serde(default)]
    pub summary: HistorySummary,
}

impl ClientHistory {
    pub fn new(history: Vec<MonthlySnapshot>) -> Self {
        let summary = HistorySummary::from_snapshots(&history);
        Self { history, summary }
    }

    pub fn find_month(&self, month: &str) -> Option<&MonthlySnapshot> {
        self.history.iter().find(|s| s.month == month)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ClientHistory)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

/// A flat forecast row as returned by `/predict` and by the
/// previous-month lookup. Fields the backend sends that this crate does not
/// interpret are kept in `extra` so approval round-trips them untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ForecastRow {
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub current: f64,

    #[serde(rename = "0_30", default)]
    pub days_0_30: f64,

    #[serde(rename = "31_60", default)]
    pub days_31_60: f64,

    #[serde(rename = "61_90", default)]
    pub days_61_90: f64,

    #[serde(rename = "90_plus", default)]
    pub days_90_plus: f64,

    #[serde(default)]
    pub total: f64,

    #[serde(default)]
    #[schemars(description = "Row amount was supplied by the user rather than the model")]
    pub is_override: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ForecastRow {
    pub fn new(
        description: impl Into<String>,
        days_0_30: f64,
        days_31_60: f64,
        days_61_90: f64,
        days_90_plus: f64,
    ) -> Self {
        let total = days_0_30 + days_31_60 + days_61_90 + days_90_plus;
        Self {
            description: description.into(),
            current: total,
            days_0_30,
            days_31_60,
            days_61_90,
            days_90_plus,
            total,
            is_override: false,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_override(mut self) -> Self {
        self.is_override = true;
        self
    }

    /// `current` as displayed: rows that never carried it fall back to `0_30`.
    pub fn current_or_0_30(&self) -> f64 {
        if self.current != 0.0 {
            self.current
        } else {
            self.days_0_30
        }
    }

    pub fn aged_sum(&self) -> f64 {
        self.days_0_30 + self.days_31_60 + self.days_61_90 + self.days_90_plus
    }

    pub(crate) fn slot_mut(&mut self, bucket: AgingBucket) -> &mut f64 {
        match bucket {
            AgingBucket::Current => &mut self.current,
            AgingBucket::Days0To30 => &mut self.days_0_30,
            AgingBucket::Days31To60 => &mut self.days_31_60,
            AgingBucket::Days61To90 => &mut self.days_61_90,
            AgingBucket::Days90Plus => &mut self.days_90_plus,
            AgingBucket::Total => &mut self.total,
        }
    }
}

impl AgingValues for ForecastRow {
    fn bucket_value(&self, bucket: AgingBucket) -> f64 {
        match bucket {
            AgingBucket::Current => self.current_or_0_30(),
            AgingBucket::Days0To30 => self.days_0_30,
            AgingBucket::Days31To60 => self.days_31_60,
            AgingBucket::Days61To90 => self.days_61_90,
            AgingBucket::Days90Plus => self.days_90_plus,
            AgingBucket::Total => self.total,
        }
    }
}

impl Described for ForecastRow {
    fn description(&self) -> &str {
        &self.description
    }
}

/// Per-bucket targets entered before generating a forecast.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnTargets {
    #[serde(default)]
    pub b0_30: f64,

    #[serde(default)]
    pub b31_60: f64,

    #[serde(default)]
    pub b61_90: f64,

    #[serde(default)]
    pub b90_plus: f64,
}

impl ColumnTargets {
    pub fn new(b0_30: f64, b31_60: f64, b61_90: f64, b90_plus: f64) -> Self {
        Self {
            b0_30,
            b31_60,
            b61_90,
            b90_plus,
        }
    }

    pub fn total(&self) -> f64 {
        self.b0_30 + self.b31_60 + self.b61_90 + self.b90_plus
    }

    /// Target for an aged bucket; `current` and `total` have no column target.
    pub fn for_bucket(&self, bucket: AgingBucket) -> Option<f64> {
        match bucket {
            AgingBucket::Days0To30 => Some(self.b0_30),
            AgingBucket::Days31To60 => Some(self.b31_60),
            AgingBucket::Days61To90 => Some(self.b61_90),
            AgingBucket::Days90Plus => Some(self.b90_plus),
            AgingBucket::Current | AgingBucket::Total => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AdditionalEntry {
    pub description: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PredictRequest {
    pub client_id: String,
    pub target_month: String,
    pub target_total: f64,
    pub carry_threshold: f64,
    #[serde(default)]
    pub additional_entries: Vec<AdditionalEntry>,
    pub column_targets: ColumnTargets,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelMeta {
    #[serde(default)]
    pub model_version: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PredictResponse {
    #[serde(default)]
    pub predictions: Vec<ForecastRow>,

    #[serde(default)]
    pub model_meta: Option<ModelMeta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ApproveRequest {
    pub client_id: String,
    pub target_month: String,
    pub predictions: Vec<ForecastRow>,
    pub model_version: String,
    #[serde(default)]
    pub retrain: bool,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClientSummary {
    #[serde(deserialize_with = "string_or_number")]
    #[schemars(with = "String")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub total_records: usize,
    #[serde(default)]
    pub historical_records: usize,
    #[serde(default)]
    pub predicted_records: usize,
    #[serde(default)]
    pub first_month: Option<String>,
    #[serde(default)]
    pub last_month: Option<String>,
    #[serde(default)]
    pub has_model: bool,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    #[schemars(with = "Option<String>")]
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClientsSummary {
    #[serde(default)]
    pub clients: Vec<ClientSummary>,
    #[serde(default)]
    pub total_clients: usize,
    #[serde(default)]
    pub total_records: usize,
    #[serde(default)]
    pub total_historical: usize,
    #[serde(default)]
    pub total_predictions: usize,
}

impl ClientsSummary {
    pub fn clients_with_model(&self) -> usize {
        self.clients.iter().filter(|c| c.has_model).count()
    }

    /// Case-insensitive substring filter on client names.
    pub fn search(&self, term: &str) -> Vec<&ClientSummary> {
        let needle = term.to_lowercase();
        self.clients
            .iter()
            .filter(|c| c.name.to_lowercase().contains(&needle))
            .collect()
    }
}

fn value_to_id(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// Backend ids arrive as numbers or strings depending on the endpoint.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_id(value).ok_or_else(|| serde::de::Error::custom("expected string or number id"))
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(value_to_id))
}
