use crate::schema::{ClientHistory, ForecastRow};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LastMonthResponse {
    #[serde(default)]
    pub last_month: Option<String>,
}

/// Error body returned by the backend (`{"detail": "..."}`).
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorDetail {
    pub detail: serde_json::Value,
}

/// What the forecast form needs before a prediction can be requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastContext {
    /// Latest month with data, if the client has any.
    pub last_month: Option<String>,
    /// Earliest month a forecast may target.
    pub minimum_target_month: String,
    /// Flat rows of `last_month`, used for provenance and cell comparisons.
    pub previous_rows: Vec<ForecastRow>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientView {
    pub history: ClientHistory,
    pub forecast: ForecastContext,
}
