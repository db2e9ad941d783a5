use crate::backend::types::*;
use crate::error::{AgingError, Result};
use crate::schema::{
    ApproveRequest, ClientHistory, ClientsSummary, ForecastRow, PredictRequest, PredictResponse,
};
use crate::utils::{month_key, next_month};
use log::{debug, info, warn};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_API_KEY: &str = "demo-api-key-123";

const API_URL_VAR: &str = "AR_AGING_API_URL";
const API_KEY_VAR: &str = "AR_AGING_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
        }
    }
}

impl ApiConfig {
    /// Reads `AR_AGING_API_URL` and `AR_AGING_API_KEY`, falling back to the
    /// local development defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            base_url: lookup(API_URL_VAR)
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            api_key: lookup(API_KEY_VAR)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.api_key),
        }
    }
}

#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    config: ApiConfig,
}

impl BackendClient {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn from_env() -> Self {
        Self::new(ApiConfig::from_env())
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn with_key(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("X-API-Key", &self.config.api_key)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await?;
        let body = match serde_json::from_str::<ErrorDetail>(&text) {
            Ok(ErrorDetail {
                detail: serde_json::Value::String(message),
            }) => message,
            Ok(ErrorDetail { detail }) => detail.to_string(),
            Err(_) => text,
        };
        warn!("Backend error (status {}): {}", status, body);
        Err(AgingError::Backend {
            status: status.as_u16(),
            body,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!("GET {}", path);
        let response = self.client.get(self.url(path)).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("POST {}", path);
        let request = self.with_key(self.client.post(self.url(path)).json(body));
        let response = request.send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn client_history(&self, client_id: &str) -> Result<ClientHistory> {
        let history: ClientHistory = self
            .get_json(&format!("/api/client/{}/history", client_id))
            .await?;
        info!(
            "Loaded {} months of history for client {}",
            history.history.len(),
            client_id
        );
        Ok(history)
    }

    /// Flat rows for one month. A response that is not a list yields no rows.
    pub async fn month_rows(&self, client_id: &str, month: &str) -> Result<Vec<ForecastRow>> {
        let value: serde_json::Value = self
            .get_json(&format!("/api/client/{}/history?month={}", client_id, month))
            .await?;
        if !value.is_array() {
            debug!("No flat rows for client {} in {}", client_id, month);
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(value)?)
    }

    pub async fn last_month(&self, client_id: &str) -> Result<Option<String>> {
        let response: LastMonthResponse = self
            .get_json(&format!("/api/client/{}/last_month", client_id))
            .await?;
        Ok(response.last_month.filter(|m| !m.is_empty()))
    }

    /// Last month with data, the earliest allowed target month and the rows
    /// of that last month. Clients without data may target next month.
    pub async fn forecast_context(&self, client_id: &str) -> Result<ForecastContext> {
        match self.last_month(client_id).await? {
            Some(last_month) => {
                let minimum_target_month = next_month(&last_month)?;
                let previous_rows = self.month_rows(client_id, &last_month).await?;
                Ok(ForecastContext {
                    last_month: Some(last_month),
                    minimum_target_month,
                    previous_rows,
                })
            }
            None => {
                let this_month = month_key(chrono::Utc::now().date_naive());
                Ok(ForecastContext {
                    last_month: None,
                    minimum_target_month: next_month(&this_month)?,
                    previous_rows: Vec::new(),
                })
            }
        }
    }

    /// Fetches history and forecast context concurrently.
    pub async fn load_client(&self, client_id: &str) -> Result<ClientView> {
        let (history, forecast) = futures::try_join!(
            self.client_history(client_id),
            self.forecast_context(client_id)
        )?;
        Ok(ClientView { history, forecast })
    }

    pub async fn predict(&self, request: &PredictRequest) -> Result<PredictResponse> {
        info!(
            "Requesting forecast for client {} ({}), target {}",
            request.client_id, request.target_month, request.target_total
        );
        let response: PredictResponse = self.post_json("/api/predict", request).await?;
        info!("Received {} forecast rows", response.predictions.len());
        Ok(response)
    }

    pub async fn approve(&self, request: &ApproveRequest) -> Result<serde_json::Value> {
        info!(
            "Approving {} rows for client {} ({})",
            request.predictions.len(),
            request.client_id,
            request.target_month
        );
        self.post_json("/api/approve", request).await
    }

    pub async fn clients_summary(&self) -> Result<ClientsSummary> {
        self.get_json("/api/clients/summary").await
    }
}
