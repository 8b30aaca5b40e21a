//! HTTP client implementation for the NutriScan API.
//!
//! This module provides a reqwest-based implementation of the [`NutritionApi`](crate::NutritionApi) trait.

use crate::utils::format_log_date;
use crate::{
    DailyLog, DayTotal, LogItem, NutritionApi, NutritionApiError, PeriodRange, PeriodTotals,
    ProfileUpdate, Registration, UserRecord,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Client for the NutriScan API using reqwest.
#[derive(Clone, Debug)]
pub struct ReqwestNutritionClient {
    base_url: String,
    client: reqwest::Client,
}

impl ReqwestNutritionClient {
    /// Create a new client instance.
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the API (e.g., "http://127.0.0.1:8000")
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, crate::config::DEFAULT_HTTP_TIMEOUT)
    }

    /// Create a client whose requests fail after `timeout`.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client build should not fail");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn from_config(cfg: &crate::config::Config) -> Self {
        Self::with_timeout(&cfg.base_url, cfg.http_timeout)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `/api/log/{entry_id}` with the id percent-encoded as one path segment.
    fn entry_url(&self, entry_id: &str) -> Result<reqwest::Url, NutritionApiError> {
        if matches!(entry_id.trim(), "" | "." | "..") {
            return Err(NutritionApiError::InvalidInput(format!(
                "invalid log entry id: {entry_id:?}"
            )));
        }
        let mut url = reqwest::Url::parse(&self.url("/api/log"))
            .map_err(|e| NutritionApiError::Config(format!("base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| NutritionApiError::Config("base url cannot hold a path".into()))?
            .push(entry_id);
        Ok(url)
    }

    /// Build an authenticated GET request.
    fn get_request(&self, url: &str, token: &SecretString) -> reqwest::RequestBuilder {
        self.client.get(url).bearer_auth(token.expose_secret())
    }

    /// Build an authenticated POST request.
    fn post_request(&self, url: &str, token: &SecretString) -> reqwest::RequestBuilder {
        self.client.post(url).bearer_auth(token.expose_secret())
    }

    /// Build an authenticated PUT request.
    fn put_request(&self, url: &str, token: &SecretString) -> reqwest::RequestBuilder {
        self.client.put(url).bearer_auth(token.expose_secret())
    }

    /// Build an authenticated DELETE request.
    fn delete_request(&self, url: &str, token: &SecretString) -> reqwest::RequestBuilder {
        self.client.delete(url).bearer_auth(token.expose_secret())
    }

    /// Execute a request and expect a JSON response.
    async fn execute_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, NutritionApiError> {
        let resp = request.send().await?;
        self.handle_response(resp).await
    }

    /// Execute a request with no expected response body.
    async fn execute_empty(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<(), NutritionApiError> {
        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(self.error_from_response(resp).await);
        }
        Ok(())
    }

    /// Handle a response, converting status codes to appropriate errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, NutritionApiError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(self.error_from_response(resp).await);
        }
        // Read body as text first so decode failures carry a useful snippet.
        let text = resp.text().await?;
        serde_json::from_str::<T>(&text).map_err(|e| {
            let body_snippet: String = text.chars().take(512).collect();
            NutritionApiError::Decode(format!("{} - body: {}", e, body_snippet))
        })
    }

    /// Extract error information from a failed response.
    async fn error_from_response(&self, resp: reqwest::Response) -> NutritionApiError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        let body_snippet: String = body.chars().take(256).collect();
        tracing::debug!(status, body = %body_snippet, "nutriscan api request failed");

        match status {
            404 => NutritionApiError::NotFound(body_snippet),
            401 | 403 => NutritionApiError::Auth(body_snippet),
            400 | 422 => NutritionApiError::InvalidInput(body_snippet),
            _ => NutritionApiError::from_status(status, body_snippet),
        }
    }
}

#[derive(serde::Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(serde::Deserialize)]
struct AnalysisRow {
    #[serde(flatten)]
    day: DayTotal,
    #[serde(default)]
    calorie_goal: Option<f64>,
}

#[derive(serde::Deserialize)]
struct AnalysisPayload {
    #[serde(default)]
    data: Vec<AnalysisRow>,
}

impl From<AnalysisPayload> for PeriodTotals {
    fn from(p: AnalysisPayload) -> Self {
        let calorie_goal = p.data.first().and_then(|r| r.calorie_goal);
        Self {
            days: p.data.into_iter().map(|r| r.day).collect(),
            calorie_goal,
        }
    }
}

#[async_trait]
impl NutritionApi for ReqwestNutritionClient {
    async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<SecretString, NutritionApiError> {
        let url = self.url("/api/users/login");
        let form = [("username", username), ("password", password.expose_secret())];
        let token: AccessToken = self.execute_json(self.client.post(&url).form(&form)).await?;
        Ok(SecretString::new(token.access_token.into()))
    }

    async fn register(&self, registration: &Registration) -> Result<UserRecord, NutritionApiError> {
        let url = self.url("/api/users/register");
        let body = serde_json::json!({
            "username": registration.username,
            "email": registration.email,
            "password": registration.password.expose_secret(),
        });
        self.execute_json(self.client.post(&url).json(&body)).await
    }

    async fn get_current_user(&self, token: &SecretString) -> Result<UserRecord, NutritionApiError> {
        let url = self.url("/api/users/me");
        self.execute_json(self.get_request(&url, token)).await
    }

    async fn update_profile(
        &self,
        token: &SecretString,
        update: &ProfileUpdate,
    ) -> Result<UserRecord, NutritionApiError> {
        let url = self.url("/api/users/me");
        self.execute_json(self.put_request(&url, token).json(update))
            .await
    }

    async fn get_daily_log(
        &self,
        token: &SecretString,
        date: NaiveDate,
    ) -> Result<DailyLog, NutritionApiError> {
        let url = self.url(&format!("/api/log/{}", format_log_date(date)));
        self.execute_json(self.get_request(&url, token)).await
    }

    async fn get_period_totals(
        &self,
        token: &SecretString,
        range: &PeriodRange,
    ) -> Result<PeriodTotals, NutritionApiError> {
        let request = match range {
            PeriodRange::WeekEnding { date } => {
                let url = self.url("/api/summary/weekly");
                let body = serde_json::json!({ "date_str": format_log_date(*date) });
                self.post_request(&url, token).json(&body)
            }
            PeriodRange::Month { year, month } => {
                let url = self.url("/api/summary/monthly");
                let body = serde_json::json!({ "year": year, "month": month });
                self.post_request(&url, token).json(&body)
            }
        };
        let payload: AnalysisPayload = self.execute_json(request).await?;
        Ok(payload.into())
    }

    async fn add_log_entry(
        &self,
        token: &SecretString,
        food_name: &str,
    ) -> Result<LogItem, NutritionApiError> {
        let url = self.url("/api/log");
        let qp = [("food_name", food_name)];
        self.execute_json(self.post_request(&url, token).query(&qp))
            .await
    }

    async fn delete_log_entry(
        &self,
        token: &SecretString,
        entry_id: &str,
    ) -> Result<(), NutritionApiError> {
        let url = self.entry_url(entry_id)?;
        self.execute_empty(self.delete_request(url.as_str(), token)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_new_trims_trailing_slash() {
        let client = ReqwestNutritionClient::new("http://localhost:8000/");
        assert_eq!(client.url("/api/users/me"), "http://localhost:8000/api/users/me");
    }

    #[test]
    fn analysis_payload_takes_goal_from_first_row() {
        let payload: AnalysisPayload = serde_json::from_value(serde_json::json!({
            "data": [
                {"date": "2025-03-01", "total_calories": 1800.0, "excess_calories": 0.0, "calorie_goal": 2301.0},
                {"date": "2025-03-02", "total_calories": 2500.0, "excess_calories": 199.0, "calorie_goal": 2301.0}
            ]
        }))
        .unwrap();
        let totals: PeriodTotals = payload.into();
        assert_eq!(totals.calorie_goal, Some(2301.0));
        assert_eq!(totals.days.len(), 2);
        assert_eq!(totals.days[1].total_calories, 2500.0);
    }

    #[test]
    fn analysis_payload_empty_has_no_goal() {
        let payload: AnalysisPayload =
            serde_json::from_value(serde_json::json!({ "data": [] })).unwrap();
        let totals: PeriodTotals = payload.into();
        assert!(totals.days.is_empty());
        assert!(totals.calorie_goal.is_none());
    }
}
