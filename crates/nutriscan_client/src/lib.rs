//! `NutritionApi` trait, wire types and a reqwest-based client for the NutriScan backend.

use async_trait::async_trait;
use chrono::NaiveDate;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub mod config;
pub mod http_client;
pub mod utils;

#[derive(Debug, Error)]
pub enum NutritionApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Auth(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decoding response: {0}")]
    Decode(String),
}

impl NutritionApiError {
    pub fn from_status(status: u16, body: String) -> Self {
        Self::Status { status, body }
    }

    /// True for 401/403-equivalent failures that must end the session.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    #[default]
    Male,
    Female,
}

impl std::str::FromStr for Sex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Sex::Male),
            "female" => Ok(Sex::Female),
            other => Err(format!("unknown sex: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    #[default]
    Light,
    Moderate,
    Active,
    VeryActive,
}

impl std::str::FromStr for ActivityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sedentary" => Ok(ActivityLevel::Sedentary),
            "light" => Ok(ActivityLevel::Light),
            "moderate" => Ok(ActivityLevel::Moderate),
            "active" => Ok(ActivityLevel::Active),
            "very_active" => Ok(ActivityLevel::VeryActive),
            other => Err(format!("unknown activity level: {other}")),
        }
    }
}

/// User record as returned by `/api/users/me`. Profile fields are absent
/// until the user fills them in; values the server sends in an unexpected
/// shape are treated as absent.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    pub id: Option<String>,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub age: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub weight: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub height: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub sex: Option<Sex>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub activity_level: Option<ActivityLevel>,
}

/// Full editable field set sent to `PUT /api/users/me`.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ProfileUpdate {
    pub age: u32,
    pub weight: f64,
    pub height: f64,
    pub sex: Sex,
    pub activity_level: ActivityLevel,
}

#[derive(Clone, Debug)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: SecretString,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LogItem {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(rename = "log_date", deserialize_with = "utils::deserialize_log_date")]
    pub date: NaiveDate,
    pub food_name: String,
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub protein: Option<f64>,
    #[serde(default)]
    pub carbs: Option<f64>,
    #[serde(default)]
    pub fat: Option<f64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DailyLog {
    #[serde(default)]
    pub items: Vec<LogItem>,
    #[serde(default)]
    pub total_calories: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DayTotal {
    #[serde(deserialize_with = "utils::deserialize_log_date")]
    pub date: NaiveDate,
    #[serde(default)]
    pub total_calories: f64,
}

/// Per-day totals for a range plus the calorie goal the log store applied.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PeriodTotals {
    pub days: Vec<DayTotal>,
    pub calorie_goal: Option<f64>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PeriodRange {
    /// The seven days ending on (and including) `date`.
    WeekEnding { date: NaiveDate },
    Month { year: i32, month: u32 },
}

fn deserialize_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string().into()),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    deserialize_opt_string(deserializer)?.ok_or_else(|| D::Error::custom("missing id"))
}

fn deserialize_lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// The narrow request interface to the remote profile/log store and identity endpoint.
#[async_trait]
pub trait NutritionApi: Send + Sync + 'static {
    /// Exchange credentials for a bearer token.
    async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<SecretString, NutritionApiError>;

    async fn register(&self, registration: &Registration) -> Result<UserRecord, NutritionApiError>;

    /// Identity endpoint: the user behind `token`, or `Auth` if it is invalid.
    async fn get_current_user(&self, token: &SecretString) -> Result<UserRecord, NutritionApiError>;

    /// Persist the full field set and return the canonical record.
    async fn update_profile(
        &self,
        token: &SecretString,
        update: &ProfileUpdate,
    ) -> Result<UserRecord, NutritionApiError>;

    async fn get_daily_log(
        &self,
        token: &SecretString,
        date: NaiveDate,
    ) -> Result<DailyLog, NutritionApiError>;

    async fn get_period_totals(
        &self,
        token: &SecretString,
        range: &PeriodRange,
    ) -> Result<PeriodTotals, NutritionApiError>;

    /// Log a food by name; the store resolves its nutrition values.
    async fn add_log_entry(
        &self,
        token: &SecretString,
        food_name: &str,
    ) -> Result<LogItem, NutritionApiError>;

    async fn delete_log_entry(
        &self,
        token: &SecretString,
        entry_id: &str,
    ) -> Result<(), NutritionApiError>;
}
