//! Shared test utilities: an in-memory `NutritionApi` used by unit tests.
#![cfg(test)]

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use nutriscan_client::{
    ActivityLevel, DailyLog, DayTotal, LogItem, NutritionApi, NutritionApiError, PeriodRange,
    PeriodTotals, ProfileUpdate, Registration, Sex, UserRecord,
};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;

use crate::aggregation::range_days;

pub const VALID_TOKEN: &str = "valid-token";
pub const PASSWORD: &str = "hunter2";

pub fn ana() -> UserRecord {
    UserRecord {
        id: Some("1".into()),
        username: "ana".into(),
        email: Some("ana@example.com".into()),
        age: Some(25),
        weight: Some(70.0),
        height: Some(175.0),
        sex: Some(Sex::Male),
        activity_level: Some(ActivityLevel::Light),
    }
}

/// Accepts only [`VALID_TOKEN`]; everything else is `Auth`.
pub struct MockApi {
    user: Mutex<UserRecord>,
    logs: Mutex<Vec<LogItem>>,
    updates: Mutex<Vec<ProfileUpdate>>,
    save_failures: Mutex<VecDeque<NutritionApiError>>,
    next_id: Mutex<u32>,
    server_goal: Option<f64>,
    save_delay: Option<Duration>,
    identity_delay: Option<Duration>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::with_user(ana())
    }

    pub fn with_user(user: UserRecord) -> Self {
        Self {
            user: Mutex::new(user),
            logs: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            save_failures: Mutex::new(VecDeque::new()),
            next_id: Mutex::new(1),
            server_goal: None,
            save_delay: None,
            identity_delay: None,
        }
    }

    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = Some(delay);
        self
    }

    pub fn with_identity_delay(mut self, delay: Duration) -> Self {
        self.identity_delay = Some(delay);
        self
    }

    pub fn with_server_goal(mut self, goal: f64) -> Self {
        self.server_goal = Some(goal);
        self
    }

    pub async fn fail_next_save(&self, err: NutritionApiError) {
        self.save_failures.lock().await.push_back(err);
    }

    /// Every update the client attempted, failed ones included.
    pub async fn updates(&self) -> Vec<ProfileUpdate> {
        self.updates.lock().await.clone()
    }

    pub async fn seed_log(&self, date: NaiveDate, food_name: &str, calories: f64) {
        let mut next = self.next_id.lock().await;
        self.logs.lock().await.push(LogItem {
            id: next.to_string(),
            date,
            food_name: food_name.into(),
            calories,
            protein: None,
            carbs: None,
            fat: None,
        });
        *next += 1;
    }

    fn check(token: &SecretString) -> Result<(), NutritionApiError> {
        if token.expose_secret() == VALID_TOKEN {
            Ok(())
        } else {
            Err(NutritionApiError::Auth("invalid token".into()))
        }
    }
}

#[async_trait]
impl NutritionApi for MockApi {
    async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<SecretString, NutritionApiError> {
        let user = self.user.lock().await;
        if username == user.username && password.expose_secret() == PASSWORD {
            Ok(SecretString::new(VALID_TOKEN.into()))
        } else {
            Err(NutritionApiError::Auth("bad credentials".into()))
        }
    }

    async fn register(&self, registration: &Registration) -> Result<UserRecord, NutritionApiError> {
        let mut user = self.user.lock().await;
        *user = UserRecord {
            id: Some("2".into()),
            username: registration.username.clone(),
            email: Some(registration.email.clone()),
            age: None,
            weight: None,
            height: None,
            sex: None,
            activity_level: None,
        };
        Ok(user.clone())
    }

    async fn get_current_user(&self, token: &SecretString) -> Result<UserRecord, NutritionApiError> {
        if let Some(delay) = self.identity_delay {
            tokio::time::sleep(delay).await;
        }
        Self::check(token)?;
        Ok(self.user.lock().await.clone())
    }

    async fn update_profile(
        &self,
        token: &SecretString,
        update: &ProfileUpdate,
    ) -> Result<UserRecord, NutritionApiError> {
        self.updates.lock().await.push(update.clone());
        if let Some(delay) = self.save_delay {
            tokio::time::sleep(delay).await;
        }
        Self::check(token)?;
        if let Some(err) = self.save_failures.lock().await.pop_front() {
            return Err(err);
        }
        let mut user = self.user.lock().await;
        user.age = Some(update.age);
        user.weight = Some(update.weight);
        user.height = Some(update.height);
        user.sex = Some(update.sex);
        user.activity_level = Some(update.activity_level);
        Ok(user.clone())
    }

    async fn get_daily_log(
        &self,
        token: &SecretString,
        date: NaiveDate,
    ) -> Result<DailyLog, NutritionApiError> {
        Self::check(token)?;
        let items: Vec<LogItem> = self
            .logs
            .lock()
            .await
            .iter()
            .filter(|i| i.date == date)
            .cloned()
            .collect();
        if items.is_empty() {
            return Err(NutritionApiError::NotFound(format!("no log for {date}")));
        }
        let total_calories = items.iter().map(|i| i.calories).sum();
        Ok(DailyLog {
            items,
            total_calories,
        })
    }

    async fn get_period_totals(
        &self,
        token: &SecretString,
        range: &PeriodRange,
    ) -> Result<PeriodTotals, NutritionApiError> {
        Self::check(token)?;
        let days =
            range_days(range).map_err(|e| NutritionApiError::InvalidInput(e.to_string()))?;
        let logs = self.logs.lock().await;
        let totals: Vec<DayTotal> = days
            .into_iter()
            .filter_map(|date| {
                let mut entries = logs.iter().filter(|i| i.date == date).peekable();
                entries.peek()?;
                Some(DayTotal {
                    date,
                    total_calories: entries.map(|i| i.calories).sum(),
                })
            })
            .collect();
        if totals.is_empty() {
            return Err(NutritionApiError::NotFound("no data in range".into()));
        }
        Ok(PeriodTotals {
            days: totals,
            calorie_goal: self.server_goal,
        })
    }

    async fn add_log_entry(
        &self,
        token: &SecretString,
        food_name: &str,
    ) -> Result<LogItem, NutritionApiError> {
        Self::check(token)?;
        if food_name == "unobtainium" {
            return Err(NutritionApiError::NotFound(format!("unknown food: {food_name}")));
        }
        let today = chrono::Local::now().date_naive();
        self.seed_log(today, food_name, 100.0).await;
        let logs = self.logs.lock().await;
        logs.last()
            .cloned()
            .ok_or_else(|| NutritionApiError::Decode("empty log".into()))
    }

    async fn delete_log_entry(
        &self,
        token: &SecretString,
        entry_id: &str,
    ) -> Result<(), NutritionApiError> {
        Self::check(token)?;
        let mut logs = self.logs.lock().await;
        let before = logs.len();
        logs.retain(|i| i.id != entry_id);
        if logs.len() == before {
            return Err(NutritionApiError::NotFound(format!("entry {entry_id}")));
        }
        Ok(())
    }
}
