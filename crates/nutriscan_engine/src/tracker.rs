//! `NutritionTracker`: the surface the presentation layer talks to.
//!
//! Ties the session, the profile sync task and the aggregation views
//! together. Every operation that touches user data requires a resolved,
//! authenticated session.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::NaiveDate;
use nutriscan_client::config::Config;
use nutriscan_client::http_client::ReqwestNutritionClient;
use nutriscan_client::{NutritionApi, NutritionApiError, PeriodRange, PeriodTotals, Registration};
use secrecy::SecretString;
use tokio::sync::watch;

use crate::aggregation::{self, DailyProgress, DailySummary, FoodShare, LogEntry, PeriodSummary};
use crate::error::{EngineError, EngineResult};
use crate::profile::{Profile, ProfileField};
use crate::profile_sync::{
    ProfileSnapshot, ProfileSyncController, ProfileSyncHandle, spawn_profile_sync,
};
use crate::recommendations::RecommendationSet;
use crate::session::{Session, SessionManager};

pub struct NutritionTracker {
    api: Arc<dyn NutritionApi>,
    session: SessionManager,
    save_debounce: Duration,
    profile: Mutex<Option<ProfileSyncHandle>>,
}

impl NutritionTracker {
    pub fn new(api: Arc<dyn NutritionApi>, save_debounce: Duration) -> Self {
        Self {
            session: SessionManager::new(api.clone()),
            api,
            save_debounce,
            profile: Mutex::new(None),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let client = ReqwestNutritionClient::from_config(cfg);
        Self::new(Arc::new(client), cfg.save_debounce)
    }

    /// Resolve the session from a stored token. An invalid token is not an
    /// error: the session simply ends up signed out.
    pub async fn bootstrap(&self, stored_token: Option<SecretString>) -> Session {
        let session = self.session.bootstrap(stored_token).await;
        self.attach_profile(&session);
        session
    }

    /// Adopt an externally obtained token and validate it.
    pub async fn sign_in(&self, token: SecretString) -> EngineResult<Session> {
        self.session.login(token);
        let session = self.session.validate().await;
        if !session.is_authenticated() {
            return Err(EngineError::SessionExpired("token rejected".into()));
        }
        self.attach_profile(&session);
        Ok(session)
    }

    pub async fn sign_in_with_password(
        &self,
        username: &str,
        password: &SecretString,
    ) -> EngineResult<Session> {
        let token = self.api.login(username, password).await?;
        self.sign_in(token).await
    }

    /// Create the account, then sign in with the same credentials.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: SecretString,
    ) -> EngineResult<Session> {
        let registration = Registration {
            username: username.trim().to_string(),
            email: email.trim().to_string(),
            password,
        };
        if registration.username.is_empty() || registration.email.is_empty() {
            return Err(EngineError::Validation(
                "username and email are required".into(),
            ));
        }
        let user = self.api.register(&registration).await?;
        tracing::info!(username = %user.username, "account registered");
        self.sign_in_with_password(&registration.username, &registration.password)
            .await
    }

    pub fn logout(&self) {
        self.session.logout();
        self.profile_slot().take();
    }

    pub fn session(&self) -> Session {
        self.session.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    pub fn editable_profile(&self) -> EngineResult<ProfileSnapshot> {
        self.with_profile(|h| Ok(h.snapshot()))
    }

    pub fn set_profile_field(&self, field: ProfileField) -> EngineResult<ProfileSnapshot> {
        self.with_profile(|h| Ok(h.set_field(field)))
    }

    pub fn set_profile_field_str(&self, name: &str, value: &str) -> EngineResult<ProfileSnapshot> {
        self.with_profile(|h| h.set_field_str(name, value))
    }

    pub fn retry_profile_save(&self) -> EngineResult<ProfileSnapshot> {
        self.with_profile(|h| Ok(h.retry()))
    }

    pub fn recommendations(&self) -> EngineResult<RecommendationSet> {
        self.with_profile(|h| Ok(h.snapshot().recommendations))
    }

    pub async fn daily_summary(&self, date: NaiveDate) -> EngineResult<DailySummary> {
        let token = self.token()?;
        let entries = match self.api.get_daily_log(&token, date).await {
            Ok(log) => log.items,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(self.fetch_error(e)),
        };
        Ok(aggregation::daily_view(date, entries))
    }

    /// Intake for `date` against `calorie_goal`, or against the live
    /// profile's calorie target when no goal is given.
    pub async fn daily_progress(
        &self,
        date: NaiveDate,
        calorie_goal: Option<f64>,
    ) -> EngineResult<DailyProgress> {
        let summary = self.daily_summary(date).await?;
        let goal = calorie_goal.or_else(|| self.local_goal());
        Ok(aggregation::daily_progress(&summary, goal))
    }

    pub async fn food_breakdown(&self, date: NaiveDate) -> EngineResult<Vec<FoodShare>> {
        let summary = self.daily_summary(date).await?;
        Ok(aggregation::food_breakdown(&summary))
    }

    /// Per-day summaries for `range`, one per calendar day. Without an
    /// explicit goal the live profile's calorie target is used, then the
    /// goal reported by the log store.
    pub async fn period_summary(
        &self,
        range: PeriodRange,
        calorie_goal: Option<f64>,
    ) -> EngineResult<Vec<PeriodSummary>> {
        aggregation::range_days(&range)?;
        let token = self.token()?;
        let totals = match self.api.get_period_totals(&token, &range).await {
            Ok(totals) => totals,
            Err(e) if e.is_not_found() => PeriodTotals::default(),
            Err(e) => return Err(self.fetch_error(e)),
        };
        let dense = aggregation::fill_range(&range, &totals.days)?;
        let goal = calorie_goal
            .or_else(|| self.local_goal())
            .or(totals.calorie_goal);
        Ok(aggregation::period_view(&dense, goal))
    }

    pub async fn log_food(&self, food_name: &str) -> EngineResult<LogEntry> {
        let food_name = food_name.trim();
        if food_name.is_empty() {
            return Err(EngineError::Validation("food name is required".into()));
        }
        let token = self.token()?;
        self.api
            .add_log_entry(&token, food_name)
            .await
            .map_err(|e| self.write_error(e))
    }

    pub async fn delete_log_entry(&self, entry_id: &str) -> EngineResult<()> {
        let token = self.token()?;
        self.api
            .delete_log_entry(&token, entry_id)
            .await
            .map_err(|e| self.write_error(e))
    }

    fn attach_profile(&self, session: &Session) {
        let (Some(token), Some(user)) = (&session.token, &session.identity) else {
            return;
        };
        if !session.is_authenticated() {
            return;
        }
        let handle = spawn_profile_sync(
            self.api.clone(),
            token.clone(),
            ProfileSyncController::new(Profile::from(user), self.save_debounce),
            self.session.subscribe(),
            self.session.invalidator(),
        );
        *self.profile_slot() = Some(handle);
    }

    fn profile_slot(&self) -> std::sync::MutexGuard<'_, Option<ProfileSyncHandle>> {
        self.profile.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_profile<T>(
        &self,
        f: impl FnOnce(&ProfileSyncHandle) -> EngineResult<T>,
    ) -> EngineResult<T> {
        if !self.session.current().is_authenticated() {
            return Err(EngineError::Unauthenticated);
        }
        match self.profile_slot().as_ref() {
            Some(handle) if handle.is_running() => f(handle),
            _ => Err(EngineError::Unauthenticated),
        }
    }

    fn local_goal(&self) -> Option<f64> {
        let calories = self.recommendations().ok()?.calories;
        (calories > 0).then(|| f64::from(calories))
    }

    fn token(&self) -> EngineResult<SecretString> {
        let session = self.session.current();
        match session.token {
            Some(token) if session.is_authenticated() => Ok(token),
            _ => Err(EngineError::Unauthenticated),
        }
    }

    fn expire(&self, e: &NutritionApiError) -> EngineError {
        self.session.invalidator().invalidate("request_unauthorized");
        EngineError::SessionExpired(e.to_string())
    }

    fn fetch_error(&self, e: NutritionApiError) -> EngineError {
        if e.is_auth() {
            return self.expire(&e);
        }
        tracing::warn!(error = %e, "summary fetch failed");
        EngineError::SummaryUnavailable(e.to_string())
    }

    fn write_error(&self, e: NutritionApiError) -> EngineError {
        if e.is_auth() {
            return self.expire(&e);
        }
        EngineError::Api(e)
    }
}
