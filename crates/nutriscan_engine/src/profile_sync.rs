//! Debounced, serialized persistence of the editable profile.
//!
//! [`ProfileSyncController`] is a plain state machine driven by explicit
//! instants; [`spawn_profile_sync`] runs it against a [`NutritionApi`] on a
//! tokio task.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use nutriscan_client::{NutritionApi, ProfileUpdate};
use secrecy::SecretString;
use serde::Serialize;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::EngineResult;
use crate::profile::{Profile, ProfileField};
use crate::recommendations::{self, RecommendationSet};
use crate::session::{Session, SessionInvalidator};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    PendingSave,
    Saving,
    Error,
}

/// A persistence request. `generation` must be handed back to
/// [`ProfileSyncController::complete_save`].
#[derive(Clone, Debug, PartialEq)]
pub struct SaveRequest {
    pub generation: u64,
    pub update: ProfileUpdate,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProfileSnapshot {
    pub profile: Profile,
    pub recommendations: RecommendationSet,
    pub state: SyncState,
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub struct ProfileSyncController {
    server: Profile,
    local: Profile,
    recommendations: RecommendationSet,
    state: SyncState,
    debounce: Duration,
    deadline: Option<Instant>,
    generation: u64,
    in_flight: Option<u64>,
    edited_in_flight: bool,
    last_error: Option<String>,
}

impl ProfileSyncController {
    pub fn new(server_profile: Profile, debounce: Duration) -> Self {
        Self {
            recommendations: recommendations::compute(&server_profile),
            local: server_profile.clone(),
            server: server_profile,
            state: SyncState::Idle,
            debounce,
            deadline: None,
            generation: 0,
            in_flight: None,
            edited_in_flight: false,
            last_error: None,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn profile(&self) -> &Profile {
        &self.local
    }

    pub fn recommendations(&self) -> RecommendationSet {
        self.recommendations
    }

    /// When the next save may be issued, if one is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn snapshot(&self) -> ProfileSnapshot {
        ProfileSnapshot {
            profile: self.local.clone(),
            recommendations: self.recommendations,
            state: self.state,
            last_error: self.last_error.clone(),
        }
    }

    /// Apply one edit. Recommendations follow the edited profile immediately.
    pub fn set_field(&mut self, field: ProfileField, now: Instant) {
        self.local.apply(field);
        self.recommendations = recommendations::compute(&self.local);

        if self.in_flight.is_some() {
            self.edited_in_flight = true;
            return;
        }
        self.rearm(now);
    }

    /// Leave the error state and make a save due immediately.
    pub fn retry(&mut self, now: Instant) -> bool {
        if self.state != SyncState::Error {
            return false;
        }
        self.state = SyncState::PendingSave;
        self.deadline = Some(now);
        true
    }

    /// Issue the save once the debounce has elapsed and nothing is in flight.
    /// An incomplete profile disarms the timer until the next edit.
    pub fn begin_save(&mut self, now: Instant) -> Option<SaveRequest> {
        if self.state != SyncState::PendingSave || self.in_flight.is_some() {
            return None;
        }
        match self.deadline {
            Some(deadline) if now >= deadline => {}
            _ => return None,
        }
        let Some(update) = self.local.to_update() else {
            tracing::debug!("profile incomplete; save postponed");
            self.deadline = None;
            return None;
        };

        self.generation += 1;
        self.in_flight = Some(self.generation);
        self.edited_in_flight = false;
        self.deadline = None;
        self.state = SyncState::Saving;
        Some(SaveRequest {
            generation: self.generation,
            update,
        })
    }

    /// Feed back the outcome of the request tagged `generation`; a success
    /// carries the server's canonical profile. Returns `false` if the
    /// outcome belongs to a request that is no longer in flight.
    pub fn complete_save(
        &mut self,
        generation: u64,
        outcome: Result<Profile, String>,
        now: Instant,
    ) -> bool {
        if self.in_flight != Some(generation) {
            tracing::debug!(generation, "ignoring stale save completion");
            return false;
        }
        self.in_flight = None;
        let edited = std::mem::take(&mut self.edited_in_flight);

        match outcome {
            Ok(saved) => {
                self.server = saved;
                self.last_error = None;
                if edited {
                    self.rearm(now);
                } else {
                    self.local = self.server.clone();
                    self.recommendations = recommendations::compute(&self.local);
                    self.state = SyncState::Idle;
                    self.deadline = None;
                }
            }
            Err(message) => {
                self.last_error = Some(message);
                self.state = SyncState::Error;
                self.deadline = None;
            }
        }
        true
    }

    fn rearm(&mut self, now: Instant) {
        if self.local == self.server {
            self.state = SyncState::Idle;
            self.deadline = None;
            self.last_error = None;
        } else {
            self.state = SyncState::PendingSave;
            self.deadline = Some(now + self.debounce);
        }
    }
}

fn lock(controller: &Mutex<ProfileSyncController>) -> MutexGuard<'_, ProfileSyncController> {
    controller.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owner of a running sync task. Dropping it stops the task once any
/// in-flight request has settled.
pub struct ProfileSyncHandle {
    controller: Arc<Mutex<ProfileSyncController>>,
    wake: Arc<Notify>,
    _shutdown: watch::Sender<()>,
    task: JoinHandle<()>,
}

impl ProfileSyncHandle {
    pub fn snapshot(&self) -> ProfileSnapshot {
        lock(&self.controller).snapshot()
    }

    pub fn set_field(&self, field: ProfileField) -> ProfileSnapshot {
        let snapshot = {
            let mut c = lock(&self.controller);
            c.set_field(field, Instant::now());
            c.snapshot()
        };
        self.wake.notify_one();
        snapshot
    }

    /// Parse raw form input; on error the profile is left untouched.
    pub fn set_field_str(&self, name: &str, value: &str) -> EngineResult<ProfileSnapshot> {
        let field = ProfileField::parse(name, value)?;
        Ok(self.set_field(field))
    }

    pub fn retry(&self) -> ProfileSnapshot {
        let snapshot = {
            let mut c = lock(&self.controller);
            c.retry(Instant::now());
            c.snapshot()
        };
        self.wake.notify_one();
        snapshot
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Start persisting `controller` with `token` for as long as the session
/// that issued the token stays authenticated.
pub fn spawn_profile_sync(
    api: Arc<dyn NutritionApi>,
    token: SecretString,
    controller: ProfileSyncController,
    session: watch::Receiver<Session>,
    invalidator: SessionInvalidator,
) -> ProfileSyncHandle {
    let controller = Arc::new(Mutex::new(controller));
    let wake = Arc::new(Notify::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let task = tokio::spawn(drive(
        api,
        token,
        controller.clone(),
        wake.clone(),
        shutdown_rx,
        session,
        invalidator,
    ));

    ProfileSyncHandle {
        controller,
        wake,
        _shutdown: shutdown_tx,
        task,
    }
}

async fn drive(
    api: Arc<dyn NutritionApi>,
    token: SecretString,
    controller: Arc<Mutex<ProfileSyncController>>,
    wake: Arc<Notify>,
    mut shutdown: watch::Receiver<()>,
    mut session: watch::Receiver<Session>,
    invalidator: SessionInvalidator,
) {
    let epoch = session.borrow_and_update().epoch();

    loop {
        let (request, deadline) = {
            let mut c = lock(&controller);
            (c.begin_save(Instant::now()), c.deadline())
        };

        if let Some(request) = request {
            tracing::debug!(generation = request.generation, "saving profile");
            let outcome = match api.update_profile(&token, &request.update).await {
                Ok(user) => {
                    metrics::counter!("nutriscan_profile_saves_total", "outcome" => "ok")
                        .increment(1);
                    let saved = Profile::from(&user);
                    invalidator.record_identity(epoch, user);
                    Ok(saved)
                }
                Err(e) if e.is_auth() => {
                    metrics::counter!("nutriscan_profile_saves_total", "outcome" => "unauthorized")
                        .increment(1);
                    lock(&controller).complete_save(
                        request.generation,
                        Err(e.to_string()),
                        Instant::now(),
                    );
                    invalidator.invalidate("profile_save_unauthorized");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "profile save failed");
                    metrics::counter!("nutriscan_profile_saves_total", "outcome" => "error")
                        .increment(1);
                    Err(e.to_string())
                }
            };
            lock(&controller).complete_save(request.generation, outcome, Instant::now());
            continue;
        }

        tokio::select! {
            _ = wake.notified() => {}
            _ = sleep_until_deadline(deadline) => {}
            res = shutdown.changed() => {
                if res.is_err() {
                    break;
                }
            }
            res = session.changed() => {
                let ended = res.is_err() || {
                    let s = session.borrow_and_update();
                    s.epoch() != epoch || !s.is_authenticated()
                };
                if ended {
                    break;
                }
            }
        }
    }
    tracing::debug!("profile sync stopped");
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionManager;
    use crate::test_utils::{MockApi, VALID_TOKEN};
    use nutriscan_client::{ActivityLevel, NutritionApiError, Sex};

    const DEBOUNCE: Duration = Duration::from_millis(1500);

    fn saved() -> Profile {
        Profile {
            age: Some(25),
            weight_kg: Some(70.0),
            height_cm: Some(175.0),
            sex: Sex::Male,
            activity_level: ActivityLevel::Light,
        }
    }

    #[test]
    fn edits_recompute_recommendations_immediately() {
        let now = Instant::now();
        let mut c = ProfileSyncController::new(saved(), DEBOUNCE);
        assert_eq!(c.recommendations().calories, 2301);

        c.set_field(ProfileField::WeightKg(Some(80.0)), now);
        assert_eq!(c.recommendations(), recommendations::compute(c.profile()));
        assert_eq!(c.recommendations().water_ml, 2800);
        assert_eq!(c.state(), SyncState::PendingSave);

        c.set_field(ProfileField::Age(None), now);
        assert_eq!(c.recommendations(), RecommendationSet::default());
    }

    #[test]
    fn debounce_restarts_on_every_edit() {
        let t0 = Instant::now();
        let mut c = ProfileSyncController::new(saved(), DEBOUNCE);
        c.set_field(ProfileField::WeightKg(Some(71.0)), t0);
        let t1 = t0 + Duration::from_millis(1000);
        c.set_field(ProfileField::WeightKg(Some(72.0)), t1);
        assert_eq!(c.deadline(), Some(t1 + DEBOUNCE));
        assert!(c.begin_save(t0 + DEBOUNCE).is_none());

        let req = c.begin_save(t1 + DEBOUNCE).expect("save due");
        assert_eq!(req.update.weight, 72.0);
        assert_eq!(c.state(), SyncState::Saving);
    }

    #[test]
    fn reverting_to_server_state_goes_idle() {
        let now = Instant::now();
        let mut c = ProfileSyncController::new(saved(), DEBOUNCE);
        c.set_field(ProfileField::Sex(Sex::Female), now);
        assert_eq!(c.state(), SyncState::PendingSave);
        c.set_field(ProfileField::Sex(Sex::Male), now);
        assert_eq!(c.state(), SyncState::Idle);
        assert_eq!(c.deadline(), None);
    }

    #[test]
    fn incomplete_profile_is_not_sent() {
        let now = Instant::now();
        let mut c = ProfileSyncController::new(saved(), DEBOUNCE);
        c.set_field(ProfileField::HeightCm(None), now);
        assert!(c.begin_save(now + DEBOUNCE).is_none());
        assert_eq!(c.state(), SyncState::PendingSave);
        assert_eq!(c.deadline(), None);

        c.set_field(ProfileField::HeightCm(Some(180.0)), now + DEBOUNCE);
        assert!(c.begin_save(now + DEBOUNCE * 2).is_some());
    }

    #[test]
    fn only_one_request_in_flight() {
        let now = Instant::now();
        let mut c = ProfileSyncController::new(saved(), DEBOUNCE);
        c.set_field(ProfileField::Age(Some(26)), now);
        let first = c.begin_save(now + DEBOUNCE).unwrap();
        c.set_field(ProfileField::Age(Some(27)), now + DEBOUNCE);
        assert!(c.begin_save(now + DEBOUNCE * 3).is_none());

        let mut server = saved();
        server.age = Some(26);
        assert!(c.complete_save(first.generation, Ok(server), now + DEBOUNCE * 3));
        // edits made during the save survive and are re-armed
        assert_eq!(c.state(), SyncState::PendingSave);
        assert_eq!(c.profile().age, Some(27));
        let second = c.begin_save(now + DEBOUNCE * 4).unwrap();
        assert_eq!(second.update.age, 27);
        assert!(second.generation > first.generation);
    }

    #[test]
    fn success_adopts_server_profile() {
        let now = Instant::now();
        let mut c = ProfileSyncController::new(saved(), DEBOUNCE);
        c.set_field(ProfileField::WeightKg(Some(70.04)), now);
        let req = c.begin_save(now + DEBOUNCE).unwrap();
        let mut canonical = saved();
        canonical.weight_kg = Some(70.0);
        assert!(c.complete_save(req.generation, Ok(canonical.clone()), now + DEBOUNCE));
        assert_eq!(c.state(), SyncState::Idle);
        assert_eq!(c.profile(), &canonical);
    }

    #[test]
    fn stale_completion_is_ignored() {
        let now = Instant::now();
        let mut c = ProfileSyncController::new(saved(), DEBOUNCE);
        c.set_field(ProfileField::Age(Some(40)), now);
        let req = c.begin_save(now + DEBOUNCE).unwrap();
        assert!(!c.complete_save(req.generation + 1, Ok(Profile::default()), now));
        assert_eq!(c.state(), SyncState::Saving);
        assert!(c.complete_save(req.generation, Ok(c.profile().clone()), now));
        assert!(!c.complete_save(req.generation, Ok(Profile::default()), now));
        assert_eq!(c.profile().age, Some(40));
    }

    #[test]
    fn failure_keeps_edits_and_surfaces_error() {
        let now = Instant::now();
        let mut c = ProfileSyncController::new(saved(), DEBOUNCE);
        c.set_field(ProfileField::ActivityLevel(ActivityLevel::Active), now);
        let req = c.begin_save(now + DEBOUNCE).unwrap();
        c.complete_save(req.generation, Err("boom".into()), now + DEBOUNCE);

        let snap = c.snapshot();
        assert_eq!(snap.state, SyncState::Error);
        assert_eq!(snap.last_error.as_deref(), Some("boom"));
        assert_eq!(snap.profile.activity_level, ActivityLevel::Active);
        // no automatic retry
        assert!(c.begin_save(now + DEBOUNCE * 10).is_none());

        assert!(c.retry(now + DEBOUNCE * 10));
        assert!(c.begin_save(now + DEBOUNCE * 10).is_some());
    }

    #[test]
    fn edit_after_failure_rearms_debounce() {
        let now = Instant::now();
        let mut c = ProfileSyncController::new(saved(), DEBOUNCE);
        c.set_field(ProfileField::Age(Some(31)), now);
        let req = c.begin_save(now + DEBOUNCE).unwrap();
        c.complete_save(req.generation, Err("offline".into()), now + DEBOUNCE);
        c.set_field(ProfileField::Age(Some(32)), now + DEBOUNCE * 2);
        assert_eq!(c.state(), SyncState::PendingSave);
        assert_eq!(c.deadline(), Some(now + DEBOUNCE * 3));
        assert!(!c.retry(now));
    }

    #[test]
    fn reverting_after_failure_clears_error() {
        let now = Instant::now();
        let mut c = ProfileSyncController::new(saved(), DEBOUNCE);
        c.set_field(ProfileField::Age(Some(31)), now);
        let req = c.begin_save(now + DEBOUNCE).unwrap();
        c.complete_save(req.generation, Err("offline".into()), now + DEBOUNCE);
        assert_eq!(c.snapshot().last_error.as_deref(), Some("offline"));

        c.set_field(ProfileField::Age(Some(25)), now + DEBOUNCE * 2);
        let snap = c.snapshot();
        assert_eq!(snap.state, SyncState::Idle);
        assert_eq!(snap.last_error, None);
        assert_eq!(c.deadline(), None);
    }

    async fn signed_in(api: Arc<MockApi>) -> (SessionManager, ProfileSyncHandle) {
        let mgr = SessionManager::new(api.clone());
        let session = mgr
            .bootstrap(Some(SecretString::new(VALID_TOKEN.into())))
            .await;
        let user = session.identity.clone().unwrap();
        let handle = spawn_profile_sync(
            api,
            session.token.clone().unwrap(),
            ProfileSyncController::new(Profile::from(&user), DEBOUNCE),
            mgr.subscribe(),
            mgr.invalidator(),
        );
        (mgr, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_edits_coalesce_into_one_request() {
        let api = Arc::new(MockApi::new());
        let (_mgr, handle) = signed_in(api.clone()).await;

        for w in [71.0, 72.0, 73.0, 74.0] {
            handle.set_field(ProfileField::WeightKg(Some(w)));
            tokio::time::sleep(Duration::from_millis(400)).await;
        }
        assert!(api.updates().await.is_empty());

        tokio::time::sleep(DEBOUNCE * 2).await;
        let updates = api.updates().await;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].weight, 74.0);
        assert_eq!(handle.snapshot().state, SyncState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_preserves_edits() {
        let api = Arc::new(MockApi::new());
        api.fail_next_save(NutritionApiError::from_status(503, "down".into()))
            .await;
        let (_mgr, handle) = signed_in(api.clone()).await;

        handle.set_field(ProfileField::HeightCm(Some(181.0)));
        tokio::time::sleep(DEBOUNCE * 2).await;

        let snap = handle.snapshot();
        assert_eq!(snap.state, SyncState::Error);
        assert!(snap.last_error.unwrap().contains("503"));
        assert_eq!(snap.profile.height_cm, Some(181.0));

        handle.retry();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.snapshot().state, SyncState::Idle);
        assert_eq!(api.updates().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn edit_during_save_triggers_follow_up_save() {
        let api = Arc::new(MockApi::new().with_save_delay(Duration::from_millis(800)));
        let (_mgr, handle) = signed_in(api.clone()).await;

        handle.set_field(ProfileField::Age(Some(33)));
        tokio::time::sleep(DEBOUNCE + Duration::from_millis(100)).await;
        assert_eq!(handle.snapshot().state, SyncState::Saving);
        handle.set_field(ProfileField::Age(Some(34)));

        tokio::time::sleep(Duration::from_secs(10)).await;
        let updates = api.updates().await;
        assert_eq!(updates.iter().map(|u| u.age).collect::<Vec<_>>(), [33, 34]);
        let snap = handle.snapshot();
        assert_eq!(snap.state, SyncState::Idle);
        assert_eq!(snap.profile.age, Some(34));
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_save_logs_out_and_stops() {
        let api = Arc::new(MockApi::new());
        api.fail_next_save(NutritionApiError::Auth("expired".into()))
            .await;
        let (mgr, handle) = signed_in(api.clone()).await;

        handle.set_field(ProfileField::Age(Some(44)));
        tokio::time::sleep(DEBOUNCE * 2).await;
        assert!(!mgr.current().is_authenticated());
        assert!(!handle.is_running());
        assert_eq!(handle.snapshot().profile.age, Some(44));
    }

    #[tokio::test(start_paused = true)]
    async fn logout_stops_the_driver() {
        let api = Arc::new(MockApi::new());
        let (mgr, handle) = signed_in(api.clone()).await;
        mgr.logout();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_running());

        handle.set_field(ProfileField::Age(Some(50)));
        tokio::time::sleep(DEBOUNCE * 2).await;
        assert!(api.updates().await.is_empty());
    }
}
