//! Authenticated session: the bearer token, the identity behind it and
//! whether validation is still outstanding.

use std::sync::Arc;

use nutriscan_client::{NutritionApi, UserRecord};
use secrecy::SecretString;
use tokio::sync::watch;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Unauthenticated,
    Validating,
    Authenticated,
}

#[derive(Clone, Debug, Default)]
pub struct Session {
    pub token: Option<SecretString>,
    pub identity: Option<UserRecord>,
    pub is_loading: bool,
    /// Bumped on every login, logout or forced invalidation.
    epoch: u64,
}

impl Session {
    pub fn status(&self) -> SessionStatus {
        match (&self.token, &self.identity) {
            _ if self.is_loading => SessionStatus::Validating,
            (Some(_), Some(_)) => SessionStatus::Authenticated,
            _ => SessionStatus::Unauthenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn clear(&mut self) {
        self.token = None;
        self.identity = None;
        self.is_loading = false;
        self.epoch += 1;
    }
}

/// Owns the session and publishes every transition on a watch channel.
pub struct SessionManager {
    api: Arc<dyn NutritionApi>,
    tx: Arc<watch::Sender<Session>>,
}

impl SessionManager {
    /// The session starts unresolved (`is_loading`) until `bootstrap` runs.
    pub fn new(api: Arc<dyn NutritionApi>) -> Self {
        let (tx, _rx) = watch::channel(Session {
            is_loading: true,
            ..Session::default()
        });
        Self {
            api,
            tx: Arc::new(tx),
        }
    }

    pub fn current(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    pub fn invalidator(&self) -> SessionInvalidator {
        SessionInvalidator {
            tx: self.tx.clone(),
        }
    }

    /// Resolve the session from a previously stored token, if any.
    pub async fn bootstrap(&self, stored_token: Option<SecretString>) -> Session {
        match stored_token {
            Some(token) => {
                self.login(token);
                self.validate().await
            }
            None => {
                self.tx.send_modify(Session::clear);
                self.current()
            }
        }
    }

    /// Adopt `token` and mark the session as validating. Any validation
    /// already in flight becomes stale.
    pub fn login(&self, token: SecretString) {
        self.tx.send_modify(|s| {
            s.epoch += 1;
            s.token = Some(token);
            s.identity = None;
            s.is_loading = true;
        });
    }

    /// Check the current token against the identity endpoint.
    pub async fn validate(&self) -> Session {
        let (token, epoch) = {
            let s = self.tx.borrow();
            (s.token.clone(), s.epoch)
        };
        let Some(token) = token else {
            self.tx.send_if_modified(|s| {
                let changed = s.is_loading;
                s.is_loading = false;
                changed
            });
            return self.current();
        };

        let result = self.api.get_current_user(&token).await;
        self.tx.send_if_modified(|s| {
            if s.epoch != epoch {
                tracing::debug!(epoch, current = s.epoch, "discarding stale session validation");
                return false;
            }
            match result {
                Ok(user) => {
                    tracing::info!(username = %user.username, "session validated");
                    s.identity = Some(user);
                    s.is_loading = false;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "session token rejected");
                    metrics::counter!("nutriscan_session_invalidations_total", "reason" => "validation_failed")
                        .increment(1);
                    s.clear();
                }
            }
            true
        });
        self.current()
    }

    pub fn logout(&self) {
        tracing::info!("session logged out");
        self.tx.send_modify(Session::clear);
    }
}

/// Cloneable hook for components that observe a 401-equivalent response.
#[derive(Clone)]
pub struct SessionInvalidator {
    tx: Arc<watch::Sender<Session>>,
}

impl SessionInvalidator {
    /// Force logout. No-op if the session is already signed out.
    pub fn invalidate(&self, reason: &'static str) {
        let changed = self.tx.send_if_modified(|s| {
            if s.token.is_none() {
                return false;
            }
            s.clear();
            true
        });
        if changed {
            tracing::warn!(reason, "session invalidated");
            metrics::counter!("nutriscan_session_invalidations_total", "reason" => reason)
                .increment(1);
        }
    }

    /// Replace the identity with a fresher record, provided the session has
    /// not changed hands since `epoch`.
    pub fn record_identity(&self, epoch: u64, user: UserRecord) {
        self.tx.send_if_modified(|s| {
            if s.epoch != epoch || !s.is_authenticated() {
                return false;
            }
            s.identity = Some(user);
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockApi, VALID_TOKEN};
    use std::time::Duration;

    fn secret(s: &str) -> SecretString {
        SecretString::new(s.into())
    }

    #[tokio::test]
    async fn starts_unresolved() {
        let mgr = SessionManager::new(Arc::new(MockApi::new()));
        let s = mgr.current();
        assert!(s.is_loading);
        assert_eq!(s.status(), SessionStatus::Validating);
    }

    #[tokio::test]
    async fn bootstrap_without_token_is_signed_out() {
        let mgr = SessionManager::new(Arc::new(MockApi::new()));
        let s = mgr.bootstrap(None).await;
        assert_eq!(s.status(), SessionStatus::Unauthenticated);
        assert!(!s.is_loading);
    }

    #[tokio::test]
    async fn bootstrap_with_valid_token_populates_identity() {
        let mgr = SessionManager::new(Arc::new(MockApi::new()));
        let s = mgr.bootstrap(Some(secret(VALID_TOKEN))).await;
        assert_eq!(s.status(), SessionStatus::Authenticated);
        assert_eq!(s.identity.unwrap().username, "ana");
    }

    #[tokio::test]
    async fn bootstrap_with_invalid_token_clears_everything() {
        let mgr = SessionManager::new(Arc::new(MockApi::new()));
        let mut rx = mgr.subscribe();
        let s = mgr.bootstrap(Some(secret("expired"))).await;
        assert_eq!(s.status(), SessionStatus::Unauthenticated);
        assert!(s.token.is_none());
        assert!(s.identity.is_none());
        assert!(!s.is_loading);
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn validation_resolving_after_logout_is_discarded() {
        let api = Arc::new(MockApi::new().with_identity_delay(Duration::from_millis(500)));
        let mgr = Arc::new(SessionManager::new(api));
        mgr.login(secret(VALID_TOKEN));

        let pending = tokio::spawn({
            let mgr = mgr.clone();
            async move { mgr.validate().await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        mgr.logout();

        let s = pending.await.unwrap();
        assert_eq!(s.status(), SessionStatus::Unauthenticated);
        assert!(s.identity.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn validation_superseded_by_new_login_is_discarded() {
        let api = Arc::new(MockApi::new().with_identity_delay(Duration::from_millis(500)));
        let mgr = Arc::new(SessionManager::new(api));
        mgr.login(secret("expired"));
        let stale = tokio::spawn({
            let mgr = mgr.clone();
            async move { mgr.validate().await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        mgr.login(secret(VALID_TOKEN));
        let fresh = mgr.validate().await;
        stale.await.unwrap();

        assert!(fresh.is_authenticated());
        assert!(mgr.current().is_authenticated());
    }

    #[tokio::test]
    async fn invalidator_forces_logout_once() {
        let mgr = SessionManager::new(Arc::new(MockApi::new()));
        mgr.bootstrap(Some(secret(VALID_TOKEN))).await;
        let inv = mgr.invalidator();
        let epoch = mgr.current().epoch();
        inv.invalidate("test");
        assert_eq!(mgr.current().status(), SessionStatus::Unauthenticated);
        assert_eq!(mgr.current().epoch(), epoch + 1);
        inv.invalidate("test");
        assert_eq!(mgr.current().epoch(), epoch + 1);
    }

    #[tokio::test]
    async fn record_identity_ignores_other_epochs() {
        let mgr = SessionManager::new(Arc::new(MockApi::new()));
        mgr.bootstrap(Some(secret(VALID_TOKEN))).await;
        let epoch = mgr.current().epoch();
        let mut user = mgr.current().identity.unwrap();
        user.age = Some(52);

        mgr.invalidator().record_identity(epoch + 7, user.clone());
        assert_ne!(mgr.current().identity.unwrap().age, Some(52));
        mgr.invalidator().record_identity(epoch, user);
        assert_eq!(mgr.current().identity.unwrap().age, Some(52));
    }
}
