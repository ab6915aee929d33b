//! Keeps the (session, local) identity pair current.
//!
//! Lifecycle of an [`IdentityResolver`]:
//! 1. The local identity is read synchronously and becomes the tentative identity.
//! 2. The session provider is asked for the live session, racing a timeout.
//! 3. Provider notifications are applied for as long as the resolver lives.
//!
//! `loading` stays true until the first of (initial check settles) or
//! (a notification is applied). The timeout bounds it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::local::LocalIdentityStore;
use super::session::{AuthEvent, AuthEventKind, SessionProvider};
use super::{EffectiveIdentity, LocalIdentity, Session, SessionError, SessionIdentity, merge};
use crate::store::{BestEffort, RemoteStore};

/// The two identity sources plus the loading flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityState {
    pub session: Option<SessionIdentity>,
    pub local: Option<LocalIdentity>,
    pub loading: bool,
}

impl IdentityState {
    pub fn effective(&self) -> Option<EffectiveIdentity> {
        merge(self.session.as_ref(), self.local.as_ref())
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some() || self.local.is_some()
    }
}

struct Inner {
    provider: Arc<dyn SessionProvider>,
    local: Arc<dyn LocalIdentityStore>,
    profiles: Option<Arc<dyn RemoteStore>>,
    state: watch::Sender<IdentityState>,
    /// Serializes transitions so the initial check and notifications never interleave
    transitions: Mutex<()>,
    /// Set once any notification was applied; a late initial check is then stale
    notified: AtomicBool,
    closed: AtomicBool,
}

/// Merges the live session and the persisted local identity.
pub struct IdentityResolver {
    inner: Arc<Inner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl IdentityResolver {
    /// Start resolving. Must be called inside a tokio runtime.
    ///
    /// `profiles`, when given, receives a best-effort profile upsert after
    /// every sign-in notification.
    pub fn start(
        provider: Arc<dyn SessionProvider>,
        local: Arc<dyn LocalIdentityStore>,
        profiles: Option<Arc<dyn RemoteStore>>,
        session_timeout: Duration,
    ) -> Self {
        let tentative = local.load();
        if let Some(identity) = &tentative {
            tracing::debug!(user_id = %identity.user_id, "Using local identity until the session check settles");
        }

        let (state, _) = watch::channel(IdentityState {
            session: None,
            local: tentative,
            loading: true,
        });
        let inner = Arc::new(Inner {
            provider,
            local,
            profiles,
            state,
            transitions: Mutex::new(()),
            notified: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        // Subscribe before the check starts so no notification slips between them.
        let events = inner.provider.subscribe();
        let listener = tokio::spawn(listen(Arc::clone(&inner), events));
        let initial = tokio::spawn(initial_check(Arc::clone(&inner), session_timeout));

        Self {
            inner,
            tasks: Mutex::new(vec![listener, initial]),
        }
    }

    /// Wait for loading to finish, then return the effective identity.
    pub async fn resolve(&self) -> Option<EffectiveIdentity> {
        let mut rx = self.inner.state.subscribe();
        match rx.wait_for(|state| !state.loading).await {
            Ok(state) => state.effective(),
            Err(_) => self.inner.state.borrow().effective(),
        }
    }

    /// The effective identity right now, without waiting.
    ///
    /// While loading this is the optimistic local placeholder.
    pub fn current(&self) -> Option<EffectiveIdentity> {
        self.inner.state.borrow().effective()
    }

    pub fn state(&self) -> IdentityState {
        self.inner.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    /// Watch identity changes.
    pub fn subscribe(&self) -> watch::Receiver<IdentityState> {
        self.inner.state.subscribe()
    }

    /// Sign out through the provider and clear both identities.
    ///
    /// Local state is cleared even when the provider fails; the provider
    /// error is still returned.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        let result = self.inner.provider.sign_out().await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Provider sign-out failed, clearing local identity anyway");
        }
        self.inner.apply(AuthEvent::signed_out());
        result
    }

    /// Stop listening. No state is written afterwards; waiters are released.
    ///
    /// In-flight provider calls are not cancelled, only ignored.
    pub fn shutdown(&self) {
        {
            let _guard = self.inner.transitions.lock();
            self.inner.closed.store(true, Ordering::SeqCst);
            self.inner.state.send_modify(|state| state.loading = false);
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        tracing::debug!("Identity resolver shut down");
    }
}

impl Drop for IdentityResolver {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

impl Inner {
    /// Outcome of the initial session check.
    fn settle(&self, session: Option<Session>) {
        let _guard = self.transitions.lock();
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        if self.notified.load(Ordering::SeqCst) {
            tracing::debug!("Ignoring initial session check, a notification already decided");
            return;
        }

        match session {
            Some(session) => {
                let identity = session.identity();
                let local = LocalIdentity::from(&identity);
                self.local.save(&local);
                tracing::info!(user_id = %identity.user_id, "Live session found");
                self.state.send_modify(|state| {
                    state.session = Some(identity);
                    state.local = Some(local);
                    state.loading = false;
                });
            }
            // Keep whatever local identity exists; never clear on a failed check.
            None => self.state.send_modify(|state| state.loading = false),
        }
    }

    /// Apply one provider notification.
    fn apply(&self, event: AuthEvent) {
        let _guard = self.transitions.lock();
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        self.notified.store(true, Ordering::SeqCst);

        let session = event.session.filter(|session| {
            let valid = session.is_valid(Utc::now());
            if !valid {
                tracing::warn!(user_id = %session.user_id, "Notification carried an expired session, ignoring it");
            }
            valid
        });

        match (event.kind, session) {
            (AuthEventKind::SignedOut, _) => {
                self.local.clear();
                self.state.send_modify(|state| {
                    state.session = None;
                    state.local = None;
                    state.loading = false;
                });
                tracing::info!("Signed out");
            }
            (AuthEventKind::SignedIn, Some(session)) => {
                let identity = session.identity();
                let local = LocalIdentity::from(&identity);
                self.local.save(&local);
                self.upsert_profile(&identity);
                tracing::info!(user_id = %identity.user_id, "Signed in");
                self.state.send_modify(|state| {
                    state.session = Some(identity);
                    state.local = Some(local);
                    state.loading = false;
                });
            }
            (AuthEventKind::SignedIn, None) => {
                tracing::warn!("Sign-in notification without a valid session, ignoring");
                self.state.send_modify(|state| state.loading = false);
            }
            (AuthEventKind::Other(kind), Some(session)) => {
                tracing::debug!(kind = %kind, "Session refreshed");
                self.state.send_modify(|state| {
                    state.session = Some(session.identity());
                    state.loading = false;
                });
            }
            (AuthEventKind::Other(kind), None) => {
                tracing::debug!(kind = %kind, "Session notification without payload");
                self.state.send_modify(|state| state.loading = false);
            }
        }
    }

    /// Fire-and-forget profile upsert.
    fn upsert_profile(&self, identity: &SessionIdentity) {
        let Some(store) = self.profiles.clone() else {
            return;
        };
        let record = identity.to_user_record();
        tokio::spawn(async move {
            let _ = BestEffort::log("upsert_user", store.upsert_user(&record).await);
        });
    }
}

async fn initial_check(inner: Arc<Inner>, session_timeout: Duration) {
    match tokio::time::timeout(session_timeout, inner.provider.get_session()).await {
        Ok(Ok(Some(session))) if !session.is_valid(Utc::now()) => {
            let e = SessionError::Expired;
            tracing::warn!(user_id = %session.user_id, error = %e, "Ignoring session, falling back to local identity");
            inner.settle(None);
        }
        Ok(Ok(session)) => {
            if session.is_none() {
                tracing::debug!("No live session");
            }
            inner.settle(session);
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Session check failed, falling back to local identity");
            inner.settle(None);
        }
        Err(_) => {
            tracing::warn!(
                timeout_ms = session_timeout.as_millis() as u64,
                "Session check timed out, falling back to local identity"
            );
            inner.settle(None);
        }
    }
}

async fn listen(inner: Arc<Inner>, mut events: broadcast::Receiver<AuthEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => inner.apply(event),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Missed session notifications");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
