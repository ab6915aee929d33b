//! Session provider boundary.
//!
//! The sign-in flow itself (redirects, tokens) belongs to the provider; this
//! crate only asks it for the current session and listens for changes.

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{Session, SessionError};

/// What a session-change notification reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    /// Any other provider event (token refresh, profile update, ...)
    Other(String),
}

/// A session-change notification with its optional session payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

impl AuthEvent {
    pub fn signed_in(session: Session) -> Self {
        Self {
            kind: AuthEventKind::SignedIn,
            session: Some(session),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            kind: AuthEventKind::SignedOut,
            session: None,
        }
    }
}

/// Trait for the session (sign-in) provider.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// The current session, if any.
    async fn get_session(&self) -> Result<Option<Session>, SessionError>;

    /// Session-change notifications from now on.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    /// End the current session.
    async fn sign_out(&self) -> Result<(), SessionError>;
}

/// Provider for a device with no live session support.
///
/// Never reports a session, so the local identity always decides. Sign-out
/// is announced to subscribers like a real provider would.
pub struct OfflineSessionProvider {
    events: broadcast::Sender<AuthEvent>,
}

impl OfflineSessionProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self { events }
    }
}

impl Default for OfflineSessionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionProvider for OfflineSessionProvider {
    async fn get_session(&self) -> Result<Option<Session>, SessionError> {
        Ok(None)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_out(&self) -> Result<(), SessionError> {
        // No subscribers is fine
        let _ = self.events.send(AuthEvent::signed_out());
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_provider_has_no_session() {
        let provider = OfflineSessionProvider::new();
        assert!(provider.get_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_offline_provider_announces_sign_out() {
        let provider = OfflineSessionProvider::new();
        let mut rx = provider.subscribe();
        provider.sign_out().await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, AuthEventKind::SignedOut);
        assert!(event.session.is_none());
    }
}
