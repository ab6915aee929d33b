//! Identity reconciliation.
//!
//! Two sources claim to know who the listener is:
//! - the live [`session`] from the session provider (authoritative when present)
//! - a [`local`] identity persisted on this device (fallback, and an
//!   optimistic placeholder until the session check completes)
//!
//! [`merge`] turns the pair into one [`EffectiveIdentity`];
//! [`IdentityResolver`] keeps the pair current as the session check and
//! provider notifications arrive.

pub mod local;
pub mod resolver;
pub mod session;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{UserId, UserRecord};

pub use local::{FileIdentityStore, LocalIdentityStore, MemoryIdentityStore};
pub use resolver::{IdentityResolver, IdentityState};
pub use session::{AuthEvent, AuthEventKind, OfflineSessionProvider, SessionProvider};

/// Display profile shared by every identity shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl Profile {
    /// Name to show: profile name, else the email's local part, else `fallback`.
    pub fn display_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| {
                self.email
                    .as_deref()
                    .and_then(|e| e.split('@').next())
                    .filter(|local| !local.is_empty())
            })
            .unwrap_or(fallback)
    }
}

/// A live session as delivered by the session provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub profile: Profile,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            profile: Profile::default(),
            expires_at: None,
        }
    }

    /// Whether the session is still usable at `now`. No expiry means it is.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires| expires > now)
    }

    pub fn identity(&self) -> SessionIdentity {
        SessionIdentity {
            user_id: self.user_id.clone(),
            profile: self.profile.clone(),
        }
    }
}

/// The identity carried by a live session. Ephemeral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: UserId,
    pub profile: Profile,
}

impl SessionIdentity {
    /// Profile row to upsert remotely after sign-in.
    pub fn to_user_record(&self) -> UserRecord {
        UserRecord {
            id: self.user_id.to_string(),
            email: self.profile.email.clone(),
            name: self.profile.name.clone(),
            avatar_url: self.profile.avatar_url.clone(),
            last_song_id: None,
        }
    }
}

/// The identity persisted on this device as a JSON record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIdentity {
    #[serde(rename = "id")]
    pub user_id: UserId,
    #[serde(flatten)]
    pub profile: Profile,
}

impl From<&SessionIdentity> for LocalIdentity {
    fn from(session: &SessionIdentity) -> Self {
        Self {
            user_id: session.user_id.clone(),
            profile: session.profile.clone(),
        }
    }
}

/// Which source an [`EffectiveIdentity`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Session,
    Local,
}

/// The identity used for every personalization and history call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveIdentity {
    pub user_id: UserId,
    pub profile: Profile,
    pub source: IdentitySource,
}

/// Merge the two identity sources.
///
/// The session wins whenever it is present; the local identity is the
/// fallback. Neither present means nobody is signed in.
pub fn merge(
    session: Option<&SessionIdentity>,
    local: Option<&LocalIdentity>,
) -> Option<EffectiveIdentity> {
    match (session, local) {
        (Some(s), _) => Some(EffectiveIdentity {
            user_id: s.user_id.clone(),
            profile: s.profile.clone(),
            source: IdentitySource::Session,
        }),
        (None, Some(l)) => Some(EffectiveIdentity {
            user_id: l.user_id.clone(),
            profile: l.profile.clone(),
            source: IdentitySource::Local,
        }),
        (None, None) => None,
    }
}

/// Errors reported by a [`SessionProvider`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session provider failed: {0}")]
    Provider(String),

    #[error("Session provider unreachable: {0}")]
    Unavailable(String),

    #[error("Session expired")]
    Expired,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(id: &str) -> LocalIdentity {
        LocalIdentity {
            user_id: UserId::new(id),
            profile: Profile::default(),
        }
    }

    #[test]
    fn test_merge_prefers_session() {
        let session = Session::new("s1").identity();
        let merged = merge(Some(&session), Some(&local("u1"))).unwrap();
        assert_eq!(merged.user_id.as_str(), "s1");
        assert_eq!(merged.source, IdentitySource::Session);
    }

    #[test]
    fn test_merge_falls_back_to_local() {
        let merged = merge(None, Some(&local("u1"))).unwrap();
        assert_eq!(merged.user_id.as_str(), "u1");
        assert_eq!(merged.source, IdentitySource::Local);
        assert!(merge(None, None).is_none());
    }

    #[test]
    fn test_session_validity() {
        let now = Utc::now();
        assert!(Session::new("s1").is_valid(now));

        let mut session = Session::new("s1");
        session.expires_at = Some(now + chrono::Duration::hours(1));
        assert!(session.is_valid(now));
        session.expires_at = Some(now);
        assert!(!session.is_valid(now));
        session.expires_at = Some(now - chrono::Duration::days(1));
        assert!(!session.is_valid(now));
    }

    #[test]
    fn test_local_identity_json_shape() {
        let identity = LocalIdentity {
            user_id: UserId::new("u1"),
            profile: Profile {
                name: Some("Ada".to_string()),
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["id"], "u1");
        assert_eq!(json["name"], "Ada");

        let parsed: LocalIdentity = serde_json::from_str(r#"{"id":"u2"}"#).unwrap();
        assert_eq!(parsed.user_id.as_str(), "u2");
        assert_eq!(parsed.profile, Profile::default());
    }

    #[test]
    fn test_display_name_fallbacks() {
        let named = Profile {
            name: Some("Ada".to_string()),
            ..Default::default()
        };
        assert_eq!(named.display_name("u1"), "Ada");

        let emailed = Profile {
            email: Some("grace@example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(emailed.display_name("u1"), "grace");
        assert_eq!(Profile::default().display_name("u1"), "u1");
    }
}
