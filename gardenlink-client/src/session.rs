use std::sync::Arc;

use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::sync::broadcast;

/// Cookie holding the bearer token.
pub const AUTH_COOKIE: &str = "userAuth";
/// Where a forced logout sends the user.
pub const SIGN_IN_PATH: &str = "/auth/signin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub expires_at: Option<OffsetDateTime>,
}

impl Cookie {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn,
    SignedOut,
    /// The server rejected the session; every cookie was dropped
    ForcedLogout { reason: String, redirect: String },
}

/// In-memory cookie jar shared by the dispatcher and the sync client.
#[derive(Clone)]
pub struct SessionStore {
    jar: Arc<DashMap<String, Cookie>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);

        Self {
            jar: Arc::new(DashMap::new()),
            events,
        }
    }

    pub fn set_cookie(&self, cookie: Cookie) {
        self.jar.insert(cookie.name.clone(), cookie);
    }

    pub fn cookie(&self, name: &str) -> Option<Cookie> {
        self.jar.get(name).map(|cookie| cookie.clone())
    }

    /// Stores the auth token with the expiry the server handed out.
    pub fn sign_in(&self, token: impl Into<String>, expires_at: Option<OffsetDateTime>) {
        self.set_cookie(Cookie {
            name: AUTH_COOKIE.to_string(),
            value: token.into(),
            expires_at,
        });
        let _ = self.events.send(SessionEvent::SignedIn);
    }

    /// Current bearer token, if present and not expired.
    pub fn token(&self) -> Option<String> {
        self.token_at(OffsetDateTime::now_utc())
    }

    pub fn token_at(&self, now: OffsetDateTime) -> Option<String> {
        self.jar.remove_if(AUTH_COOKIE, |_, cookie| cookie.is_expired(now));

        self.cookie(AUTH_COOKIE)
            .filter(|cookie| !cookie.is_expired(now))
            .map(|cookie| cookie.value)
    }

    pub fn is_signed_in(&self) -> bool {
        self.token().is_some()
    }

    /// Drops every cookie.
    pub fn clear(&self) {
        self.jar.clear();
    }

    pub fn sign_out(&self) {
        self.clear();
        let _ = self.events.send(SessionEvent::SignedOut);
    }

    pub fn force_logout(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(%reason, "forced logout");

        self.clear();
        let _ = self.events.send(SessionEvent::ForcedLogout {
            reason,
            redirect: SIGN_IN_PATH.to_string(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
