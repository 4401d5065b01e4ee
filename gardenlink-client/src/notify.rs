use std::sync::Arc;

use dashmap::DashMap;
use time::{Duration, OffsetDateTime};
use tokio::sync::broadcast;
use uuid::Uuid;

pub const DEFAULT_TTL: Duration = Duration::seconds(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Error,
}

/// Transient, non-blocking toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    pub level: Level,
    pub message: String,
    pub created_at: OffsetDateTime,
    pub ttl: Duration,
}

impl Notification {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now - self.created_at >= self.ttl
    }

    /// Remaining share of the countdown, from 1.0 when shown down to 0.0.
    pub fn progress(&self, now: OffsetDateTime) -> f64 {
        let elapsed = (now - self.created_at).as_seconds_f64();
        let total = self.ttl.as_seconds_f64();
        if total <= 0.0 {
            return 0.0;
        }
        (1.0 - elapsed / total).clamp(0.0, 1.0)
    }
}

/// Single notification surface shared by every screen.
#[derive(Clone)]
pub struct Notifier {
    active: Arc<DashMap<Uuid, Notification>>,
    ttl: Duration,
    events: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(32);

        Self {
            active: Arc::new(DashMap::new()),
            ttl,
            events,
        }
    }

    pub fn info(&self, message: impl Into<String>) -> Notification {
        self.push(Level::Info, message)
    }

    pub fn success(&self, message: impl Into<String>) -> Notification {
        self.push(Level::Success, message)
    }

    pub fn error(&self, message: impl Into<String>) -> Notification {
        self.push(Level::Error, message)
    }

    pub fn push(&self, level: Level, message: impl Into<String>) -> Notification {
        self.push_at(level, message, OffsetDateTime::now_utc())
    }

    pub fn push_at(&self, level: Level, message: impl Into<String>, now: OffsetDateTime) -> Notification {
        let notification = Notification {
            id: Uuid::new_v4(),
            level,
            message: message.into(),
            created_at: now,
            ttl: self.ttl,
        };

        match level {
            Level::Error => tracing::warn!(message = %notification.message, "error notification"),
            _ => tracing::debug!(message = %notification.message, "notification"),
        }

        self.active.retain(|_, active| !active.is_expired(now));
        self.active.insert(notification.id, notification.clone());
        let _ = self.events.send(notification.clone());
        notification
    }

    /// Notifications still on screen at `now`, oldest first. Expired ones are dropped.
    pub fn active(&self, now: OffsetDateTime) -> Vec<Notification> {
        self.active.retain(|_, notification| !notification.is_expired(now));

        let mut active: Vec<_> = self.active.iter().map(|entry| entry.value().clone()).collect();
        active.sort_by_key(|notification| notification.created_at);
        active
    }

    pub fn dismiss(&self, id: Uuid) -> bool {
        self.active.remove(&id).is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.events.subscribe()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
