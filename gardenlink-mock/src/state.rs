use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use gardenlink_api::models::{
    AccountPush, AccountSnapshot, LogEntry, OutputMode, PzemDevice, PzemReading, Role,
    SessionRecord,
};
use gardenlink_api::{Channel, SharedSecret, envelope};
use serde::Serialize;
use serde_json::{Value, json};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use crate::error::MockError;
use crate::settings::Settings;

pub const LOG_CAPACITY: usize = 200;
pub const READING_CAPACITY: usize = 500;
/// Entries sent to a log subscriber when it connects
pub const LOG_SNAPSHOT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    All,
    User(String),
    Token(String),
}

/// A frame queued for every matching push connection.
#[derive(Debug, Clone)]
pub struct Push {
    /// `None` reaches every channel
    pub channel: Option<Channel>,
    pub audience: Audience,
    pub text: String,
}

impl Push {
    pub fn reaches(&self, channel: Channel, session: &Session) -> bool {
        let on_channel = self.channel.is_none_or(|target| target == channel);
        let for_client = match &self.audience {
            Audience::All => true,
            Audience::User(user_id) => *user_id == session.user_id,
            Audience::Token(token) => *token == session.token,
        };
        on_channel && for_client
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub role: Role,
    pub expires_at: OffsetDateTime,
    pub record: SessionRecord,
}

/// Output as stored by the backend; `state` stays `null` until the device reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord {
    pub id: String,
    pub name: String,
    pub state: Option<bool>,
    pub mode: OutputMode,
    pub turn_on_time: Option<String>,
    pub turn_off_time: Option<String>,
    pub state_id: Option<String>,
    pub state_created_at: Option<String>,
}

impl OutputRecord {
    /// Switches the output, returning whether anything changed.
    pub fn switch(&mut self, state: bool, now: OffsetDateTime) -> bool {
        if self.state == Some(state) {
            return false;
        }
        self.state = Some(state);
        self.state_id = Some(Uuid::new_v4().to_string());
        self.state_created_at = now.format(&Rfc3339).ok();
        true
    }
}

#[derive(Debug, Default)]
pub struct Store {
    pub users: Vec<User>,
    pub sessions: Vec<Session>,
    pub outputs: BTreeMap<String, OutputRecord>,
    pub meters: BTreeMap<String, PzemDevice>,
    pub readings: BTreeMap<String, VecDeque<PzemReading>>,
    pub logs: VecDeque<LogEntry>,
}

impl Store {
    pub fn from_settings(settings: &Settings) -> Self {
        let users = settings
            .mock
            .users
            .iter()
            .map(|user| User {
                id: user.id.clone(),
                email: user.email.clone(),
                password: user.password.clone(),
                name: user.name.clone(),
                role: user.role,
            })
            .collect();

        let outputs = settings
            .mock
            .outputs
            .iter()
            .map(|output| {
                let record = OutputRecord {
                    id: output.id.clone(),
                    name: output.name.clone(),
                    state: output.state,
                    mode: output.mode,
                    turn_on_time: output.turn_on_time.clone(),
                    turn_off_time: output.turn_off_time.clone(),
                    state_id: None,
                    state_created_at: None,
                };
                (record.id.clone(), record)
            })
            .collect();

        let meters = settings
            .mock
            .meters
            .iter()
            .map(|meter| {
                let device = PzemDevice {
                    id: meter.id.clone(),
                    name: meter.name.clone(),
                    description: meter.description.clone(),
                };
                (device.id.clone(), device)
            })
            .collect();

        Self {
            users,
            outputs,
            meters,
            ..Default::default()
        }
    }

    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.iter().find(|user| user.id == id)
    }

    pub fn user_mut(&mut self, id: &str) -> Option<&mut User> {
        self.users.iter_mut().find(|user| user.id == id)
    }

    pub fn outputs(&self) -> Vec<OutputRecord> {
        self.outputs.values().cloned().collect()
    }

    pub fn latest_readings(&self) -> Vec<PzemReading> {
        self.readings
            .values()
            .filter_map(|readings| readings.back().cloned())
            .collect()
    }

    pub fn record_reading(&mut self, reading: PzemReading) {
        let readings = self.readings.entry(reading.pzem_id.clone()).or_default();
        readings.push_back(reading);
        while readings.len() > READING_CAPACITY {
            readings.pop_front();
        }
    }

    pub fn next_meter_id(&self) -> String {
        let next = self
            .meters
            .keys()
            .filter_map(|id| id.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        next.to_string()
    }

    /// Account view as seen from the session holding `token`.
    pub fn account_push(&self, user_id: &str, token: &str) -> AccountPush {
        let sessions: Vec<_> = self
            .sessions
            .iter()
            .filter(|session| session.user_id == user_id)
            .collect();

        AccountPush {
            account: AccountSnapshot {
                sessions: sessions.iter().map(|session| session.record.clone()).collect(),
                session_now: sessions
                    .iter()
                    .find(|session| session.token == token)
                    .map(|session| session.record.id.clone()),
            },
        }
    }

    fn append_log(&mut self, message: String, level: &str, now: OffsetDateTime) -> LogEntry {
        let entry = LogEntry {
            id: Uuid::new_v4().to_string(),
            message,
            level: Some(level.to_string()),
            created_at: now,
        };
        self.logs.push_front(entry.clone());
        self.logs.truncate(LOG_CAPACITY);
        entry
    }
}

/// Shared state of the mock backend.
#[derive(Clone)]
pub struct MockState {
    pub store: Arc<RwLock<Store>>,
    pub secret: SharedSecret,
    pub token_ttl: Duration,
    pub sun_threshold_lux: f64,
    pushes: broadcast::Sender<Push>,
}

impl MockState {
    pub fn new(settings: &Settings) -> Result<Self, MockError> {
        let (pushes, _) = broadcast::channel(256);

        Ok(Self {
            store: Arc::new(RwLock::new(Store::from_settings(settings))),
            secret: SharedSecret::new(settings.crypto.secret.clone())?,
            token_ttl: Duration::seconds(settings.mock.token_ttl_secs),
            sun_threshold_lux: settings.mock.sun_threshold_lux,
            pushes,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Push> {
        self.pushes.subscribe()
    }

    /// Looks up a live session and marks it as accessed.
    pub async fn authenticate(&self, token: &str) -> Option<Session> {
        let now = OffsetDateTime::now_utc();
        let mut store = self.store.write().await;

        store.sessions.retain(|session| session.expires_at > now);
        let session = store.sessions.iter_mut().find(|session| session.token == token)?;
        session.record.last_accessed_at = now;

        Some(session.clone())
    }

    pub async fn sign_in(&self, user: &User, device: String) -> Session {
        let now = OffsetDateTime::now_utc();
        let session = Session {
            token: Uuid::new_v4().simple().to_string(),
            user_id: user.id.clone(),
            role: user.role,
            expires_at: now + self.token_ttl,
            record: SessionRecord {
                id: Uuid::new_v4().to_string(),
                device,
                ip: "127.0.0.1".to_string(),
                region: "Local".to_string(),
                city: "Localhost".to_string(),
                org: "GardenLink".to_string(),
                timezone: "UTC".to_string(),
                created_at: now,
                last_accessed_at: now,
            },
        };

        let mut store = self.store.write().await;
        store.sessions.push(session.clone());
        self.publish_account(&store, &user.id);

        session
    }

    /// Ends the sessions matching `predicate` and tells their push clients.
    pub async fn end_sessions<F>(&self, user_id: &str, predicate: F) -> usize
    where
        F: Fn(&Session) -> bool,
    {
        let mut store = self.store.write().await;
        let (ended, kept): (Vec<_>, Vec<_>) = store
            .sessions
            .drain(..)
            .partition(|session| session.user_id == user_id && predicate(session));
        store.sessions = kept;

        for session in &ended {
            self.publish_text(
                None,
                Audience::Token(session.token.clone()),
                gardenlink_api::channel::INVALID_SESSION,
            );
        }
        self.publish_account(&store, user_id);

        ended.len()
    }

    /// Initial payload sent when a client subscribes to `channel`.
    pub async fn snapshot(&self, channel: Channel, session: &Session) -> Result<Value, MockError> {
        let store = self.store.read().await;

        let value = match channel {
            Channel::SessionId => json!({ "sessionId": session.record.id }),
            Channel::Output => serde_json::to_value(store.outputs()).map_err(seal_error)?,
            Channel::Pzem => serde_json::to_value(store.latest_readings()).map_err(seal_error)?,
            Channel::SessionAccount => {
                serde_json::to_value(store.account_push(&session.user_id, &session.token))
                    .map_err(seal_error)?
            }
            Channel::Logs => {
                let entries: Vec<_> = store.logs.iter().take(LOG_SNAPSHOT).collect();
                serde_json::to_value(entries).map_err(seal_error)?
            }
        };

        Ok(value)
    }

    /// Encrypts `payload` and queues it for the matching connections.
    pub fn publish<T: Serialize>(&self, channel: Channel, audience: Audience, payload: &T) {
        match self.seal(payload) {
            Ok(text) => self.send(Push {
                channel: Some(channel),
                audience,
                text,
            }),
            Err(e) => tracing::error!(%channel, error = %e, "failed to seal push"),
        }
    }

    /// Queues a frame sent in the clear.
    pub fn publish_text(&self, channel: Option<Channel>, audience: Audience, text: &str) {
        self.send(Push {
            channel,
            audience,
            text: text.to_string(),
        });
    }

    pub fn seal<T: Serialize>(&self, payload: &T) -> Result<String, MockError> {
        let sealed = envelope::seal(payload, &self.secret)?;
        serde_json::to_string(&sealed).map_err(seal_error)
    }

    pub fn publish_outputs(&self, store: &Store) {
        self.publish(Channel::Output, Audience::All, &store.outputs());
    }

    /// Sends every session of `user_id` its own view of the account.
    pub fn publish_account(&self, store: &Store, user_id: &str) {
        for session in store.sessions.iter().filter(|session| session.user_id == user_id) {
            self.publish(
                Channel::SessionAccount,
                Audience::Token(session.token.clone()),
                &store.account_push(user_id, &session.token),
            );
        }
    }

    pub fn publish_reading(&self, reading: &PzemReading) {
        self.publish(Channel::Pzem, Audience::All, reading);
    }

    /// Appends an audit entry and pushes it to log subscribers.
    pub fn log(&self, store: &mut Store, message: impl Into<String>) {
        let entry = store.append_log(message.into(), "INFO", OffsetDateTime::now_utc());
        self.publish(Channel::Logs, Audience::All, &entry);
    }

    fn send(&self, push: Push) {
        // No receivers just means nobody is connected.
        let _ = self.pushes.send(push);
    }
}

fn seal_error(e: serde_json::Error) -> MockError {
    MockError::Seal(e.into())
}

#[cfg(test)]
mod tests {
    use gardenlink_api::envelope::EncryptedEnvelope;

    use super::*;

    fn state() -> MockState {
        MockState::new(&Settings::new().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_sessions_expire() {
        let state = state();
        let user = state.store.read().await.users[0].clone();
        let session = state.sign_in(&user, "test".into()).await;

        assert!(state.authenticate(&session.token).await.is_some());

        state.store.write().await.sessions[0].expires_at = OffsetDateTime::now_utc() - Duration::seconds(1);
        assert!(state.authenticate(&session.token).await.is_none());
        assert!(state.store.read().await.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_account_push_is_per_session() {
        let state = state();
        let user = state.store.read().await.users[0].clone();
        let first = state.sign_in(&user, "laptop".into()).await;
        let second = state.sign_in(&user, "phone".into()).await;

        let store = state.store.read().await;
        let push = store.account_push(&user.id, &second.token);
        assert_eq!(push.account.sessions.len(), 2);
        assert_eq!(push.account.session_now, Some(second.record.id.clone()));
        assert_ne!(push.account.session_now, Some(first.record.id.clone()));
    }

    #[tokio::test]
    async fn test_end_sessions_notifies_the_token() {
        let state = state();
        let mut pushes = state.subscribe();
        let user = state.store.read().await.users[0].clone();
        let session = state.sign_in(&user, "laptop".into()).await;

        let ended = state
            .end_sessions(&user.id, |candidate| candidate.record.id == session.record.id)
            .await;
        assert_eq!(ended, 1);

        let mut texts = Vec::new();
        while let Ok(push) = pushes.try_recv() {
            if push.reaches(Channel::Output, &session) {
                texts.push(push.text);
            }
        }
        assert!(texts.iter().any(|text| text == "Invalid session"));
    }

    #[tokio::test]
    async fn test_published_frames_are_sealed() {
        let state = state();
        let mut pushes = state.subscribe();

        let store = state.store.read().await;
        state.publish_outputs(&store);

        let push = pushes.recv().await.unwrap();
        let value: Value = serde_json::from_str(&push.text).unwrap();
        let sealed = EncryptedEnvelope::detect(&value).unwrap();
        let outputs = envelope::decrypt(&sealed, &state.secret).unwrap();
        assert_eq!(outputs.as_array().unwrap().len(), 3);
        assert_eq!(outputs[0]["state"], Value::Null);
    }
}
