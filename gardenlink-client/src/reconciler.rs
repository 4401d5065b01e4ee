use std::collections::{BTreeMap, VecDeque};

use gardenlink_api::models::{
    DeviceState, LogEntry, OutputMode, OutputState, PzemReading, SessionRecord, SessionStatus,
};
use serde_json::Value;
use time::OffsetDateTime;

pub const DEFAULT_PZEM_HISTORY: usize = 20;
pub const DEFAULT_LOG_HISTORY: usize = 50;

/// Folds one decrypted payload into a view model.
///
/// Implementations are total: a payload of the wrong shape leaves the view
/// unchanged, and a bad record inside a list is dropped on its own.
pub trait Reconcile: Sized {
    fn reconcile(&self, incoming: &Value) -> Self;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutputView {
    pub outputs: Vec<DeviceState>,
}

impl OutputView {
    pub fn get(&self, id: &str) -> Option<&DeviceState> {
        self.outputs.iter().find(|output| output.id == id)
    }
}

impl Reconcile for OutputView {
    fn reconcile(&self, incoming: &Value) -> Self {
        let records = match incoming {
            Value::Array(records) => records,
            Value::Object(object) => match object.get("outputs") {
                Some(Value::Array(records)) => records,
                _ => {
                    tracing::warn!("output payload without an `outputs` list, keeping current view");
                    return self.clone();
                }
            },
            _ => {
                tracing::warn!("output payload is not a list, keeping current view");
                return self.clone();
            }
        };

        Self {
            outputs: records.iter().filter_map(shape_output).collect(),
        }
    }
}

fn shape_output(record: &Value) -> Option<DeviceState> {
    let id = record.get("id").and_then(id_string);
    let name = record
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.trim().is_empty());

    let (Some(id), Some(name)) = (id, name) else {
        tracing::warn!(%record, "dropping output record without id or name");
        return None;
    };

    Some(DeviceState {
        id,
        name: name.to_owned(),
        state: OutputState::from_api(record.get("state").and_then(Value::as_bool)),
        mode: OutputMode::parse_lenient(record.get("mode").and_then(Value::as_str)),
        turn_on_time: record.get("turnOnTime").and_then(Value::as_str).map(str::to_owned),
        turn_off_time: record.get("turnOffTime").and_then(Value::as_str).map(str::to_owned),
        state_id: record.get("stateId").and_then(id_string),
        state_created_at: record
            .get("stateCreatedAt")
            .and_then(Value::as_str)
            .map(str::to_owned),
    })
}

/// Ids arrive as strings or numbers depending on the backend table.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AccountView {
    pub sessions: Vec<SessionRecord>,
    /// Id of the session this client is using
    pub session_now: Option<String>,
}

impl AccountView {
    pub fn current(&self) -> Option<&SessionRecord> {
        let session_now = self.session_now.as_deref()?;
        self.sessions.iter().find(|session| session.id == session_now)
    }

    /// Sessions paired with their status at `now`.
    pub fn statuses(&self, now: OffsetDateTime) -> Vec<(&SessionRecord, SessionStatus)> {
        self.sessions
            .iter()
            .map(|session| (session, session.status(now)))
            .collect()
    }
}

impl Reconcile for AccountView {
    fn reconcile(&self, incoming: &Value) -> Self {
        let Some(account) = incoming.get("account").filter(|account| account.is_object()) else {
            tracing::warn!("account payload without `account`, keeping current view");
            return self.clone();
        };

        let Some(records) = account.get("sessions").and_then(Value::as_array) else {
            tracing::warn!("account payload without a session list, keeping current view");
            return self.clone();
        };

        let sessions = records
            .iter()
            .filter_map(|record| match serde_json::from_value(record.clone()) {
                Ok(session) => Some(session),
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed session record");
                    None
                }
            })
            .collect();

        Self {
            sessions,
            session_now: account
                .get("sessionNow")
                .and_then(Value::as_str)
                .map(str::to_owned),
        }
    }
}

/// Latest readings per power meter, bounded per meter.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerView {
    pub history_limit: usize,
    pub meters: BTreeMap<String, VecDeque<PzemReading>>,
}

impl PowerView {
    pub fn with_limit(history_limit: usize) -> Self {
        Self {
            history_limit: history_limit.max(1),
            meters: BTreeMap::new(),
        }
    }

    pub fn latest(&self, pzem_id: &str) -> Option<&PzemReading> {
        self.meters.get(pzem_id).and_then(VecDeque::back)
    }

    pub fn history(&self, pzem_id: &str) -> impl Iterator<Item = &PzemReading> {
        self.meters.get(pzem_id).into_iter().flatten()
    }

    fn push(&mut self, reading: PzemReading) {
        let history = self.meters.entry(reading.pzem_id.clone()).or_default();
        history.push_back(reading);
        while history.len() > self.history_limit {
            history.pop_front();
        }
    }
}

impl Default for PowerView {
    fn default() -> Self {
        Self::with_limit(DEFAULT_PZEM_HISTORY)
    }
}

impl Reconcile for PowerView {
    fn reconcile(&self, incoming: &Value) -> Self {
        match incoming {
            Value::Array(records) => {
                let mut view = Self::with_limit(self.history_limit);
                for reading in records.iter().filter_map(parse_reading) {
                    view.push(reading);
                }
                view
            }
            Value::Object(_) => {
                let mut view = self.clone();
                if let Some(reading) = parse_reading(incoming) {
                    view.push(reading);
                }
                view
            }
            _ => {
                tracing::warn!("power payload is neither a reading nor a list, keeping current view");
                self.clone()
            }
        }
    }
}

fn parse_reading(record: &Value) -> Option<PzemReading> {
    serde_json::from_value(record.clone())
        .map_err(|e| tracing::warn!(error = %e, "dropping malformed power reading"))
        .ok()
}

/// Audit log, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogView {
    pub limit: usize,
    pub entries: VecDeque<LogEntry>,
}

impl LogView {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            entries: VecDeque::new(),
        }
    }
}

impl Default for LogView {
    fn default() -> Self {
        Self::with_limit(DEFAULT_LOG_HISTORY)
    }
}

impl Reconcile for LogView {
    fn reconcile(&self, incoming: &Value) -> Self {
        let parse = |record: &Value| -> Option<LogEntry> {
            serde_json::from_value(record.clone())
                .map_err(|e| tracing::warn!(error = %e, "dropping malformed log entry"))
                .ok()
        };

        let mut view = match incoming {
            Value::Array(records) => Self {
                limit: self.limit,
                entries: records.iter().filter_map(|record| parse(record)).collect(),
            },
            Value::Object(_) => {
                let mut view = self.clone();
                if let Some(entry) = parse(incoming) {
                    view.entries.push_front(entry);
                }
                view
            }
            _ => {
                tracing::warn!("log payload is neither an entry nor a list, keeping current view");
                return self.clone();
            }
        };

        view.entries.truncate(view.limit);
        view
    }
}

/// Current session id reported on the session channel.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionGate {
    pub session_id: Option<String>,
}

impl Reconcile for SessionGate {
    fn reconcile(&self, incoming: &Value) -> Self {
        match incoming.get("sessionId").and_then(id_string) {
            Some(session_id) => Self {
                session_id: Some(session_id),
            },
            None => self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::Duration;

    use crate::draft::DraftStore;

    use super::*;

    fn reading(pzem_id: &str, power: f64) -> Value {
        json!({
            "pzemId": pzem_id,
            "voltage": 220.0,
            "current": power / 220.0,
            "power": power,
            "energy": 1.5,
            "frequency": 50.0,
            "powerFactor": 0.9,
            "createdAt": "2024-05-01T10:00:00Z"
        })
    }

    #[test]
    fn test_output_shaping() {
        let view = OutputView::default().reconcile(&json!([
            {"id": "1", "name": "Porch", "state": true, "mode": "AUTO_SUN"},
            {"id": 2, "name": "Pump", "state": false, "mode": "AUTO_DATETIME",
             "turnOnTime": "06:00", "turnOffTime": "18:00", "stateId": 44},
            {"id": "3", "name": "Fan", "state": null, "mode": "TURBO"},
            {"id": "4", "name": "Heater"}
        ]));

        let states: Vec<_> = view.outputs.iter().map(|o| (o.id.as_str(), o.state, o.mode)).collect();
        assert_eq!(
            states,
            vec![
                ("1", OutputState::On, OutputMode::AutoSun),
                ("2", OutputState::Off, OutputMode::AutoDatetime),
                ("3", OutputState::Unknown, OutputMode::Manual),
                ("4", OutputState::Unknown, OutputMode::Manual),
            ]
        );
        let pump = view.get("2").unwrap();
        assert_eq!(pump.turn_on_time.as_deref(), Some("06:00"));
        assert_eq!(pump.state_id.as_deref(), Some("44"));
    }

    #[test]
    fn test_invalid_output_records_are_dropped_individually() {
        let view = OutputView::default().reconcile(&json!({"outputs": [
            {"id": "", "name": "Ghost"},
            {"name": "No id"},
            {"id": "9", "name": "  "},
            {"id": "1", "name": "Kept"}
        ]}));

        assert_eq!(view.outputs.len(), 1);
        assert_eq!(view.outputs[0].name, "Kept");
    }

    #[test]
    fn test_wrong_output_shape_keeps_view() {
        let current = OutputView::default().reconcile(&json!([{"id": "1", "name": "Porch"}]));

        assert_eq!(current.reconcile(&json!("nope")), current);
        assert_eq!(current.reconcile(&json!({"other": []})), current);
    }

    #[test]
    fn test_snapshot_leaves_open_draft_untouched() {
        let current = OutputView::default().reconcile(&json!([
            {"id": "x", "name": "Porch", "state": true, "mode": "MANUAL"},
            {"id": "y", "name": "Pump", "state": false, "mode": "MANUAL"}
        ]));

        let mut drafts = DraftStore::new();
        let draft = drafts.open(current.get("x").unwrap());
        draft.mode = OutputMode::AutoDatetime;
        draft.turn_on_time = Some("05:15".into());
        let before = drafts.get("x").cloned();

        let next = current.reconcile(&json!([
            {"id": "x", "name": "Porch", "state": false, "mode": "AUTO_SUN"},
            {"id": "y", "name": "Pump", "state": true, "mode": "AUTO_SUN"}
        ]));

        assert_eq!(drafts.get("x").cloned(), before);
        assert_eq!(next.get("x").unwrap().state, OutputState::Off);
        assert_eq!(next.get("y").unwrap().state, OutputState::On);
        assert_eq!(next.get("y").unwrap().mode, OutputMode::AutoSun);
    }

    #[test]
    fn test_account_snapshot() {
        let view = AccountView::default().reconcile(&json!({"account": {
            "sessions": [
                {"id": "abc", "device": "Chrome", "createdAt": "2024-05-01T10:00:00Z",
                 "lastAccessedAt": "2024-05-01T10:00:30Z"},
                {"id": "def", "device": "Phone", "createdAt": "2024-05-01T09:00:00Z",
                 "lastAccessedAt": "2024-05-01T09:58:30Z"},
                {"device": "broken"}
            ],
            "sessionNow": "abc"
        }}));

        assert_eq!(view.sessions.len(), 2);
        assert_eq!(view.current().unwrap().device, "Chrome");

        let now = view.sessions[0].last_accessed_at + Duration::seconds(30);
        let statuses: Vec<_> = view.statuses(now).into_iter().map(|(s, st)| (s.id.as_str(), st)).collect();
        assert_eq!(
            statuses,
            vec![("abc", SessionStatus::Online), ("def", SessionStatus::Offline)]
        );

        assert_eq!(view.reconcile(&json!({"iv": "00"})), view);
    }

    #[test]
    fn test_account_keeps_sessions_on_malformed_payload() {
        let view = AccountView::default().reconcile(&json!({"account": {
            "sessions": [
                {"id": "abc", "device": "Chrome", "createdAt": "2024-05-01T10:00:00Z",
                 "lastAccessedAt": "2024-05-01T10:00:30Z"}
            ],
            "sessionNow": "abc"
        }}));
        assert_eq!(view.sessions.len(), 1);

        for malformed in [
            json!({"account": {"sessions": "garbage", "sessionNow": "zzz"}}),
            json!({"account": {}}),
            json!({"account": {"sessions": null}}),
            json!({"account": []}),
        ] {
            let next = view.reconcile(&malformed);
            assert_eq!(next, view, "payload {malformed} changed the view");
            assert_eq!(next.session_now.as_deref(), Some("abc"));
        }
    }

    #[test]
    fn test_power_delta_and_snapshot_are_bounded() {
        let mut view = PowerView::with_limit(3);
        for power in [10.0, 20.0, 30.0, 40.0] {
            view = view.reconcile(&reading("m1", power));
        }
        view = view.reconcile(&reading("m2", 5.0));

        let powers: Vec<_> = view.history("m1").map(|r| r.power).collect();
        assert_eq!(powers, vec![20.0, 30.0, 40.0]);
        assert_eq!(view.latest("m2").unwrap().power, 5.0);

        let snapshot = view.reconcile(&json!([reading("m3", 1.0), {"pzemId": "bad"}]));
        assert!(snapshot.latest("m1").is_none());
        assert_eq!(snapshot.latest("m3").unwrap().power, 1.0);
        assert_eq!(snapshot.history_limit, 3);
    }

    #[test]
    fn test_log_view_is_newest_first_and_bounded() {
        let entry = |id: &str| json!({"id": id, "message": format!("event {id}"), "createdAt": "2024-05-01T10:00:00Z"});

        let mut view = LogView::with_limit(2);
        view = view.reconcile(&json!([entry("1")]));
        view = view.reconcile(&entry("2"));
        view = view.reconcile(&entry("3"));

        let ids: Vec<_> = view.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2"]);
    }

    #[test]
    fn test_session_gate() {
        let gate = SessionGate::default().reconcile(&json!({"sessionId": "abc"}));
        assert_eq!(gate.session_id.as_deref(), Some("abc"));
        assert_eq!(gate.reconcile(&json!({})), gate);
    }
}
