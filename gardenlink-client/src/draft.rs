use std::collections::HashMap;

use gardenlink_api::models::{DeviceState, OutputMode, UpdateOutputRequest};

use crate::validation::{ValidationError, validate_time};

/// Unsaved settings of one output, edited while its settings editor is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempSettings {
    pub mode: OutputMode,
    pub turn_on_time: Option<String>,
    pub turn_off_time: Option<String>,
}

impl TempSettings {
    pub fn from_device(device: &DeviceState) -> Self {
        Self {
            mode: device.mode,
            turn_on_time: device.turn_on_time.clone(),
            turn_off_time: device.turn_off_time.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let times = [
            ("turnOnTime", self.turn_on_time.as_deref()),
            ("turnOffTime", self.turn_off_time.as_deref()),
        ];

        for (field, value) in times {
            match value {
                Some(value) => validate_time(field, value)?,
                None if self.mode == OutputMode::AutoDatetime => {
                    return Err(ValidationError::Required { field, mode: self.mode });
                }
                None => {}
            }
        }
        Ok(())
    }

    pub fn to_request(&self) -> UpdateOutputRequest {
        UpdateOutputRequest {
            state: None,
            mode: Some(self.mode),
            turn_on_time: self.turn_on_time.clone(),
            turn_off_time: self.turn_off_time.clone(),
        }
    }
}

/// Draft buffers keyed by output id.
///
/// Kept apart from the reconciled view so a push can never overwrite input
/// that has not been saved yet.
#[derive(Debug, Default, Clone)]
pub struct DraftStore {
    drafts: HashMap<String, TempSettings>,
}

impl DraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the editor for `device`. Reopening keeps the existing draft.
    pub fn open(&mut self, device: &DeviceState) -> &mut TempSettings {
        self.drafts
            .entry(device.id.clone())
            .or_insert_with(|| TempSettings::from_device(device))
    }

    pub fn get(&self, id: &str) -> Option<&TempSettings> {
        self.drafts.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TempSettings> {
        self.drafts.get_mut(id)
    }

    pub fn is_open(&self, id: &str) -> bool {
        self.drafts.contains_key(id)
    }

    /// Discards the draft without sending anything.
    pub fn cancel(&mut self, id: &str) -> Option<TempSettings> {
        self.drafts.remove(id)
    }

    /// Validated request for the draft of `id`, leaving the draft open.
    pub fn prepare(&self, id: &str) -> Option<Result<UpdateOutputRequest, ValidationError>> {
        self.drafts
            .get(id)
            .map(|draft| draft.validate().map(|_| draft.to_request()))
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use gardenlink_api::models::OutputState;

    use super::*;

    fn device(id: &str) -> DeviceState {
        DeviceState {
            id: id.to_string(),
            name: format!("Light {id}"),
            state: OutputState::On,
            mode: OutputMode::Manual,
            turn_on_time: None,
            turn_off_time: None,
            state_id: None,
            state_created_at: None,
        }
    }

    #[test]
    fn test_open_edit_cancel() {
        let mut drafts = DraftStore::new();
        let lamp = device("1");

        drafts.open(&lamp).mode = OutputMode::AutoSun;
        assert_eq!(drafts.open(&lamp).mode, OutputMode::AutoSun);
        assert!(drafts.is_open("1"));

        let discarded = drafts.cancel("1").unwrap();
        assert_eq!(discarded.mode, OutputMode::AutoSun);
        assert!(drafts.is_empty());
    }

    #[test]
    fn test_datetime_mode_needs_both_times() {
        let mut drafts = DraftStore::new();
        let draft = drafts.open(&device("1"));
        draft.mode = OutputMode::AutoDatetime;
        draft.turn_on_time = Some("06:00".into());

        assert_eq!(
            drafts.prepare("1"),
            Some(Err(ValidationError::Required {
                field: "turnOffTime",
                mode: OutputMode::AutoDatetime,
            }))
        );

        drafts.get_mut("1").unwrap().turn_off_time = Some("18:45".into());
        let request = drafts.prepare("1").unwrap().unwrap();
        assert_eq!(request.mode, Some(OutputMode::AutoDatetime));
        assert_eq!(request.turn_off_time.as_deref(), Some("18:45"));
        assert!(drafts.is_open("1"));
    }

    #[test]
    fn test_bad_time_is_rejected_in_any_mode() {
        let mut drafts = DraftStore::new();
        drafts.open(&device("1")).turn_on_time = Some("7pm".into());

        assert_eq!(
            drafts.prepare("1"),
            Some(Err(ValidationError::TimeFormat("turnOnTime")))
        );
        assert_eq!(drafts.prepare("2"), None);
    }
}
