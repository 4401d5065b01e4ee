use gardenlink_api::models::{DeviceState, UpdateOutputRequest};
use serde_json::Value;

use crate::dispatcher::{Command, CommandDispatcher};
use crate::draft::DraftStore;
use crate::error::{ClientError, Result};

/// Output control. Nothing here touches the output view: the new state is
/// shown once the backend pushes it.
#[derive(Clone)]
pub struct OutputService {
    dispatcher: CommandDispatcher,
}

impl OutputService {
    pub fn new(dispatcher: CommandDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Flips the output. An output in unknown state is switched on.
    pub async fn toggle(&self, device: &DeviceState) -> Result<Value> {
        let request = UpdateOutputRequest {
            state: Some(device.state.toggled().unwrap_or(true)),
            ..Default::default()
        };
        self.update(&device.id, request).await
    }

    pub async fn update(&self, id: &str, request: UpdateOutputRequest) -> Result<Value> {
        tracing::debug!(%id, ?request, "updating output");

        self.dispatcher
            .execute(&Command::UpdateOutput {
                id: id.to_string(),
                request,
            })
            .await
    }

    /// Sends the draft of `id`. The draft stays open when validation or the
    /// request fails, and is discarded once the server accepts it.
    pub async fn save_draft(&self, drafts: &mut DraftStore, id: &str) -> Result<Value> {
        let request = match drafts.prepare(id) {
            Some(request) => request?,
            None => {
                return Err(ClientError::Config(format!("no settings editor open for output {id}")));
            }
        };

        let response = self.update(id, request).await?;
        drafts.cancel(id);
        self.dispatcher.notifier().success("Settings saved");

        Ok(response)
    }
}
