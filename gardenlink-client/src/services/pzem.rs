use gardenlink_api::models::{CreatePzemRequest, PzemDevice, PzemReading, UpdatePzemRequest};
use serde_json::Value;

use crate::dispatcher::{Command, CommandDispatcher};
use crate::error::Result;
use crate::validation::validate_required;

#[derive(Clone)]
pub struct PzemService {
    dispatcher: CommandDispatcher,
}

impl PzemService {
    pub fn new(dispatcher: CommandDispatcher) -> Self {
        Self { dispatcher }
    }

    pub async fn list(&self) -> Result<Vec<PzemDevice>> {
        self.dispatcher.execute_as(&Command::ListPzem).await
    }

    pub async fn create(&self, request: CreatePzemRequest) -> Result<PzemDevice> {
        validate_required("name", &request.name)?;

        let device = self.dispatcher.execute_as(&Command::CreatePzem(request)).await?;
        self.dispatcher.notifier().success("Power meter added");
        Ok(device)
    }

    pub async fn update(&self, id: &str, request: UpdatePzemRequest) -> Result<PzemDevice> {
        if let Some(name) = &request.name {
            validate_required("name", name)?;
        }

        let device = self
            .dispatcher
            .execute_as(&Command::UpdatePzem {
                id: id.to_string(),
                request,
            })
            .await?;
        self.dispatcher.notifier().success("Power meter updated");
        Ok(device)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.dispatcher
            .execute(&Command::DeletePzem { id: id.to_string() })
            .await?;
        self.dispatcher.notifier().success("Power meter removed");
        Ok(())
    }

    /// Readings for the chart of one meter, oldest first.
    pub async fn chart(&self, id: &str) -> Result<Vec<PzemReading>> {
        self.dispatcher
            .execute_as(&Command::PzemChart { id: id.to_string() })
            .await
    }

    pub async fn logs(&self, id: &str) -> Result<Vec<PzemReading>> {
        self.dispatcher
            .execute_as(&Command::PzemLogs { id: id.to_string() })
            .await
    }

    pub async fn latest(&self, id: &str) -> Result<Option<PzemReading>> {
        let value = self
            .dispatcher
            .execute(&Command::PzemLatest { id: id.to_string() })
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    /// Asks the meter to zero its energy counter.
    pub async fn reset(&self, id: &str) -> Result<Value> {
        let response = self
            .dispatcher
            .execute(&Command::ResetPzem { id: id.to_string() })
            .await?;
        self.dispatcher.notifier().info("Reset command sent");
        Ok(response)
    }
}
