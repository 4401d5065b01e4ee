use std::sync::Arc;
use std::time::Duration;

use gardenlink_api::envelope::{self, EncryptedEnvelope};
use gardenlink_api::models::{
    ChangePasswordRequest, CreatePzemRequest, EditAccountRequest, ErrorResponse, LoginRequest,
    RemoteLogoutRequest, UpdateOutputRequest, UpdatePzemRequest, ValidatePasswordRequest,
};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::configs::ClientContext;
use crate::error::{ClientError, Result};
use crate::notify::Notifier;
use crate::session::SessionStore;

/// Shown when the server gives no usable message.
pub const FALLBACK_ERROR: &str = "Something went wrong, please try again";
pub const UNREACHABLE_ERROR: &str = "Unable to reach the server";

/// Every control request the dashboard can issue.
#[derive(Debug, Clone)]
pub enum Command {
    Login(LoginRequest),
    Logout,
    ValidateToken,
    Account,
    EditAccount(EditAccountRequest),
    ChangePassword(ChangePasswordRequest),
    RemoteLogout(RemoteLogoutRequest),
    ValidatePassword(ValidatePasswordRequest),
    UpdateOutput { id: String, request: UpdateOutputRequest },
    ListPzem,
    CreatePzem(CreatePzemRequest),
    UpdatePzem { id: String, request: UpdatePzemRequest },
    DeletePzem { id: String },
    PzemChart { id: String },
    PzemLogs { id: String },
    PzemLatest { id: String },
    ResetPzem { id: String },
}

impl Command {
    pub fn method(&self) -> Method {
        match self {
            Command::Account
            | Command::ListPzem
            | Command::PzemChart { .. }
            | Command::PzemLogs { .. }
            | Command::PzemLatest { .. } => Method::GET,
            Command::EditAccount(_)
            | Command::ChangePassword(_)
            | Command::UpdateOutput { .. }
            | Command::UpdatePzem { .. } => Method::PUT,
            Command::DeletePzem { .. } => Method::DELETE,
            Command::Login(_)
            | Command::Logout
            | Command::ValidateToken
            | Command::RemoteLogout(_)
            | Command::ValidatePassword(_)
            | Command::CreatePzem(_)
            | Command::ResetPzem { .. } => Method::POST,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Command::Login(_) => "/api/users/login".into(),
            Command::Logout => "/api/users/logout".into(),
            Command::ValidateToken => "/api/users/token/validator".into(),
            Command::Account => "/api/users/account".into(),
            Command::EditAccount(_) => "/api/users/edit".into(),
            Command::ChangePassword(_) => "/api/users/change-password".into(),
            Command::RemoteLogout(_) => "/api/users/remote-logout".into(),
            Command::ValidatePassword(_) => "/api/users/validate-password".into(),
            Command::UpdateOutput { id, .. } => format!("/api/device/output/{id}"),
            Command::ListPzem | Command::CreatePzem(_) => "/api/device/pzem".into(),
            Command::UpdatePzem { id, .. } | Command::DeletePzem { id } => {
                format!("/api/device/pzem/{id}")
            }
            Command::PzemChart { id } => format!("/api/device/pzem/{id}/chart"),
            Command::PzemLogs { id } => format!("/api/device/pzem/{id}/logs"),
            Command::PzemLatest { id } => format!("/api/device/pzem/{id}/latest"),
            Command::ResetPzem { id } => format!("/api/device/pzem/{id}/reset-command"),
        }
    }

    pub fn body(&self) -> Result<Option<Value>> {
        let body = match self {
            Command::Login(request) => serde_json::to_value(request)?,
            Command::EditAccount(request) => serde_json::to_value(request)?,
            Command::ChangePassword(request) => serde_json::to_value(request)?,
            Command::RemoteLogout(request) => serde_json::to_value(request)?,
            Command::ValidatePassword(request) => serde_json::to_value(request)?,
            Command::UpdateOutput { request, .. } => serde_json::to_value(request)?,
            Command::CreatePzem(request) => serde_json::to_value(request)?,
            Command::UpdatePzem { request, .. } => serde_json::to_value(request)?,
            _ => return Ok(None),
        };
        Ok(Some(body))
    }

    /// Whether the request carries the session token.
    pub fn requires_auth(&self) -> bool {
        !matches!(self, Command::Login(_))
    }
}

/// Sends control requests. Successful responses never touch view state; the
/// authoritative value arrives on the push stream.
#[derive(Clone)]
pub struct CommandDispatcher {
    http: reqwest::Client,
    context: Arc<ClientContext>,
    session: SessionStore,
    notifier: Notifier,
}

impl CommandDispatcher {
    pub fn new(context: Arc<ClientContext>, session: SessionStore, notifier: Notifier) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            http,
            context,
            session,
            notifier,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Sends `command` with the token from the session store.
    pub async fn execute(&self, command: &Command) -> Result<Value> {
        if !command.requires_auth() {
            return self.send(command, None).await;
        }

        let token = self.session.token().ok_or(ClientError::Unauthenticated)?;
        self.send(command, Some(&token)).await
    }

    pub async fn execute_as<T: DeserializeOwned>(&self, command: &Command) -> Result<T> {
        Ok(serde_json::from_value(self.execute(command).await?)?)
    }

    pub async fn send(&self, command: &Command, token: Option<&str>) -> Result<Value> {
        let url = self.context.endpoints.http(&command.path())?;
        tracing::debug!(method = %command.method(), %url, "dispatching command");

        let mut request = self.http.request(command.method(), url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = command.body()? {
            request = request.json(&body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                self.notifier.error(UNREACHABLE_ERROR);
                return Err(e.into());
            }
        };

        let status = response.status();
        let text = response.text().await?;

        if is_auth_failure(status) && command.requires_auth() {
            self.session.force_logout(format!("{} rejected with {status}", command.path()));
            return Err(ClientError::Auth(status));
        }

        if !status.is_success() {
            let message = server_message(&text).unwrap_or_else(|| FALLBACK_ERROR.to_string());
            self.notifier.error(message.clone());
            return Err(ClientError::Server { status, message });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        let value: Value = serde_json::from_str(&text)?;
        match EncryptedEnvelope::detect(&value) {
            Some(sealed) => envelope::decrypt(&sealed, &self.context.secret).map_err(|e| {
                tracing::warn!(error = %e, path = %command.path(), "dropping undecryptable response");
                e.into()
            }),
            None => Ok(value),
        }
    }
}

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

fn server_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|error| error.message)
        .filter(|message| !message.trim().is_empty())
}
