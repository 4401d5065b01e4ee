use gardenlink_api::models::{
    AccountResponse, ChangePasswordRequest, EditAccountRequest, LoginRequest, LoginResponse,
    RemoteLogoutRequest, TokenValidation, ValidatePasswordRequest,
};

use crate::dispatcher::{Command, CommandDispatcher};
use crate::error::Result;
use crate::validation::{validate_password_change, validate_required};

#[derive(Clone)]
pub struct AccountService {
    dispatcher: CommandDispatcher,
}

impl AccountService {
    pub fn new(dispatcher: CommandDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Signs in and stores the token with the expiry handed out by the server.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        validate_required("email", email)?;
        validate_required("password", password)?;

        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let response: LoginResponse = self.dispatcher.execute_as(&Command::Login(request)).await?;

        self.dispatcher
            .session()
            .sign_in(response.token.clone(), Some(response.expires_at));
        tracing::info!(role = %response.role, "signed in");

        Ok(response)
    }

    /// Ends the session on the server. The local session is dropped even when
    /// the request fails.
    pub async fn logout(&self) -> Result<()> {
        let result = self.dispatcher.execute(&Command::Logout).await;
        self.dispatcher.session().sign_out();
        result.map(|_| ())
    }

    pub async fn validate_token(&self) -> Result<TokenValidation> {
        self.dispatcher.execute_as(&Command::ValidateToken).await
    }

    pub async fn account(&self) -> Result<AccountResponse> {
        self.dispatcher.execute_as(&Command::Account).await
    }

    pub async fn edit(&self, request: EditAccountRequest) -> Result<AccountResponse> {
        if let Some(name) = &request.name {
            validate_required("name", name)?;
        }
        if let Some(email) = &request.email {
            validate_required("email", email)?;
        }

        let account = self
            .dispatcher
            .execute_as(&Command::EditAccount(request))
            .await?;
        self.dispatcher.notifier().success("Account updated");
        Ok(account)
    }

    /// Checked locally first; a weak or mismatched password never reaches the network.
    pub async fn change_password(&self, current: &str, new: &str, confirmation: &str) -> Result<()> {
        validate_password_change(current, new, confirmation)?;

        let request = ChangePasswordRequest {
            old_password: current.to_string(),
            new_password: new.to_string(),
        };
        self.dispatcher.execute(&Command::ChangePassword(request)).await?;
        self.dispatcher.notifier().success("Password changed");
        Ok(())
    }

    /// Ends another session of this account, such as one listed in the account view.
    pub async fn remote_logout(&self, session_id: &str) -> Result<()> {
        let request = RemoteLogoutRequest {
            session_id: session_id.to_string(),
        };
        self.dispatcher.execute(&Command::RemoteLogout(request)).await?;
        self.dispatcher.notifier().success("Session signed out");
        Ok(())
    }

    pub async fn validate_password(&self, password: &str) -> Result<bool> {
        validate_required("password", password)?;

        let request = ValidatePasswordRequest {
            password: password.to_string(),
        };
        let value = self.dispatcher.execute(&Command::ValidatePassword(request)).await?;
        Ok(value.get("valid").and_then(|valid| valid.as_bool()).unwrap_or(false))
    }
}
