use gardenlink_api::DecryptError;
use reqwest::StatusCode;

use crate::validation::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Decrypt error: {0}")]
    Decrypt(#[from] DecryptError),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session rejected by the server ({0})")]
    Auth(StatusCode),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Server error {status}: {message}")]
    Server { status: StatusCode, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not signed in")]
    Unauthenticated,
}

impl ClientError {
    /// Errors that end the session and require a new sign-in.
    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Auth(_) | ClientError::Unauthenticated)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Connection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ClientError::Server {
                status: StatusCode::BAD_REQUEST,
                message: "Name taken".into(),
            }
            .to_string(),
            "Server error 400 Bad Request: Name taken"
        );
        assert_eq!(
            ClientError::Auth(StatusCode::UNAUTHORIZED).to_string(),
            "Session rejected by the server (401 Unauthorized)"
        );
        assert!(ClientError::Unauthenticated.is_auth());
        assert!(!ClientError::Connection("reset".into()).is_auth());
    }
}
