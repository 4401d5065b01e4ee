use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gardenlink_api::DecryptError;
use gardenlink_api::models::ErrorResponse;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum MockError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid session")]
    InvalidSession,

    #[error("Insufficient permission")]
    InsufficientPermission,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Email already used")]
    EmailExists,

    #[error("Old password is wrong")]
    WrongPassword,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Failed to seal payload: {0}")]
    Seal(#[from] DecryptError),
}

impl MockError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MockError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            MockError::InvalidSession => StatusCode::UNAUTHORIZED,
            MockError::InsufficientPermission => StatusCode::FORBIDDEN,
            MockError::NotFound(_) => StatusCode::NOT_FOUND,
            MockError::EmailExists => StatusCode::CONFLICT,
            MockError::WrongPassword => StatusCode::BAD_REQUEST,
            MockError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            MockError::Seal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for MockError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            MockError::Seal(e) => {
                let error_id = Uuid::new_v4();
                tracing::error!(?error_id, "Seal error: {}", e);
                "Internal server error".to_string()
            }
            e => e.to_string(),
        };

        (status, Json(ErrorResponse { message: Some(message) })).into_response()
    }
}
